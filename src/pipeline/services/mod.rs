pub mod background;
pub mod backends;
pub mod cpu_backends;
pub mod face_analysis;
pub mod face_swap;
pub mod service_registry;
pub mod upscale;

pub use backends::{BackendFactory, BackgroundRemover, FaceAnalyzer, FaceSwapper, Upscaler};
pub use cpu_backends::CpuBackendFactory;
pub use service_registry::{InferenceAccess, Resource, ResourceKind, ServiceRegistry};
pub use upscale::ResampleFilter;
