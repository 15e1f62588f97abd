use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::{OnceCell, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

use super::backends::{BackendFactory, BackgroundRemover, FaceAnalyzer, FaceSwapper, Upscaler};
use crate::error::ResourceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    FaceAnalyzer,
    FaceSwapper,
    Upscaler,
    BackgroundRemover,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::FaceAnalyzer,
        ResourceKind::FaceSwapper,
        ResourceKind::Upscaler,
        ResourceKind::BackgroundRemover,
    ];

    fn index(self) -> usize {
        match self {
            ResourceKind::FaceAnalyzer => 0,
            ResourceKind::FaceSwapper => 1,
            ResourceKind::Upscaler => 2,
            ResourceKind::BackgroundRemover => 3,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::FaceAnalyzer => "face analyzer",
            ResourceKind::FaceSwapper => "face swapper",
            ResourceKind::Upscaler => "upscaler",
            ResourceKind::BackgroundRemover => "background remover",
        };
        f.write_str(name)
    }
}

#[derive(Clone)]
pub enum Resource {
    FaceAnalyzer(Arc<dyn FaceAnalyzer>),
    FaceSwapper(Arc<dyn FaceSwapper>),
    Upscaler(Arc<dyn Upscaler>),
    BackgroundRemover(Arc<dyn BackgroundRemover>),
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::FaceAnalyzer(_) => ResourceKind::FaceAnalyzer,
            Resource::FaceSwapper(_) => ResourceKind::FaceSwapper,
            Resource::Upscaler(_) => ResourceKind::Upscaler,
            Resource::BackgroundRemover(_) => ResourceKind::BackgroundRemover,
        }
    }
}

/// How concurrent jobs in one process may use the shared backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceAccess {
    /// Backends are invoked by several jobs at once.
    Shared,
    /// One backend invocation at a time across the whole process.
    #[default]
    Serialized,
}

/// Process-wide holder of the expensive compute backends.
///
/// Each backend is built on first use and kept until the process exits.
/// When several jobs race for a backend that is not built yet, exactly one
/// of them runs the factory and the rest wait for and reuse its instance.
/// A failed construction is not cached; the next caller tries again.
pub struct ServiceRegistry {
    factory: Arc<dyn BackendFactory>,
    face_analyzer: OnceCell<Arc<dyn FaceAnalyzer>>,
    face_swapper: OnceCell<Arc<dyn FaceSwapper>>,
    upscaler: OnceCell<Arc<dyn Upscaler>>,
    background_remover: OnceCell<Arc<dyn BackgroundRemover>>,
    constructions: [AtomicUsize; 4],
    access: InferenceAccess,
    inference: Arc<Semaphore>,
}

impl ServiceRegistry {
    pub fn new(factory: Arc<dyn BackendFactory>) -> Self {
        Self::with_access(factory, InferenceAccess::default())
    }

    pub fn with_access(factory: Arc<dyn BackendFactory>, access: InferenceAccess) -> Self {
        let permits = match access {
            InferenceAccess::Shared => Semaphore::MAX_PERMITS,
            InferenceAccess::Serialized => 1,
        };
        Self {
            factory,
            face_analyzer: OnceCell::new(),
            face_swapper: OnceCell::new(),
            upscaler: OnceCell::new(),
            background_remover: OnceCell::new(),
            constructions: Default::default(),
            access,
            inference: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn access(&self) -> InferenceAccess {
        self.access
    }

    pub async fn get(&self, kind: ResourceKind) -> Result<Resource, ResourceError> {
        Ok(match kind {
            ResourceKind::FaceAnalyzer => Resource::FaceAnalyzer(self.face_analyzer().await?),
            ResourceKind::FaceSwapper => Resource::FaceSwapper(self.face_swapper().await?),
            ResourceKind::Upscaler => Resource::Upscaler(self.upscaler().await?),
            ResourceKind::BackgroundRemover => {
                Resource::BackgroundRemover(self.background_remover().await?)
            }
        })
    }

    pub async fn face_analyzer(&self) -> Result<Arc<dyn FaceAnalyzer>, ResourceError> {
        self.get_or_build(ResourceKind::FaceAnalyzer, &self.face_analyzer, |f| {
            f.face_analyzer()
        })
        .await
    }

    pub async fn face_swapper(&self) -> Result<Arc<dyn FaceSwapper>, ResourceError> {
        self.get_or_build(ResourceKind::FaceSwapper, &self.face_swapper, |f| {
            f.face_swapper()
        })
        .await
    }

    pub async fn upscaler(&self) -> Result<Arc<dyn Upscaler>, ResourceError> {
        self.get_or_build(ResourceKind::Upscaler, &self.upscaler, |f| f.upscaler())
            .await
    }

    pub async fn background_remover(&self) -> Result<Arc<dyn BackgroundRemover>, ResourceError> {
        self.get_or_build(
            ResourceKind::BackgroundRemover,
            &self.background_remover,
            |f| f.background_remover(),
        )
        .await
    }

    /// Number of times the factory successfully built `kind` in this process.
    pub fn constructions(&self, kind: ResourceKind) -> usize {
        self.constructions[kind.index()].load(Ordering::SeqCst)
    }

    /// Permit that must be held for the duration of one backend call.
    /// Under `Serialized` access only one permit exists per process.
    pub async fn inference_permit(
        &self,
        kind: ResourceKind,
    ) -> Result<OwnedSemaphorePermit, ResourceError> {
        self.inference
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ResourceError::Unavailable {
                kind,
                reason: format!("inference gate closed: {e}"),
            })
    }

    async fn get_or_build<T, F>(
        &self,
        kind: ResourceKind,
        cell: &OnceCell<Arc<T>>,
        build: F,
    ) -> Result<Arc<T>, ResourceError>
    where
        T: ?Sized + Send + Sync + 'static,
        F: FnOnce(&dyn BackendFactory) -> Result<Arc<T>, ResourceError> + Send + 'static,
    {
        let resource = cell
            .get_or_try_init(|| async move {
                info!("Constructing {} backend", kind);
                let factory = self.factory.clone();
                let built = tokio::task::spawn_blocking(move || build(factory.as_ref()))
                    .await
                    .map_err(|e| ResourceError::Unavailable {
                        kind,
                        reason: format!("construction panicked: {e}"),
                    })??;
                self.constructions[kind.index()].fetch_add(1, Ordering::SeqCst);
                Ok::<_, ResourceError>(built)
            })
            .await?;
        debug!("Reusing cached {} backend", kind);
        Ok(resource.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{BoundingBox, FaceDescriptor};
    use image::{RgbImage, RgbaImage};
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    struct StubAnalyzer;

    impl FaceAnalyzer for StubAnalyzer {
        fn detect(&self, _image: &RgbImage) -> Result<Vec<FaceDescriptor>, ResourceError> {
            Ok(vec![FaceDescriptor::from_bounds(
                BoundingBox::new(0, 0, 4, 4),
                vec![],
                1.0,
            )])
        }
    }

    struct StubSwapper;

    impl FaceSwapper for StubSwapper {
        fn swap(
            &self,
            target: &RgbImage,
            _target_face: &FaceDescriptor,
            _source: &RgbImage,
            _source_face: &FaceDescriptor,
        ) -> Result<RgbImage, ResourceError> {
            Ok(target.clone())
        }
    }

    struct StubUpscaler;

    impl Upscaler for StubUpscaler {
        fn factor(&self) -> u32 {
            1
        }

        fn enhance(&self, image: &RgbImage) -> Result<RgbImage, ResourceError> {
            Ok(image.clone())
        }
    }

    struct StubRemover;

    impl BackgroundRemover for StubRemover {
        fn remove_background(&self, image: &RgbImage) -> Result<RgbaImage, ResourceError> {
            Ok(RgbaImage::new(image.width(), image.height()))
        }
    }

    /// Slow factory whose first upscaler construction fails when asked to.
    struct SlowFactory {
        fail_upscaler_once: AtomicBool,
    }

    impl BackendFactory for SlowFactory {
        fn face_analyzer(&self) -> Result<Arc<dyn FaceAnalyzer>, ResourceError> {
            std::thread::sleep(Duration::from_millis(50));
            Ok(Arc::new(StubAnalyzer))
        }

        fn face_swapper(&self) -> Result<Arc<dyn FaceSwapper>, ResourceError> {
            Ok(Arc::new(StubSwapper))
        }

        fn upscaler(&self) -> Result<Arc<dyn Upscaler>, ResourceError> {
            if self.fail_upscaler_once.swap(false, Ordering::SeqCst) {
                return Err(ResourceError::Unavailable {
                    kind: ResourceKind::Upscaler,
                    reason: "device busy".to_string(),
                });
            }
            Ok(Arc::new(StubUpscaler))
        }

        fn background_remover(&self) -> Result<Arc<dyn BackgroundRemover>, ResourceError> {
            Ok(Arc::new(StubRemover))
        }
    }

    fn registry(fail_upscaler_once: bool) -> Arc<ServiceRegistry> {
        Arc::new(ServiceRegistry::new(Arc::new(SlowFactory {
            fail_upscaler_once: AtomicBool::new(fail_upscaler_once),
        })))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_callers_share_one_instance() {
        let registry = registry(false);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.face_analyzer().await })
            })
            .collect();

        let analyzers: Vec<_> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        assert_eq!(registry.constructions(ResourceKind::FaceAnalyzer), 1);
        for analyzer in &analyzers[1..] {
            assert!(Arc::ptr_eq(&analyzers[0], analyzer));
        }
    }

    #[tokio::test]
    async fn failed_construction_is_retried_on_next_use() {
        let registry = registry(true);
        let first = registry.upscaler().await;
        assert!(matches!(first, Err(ResourceError::Unavailable { .. })));
        assert_eq!(registry.constructions(ResourceKind::Upscaler), 0);

        assert!(registry.upscaler().await.is_ok());
        assert!(registry.upscaler().await.is_ok());
        assert_eq!(registry.constructions(ResourceKind::Upscaler), 1);
    }

    #[tokio::test]
    async fn get_returns_resource_of_requested_kind() {
        let registry = registry(false);
        for kind in ResourceKind::ALL {
            let resource = registry.get(kind).await.unwrap();
            assert_eq!(resource.kind(), kind);
        }
        let remover = registry.background_remover().await.unwrap();
        let mask = remover.foreground_mask(&RgbImage::new(3, 2)).unwrap();
        assert_eq!(mask.dimensions(), (3, 2));
    }

    #[tokio::test]
    async fn serialized_access_hands_out_a_single_permit() {
        let registry = registry(false);
        assert_eq!(registry.access(), InferenceAccess::Serialized);
        let permit = registry
            .inference_permit(ResourceKind::Upscaler)
            .await
            .unwrap();
        let second = tokio::time::timeout(
            Duration::from_millis(50),
            registry.inference_permit(ResourceKind::FaceSwapper),
        )
        .await;
        assert!(second.is_err());
        drop(permit);
        assert!(registry.inference_permit(ResourceKind::Upscaler).await.is_ok());
    }

    #[tokio::test]
    async fn shared_access_allows_parallel_permits() {
        let registry = ServiceRegistry::with_access(
            Arc::new(SlowFactory {
                fail_upscaler_once: AtomicBool::new(false),
            }),
            InferenceAccess::Shared,
        );
        let _a = registry.inference_permit(ResourceKind::Upscaler).await.unwrap();
        let _b = registry.inference_permit(ResourceKind::Upscaler).await.unwrap();
    }
}
