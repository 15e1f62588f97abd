pub mod job;
pub mod layout;

pub use job::{EffectType, ImageRole, Job};
pub use layout::FileLayout;
