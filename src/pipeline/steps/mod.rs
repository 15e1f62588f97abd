pub mod candid_effect_step;
pub mod enhancement_step;
pub mod identity_transfer_step;

pub use candid_effect_step::{CandidEffectConfig, CandidEffectStage, CandidEffectStep};
pub use enhancement_step::{EnhancementPolicy, EnhancementStage, EnhancementStep};
pub use identity_transfer_step::{
    IdentityDirection, IdentityTransferStage, IdentityTransferStep, RoleImage,
};
