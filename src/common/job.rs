use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Stylistic treatment requested for a job. Anything other than
/// `street_candid` is delivered without the candid filter chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectType {
    #[default]
    StreetCandid,
    #[serde(other)]
    Plain,
}

impl EffectType {
    pub fn wants_candid_effect(self) -> bool {
        matches!(self, EffectType::StreetCandid)
    }
}

/// Which of the job's two input images a value refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageRole {
    /// The user's uploaded photograph.
    Source,
    /// The celebrity reference template.
    Template,
}

impl fmt::Display for ImageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageRole::Source => f.write_str("source"),
            ImageRole::Template => f.write_str("template"),
        }
    }
}

/// One unit of pipeline work, exactly as it arrives on the
/// `photo_processing` queue. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    #[serde(alias = "photo_id")]
    pub photo_id: i64,
    #[serde(alias = "celebrity_id")]
    pub celebrity_id: i64,
    #[serde(alias = "user_id")]
    pub user_id: i64,
    #[serde(default, alias = "effect_type")]
    pub effect_type: EffectType,
    #[serde(alias = "source_image_path")]
    pub source_image_path: PathBuf,
    #[serde(alias = "template_image_path")]
    pub template_image_path: PathBuf,
}

impl Job {
    pub fn image_path(&self, role: ImageRole) -> &PathBuf {
        match role {
            ImageRole::Source => &self.source_image_path,
            ImageRole::Template => &self.template_image_path,
        }
    }
}
