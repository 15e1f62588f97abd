use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::job::{EffectType, Job};

pub const RESULT_EXTENSION: &str = "jpg";

/// On-disk naming convention shared with the submission side.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileLayout {
    pub upload_root: PathBuf,
    pub template_root: PathBuf,
}

impl Default for FileLayout {
    fn default() -> Self {
        Self {
            upload_root: PathBuf::from("static/uploads"),
            template_root: PathBuf::from("static/celebrities"),
        }
    }
}

impl FileLayout {
    pub fn new(upload_root: impl Into<PathBuf>, template_root: impl Into<PathBuf>) -> Self {
        Self {
            upload_root: upload_root.into(),
            template_root: template_root.into(),
        }
    }

    pub fn user_dir(&self, user_id: i64) -> PathBuf {
        self.upload_root.join(user_id.to_string())
    }

    pub fn original_path(&self, user_id: i64, photo_id: i64, extension: &str) -> PathBuf {
        self.user_dir(user_id)
            .join(format!("{photo_id}_original.{extension}"))
    }

    pub fn template_path(&self, celebrity_id: i64, extension: &str) -> PathBuf {
        self.template_root
            .join(celebrity_id.to_string())
            .join(format!("template.{extension}"))
    }

    /// Canonical location of the published composite for a photo.
    pub fn result_path(&self, user_id: i64, photo_id: i64) -> PathBuf {
        self.user_dir(user_id)
            .join(format!("{photo_id}_result.{RESULT_EXTENSION}"))
    }

    /// Builds a job from ids alone, for submitters that follow the layout.
    pub fn job_for(
        &self,
        photo_id: i64,
        celebrity_id: i64,
        user_id: i64,
        effect_type: EffectType,
        extension: &str,
    ) -> Job {
        Job {
            photo_id,
            celebrity_id,
            user_id,
            effect_type,
            source_image_path: self.original_path(user_id, photo_id, extension),
            template_image_path: self.template_path(celebrity_id, extension),
        }
    }

    /// Returns the photo id if `path` is a published result artifact.
    pub fn parse_result_name(path: &Path) -> Option<i64> {
        let name = path.file_name()?.to_str()?;
        let stem = name.strip_suffix(&format!("_result.{RESULT_EXTENSION}"))?;
        stem.parse().ok()
    }
}
