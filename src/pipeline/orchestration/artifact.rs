use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use uuid::Uuid;

use crate::error::PipelineError;

pub const TEMP_EXTENSION: &str = "tmp";

/// Publishes result images so that the destination path only ever holds a
/// complete file: the image is encoded into a sibling temporary file, synced,
/// and renamed over the destination. Any failure removes the temporary file.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    jpeg_quality: u8,
}

impl ArtifactWriter {
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    pub fn temp_path_for(destination: &Path) -> PathBuf {
        let name = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact".to_string());
        destination.with_file_name(format!("{name}.{}.{TEMP_EXTENSION}", Uuid::new_v4()))
    }

    pub fn publish(&self, image: &RgbImage, destination: &Path) -> Result<(), PipelineError> {
        let io_error = |source| PipelineError::Io {
            path: destination.to_path_buf(),
            source,
        };
        if let Some(dir) = destination.parent() {
            fs::create_dir_all(dir).map_err(io_error)?;
        }

        let temp = Self::temp_path_for(destination);
        let written = self
            .write_jpeg(image, &temp)
            .and_then(|()| fs::rename(&temp, destination).map_err(io_error));
        if written.is_err() {
            let _ = fs::remove_file(&temp);
        }
        written
    }

    fn write_jpeg(&self, image: &RgbImage, path: &Path) -> Result<(), PipelineError> {
        let io_error = |source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(io_error)?;
        let mut writer = BufWriter::new(file);
        let encoder = JpegEncoder::new_with_quality(&mut writer, self.jpeg_quality);
        image
            .write_with_encoder(encoder)
            .map_err(|e| PipelineError::Encode(e.to_string()))?;
        writer.flush().map_err(io_error)?;
        let file = writer.into_inner().map_err(|e| io_error(e.into_error()))?;
        file.sync_all().map_err(io_error)
    }
}
