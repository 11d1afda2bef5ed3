use std::path::PathBuf;

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat};

use super::OutputHandler;

/// Writes every frame to a PNG file, replacing the previous one
pub struct FileOutput {
    path: PathBuf,
}

impl FileOutput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileOutput { path: path.into() }
    }
}

impl OutputHandler for FileOutput {
    fn output(&self, frame: &DynamicImage) -> Result<()> {
        frame
            .save_with_format(&self.path, ImageFormat::Png)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "file"
    }
}
