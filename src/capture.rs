use anyhow::{Context, Result};
use std::path::Path;

use crate::model::{CapturedImage, DEFAULT_CAPTURE_NAME};

impl CapturedImage {
    /// Read a still image captured elsewhere (camera app, webcam snapshot).
    ///
    /// The media type is sniffed from the content, not the extension.
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("reading image {}", path.display()))?;
        let format = image::guess_format(&bytes)
            .with_context(|| format!("{} is not a recognised still image", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(DEFAULT_CAPTURE_NAME)
            .to_string();

        Ok(Self::new(bytes, format.to_mime_type()).with_file_name(file_name))
    }
}
