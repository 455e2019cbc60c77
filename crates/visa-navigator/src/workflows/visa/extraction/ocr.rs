use std::process::Command;

use tracing::debug;

use super::ExtractionError;
use crate::config::OcrConfig;

/// Runs `tesseract <file> stdout -l <lang>` against a temporary copy of the image.
pub(super) fn ocr_image(
    bytes: &[u8],
    extension: &str,
    config: &OcrConfig,
) -> Result<String, ExtractionError> {
    if !config.enabled {
        return Err(ExtractionError::OcrDisabled);
    }

    let dir = tempfile::tempdir()?;
    let input = dir.path().join(format!("upload.{extension}"));
    std::fs::write(&input, bytes)?;

    let output = Command::new(&config.tesseract_path)
        .arg(&input)
        .arg("stdout")
        .arg("-l")
        .arg(&config.language)
        .output()
        .map_err(|err| {
            ExtractionError::Ocr(format!(
                "could not run '{}': {err}",
                config.tesseract_path
            ))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ExtractionError::Ocr(format!(
            "exit code {}: {}",
            output.status.code().unwrap_or(-1),
            stderr.trim()
        )));
    }

    let text = String::from_utf8_lossy(&output.stdout).into_owned();
    debug!(bytes = bytes.len(), chars = text.len(), "tesseract finished");
    Ok(text)
}
