use std::panic;

use super::ExtractionError;

/// Text layer of a PDF; image-only pages contribute nothing.
pub(super) fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractionError> {
    // pdf-extract panics on some malformed inputs instead of returning an error.
    let outcome = panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes));

    match outcome {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(err)) => Err(ExtractionError::Pdf(err.to_string())),
        Err(_) => Err(ExtractionError::Pdf(
            "parser aborted on malformed document".to_string(),
        )),
    }
}
