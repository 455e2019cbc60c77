use docx_rs::{DocumentChild, ParagraphChild, RunChild};

use super::ExtractionError;

/// Concatenates paragraph runs, one paragraph per line.
pub(super) fn extract_docx(bytes: &[u8]) -> Result<String, ExtractionError> {
    let docx = docx_rs::read_docx(bytes).map_err(|err| ExtractionError::Docx(err.to_string()))?;

    let mut text = String::new();
    for child in &docx.document.children {
        if let DocumentChild::Paragraph(paragraph) = child {
            for item in &paragraph.children {
                if let ParagraphChild::Run(run) = item {
                    for piece in &run.children {
                        if let RunChild::Text(fragment) = piece {
                            text.push_str(&fragment.text);
                        }
                    }
                }
            }
            text.push('\n');
        }
    }

    Ok(text)
}
