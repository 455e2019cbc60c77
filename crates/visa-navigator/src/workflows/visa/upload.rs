use super::domain::ApplicationId;
use super::extraction::{MIME_DOCX, MIME_JPEG, MIME_JPG, MIME_PDF, MIME_PNG};

/// A document as received from the client, before any side effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub doc_type: String,
    pub original_name: String,
    pub mime_type: String,
    pub application_id: Option<ApplicationId>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadRejected {
    #[error("File and document type are required")]
    MissingFields,
    #[error("Invalid file type. Only PDF, JPG, PNG and DOCX files are allowed")]
    UnsupportedType(String),
    #[error("File size too large. Maximum size is {}MB", .max_bytes / (1024 * 1024))]
    TooLarge { size: u64, max_bytes: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPolicy {
    pub max_bytes: u64,
}

impl UploadPolicy {
    pub const ALLOWED_TYPES: [&'static str; 5] = [MIME_PDF, MIME_JPEG, MIME_JPG, MIME_PNG, MIME_DOCX];

    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    pub fn validate(&self, request: &UploadRequest) -> Result<(), UploadRejected> {
        if request.bytes.is_empty()
            || request.doc_type.trim().is_empty()
            || request.original_name.trim().is_empty()
        {
            return Err(UploadRejected::MissingFields);
        }
        if !Self::ALLOWED_TYPES.contains(&request.mime_type.as_str()) {
            return Err(UploadRejected::UnsupportedType(request.mime_type.clone()));
        }
        let size = request.bytes.len() as u64;
        if size > self.max_bytes {
            return Err(UploadRejected::TooLarge {
                size,
                max_bytes: self.max_bytes,
            });
        }
        Ok(())
    }
}
