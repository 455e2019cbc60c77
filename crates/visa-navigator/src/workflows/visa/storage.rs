use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::StorageConfig;

use super::domain::UserId;

/// Signed download links stay valid for an hour.
pub const SIGNED_URL_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("object already exists: {0}")]
    AlreadyExists(String),
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("storage backend rejected request ({status}): {message}")]
    Backend { status: u16, message: String },
    #[error("storage transport failed: {0}")]
    Transport(String),
    #[error("invalid storage url: {0}")]
    InvalidUrl(String),
}

/// Blob store for uploaded documents. Writes never overwrite an existing key.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<(), StorageError>;
    /// Server-side read of a stored object. Clients fetch through `signed_url`; this
    /// stays on the trait so backends can be checked and re-extracted from directly.
    async fn download(&self, key: &str) -> Result<Vec<u8>, StorageError>;
    async fn signed_url(&self, key: &str, ttl: Duration) -> Result<String, StorageError>;
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// `{user}/{doc_type}/{millis}.{ext}`; slashes inside the tag are flattened.
pub fn object_key(user: &UserId, doc_type: &str, millis: i64, extension: &str) -> String {
    let tag = doc_type.trim().replace('/', "-");
    format!("{}/{tag}/{millis}.{extension}", user.as_str())
}

/// Lowercase extension of the client's file name, or one implied by the content type.
pub fn file_extension(original_name: &str, mime_type: &str) -> String {
    if let Some((stem, extension)) = original_name.rsplit_once('.') {
        if !stem.is_empty() && !extension.is_empty() {
            return extension.to_ascii_lowercase();
        }
    }
    match mime_type {
        "application/pdf" => "pdf",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
        _ => "bin",
    }
    .to_string()
}

/// Objects written to storage whose metadata row has not been committed yet.
#[derive(Debug, Default)]
pub struct UploadLedger {
    pending: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl UploadLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, key: &str, at: DateTime<Utc>) {
        self.pending
            .lock()
            .expect("upload ledger mutex poisoned")
            .insert(key.to_string(), at);
    }

    /// Removes the entry; returns whether it was pending.
    pub fn settle(&self, key: &str) -> bool {
        self.pending
            .lock()
            .expect("upload ledger mutex poisoned")
            .remove(key)
            .is_some()
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.pending
            .lock()
            .expect("upload ledger mutex poisoned")
            .contains_key(key)
    }

    /// Keys recorded before `now - max_age`, oldest first.
    pub fn stale(&self, max_age: chrono::Duration, now: DateTime<Utc>) -> Vec<String> {
        let cutoff = now - max_age;
        let pending = self.pending.lock().expect("upload ledger mutex poisoned");
        let mut stale: Vec<(DateTime<Utc>, String)> = pending
            .iter()
            .filter(|(_, recorded)| **recorded < cutoff)
            .map(|(key, recorded)| (*recorded, key.clone()))
            .collect();
        stale.sort();
        stale.into_iter().map(|(_, key)| key).collect()
    }
}

/// Storage REST API client for a hosted bucket.
#[derive(Debug, Clone)]
pub struct SupabaseStorage {
    client: Client,
    base_url: Url,
    service_key: String,
    bucket: String,
}

#[derive(Debug, Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

impl SupabaseStorage {
    /// Returns `None` unless both the project URL and the service key are configured.
    pub fn from_config(config: &StorageConfig) -> Result<Option<Self>, StorageError> {
        match (config.url.as_deref(), config.service_key.as_deref()) {
            (Some(url), Some(key)) => Self::new(url, key, &config.bucket).map(Some),
            _ => Ok(None),
        }
    }

    pub fn new(base_url: &str, service_key: &str, bucket: &str) -> Result<Self, StorageError> {
        let base_url =
            Url::parse(base_url).map_err(|err| StorageError::InvalidUrl(format!("{base_url}: {err}")))?;
        if base_url.cannot_be_a_base() {
            return Err(StorageError::InvalidUrl(base_url.to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| StorageError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            base_url,
            service_key: service_key.to_string(),
            bucket: bucket.to_string(),
        })
    }

    /// `{base}/storage/v1/object[/{action}]/{bucket}/{key}` with every key segment
    /// percent-encoded, so free-text tags cannot spill into the query or fragment.
    fn object_url(&self, action: Option<&str>, key: &str) -> Result<Url, StorageError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StorageError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["storage", "v1", "object"])
            .extend(action)
            .push(&self.bucket)
            .extend(key.split('/'));
        Ok(url)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
    }

    async fn check(key: &str, response: reqwest::Response) -> Result<reqwest::Response, StorageError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::NOT_FOUND => StorageError::NotFound(key.to_string()),
            StatusCode::CONFLICT => StorageError::AlreadyExists(key.to_string()),
            _ if message.contains("Duplicate") => StorageError::AlreadyExists(key.to_string()),
            _ => StorageError::Backend {
                status: status.as_u16(),
                message,
            },
        })
    }
}

fn transport(err: reqwest::Error) -> StorageError {
    StorageError::Transport(err.to_string())
}

#[async_trait]
impl ObjectStorage for SupabaseStorage {
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        debug!(key, size = bytes.len(), "uploading object");
        let response = self
            .authorized(self.client.post(self.object_url(None, key)?))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await
            .map_err(transport)?;
        Self::check(key, response).await.map(|_| ())
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = self
            .authorized(self.client.get(self.object_url(None, key)?))
            .send()
            .await
            .map_err(transport)?;
        let response = Self::check(key, response).await?;
        let bytes = response.bytes().await.map_err(transport)?;
        Ok(bytes.to_vec())
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        let url = self.object_url(Some("sign"), key)?;
        let response = self
            .authorized(self.client.post(url))
            .json(&serde_json::json!({ "expiresIn": ttl.as_secs() }))
            .send()
            .await
            .map_err(transport)?;
        let response = Self::check(key, response).await?;
        let signed: SignedUrlResponse = response.json().await.map_err(transport)?;
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(format!("{base}/storage/v1{}", signed.signed_url))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let response = self
            .authorized(self.client.delete(self.object_url(None, key)?))
            .send()
            .await
            .map_err(transport)?;
        match Self::check(key, response).await {
            Ok(_) => Ok(()),
            Err(err) => {
                warn!(key, error = %err, "object delete failed");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_key_layout() {
        let key = object_key(&UserId::new("user_9"), "Letter of Acceptance", 1_700_000_000_123, "pdf");
        assert_eq!(key, "user_9/Letter of Acceptance/1700000000123.pdf");

        let flattened = object_key(&UserId::new("user_9"), "../Passport", 1, "png");
        assert_eq!(flattened, "user_9/..-Passport/1.png");
    }

    #[test]
    fn extension_prefers_file_name_then_mime() {
        assert_eq!(file_extension("Offer.PDF", "application/pdf"), "pdf");
        assert_eq!(file_extension("scan", "image/png"), "png");
        assert_eq!(file_extension(".hidden", "image/jpeg"), "jpg");
    }

    #[test]
    fn ledger_reports_only_stale_pending_keys() {
        let ledger = UploadLedger::new();
        let now = Utc::now();
        ledger.record("old", now - chrono::Duration::hours(2));
        ledger.record("older", now - chrono::Duration::hours(3));
        ledger.record("fresh", now);

        assert_eq!(
            ledger.stale(chrono::Duration::hours(1), now),
            vec!["older".to_string(), "old".to_string()]
        );
        assert!(ledger.settle("old"));
        assert!(!ledger.settle("old"));
        assert!(ledger.is_pending("fresh"));
    }

    #[test]
    fn reserved_characters_in_tags_stay_inside_the_object_path() {
        let storage = SupabaseStorage::new("https://project.supabase.co/", "service-key", "documents")
            .expect("client builds");
        let user = UserId::new("u1");

        let key = object_key(&user, "Bank Statement #2", 1_700_000_000_123, "pdf");
        let url = storage.object_url(None, &key).expect("url");
        assert_eq!(
            url.path(),
            "/storage/v1/object/documents/u1/Bank%20Statement%20%232/1700000000123.pdf"
        );
        assert_eq!(url.fragment(), None);
        assert_eq!(url.query(), None);

        let key = object_key(&user, "Transcript?", 1, "png");
        let url = storage.object_url(Some("sign"), &key).expect("url");
        assert_eq!(url.path(), "/storage/v1/object/sign/documents/u1/Transcript%3F/1.png");
        assert_eq!(url.query(), None);
    }

    #[test]
    fn malformed_project_url_is_rejected() {
        assert!(matches!(
            SupabaseStorage::new("not a url", "service-key", "documents"),
            Err(StorageError::InvalidUrl(_))
        ));
    }

    #[test]
    fn unconfigured_storage_is_none() {
        let config = StorageConfig {
            url: Some("https://project.supabase.co".to_string()),
            service_key: None,
            bucket: "documents".to_string(),
        };
        assert!(SupabaseStorage::from_config(&config)
            .expect("no client error")
            .is_none());
    }
}
