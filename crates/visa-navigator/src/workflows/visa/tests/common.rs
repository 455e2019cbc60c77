use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::Utc;
use serde_json::Value;

use crate::config::OcrConfig;
use crate::workflows::visa::domain::{
    Application, ApplicationId, ApplicationStatus, ApplicationUpdate, DocumentId, DocumentRecord,
    NewApplication, NewDocument, ProfileUpdate, UserId, UserProfile, UserSync,
};
use crate::workflows::visa::reasoning::{ReasoningError, ReasoningRequest, ReasoningService};
use crate::workflows::visa::repository::{
    newest_first, ApplicationRepository, DocumentRepository, RepositoryError, UserRepository,
};
use crate::workflows::visa::storage::{ObjectStorage, StorageError};
use crate::workflows::visa::{visa_router, ServiceSettings, VisaRepositories, VisaService};

pub(super) const OWNER: &str = "user_ana";
pub(super) const STRANGER: &str = "user_bo";

pub(super) fn owner() -> UserId {
    UserId::new(OWNER)
}

pub(super) fn stranger() -> UserId {
    UserId::new(STRANGER)
}

pub(super) fn settings() -> ServiceSettings {
    ServiceSettings {
        reasoning_timeout: Duration::from_millis(200),
        upload_max_bytes: 64 * 1024,
        ocr: OcrConfig {
            enabled: false,
            ..OcrConfig::default()
        },
        ..ServiceSettings::default()
    }
}

pub(super) type TestService = VisaService<MemoryUsers, MemoryApplications, MemoryDocuments>;

pub(super) struct Harness {
    pub(super) service: Arc<TestService>,
    pub(super) users: Arc<MemoryUsers>,
    pub(super) applications: Arc<MemoryApplications>,
    pub(super) documents: Arc<MemoryDocuments>,
    pub(super) storage: Arc<MemoryStorage>,
    pub(super) reasoning: Arc<ScriptedReasoning>,
}

impl Harness {
    pub(super) fn router(&self) -> axum::Router {
        visa_router(self.service.clone(), settings().upload_max_bytes)
    }

    /// Writes a text-less document row for the owner directly through the repository.
    pub(super) fn attach_document_to(
        &self,
        application: Option<ApplicationId>,
        doc_type: &str,
    ) -> DocumentRecord {
        self.documents
            .insert(stored_document(&owner(), application, doc_type, None))
            .expect("document insert")
    }
}

pub(super) fn harness(reasoning: ScriptedReasoning) -> Harness {
    let users = Arc::new(MemoryUsers::default());
    let applications = Arc::new(MemoryApplications::default());
    let documents = Arc::new(MemoryDocuments::default());
    let storage = Arc::new(MemoryStorage::default());
    let reasoning = Arc::new(reasoning);

    let service = VisaService::new(
        VisaRepositories {
            users: users.clone(),
            applications: applications.clone(),
            documents: documents.clone(),
        },
        storage.clone(),
        reasoning.clone(),
        settings(),
    );

    Harness {
        service: Arc::new(service),
        users,
        applications,
        documents,
        storage,
        reasoning,
    }
}

/// Onboarded applicant from India with a complete profile.
pub(super) fn seed_owner(users: &MemoryUsers) -> UserProfile {
    users
        .upsert(
            &owner(),
            UserSync {
                email: "ana@example.com".to_string(),
                first_name: Some("Ana".to_string()),
                last_name: Some("Sharma".to_string()),
            },
        )
        .expect("user upsert");
    users
        .update_profile(
            &owner(),
            ProfileUpdate {
                country_of_origin: Some("India".to_string()),
                current_country: Some("India".to_string()),
                phone: Some("+91 555 0100".to_string()),
            },
        )
        .expect("profile update");
    users.mark_onboarded(&owner()).expect("onboarding")
}

pub(super) fn waterloo() -> NewApplication {
    NewApplication {
        institution: "University of Waterloo".to_string(),
        program: "Computer Science".to_string(),
        start_date: "September 2025".to_string(),
        total_cost: "$45000".to_string(),
        status: ApplicationStatus::Draft,
    }
}

pub(super) fn stored_document(
    owner: &UserId,
    application: Option<ApplicationId>,
    doc_type: &str,
    text: Option<&str>,
) -> NewDocument {
    NewDocument {
        user_id: owner.clone(),
        application_id: application,
        doc_type: doc_type.to_string(),
        filename: format!("{owner}/{doc_type}/1.pdf"),
        original_name: format!("{doc_type}.pdf"),
        size: 2048,
        mime_type: "application/pdf".to_string(),
        storage_path: format!("{owner}/{doc_type}/1.pdf"),
        text_content: text.map(str::to_string),
    }
}

#[derive(Default)]
pub(super) struct MemoryUsers {
    rows: Mutex<HashMap<UserId, UserProfile>>,
}

impl UserRepository for MemoryUsers {
    fn upsert(&self, id: &UserId, sync: UserSync) -> Result<UserProfile, RepositoryError> {
        let mut rows = self.rows.lock().expect("user mutex poisoned");
        let now = Utc::now();
        let profile = rows
            .entry(id.clone())
            .or_insert_with(|| UserProfile::new(id.clone(), sync.email.clone(), now));
        profile.email = sync.email;
        profile.first_name = sync.first_name;
        profile.last_name = sync.last_name;
        profile.updated_at = now;
        Ok(profile.clone())
    }

    fn fetch(&self, id: &UserId) -> Result<Option<UserProfile>, RepositoryError> {
        Ok(self.rows.lock().expect("user mutex poisoned").get(id).cloned())
    }

    fn update_profile(
        &self,
        id: &UserId,
        update: ProfileUpdate,
    ) -> Result<UserProfile, RepositoryError> {
        let mut rows = self.rows.lock().expect("user mutex poisoned");
        let profile = rows.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if let Some(origin) = update.country_of_origin {
            profile.country_of_origin = Some(origin);
        }
        if let Some(current) = update.current_country {
            profile.current_country = Some(current);
        }
        if let Some(phone) = update.phone {
            profile.phone = Some(phone);
        }
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }

    fn mark_onboarded(&self, id: &UserId) -> Result<UserProfile, RepositoryError> {
        let mut rows = self.rows.lock().expect("user mutex poisoned");
        let profile = rows.get_mut(id).ok_or(RepositoryError::NotFound)?;
        profile.is_onboarded = true;
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }
}

#[derive(Default)]
pub(super) struct MemoryApplications {
    rows: Mutex<Vec<Application>>,
    sequence: AtomicI64,
}

impl ApplicationRepository for MemoryApplications {
    fn insert(
        &self,
        owner: &UserId,
        application: NewApplication,
    ) -> Result<Application, RepositoryError> {
        let now = Utc::now();
        let record = Application {
            id: ApplicationId(self.sequence.fetch_add(1, Ordering::Relaxed) + 1),
            user_id: owner.clone(),
            status: application.status,
            institution: application.institution,
            program: application.program,
            start_date: application.start_date,
            total_cost: application.total_cost,
            strength_score: None,
            is_complete: false,
            created_at: now,
            updated_at: now,
        };
        self.rows
            .lock()
            .expect("application mutex poisoned")
            .push(record.clone());
        Ok(record)
    }

    fn list(&self, owner: &UserId) -> Result<Vec<Application>, RepositoryError> {
        let mut owned: Vec<Application> = self
            .rows
            .lock()
            .expect("application mutex poisoned")
            .iter()
            .filter(|row| &row.user_id == owner)
            .cloned()
            .collect();
        newest_first(&mut owned, |row| (row.created_at, row.id.0));
        Ok(owned)
    }

    fn fetch(
        &self,
        owner: &UserId,
        id: ApplicationId,
    ) -> Result<Option<Application>, RepositoryError> {
        Ok(self
            .rows
            .lock()
            .expect("application mutex poisoned")
            .iter()
            .find(|row| row.id == id && &row.user_id == owner)
            .cloned())
    }

    fn update(
        &self,
        owner: &UserId,
        id: ApplicationId,
        update: ApplicationUpdate,
    ) -> Result<Application, RepositoryError> {
        let mut rows = self.rows.lock().expect("application mutex poisoned");
        let row = rows
            .iter_mut()
            .find(|row| row.id == id && &row.user_id == owner)
            .ok_or(RepositoryError::NotFound)?;
        update.apply(row);
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    fn set_strength_score(
        &self,
        owner: &UserId,
        id: ApplicationId,
        score: u8,
    ) -> Result<(), RepositoryError> {
        let mut rows = self.rows.lock().expect("application mutex poisoned");
        let row = rows
            .iter_mut()
            .find(|row| row.id == id && &row.user_id == owner)
            .ok_or(RepositoryError::NotFound)?;
        row.strength_score = Some(score);
        row.updated_at = Utc::now();
        Ok(())
    }

    fn delete(&self, owner: &UserId, id: ApplicationId) -> Result<Application, RepositoryError> {
        let mut rows = self.rows.lock().expect("application mutex poisoned");
        let index = rows
            .iter()
            .position(|row| row.id == id && &row.user_id == owner)
            .ok_or(RepositoryError::NotFound)?;
        Ok(rows.remove(index))
    }
}

#[derive(Default)]
pub(super) struct MemoryDocuments {
    rows: Mutex<Vec<DocumentRecord>>,
    sequence: AtomicI64,
    fail_inserts: AtomicBool,
}

impl MemoryDocuments {
    pub(super) fn fail_inserts(&self) {
        self.fail_inserts.store(true, Ordering::SeqCst);
    }

    pub(super) fn len(&self) -> usize {
        self.rows.lock().expect("document mutex poisoned").len()
    }
}

impl DocumentRepository for MemoryDocuments {
    fn insert(&self, document: NewDocument) -> Result<DocumentRecord, RepositoryError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("database offline".to_string()));
        }
        let now = Utc::now();
        let record = DocumentRecord {
            id: DocumentId(self.sequence.fetch_add(1, Ordering::Relaxed) + 1),
            user_id: document.user_id,
            application_id: document.application_id,
            doc_type: document.doc_type,
            filename: document.filename,
            original_name: document.original_name,
            size: document.size,
            mime_type: document.mime_type,
            storage_path: document.storage_path,
            text_content: document.text_content,
            is_verified: false,
            created_at: now,
            updated_at: now,
        };
        self.rows
            .lock()
            .expect("document mutex poisoned")
            .push(record.clone());
        Ok(record)
    }

    fn list(
        &self,
        owner: &UserId,
        application: Option<ApplicationId>,
    ) -> Result<Vec<DocumentRecord>, RepositoryError> {
        let mut owned: Vec<DocumentRecord> = self
            .rows
            .lock()
            .expect("document mutex poisoned")
            .iter()
            .filter(|row| &row.user_id == owner)
            .filter(|row| application.map_or(true, |id| row.application_id == Some(id)))
            .cloned()
            .collect();
        newest_first(&mut owned, |row| (row.created_at, row.id.0));
        Ok(owned)
    }

    fn fetch(
        &self,
        owner: &UserId,
        id: DocumentId,
    ) -> Result<Option<DocumentRecord>, RepositoryError> {
        Ok(self
            .rows
            .lock()
            .expect("document mutex poisoned")
            .iter()
            .find(|row| row.id == id && &row.user_id == owner)
            .cloned())
    }

    fn delete(&self, owner: &UserId, id: DocumentId) -> Result<DocumentRecord, RepositoryError> {
        let mut rows = self.rows.lock().expect("document mutex poisoned");
        let index = rows
            .iter()
            .position(|row| row.id == id && &row.user_id == owner)
            .ok_or(RepositoryError::NotFound)?;
        Ok(rows.remove(index))
    }

    fn count_for_application(
        &self,
        owner: &UserId,
        application: ApplicationId,
    ) -> Result<usize, RepositoryError> {
        Ok(self
            .rows
            .lock()
            .expect("document mutex poisoned")
            .iter()
            .filter(|row| &row.user_id == owner && row.application_id == Some(application))
            .count())
    }

    fn detach_application(
        &self,
        owner: &UserId,
        application: ApplicationId,
    ) -> Result<usize, RepositoryError> {
        let mut rows = self.rows.lock().expect("document mutex poisoned");
        let now = Utc::now();
        let mut detached = 0;
        for row in rows
            .iter_mut()
            .filter(|row| &row.user_id == owner && row.application_id == Some(application))
        {
            row.application_id = None;
            row.updated_at = now;
            detached += 1;
        }
        Ok(detached)
    }
}

#[derive(Default)]
pub(super) struct MemoryStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fail_uploads: AtomicBool,
    fail_deletes: AtomicBool,
}

impl MemoryStorage {
    pub(super) fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .expect("storage mutex poisoned")
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub(super) fn fail_uploads(&self) {
        self.fail_uploads.store(true, Ordering::SeqCst);
    }

    pub(super) fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::Transport("bucket offline".to_string()));
        }
        let mut objects = self.objects.lock().expect("storage mutex poisoned");
        if objects.contains_key(key) {
            return Err(StorageError::AlreadyExists(key.to_string()));
        }
        objects.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .lock()
            .expect("storage mutex poisoned")
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        if !self
            .objects
            .lock()
            .expect("storage mutex poisoned")
            .contains_key(key)
        {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(format!("memory://{key}?expires_in={}", ttl.as_secs()))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::Transport("bucket offline".to_string()));
        }
        self.objects
            .lock()
            .expect("storage mutex poisoned")
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}

/// Reasoning fake returning a fixed outcome and recording every prompt.
pub(super) struct ScriptedReasoning {
    outcome: Result<String, ReasoningError>,
    delay: Option<Duration>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedReasoning {
    pub(super) fn replying(reply: &str) -> Self {
        Self {
            outcome: Ok(reply.to_string()),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn failing(err: ReasoningError) -> Self {
        Self {
            outcome: Err(err),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn stalling() -> Self {
        Self {
            outcome: Ok("{}".to_string()),
            delay: Some(Duration::from_secs(30)),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompt mutex poisoned").clone()
    }
}

#[async_trait]
impl ReasoningService for ScriptedReasoning {
    async fn complete(&self, request: ReasoningRequest) -> Result<String, ReasoningError> {
        self.prompts
            .lock()
            .expect("prompt mutex poisoned")
            .push(request.prompt);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcome.clone()
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
