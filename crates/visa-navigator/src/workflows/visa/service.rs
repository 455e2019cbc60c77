use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::config::OcrConfig;

use super::aggregate::aggregate;
use super::assistant::{ApplicationTemplate, Assistant, DocumentAnalysis, TemplateKind};
use super::completeness::{CompletenessChecker, CompletenessReport};
use super::domain::{
    Application, ApplicationId, ApplicationUpdate, DocumentId, DocumentRecord, NewApplication,
    NewDocument, OnboardingStatus, ProfileUpdate, UserId, UserProfile, UserSync,
};
use super::extraction::TextExtractor;
use super::fields::{FieldExtractor, FieldMap};
use super::prompts::TemplateSubject;
use super::reasoning::{ReasoningError, ReasoningService};
use super::repository::{
    ApplicationRepository, DocumentRepository, RepositoryError, UserRepository,
};
use super::storage::{
    file_extension, object_key, ObjectStorage, StorageError, UploadLedger, SIGNED_URL_TTL,
};
use super::strength::{StrengthEngine, StrengthReport};
use super::tables::ScoringTables;
use super::upload::{UploadPolicy, UploadRejected, UploadRequest};

/// Repository handles injected into the service.
pub struct VisaRepositories<U, A, D> {
    pub users: Arc<U>,
    pub applications: Arc<A>,
    pub documents: Arc<D>,
}

/// Tunables resolved from configuration at startup.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub tables: Arc<ScoringTables>,
    pub reasoning_timeout: Duration,
    pub upload_max_bytes: u64,
    pub ocr: OcrConfig,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            tables: Arc::new(ScoringTables::default()),
            reasoning_timeout: Duration::from_secs(60),
            upload_max_bytes: 10 * 1024 * 1024,
            ocr: OcrConfig::default(),
        }
    }
}

/// Body of a template request; `application_id` overrides program and institution.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRequest {
    #[serde(default)]
    pub application_id: Option<ApplicationId>,
    #[serde(default, rename = "type")]
    pub kind: TemplateKind,
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub institution: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default)]
    pub goals: Option<String>,
}

/// Outcome of a stale-upload sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct SweepReport {
    pub removed: Vec<String>,
    pub failed: Vec<String>,
}

/// Applicant-facing operations over users, applications and documents.
pub struct VisaService<U, A, D> {
    users: Arc<U>,
    applications: Arc<A>,
    documents: Arc<D>,
    storage: Arc<dyn ObjectStorage>,
    extractor: TextExtractor,
    fields: FieldExtractor,
    assistant: Assistant,
    engine: StrengthEngine,
    policy: UploadPolicy,
    ledger: UploadLedger,
}

impl<U, A, D> VisaService<U, A, D>
where
    U: UserRepository + 'static,
    A: ApplicationRepository + 'static,
    D: DocumentRepository + 'static,
{
    pub fn new(
        repositories: VisaRepositories<U, A, D>,
        storage: Arc<dyn ObjectStorage>,
        reasoning: Arc<dyn ReasoningService>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            users: repositories.users,
            applications: repositories.applications,
            documents: repositories.documents,
            storage,
            extractor: TextExtractor::new(settings.ocr),
            fields: FieldExtractor::new(reasoning.clone(), settings.reasoning_timeout),
            assistant: Assistant::new(reasoning, settings.reasoning_timeout),
            engine: StrengthEngine::new(settings.tables),
            policy: UploadPolicy::new(settings.upload_max_bytes),
            ledger: UploadLedger::new(),
        }
    }

    pub fn ledger(&self) -> &UploadLedger {
        &self.ledger
    }

    pub fn tables(&self) -> &ScoringTables {
        self.engine.tables()
    }

    // Users

    pub fn sync_user(
        &self,
        user: &UserId,
        sync: UserSync,
    ) -> Result<UserProfile, VisaServiceError> {
        if sync.email.trim().is_empty() {
            return Err(VisaServiceError::Validation("email is required".to_string()));
        }
        let profile = self.users.upsert(user, sync).map_err(missing("user"))?;
        info!(user = %user, "user synchronised");
        Ok(profile)
    }

    pub fn current_user(&self, user: &UserId) -> Result<UserProfile, VisaServiceError> {
        self.users
            .fetch(user)
            .map_err(missing("user"))?
            .ok_or(VisaServiceError::NotFound("user"))
    }

    pub fn update_profile(
        &self,
        user: &UserId,
        update: ProfileUpdate,
    ) -> Result<UserProfile, VisaServiceError> {
        self.users
            .update_profile(user, update)
            .map_err(missing("user"))
    }

    pub fn complete_onboarding(&self, user: &UserId) -> Result<UserProfile, VisaServiceError> {
        let profile = self.users.mark_onboarded(user).map_err(missing("user"))?;
        info!(user = %user, "onboarding completed");
        Ok(profile)
    }

    /// Unknown users report as not onboarded with an incomplete profile.
    pub fn onboarding_status(&self, user: &UserId) -> Result<OnboardingStatus, VisaServiceError> {
        let status = match self.users.fetch(user).map_err(missing("user"))? {
            Some(profile) => OnboardingStatus {
                is_onboarded: profile.is_onboarded,
                profile_complete: profile.profile_complete(),
            },
            None => OnboardingStatus {
                is_onboarded: false,
                profile_complete: false,
            },
        };
        Ok(status)
    }

    // Applications

    pub fn create_application(
        &self,
        owner: &UserId,
        application: NewApplication,
    ) -> Result<Application, VisaServiceError> {
        if application.institution.trim().is_empty() || application.program.trim().is_empty() {
            return Err(VisaServiceError::Validation(
                "institution and program are required".to_string(),
            ));
        }
        let created = self
            .applications
            .insert(owner, application)
            .map_err(missing("application"))?;
        info!(user = %owner, application = %created.id, "application created");
        Ok(created)
    }

    pub fn list_applications(&self, owner: &UserId) -> Result<Vec<Application>, VisaServiceError> {
        self.applications.list(owner).map_err(missing("application"))
    }

    pub fn get_application(
        &self,
        owner: &UserId,
        id: ApplicationId,
    ) -> Result<Application, VisaServiceError> {
        self.applications
            .fetch(owner, id)
            .map_err(missing("application"))?
            .ok_or(VisaServiceError::NotFound("application"))
    }

    pub fn update_application(
        &self,
        owner: &UserId,
        id: ApplicationId,
        update: ApplicationUpdate,
    ) -> Result<Application, VisaServiceError> {
        self.applications
            .update(owner, id, update)
            .map_err(missing("application"))
    }

    pub fn delete_application(
        &self,
        owner: &UserId,
        id: ApplicationId,
    ) -> Result<Application, VisaServiceError> {
        // Documents outlive the application but must not point at a missing one.
        self.get_application(owner, id)?;
        let detached = self
            .documents
            .detach_application(owner, id)
            .map_err(missing("document"))?;
        let deleted = self
            .applications
            .delete(owner, id)
            .map_err(missing("application"))?;
        info!(user = %owner, application = %id, detached, "application deleted");
        Ok(deleted)
    }

    /// Scores the application and persists the total; recomputation is idempotent.
    pub fn calculate_strength(
        &self,
        owner: &UserId,
        id: ApplicationId,
    ) -> Result<StrengthReport, VisaServiceError> {
        let application = self.get_application(owner, id)?;
        let profile = self.current_user(owner)?;
        let document_count = self
            .documents
            .count_for_application(owner, id)
            .map_err(missing("document"))?;

        let report = self.engine.score(&application, &profile, document_count);
        self.applications
            .set_strength_score(owner, id, report.total_score)
            .map_err(missing("application"))?;

        info!(
            user = %owner,
            application = %id,
            total = report.total_score,
            documents = document_count,
            "strength score recorded"
        );
        Ok(report)
    }

    /// Local checklist match plus a best-effort review of the documents already present.
    pub async fn check_completeness(
        &self,
        owner: &UserId,
        id: ApplicationId,
    ) -> Result<CompletenessReport, VisaServiceError> {
        self.get_application(owner, id)?;
        let documents = self
            .documents
            .list(owner, Some(id))
            .map_err(missing("document"))?;
        let tags: Vec<String> = documents
            .iter()
            .map(|document| document.doc_type.clone())
            .collect();

        let required = &self.tables().required_documents;
        let mut report = CompletenessChecker::new(required).check(&tags);
        let names: Vec<String> = required.iter().map(|entry| entry.name.clone()).collect();
        report.incomplete_documents = self.assistant.review_present_documents(&tags, &names).await;
        Ok(report)
    }

    // Documents

    /// Validates, extracts text, writes the object tentatively, then commits the metadata row.
    pub async fn upload_document(
        &self,
        owner: &UserId,
        request: UploadRequest,
    ) -> Result<DocumentRecord, VisaServiceError> {
        self.policy.validate(&request)?;
        if let Some(application) = request.application_id {
            self.get_application(owner, application)?;
        }

        let text = self.extract_text(&request).await;

        let now = Utc::now();
        let extension = file_extension(&request.original_name, &request.mime_type);
        let key = object_key(owner, &request.doc_type, now.timestamp_millis(), &extension);
        let size = request.bytes.len() as u64;

        self.ledger.record(&key, now);
        if let Err(err) = self
            .storage
            .upload(&key, request.bytes, &request.mime_type)
            .await
        {
            self.ledger.settle(&key);
            error!(user = %owner, key = %key, error = %err, "document upload failed");
            return Err(err.into());
        }

        let inserted = self.documents.insert(NewDocument {
            user_id: owner.clone(),
            application_id: request.application_id,
            doc_type: request.doc_type.trim().to_string(),
            filename: key.clone(),
            original_name: request.original_name,
            size,
            mime_type: request.mime_type,
            storage_path: key.clone(),
            text_content: Some(text).filter(|text| !text.is_empty()),
        });

        match inserted {
            Ok(record) => {
                self.ledger.settle(&key);
                info!(
                    user = %owner,
                    document = %record.id,
                    key = %key,
                    size,
                    "document uploaded"
                );
                Ok(record)
            }
            Err(err) => {
                error!(user = %owner, key = %key, error = %err, "document metadata insert failed");
                match self.storage.delete(&key).await {
                    Ok(()) => {
                        self.ledger.settle(&key);
                    }
                    Err(cleanup) => {
                        warn!(key = %key, error = %cleanup, "orphaned object left for sweep");
                    }
                }
                Err(missing("document")(err))
            }
        }
    }

    async fn extract_text(&self, request: &UploadRequest) -> String {
        let extractor = self.extractor.clone();
        let bytes = request.bytes.clone();
        let mime_type = request.mime_type.clone();
        match tokio::task::spawn_blocking(move || extractor.extract(&bytes, &mime_type)).await {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "text extraction task failed");
                String::new()
            }
        }
    }

    pub fn list_documents(
        &self,
        owner: &UserId,
        application: Option<ApplicationId>,
    ) -> Result<Vec<DocumentRecord>, VisaServiceError> {
        self.documents
            .list(owner, application)
            .map_err(missing("document"))
    }

    pub fn get_document(
        &self,
        owner: &UserId,
        id: DocumentId,
    ) -> Result<DocumentRecord, VisaServiceError> {
        self.documents
            .fetch(owner, id)
            .map_err(missing("document"))?
            .ok_or(VisaServiceError::NotFound("document"))
    }

    /// Storage failures are logged; the metadata row is removed regardless.
    pub async fn delete_document(
        &self,
        owner: &UserId,
        id: DocumentId,
    ) -> Result<DocumentRecord, VisaServiceError> {
        let document = self.get_document(owner, id)?;
        if let Err(err) = self.storage.delete(&document.storage_path).await {
            warn!(
                user = %owner,
                document = %id,
                key = %document.storage_path,
                error = %err,
                "storage delete failed; removing metadata anyway"
            );
        }
        let deleted = self
            .documents
            .delete(owner, id)
            .map_err(missing("document"))?;
        info!(user = %owner, document = %id, "document deleted");
        Ok(deleted)
    }

    pub async fn document_url(
        &self,
        owner: &UserId,
        id: DocumentId,
    ) -> Result<String, VisaServiceError> {
        let document = self.get_document(owner, id)?;
        let url = self
            .storage
            .signed_url(&document.storage_path, SIGNED_URL_TTL)
            .await?;
        Ok(url)
    }

    /// Deletes tentative objects older than `max_age` whose metadata never landed.
    pub async fn sweep_uncommitted(&self, max_age: chrono::Duration) -> SweepReport {
        let mut report = SweepReport::default();
        for key in self.ledger.stale(max_age, Utc::now()) {
            match self.storage.delete(&key).await {
                Ok(()) | Err(StorageError::NotFound(_)) => {
                    self.ledger.settle(&key);
                    report.removed.push(key);
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "stale object delete failed");
                    report.failed.push(key);
                }
            }
        }
        if !report.removed.is_empty() || !report.failed.is_empty() {
            info!(
                removed = report.removed.len(),
                failed = report.failed.len(),
                "uncommitted upload sweep finished"
            );
        }
        report
    }

    // Assistant

    pub async fn chat(&self, user: &UserId, message: &str) -> Result<String, VisaServiceError> {
        if message.trim().is_empty() {
            return Err(VisaServiceError::Validation("Message is required".to_string()));
        }
        let reply = self.assistant.chat(message).await.map_err(|err| {
            error!(user = %user, error = %err, "chat request failed");
            VisaServiceError::Reasoning(err)
        })?;
        Ok(reply)
    }

    pub async fn analyze_documents(
        &self,
        owner: &UserId,
    ) -> Result<DocumentAnalysis, VisaServiceError> {
        let documents = self.list_documents(owner, None)?;
        if documents.is_empty() {
            return Err(VisaServiceError::NotFound("documents"));
        }
        Ok(self.assistant.analyze_documents(&documents).await)
    }

    /// Review fields from every document the user uploaded, oldest first.
    pub async fn extract_fields(&self, owner: &UserId) -> Result<FieldMap, VisaServiceError> {
        let documents = self.list_documents(owner, None)?;
        if documents.is_empty() {
            return Err(VisaServiceError::NotFound("documents"));
        }
        let corpus = aggregate(&documents);
        info!(
            user = %owner,
            documents = documents.len(),
            corpus_chars = corpus.len(),
            "extracting review fields"
        );
        Ok(self.fields.extract(&corpus).await)
    }

    pub async fn generate_template(
        &self,
        owner: &UserId,
        request: TemplateRequest,
    ) -> Result<ApplicationTemplate, VisaServiceError> {
        let subject = match request.application_id {
            Some(id) => {
                let application = self.get_application(owner, id)?;
                let country = self
                    .users
                    .fetch(owner)
                    .map_err(missing("user"))?
                    .and_then(|profile| profile.country_of_origin);
                TemplateSubject {
                    program: application.program,
                    institution: application.institution,
                    country,
                    background: None,
                    goals: None,
                }
            }
            None => TemplateSubject {
                program: request.program.unwrap_or_default(),
                institution: request.institution.unwrap_or_default(),
                country: request.country,
                background: request.background,
                goals: request.goals,
            },
        };

        if subject.program.trim().is_empty() || subject.institution.trim().is_empty() {
            return Err(VisaServiceError::Validation(
                "Program and institution are required".to_string(),
            ));
        }

        self.assistant
            .draft(request.kind, &subject)
            .await
            .map_err(|err| {
                error!(user = %owner, error = %err, "template generation failed");
                VisaServiceError::Reasoning(err)
            })
    }
}

/// Maps repository not-found onto the named entity; other failures pass through.
fn missing(entity: &'static str) -> impl Fn(RepositoryError) -> VisaServiceError {
    move |err| match err {
        RepositoryError::NotFound => VisaServiceError::NotFound(entity),
        other => VisaServiceError::Repository(other),
    }
}

/// Error raised by the visa service.
#[derive(Debug, thiserror::Error)]
pub enum VisaServiceError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    UploadRejected(#[from] UploadRejected),
    #[error(transparent)]
    Reasoning(#[from] ReasoningError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for VisaServiceError {
    fn from(err: RepositoryError) -> Self {
        missing("record")(err)
    }
}
