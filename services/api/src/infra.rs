use async_trait::async_trait;
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};
use visa_navigator::config::{AppConfig, ReasoningConfig, StorageConfig};
use visa_navigator::error::AppError;
use visa_navigator::workflows::visa::{
    newest_first, AnthropicClient, Application, ApplicationId, ApplicationRepository,
    ApplicationUpdate, DisabledReasoning, DocumentId, DocumentRecord, DocumentRepository,
    NewApplication, NewDocument, ObjectStorage, ProfileUpdate, ReasoningService,
    RepositoryError, ScoringTables, ServiceSettings, StorageError, SupabaseStorage, UserId,
    UserProfile, UserRepository, UserSync, VisaRepositories, VisaService,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type ApiService =
    VisaService<InMemoryUserRepository, InMemoryApplicationRepository, InMemoryDocumentRepository>;

#[derive(Default, Clone)]
pub(crate) struct InMemoryUserRepository {
    users: Arc<Mutex<HashMap<UserId, UserProfile>>>,
}

impl UserRepository for InMemoryUserRepository {
    fn upsert(&self, id: &UserId, sync: UserSync) -> Result<UserProfile, RepositoryError> {
        let mut guard = self.users.lock().expect("user repository mutex poisoned");
        let now = Utc::now();
        let profile = guard
            .entry(id.clone())
            .or_insert_with(|| UserProfile::new(id.clone(), sync.email.clone(), now));
        profile.email = sync.email;
        profile.first_name = sync.first_name;
        profile.last_name = sync.last_name;
        profile.updated_at = now;
        Ok(profile.clone())
    }

    fn fetch(&self, id: &UserId) -> Result<Option<UserProfile>, RepositoryError> {
        let guard = self.users.lock().expect("user repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn update_profile(
        &self,
        id: &UserId,
        update: ProfileUpdate,
    ) -> Result<UserProfile, RepositoryError> {
        let mut guard = self.users.lock().expect("user repository mutex poisoned");
        let profile = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
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
        let mut guard = self.users.lock().expect("user repository mutex poisoned");
        let profile = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        profile.is_onboarded = true;
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryApplicationRepository {
    records: Arc<Mutex<HashMap<ApplicationId, Application>>>,
    sequence: Arc<AtomicI64>,
}

impl InMemoryApplicationRepository {
    fn owned<'a>(
        guard: &'a mut HashMap<ApplicationId, Application>,
        owner: &UserId,
        id: ApplicationId,
    ) -> Result<&'a mut Application, RepositoryError> {
        guard
            .get_mut(&id)
            .filter(|record| &record.user_id == owner)
            .ok_or(RepositoryError::NotFound)
    }
}

impl ApplicationRepository for InMemoryApplicationRepository {
    fn insert(
        &self,
        owner: &UserId,
        application: NewApplication,
    ) -> Result<Application, RepositoryError> {
        let id = ApplicationId(self.sequence.fetch_add(1, Ordering::Relaxed) + 1);
        let now = Utc::now();
        let record = Application {
            id,
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
        let mut guard = self.records.lock().expect("application repository mutex poisoned");
        if guard.contains_key(&id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(id, record.clone());
        Ok(record)
    }

    fn list(&self, owner: &UserId) -> Result<Vec<Application>, RepositoryError> {
        let guard = self.records.lock().expect("application repository mutex poisoned");
        let mut records: Vec<Application> = guard
            .values()
            .filter(|record| &record.user_id == owner)
            .cloned()
            .collect();
        newest_first(&mut records, |record| (record.created_at, record.id.0));
        Ok(records)
    }

    fn fetch(
        &self,
        owner: &UserId,
        id: ApplicationId,
    ) -> Result<Option<Application>, RepositoryError> {
        let guard = self.records.lock().expect("application repository mutex poisoned");
        Ok(guard
            .get(&id)
            .filter(|record| &record.user_id == owner)
            .cloned())
    }

    fn update(
        &self,
        owner: &UserId,
        id: ApplicationId,
        update: ApplicationUpdate,
    ) -> Result<Application, RepositoryError> {
        let mut guard = self.records.lock().expect("application repository mutex poisoned");
        let record = Self::owned(&mut guard, owner, id)?;
        update.apply(record);
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    fn set_strength_score(
        &self,
        owner: &UserId,
        id: ApplicationId,
        score: u8,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("application repository mutex poisoned");
        let record = Self::owned(&mut guard, owner, id)?;
        record.strength_score = Some(score);
        record.updated_at = Utc::now();
        Ok(())
    }

    fn delete(&self, owner: &UserId, id: ApplicationId) -> Result<Application, RepositoryError> {
        let mut guard = self.records.lock().expect("application repository mutex poisoned");
        Self::owned(&mut guard, owner, id)?;
        guard.remove(&id).ok_or(RepositoryError::NotFound)
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryDocumentRepository {
    records: Arc<Mutex<HashMap<DocumentId, DocumentRecord>>>,
    sequence: Arc<AtomicI64>,
}

impl DocumentRepository for InMemoryDocumentRepository {
    fn insert(&self, document: NewDocument) -> Result<DocumentRecord, RepositoryError> {
        let id = DocumentId(self.sequence.fetch_add(1, Ordering::Relaxed) + 1);
        let now = Utc::now();
        let record = DocumentRecord {
            id,
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
        let mut guard = self.records.lock().expect("document repository mutex poisoned");
        guard.insert(id, record.clone());
        Ok(record)
    }

    fn list(
        &self,
        owner: &UserId,
        application: Option<ApplicationId>,
    ) -> Result<Vec<DocumentRecord>, RepositoryError> {
        let guard = self.records.lock().expect("document repository mutex poisoned");
        let mut records: Vec<DocumentRecord> = guard
            .values()
            .filter(|record| &record.user_id == owner)
            .filter(|record| application.map_or(true, |id| record.application_id == Some(id)))
            .cloned()
            .collect();
        newest_first(&mut records, |record| (record.created_at, record.id.0));
        Ok(records)
    }

    fn fetch(
        &self,
        owner: &UserId,
        id: DocumentId,
    ) -> Result<Option<DocumentRecord>, RepositoryError> {
        let guard = self.records.lock().expect("document repository mutex poisoned");
        Ok(guard
            .get(&id)
            .filter(|record| &record.user_id == owner)
            .cloned())
    }

    fn delete(&self, owner: &UserId, id: DocumentId) -> Result<DocumentRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("document repository mutex poisoned");
        match guard.get(&id) {
            Some(record) if &record.user_id == owner => {
                guard.remove(&id).ok_or(RepositoryError::NotFound)
            }
            _ => Err(RepositoryError::NotFound),
        }
    }

    fn count_for_application(
        &self,
        owner: &UserId,
        application: ApplicationId,
    ) -> Result<usize, RepositoryError> {
        let guard = self.records.lock().expect("document repository mutex poisoned");
        Ok(guard
            .values()
            .filter(|record| &record.user_id == owner && record.application_id == Some(application))
            .count())
    }

    fn detach_application(
        &self,
        owner: &UserId,
        application: ApplicationId,
    ) -> Result<usize, RepositoryError> {
        let mut guard = self.records.lock().expect("document repository mutex poisoned");
        let now = Utc::now();
        let attached = guard.values_mut().filter(|record| {
            &record.user_id == owner && record.application_id == Some(application)
        });
        let mut detached = 0;
        for record in attached {
            record.application_id = None;
            record.updated_at = now;
            detached += 1;
        }
        Ok(detached)
    }
}

/// Process-local bucket used when no hosted storage is configured.
#[derive(Default, Clone)]
pub(crate) struct InMemoryObjectStorage {
    bucket: String,
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl InMemoryObjectStorage {
    pub(crate) fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: Arc::default(),
        }
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        let guard = self.objects.lock().expect("object storage mutex poisoned");
        let mut keys: Vec<String> = guard.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        let mut guard = self.objects.lock().expect("object storage mutex poisoned");
        if guard.contains_key(key) {
            return Err(StorageError::AlreadyExists(key.to_string()));
        }
        guard.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let guard = self.objects.lock().expect("object storage mutex poisoned");
        guard
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        let guard = self.objects.lock().expect("object storage mutex poisoned");
        if !guard.contains_key(key) {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(format!(
            "memory://{}/{key}?expires_in={}",
            self.bucket,
            ttl.as_secs()
        ))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut guard = self.objects.lock().expect("object storage mutex poisoned");
        guard
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}

pub(crate) fn load_tables(path: Option<&Path>) -> Result<ScoringTables, AppError> {
    match path {
        Some(path) => {
            let tables = ScoringTables::from_path(path)?;
            info!(path = %path.display(), version = %tables.version, "scoring tables loaded");
            Ok(tables)
        }
        None => Ok(ScoringTables::default()),
    }
}

pub(crate) fn reasoning_service(
    config: &ReasoningConfig,
) -> Result<Arc<dyn ReasoningService>, AppError> {
    match AnthropicClient::from_config(config)? {
        Some(client) => {
            info!(model = client.model(), "reasoning client configured");
            Ok(Arc::new(client))
        }
        None => {
            warn!("ANTHROPIC_API_KEY not set; assistant features will use fallbacks");
            Ok(Arc::new(DisabledReasoning))
        }
    }
}

pub(crate) fn object_storage(config: &StorageConfig) -> Result<Arc<dyn ObjectStorage>, AppError> {
    match SupabaseStorage::from_config(config)? {
        Some(storage) => Ok(Arc::new(storage)),
        None => {
            warn!(bucket = %config.bucket, "hosted storage not configured; keeping uploads in memory");
            Ok(Arc::new(InMemoryObjectStorage::new(config.bucket.clone())))
        }
    }
}

pub(crate) fn service_settings(config: &AppConfig) -> Result<ServiceSettings, AppError> {
    Ok(ServiceSettings {
        tables: Arc::new(load_tables(config.scoring_tables.as_deref())?),
        reasoning_timeout: config.reasoning.timeout,
        upload_max_bytes: config.uploads.max_bytes,
        ocr: config.ocr.clone(),
    })
}

pub(crate) fn in_memory_service(
    storage: Arc<dyn ObjectStorage>,
    reasoning: Arc<dyn ReasoningService>,
    settings: ServiceSettings,
) -> ApiService {
    VisaService::new(
        VisaRepositories {
            users: Arc::new(InMemoryUserRepository::default()),
            applications: Arc::new(InMemoryApplicationRepository::default()),
            documents: Arc::new(InMemoryDocumentRepository::default()),
        },
        storage,
        reasoning,
        settings,
    )
}
