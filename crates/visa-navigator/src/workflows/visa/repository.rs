use chrono::{DateTime, Utc};

use super::domain::{
    Application, ApplicationId, ApplicationUpdate, DocumentId, DocumentRecord, NewApplication,
    NewDocument, ProfileUpdate, UserId, UserProfile, UserSync,
};

/// Storage abstraction for user rows keyed by identity.
pub trait UserRepository: Send + Sync {
    /// Insert the user on first sight, otherwise refresh email and names.
    fn upsert(&self, id: &UserId, sync: UserSync) -> Result<UserProfile, RepositoryError>;
    fn fetch(&self, id: &UserId) -> Result<Option<UserProfile>, RepositoryError>;
    fn update_profile(
        &self,
        id: &UserId,
        update: ProfileUpdate,
    ) -> Result<UserProfile, RepositoryError>;
    fn mark_onboarded(&self, id: &UserId) -> Result<UserProfile, RepositoryError>;
}

/// Owner-scoped access to applications. Every method filters by `owner`.
pub trait ApplicationRepository: Send + Sync {
    fn insert(
        &self,
        owner: &UserId,
        application: NewApplication,
    ) -> Result<Application, RepositoryError>;
    /// Newest first.
    fn list(&self, owner: &UserId) -> Result<Vec<Application>, RepositoryError>;
    fn fetch(
        &self,
        owner: &UserId,
        id: ApplicationId,
    ) -> Result<Option<Application>, RepositoryError>;
    fn update(
        &self,
        owner: &UserId,
        id: ApplicationId,
        update: ApplicationUpdate,
    ) -> Result<Application, RepositoryError>;
    /// Unconditional write of the score column; concurrent writers race and the last one wins.
    fn set_strength_score(
        &self,
        owner: &UserId,
        id: ApplicationId,
        score: u8,
    ) -> Result<(), RepositoryError>;
    fn delete(&self, owner: &UserId, id: ApplicationId) -> Result<Application, RepositoryError>;
}

/// Owner-scoped access to document metadata.
pub trait DocumentRepository: Send + Sync {
    fn insert(&self, document: NewDocument) -> Result<DocumentRecord, RepositoryError>;
    /// All of the owner's documents, optionally narrowed to one application, newest first.
    fn list(
        &self,
        owner: &UserId,
        application: Option<ApplicationId>,
    ) -> Result<Vec<DocumentRecord>, RepositoryError>;
    fn fetch(
        &self,
        owner: &UserId,
        id: DocumentId,
    ) -> Result<Option<DocumentRecord>, RepositoryError>;
    fn delete(&self, owner: &UserId, id: DocumentId) -> Result<DocumentRecord, RepositoryError>;
    fn count_for_application(
        &self,
        owner: &UserId,
        application: ApplicationId,
    ) -> Result<usize, RepositoryError>;
    /// Clears `application_id` on the owner's documents attached to `application`;
    /// returns how many rows changed.
    fn detach_application(
        &self,
        owner: &UserId,
        application: ApplicationId,
    ) -> Result<usize, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Newest-first ordering shared by list implementations.
pub fn newest_first<T>(items: &mut [T], key: impl Fn(&T) -> (DateTime<Utc>, i64)) {
    items.sort_by(|left, right| key(right).cmp(&key(left)));
}
