//! Student-visa application workflow: document intake and text extraction, strength
//! scoring, checklist completeness and assistant-backed review and drafting.

pub mod aggregate;
pub mod assistant;
pub mod completeness;
pub mod domain;
pub mod extraction;
pub mod fields;
pub mod prompts;
pub mod reasoning;
pub mod repository;
pub mod router;
pub mod service;
pub mod storage;
pub mod strength;
pub mod tables;
pub mod upload;

#[cfg(test)]
mod tests;

pub use aggregate::aggregate;
pub use assistant::{ApplicationTemplate, DocumentAnalysis, TemplateKind};
pub use completeness::{CompletenessChecker, CompletenessReport};
pub use domain::{
    Application, ApplicationId, ApplicationStatus, ApplicationUpdate, DocumentId, DocumentRecord,
    NewApplication, NewDocument, OnboardingStatus, ProfileUpdate, UserId, UserProfile, UserSync,
};
pub use extraction::{ExtractionError, TextExtractor};
pub use fields::{FieldEntry, FieldExtractor, FieldMap, FieldValue};
pub use reasoning::{
    AnthropicClient, DisabledReasoning, ReasoningError, ReasoningRequest, ReasoningService,
};
pub use repository::{
    newest_first, ApplicationRepository, DocumentRepository, RepositoryError, UserRepository,
};
pub use router::{visa_router, CurrentUser, USER_ID_HEADER};
pub use service::{
    ServiceSettings, SweepReport, TemplateRequest, VisaRepositories, VisaService, VisaServiceError,
};
pub use storage::{ObjectStorage, StorageError, SupabaseStorage, UploadLedger, SIGNED_URL_TTL};
pub use strength::{StrengthBreakdown, StrengthEngine, StrengthReport};
pub use tables::{ScoringTables, TablesError};
pub use upload::{UploadPolicy, UploadRejected, UploadRequest};
