use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque identity issued by the external identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub i64);

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub i64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Applicant profile as mirrored from the identity provider plus onboarding answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub country_of_origin: Option<String>,
    pub current_country: Option<String>,
    pub phone: Option<String>,
    pub is_onboarded: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(id: UserId, email: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            email: email.into(),
            first_name: None,
            last_name: None,
            country_of_origin: None,
            current_country: None,
            phone: None,
            is_onboarded: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Origin, current country and phone are all filled in.
    pub fn profile_complete(&self) -> bool {
        [
            &self.country_of_origin,
            &self.current_country,
            &self.phone,
        ]
        .iter()
        .all(|field| field.as_deref().is_some_and(|value| !value.trim().is_empty()))
    }

    pub fn display_name(&self) -> String {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.trim().is_empty())
            .collect();
        parts.join(" ")
    }
}

/// Identity-provider payload used to create or refresh a user row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSync {
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub country_of_origin: Option<String>,
    #[serde(default)]
    pub current_country: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OnboardingStatus {
    pub is_onboarded: bool,
    pub profile_complete: bool,
}

/// Lifecycle of a visa application; loosely enforced, transitions are caller driven.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    #[default]
    Draft,
    InReview,
    Complete,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Draft => "draft",
            ApplicationStatus::InReview => "in_review",
            ApplicationStatus::Complete => "complete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub user_id: UserId,
    pub status: ApplicationStatus,
    pub institution: String,
    pub program: String,
    /// Free text; not validated as a calendar date.
    pub start_date: String,
    /// Free text expected to contain a numeric amount.
    pub total_cost: String,
    pub strength_score: Option<u8>,
    pub is_complete: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when creating an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApplication {
    pub institution: String,
    pub program: String,
    pub start_date: String,
    pub total_cost: String,
    #[serde(default)]
    pub status: ApplicationStatus,
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationUpdate {
    #[serde(default)]
    pub status: Option<ApplicationStatus>,
    #[serde(default)]
    pub institution: Option<String>,
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub total_cost: Option<String>,
    #[serde(default)]
    pub is_complete: Option<bool>,
}

impl ApplicationUpdate {
    pub fn apply(self, application: &mut Application) {
        if let Some(status) = self.status {
            application.status = status;
        }
        if let Some(institution) = self.institution {
            application.institution = institution;
        }
        if let Some(program) = self.program {
            application.program = program;
        }
        if let Some(start_date) = self.start_date {
            application.start_date = start_date;
        }
        if let Some(total_cost) = self.total_cost {
            application.total_cost = total_cost;
        }
        if let Some(is_complete) = self.is_complete {
            application.is_complete = is_complete;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub user_id: UserId,
    pub application_id: Option<ApplicationId>,
    /// Free-text category tag such as "Letter of Acceptance".
    #[serde(rename = "type")]
    pub doc_type: String,
    pub filename: String,
    pub original_name: String,
    pub size: u64,
    pub mime_type: String,
    pub storage_path: String,
    pub text_content: Option<String>,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Metadata written once the stored object exists; the repository assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDocument {
    pub user_id: UserId,
    pub application_id: Option<ApplicationId>,
    pub doc_type: String,
    pub filename: String,
    pub original_name: String,
    pub size: u64,
    pub mime_type: String,
    pub storage_path: String,
    pub text_content: Option<String>,
}
