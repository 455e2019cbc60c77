use std::sync::Arc;

use axum::{
    async_trait,
    extract::{DefaultBodyLimit, FromRequestParts, Multipart, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};

use super::domain::{
    ApplicationId, ApplicationUpdate, DocumentId, NewApplication, ProfileUpdate, UserId, UserSync,
};
use super::reasoning::ReasoningError;
use super::repository::{
    ApplicationRepository, DocumentRepository, RepositoryError, UserRepository,
};
use super::service::{TemplateRequest, VisaService, VisaServiceError};
use super::upload::UploadRequest;

/// Header set by the identity-provider proxy in front of the service.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Multipart framing overhead allowed on top of the upload size limit.
const MULTIPART_SLACK_BYTES: usize = 1024 * 1024;

/// Caller identity taken from [`USER_ID_HEADER`]; missing or blank yields 401.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| CurrentUser(UserId::new(value)))
            .ok_or_else(|| error_response(VisaServiceError::Unauthorized))
    }
}

type Service<U, A, D> = State<Arc<VisaService<U, A, D>>>;

/// Router exposing user, application, document and assistant endpoints.
pub fn visa_router<U, A, D>(service: Arc<VisaService<U, A, D>>, upload_max_bytes: u64) -> Router
where
    U: UserRepository + 'static,
    A: ApplicationRepository + 'static,
    D: DocumentRepository + 'static,
{
    let body_limit = usize::try_from(upload_max_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_SLACK_BYTES);

    Router::new()
        .route("/api/v1/users", post(sync_user_handler::<U, A, D>))
        .route("/api/v1/users/me", get(current_user_handler::<U, A, D>))
        .route(
            "/api/v1/users/me/profile",
            put(update_profile_handler::<U, A, D>),
        )
        .route(
            "/api/v1/users/me/onboarding",
            get(onboarding_status_handler::<U, A, D>).post(complete_onboarding_handler::<U, A, D>),
        )
        .route(
            "/api/v1/applications",
            get(list_applications_handler::<U, A, D>).post(create_application_handler::<U, A, D>),
        )
        .route(
            "/api/v1/applications/:application_id",
            get(get_application_handler::<U, A, D>)
                .put(update_application_handler::<U, A, D>)
                .delete(delete_application_handler::<U, A, D>),
        )
        .route(
            "/api/v1/applications/:application_id/strength",
            post(strength_handler::<U, A, D>),
        )
        .route(
            "/api/v1/applications/:application_id/completeness",
            get(completeness_handler::<U, A, D>),
        )
        .route(
            "/api/v1/documents",
            get(list_documents_handler::<U, A, D>).post(upload_document_handler::<U, A, D>),
        )
        .route(
            "/api/v1/documents/:document_id",
            get(get_document_handler::<U, A, D>).delete(delete_document_handler::<U, A, D>),
        )
        .route(
            "/api/v1/documents/:document_id/url",
            get(document_url_handler::<U, A, D>),
        )
        .route("/api/v1/ai/chat", post(chat_handler::<U, A, D>))
        .route(
            "/api/v1/ai/document-analysis",
            post(document_analysis_handler::<U, A, D>),
        )
        .route(
            "/api/v1/ai/extract-review",
            post(extract_review_handler::<U, A, D>),
        )
        .route("/api/v1/ai/template", post(template_handler::<U, A, D>))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(service)
}

/// Maps service failures onto status codes with a sanitized `{ "error": .. }` body.
pub(crate) fn error_response(err: VisaServiceError) -> Response {
    let (status, message) = match &err {
        VisaServiceError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
        VisaServiceError::NotFound(entity) => (StatusCode::NOT_FOUND, format!("{entity} not found")),
        VisaServiceError::Validation(message) => (StatusCode::BAD_REQUEST, message.clone()),
        VisaServiceError::UploadRejected(rejection) => {
            (StatusCode::BAD_REQUEST, rejection.to_string())
        }
        VisaServiceError::Reasoning(ReasoningError::Timeout) => (
            StatusCode::GATEWAY_TIMEOUT,
            "The assistant took too long to respond".to_string(),
        ),
        VisaServiceError::Reasoning(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to process request".to_string(),
        ),
        VisaServiceError::Storage(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Document storage operation failed".to_string(),
        ),
        VisaServiceError::Repository(RepositoryError::Conflict) => {
            (StatusCode::CONFLICT, "record already exists".to_string())
        }
        VisaServiceError::Repository(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        ),
    };

    if status.is_server_error() {
        error!(status = status.as_u16(), error = %err, "request failed");
    }

    (status, Json(json!({ "error": message }))).into_response()
}

fn respond<T: serde::Serialize>(status: StatusCode, result: Result<T, VisaServiceError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn sync_user_handler<U, A, D>(
    State(service): Service<U, A, D>,
    CurrentUser(user): CurrentUser,
    Json(sync): Json<UserSync>,
) -> Response
where
    U: UserRepository + 'static,
    A: ApplicationRepository + 'static,
    D: DocumentRepository + 'static,
{
    respond(StatusCode::OK, service.sync_user(&user, sync))
}

pub(crate) async fn current_user_handler<U, A, D>(
    State(service): Service<U, A, D>,
    CurrentUser(user): CurrentUser,
) -> Response
where
    U: UserRepository + 'static,
    A: ApplicationRepository + 'static,
    D: DocumentRepository + 'static,
{
    respond(StatusCode::OK, service.current_user(&user))
}

pub(crate) async fn update_profile_handler<U, A, D>(
    State(service): Service<U, A, D>,
    CurrentUser(user): CurrentUser,
    Json(update): Json<ProfileUpdate>,
) -> Response
where
    U: UserRepository + 'static,
    A: ApplicationRepository + 'static,
    D: DocumentRepository + 'static,
{
    respond(StatusCode::OK, service.update_profile(&user, update))
}

pub(crate) async fn complete_onboarding_handler<U, A, D>(
    State(service): Service<U, A, D>,
    CurrentUser(user): CurrentUser,
) -> Response
where
    U: UserRepository + 'static,
    A: ApplicationRepository + 'static,
    D: DocumentRepository + 'static,
{
    respond(
        StatusCode::OK,
        service
            .complete_onboarding(&user)
            .map(|_| json!({ "success": true })),
    )
}

pub(crate) async fn onboarding_status_handler<U, A, D>(
    State(service): Service<U, A, D>,
    CurrentUser(user): CurrentUser,
) -> Response
where
    U: UserRepository + 'static,
    A: ApplicationRepository + 'static,
    D: DocumentRepository + 'static,
{
    respond(StatusCode::OK, service.onboarding_status(&user))
}

pub(crate) async fn list_applications_handler<U, A, D>(
    State(service): Service<U, A, D>,
    CurrentUser(user): CurrentUser,
) -> Response
where
    U: UserRepository + 'static,
    A: ApplicationRepository + 'static,
    D: DocumentRepository + 'static,
{
    respond(StatusCode::OK, service.list_applications(&user))
}

pub(crate) async fn create_application_handler<U, A, D>(
    State(service): Service<U, A, D>,
    CurrentUser(user): CurrentUser,
    Json(application): Json<NewApplication>,
) -> Response
where
    U: UserRepository + 'static,
    A: ApplicationRepository + 'static,
    D: DocumentRepository + 'static,
{
    respond(
        StatusCode::CREATED,
        service.create_application(&user, application),
    )
}

pub(crate) async fn get_application_handler<U, A, D>(
    State(service): Service<U, A, D>,
    CurrentUser(user): CurrentUser,
    Path(application_id): Path<i64>,
) -> Response
where
    U: UserRepository + 'static,
    A: ApplicationRepository + 'static,
    D: DocumentRepository + 'static,
{
    respond(
        StatusCode::OK,
        service.get_application(&user, ApplicationId(application_id)),
    )
}

pub(crate) async fn update_application_handler<U, A, D>(
    State(service): Service<U, A, D>,
    CurrentUser(user): CurrentUser,
    Path(application_id): Path<i64>,
    Json(update): Json<ApplicationUpdate>,
) -> Response
where
    U: UserRepository + 'static,
    A: ApplicationRepository + 'static,
    D: DocumentRepository + 'static,
{
    respond(
        StatusCode::OK,
        service.update_application(&user, ApplicationId(application_id), update),
    )
}

pub(crate) async fn delete_application_handler<U, A, D>(
    State(service): Service<U, A, D>,
    CurrentUser(user): CurrentUser,
    Path(application_id): Path<i64>,
) -> Response
where
    U: UserRepository + 'static,
    A: ApplicationRepository + 'static,
    D: DocumentRepository + 'static,
{
    respond(
        StatusCode::OK,
        service.delete_application(&user, ApplicationId(application_id)),
    )
}

pub(crate) async fn strength_handler<U, A, D>(
    State(service): Service<U, A, D>,
    CurrentUser(user): CurrentUser,
    Path(application_id): Path<i64>,
) -> Response
where
    U: UserRepository + 'static,
    A: ApplicationRepository + 'static,
    D: DocumentRepository + 'static,
{
    respond(
        StatusCode::OK,
        service.calculate_strength(&user, ApplicationId(application_id)),
    )
}

pub(crate) async fn completeness_handler<U, A, D>(
    State(service): Service<U, A, D>,
    CurrentUser(user): CurrentUser,
    Path(application_id): Path<i64>,
) -> Response
where
    U: UserRepository + 'static,
    A: ApplicationRepository + 'static,
    D: DocumentRepository + 'static,
{
    respond(
        StatusCode::OK,
        service
            .check_completeness(&user, ApplicationId(application_id))
            .await,
    )
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct DocumentFilter {
    #[serde(default)]
    application_id: Option<i64>,
}

pub(crate) async fn list_documents_handler<U, A, D>(
    State(service): Service<U, A, D>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<DocumentFilter>,
) -> Response
where
    U: UserRepository + 'static,
    A: ApplicationRepository + 'static,
    D: DocumentRepository + 'static,
{
    respond(
        StatusCode::OK,
        service.list_documents(&user, filter.application_id.map(ApplicationId)),
    )
}

/// Accepts `file`, `type` and an optional `applicationId` (or `application_id`) part.
pub(crate) async fn upload_document_handler<U, A, D>(
    State(service): Service<U, A, D>,
    CurrentUser(user): CurrentUser,
    multipart: Multipart,
) -> Response
where
    U: UserRepository + 'static,
    A: ApplicationRepository + 'static,
    D: DocumentRepository + 'static,
{
    let request = match read_upload(multipart).await {
        Ok(request) => request,
        Err(message) => return error_response(VisaServiceError::Validation(message)),
    };
    respond(
        StatusCode::CREATED,
        service.upload_document(&user, request).await,
    )
}

async fn read_upload(mut multipart: Multipart) -> Result<UploadRequest, String> {
    let mut request = UploadRequest {
        doc_type: String::new(),
        original_name: String::new(),
        mime_type: String::new(),
        application_id: None,
        bytes: Vec::new(),
    };

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        warn!(error = %err, "malformed multipart body");
        "Malformed upload body".to_string()
    })? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                request.original_name = field.file_name().unwrap_or_default().to_string();
                request.mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                request.bytes = field
                    .bytes()
                    .await
                    .map_err(|_| "Malformed upload body".to_string())?
                    .to_vec();
            }
            "type" => {
                request.doc_type = field
                    .text()
                    .await
                    .map_err(|_| "Malformed upload body".to_string())?;
            }
            "applicationId" | "application_id" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|_| "Malformed upload body".to_string())?;
                let raw = raw.trim();
                if !raw.is_empty() {
                    let id = raw
                        .parse::<i64>()
                        .map_err(|_| "applicationId must be a number".to_string())?;
                    request.application_id = Some(ApplicationId(id));
                }
            }
            _ => {}
        }
    }

    Ok(request)
}

pub(crate) async fn get_document_handler<U, A, D>(
    State(service): Service<U, A, D>,
    CurrentUser(user): CurrentUser,
    Path(document_id): Path<i64>,
) -> Response
where
    U: UserRepository + 'static,
    A: ApplicationRepository + 'static,
    D: DocumentRepository + 'static,
{
    respond(
        StatusCode::OK,
        service.get_document(&user, DocumentId(document_id)),
    )
}

pub(crate) async fn delete_document_handler<U, A, D>(
    State(service): Service<U, A, D>,
    CurrentUser(user): CurrentUser,
    Path(document_id): Path<i64>,
) -> Response
where
    U: UserRepository + 'static,
    A: ApplicationRepository + 'static,
    D: DocumentRepository + 'static,
{
    respond(
        StatusCode::OK,
        service
            .delete_document(&user, DocumentId(document_id))
            .await
            .map(|_| json!({ "success": true })),
    )
}

pub(crate) async fn document_url_handler<U, A, D>(
    State(service): Service<U, A, D>,
    CurrentUser(user): CurrentUser,
    Path(document_id): Path<i64>,
) -> Response
where
    U: UserRepository + 'static,
    A: ApplicationRepository + 'static,
    D: DocumentRepository + 'static,
{
    respond(
        StatusCode::OK,
        service
            .document_url(&user, DocumentId(document_id))
            .await
            .map(|url| json!({ "url": url })),
    )
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatMessage {
    #[serde(default)]
    message: String,
}

pub(crate) async fn chat_handler<U, A, D>(
    State(service): Service<U, A, D>,
    CurrentUser(user): CurrentUser,
    Json(chat): Json<ChatMessage>,
) -> Response
where
    U: UserRepository + 'static,
    A: ApplicationRepository + 'static,
    D: DocumentRepository + 'static,
{
    respond(
        StatusCode::OK,
        service
            .chat(&user, &chat.message)
            .await
            .map(|reply| json!({ "response": reply })),
    )
}

pub(crate) async fn document_analysis_handler<U, A, D>(
    State(service): Service<U, A, D>,
    CurrentUser(user): CurrentUser,
) -> Response
where
    U: UserRepository + 'static,
    A: ApplicationRepository + 'static,
    D: DocumentRepository + 'static,
{
    respond(
        StatusCode::OK,
        service
            .analyze_documents(&user)
            .await
            .map(|analysis| json!({ "analysis": analysis })),
    )
}

pub(crate) async fn extract_review_handler<U, A, D>(
    State(service): Service<U, A, D>,
    CurrentUser(user): CurrentUser,
) -> Response
where
    U: UserRepository + 'static,
    A: ApplicationRepository + 'static,
    D: DocumentRepository + 'static,
{
    respond(StatusCode::OK, service.extract_fields(&user).await)
}

pub(crate) async fn template_handler<U, A, D>(
    State(service): Service<U, A, D>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<TemplateRequest>,
) -> Response
where
    U: UserRepository + 'static,
    A: ApplicationRepository + 'static,
    D: DocumentRepository + 'static,
{
    respond(
        StatusCode::OK,
        service
            .generate_template(&user, request)
            .await
            .map(|template| json!({ "template": template })),
    )
}
