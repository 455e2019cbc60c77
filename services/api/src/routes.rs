use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use serde_json::json;
use std::sync::Arc;
use visa_navigator::workflows::visa::{
    visa_router, ApplicationRepository, DocumentRepository, UserRepository, VisaService,
};

pub(crate) fn with_visa_routes<U, A, D>(
    service: Arc<VisaService<U, A, D>>,
    upload_max_bytes: u64,
) -> axum::Router
where
    U: UserRepository + 'static,
    A: ApplicationRepository + 'static,
    D: DocumentRepository + 'static,
{
    visa_router(service, upload_max_bytes)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{in_memory_service, InMemoryObjectStorage};
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tower::ServiceExt;
    use visa_navigator::workflows::visa::{DisabledReasoning, ServiceSettings, USER_ID_HEADER};

    fn app() -> (axum::Router, AppState) {
        let settings = ServiceSettings::default();
        let max_bytes = settings.upload_max_bytes;
        let service = Arc::new(in_memory_service(
            Arc::new(InMemoryObjectStorage::new("documents")),
            Arc::new(DisabledReasoning),
            settings,
        ));
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(false)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        let router = with_visa_routes(service, max_bytes).layer(Extension(state.clone()));
        (router, state)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json payload")
    }

    #[tokio::test]
    async fn readiness_follows_the_flag() {
        let (router, state) = app();

        let response = router
            .clone()
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await, json!({ "status": "initializing" }));

        state.readiness.store(true, Ordering::Release);
        let response = router
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn health_needs_no_identity_but_api_routes_do() {
        let (router, _) = app();

        let response = router
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .expect("route executes");
        assert_eq!(body_json(response).await, json!({ "status": "ok" }));

        let response = router
            .clone()
            .oneshot(Request::get("/api/v1/applications").body(Body::empty()).unwrap())
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = router
            .oneshot(
                Request::get("/api/v1/users/me/onboarding")
                    .header(USER_ID_HEADER, "user_new")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("route executes");
        assert_eq!(
            body_json(response).await,
            json!({ "is_onboarded": false, "profile_complete": false })
        );
    }

    #[tokio::test]
    async fn metrics_render_as_prometheus_text() {
        let (router, _) = app();
        let response = router
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; version=0.0.4"
        );
    }
}
