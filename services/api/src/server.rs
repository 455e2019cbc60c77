use crate::cli::ServeArgs;
use crate::infra::{
    in_memory_service, object_storage, reasoning_service, service_settings, ApiService, AppState,
};
use crate::routes::with_visa_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use visa_navigator::config::AppConfig;
use visa_navigator::error::AppError;
use visa_navigator::telemetry;

const SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Tentative uploads younger than this may still be waiting on their metadata insert.
const SWEEP_MIN_AGE_MINUTES: i64 = 60;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let settings = service_settings(&config)?;
    let service = Arc::new(in_memory_service(
        object_storage(&config.storage)?,
        reasoning_service(&config.reasoning)?,
        settings,
    ));
    spawn_upload_sweeper(service.clone());

    let app = with_visa_routes(service, config.uploads.max_bytes)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        hosted_storage = config.storage.is_configured(),
        reasoning = config.reasoning.api_key.is_some(),
        "visa navigator ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

fn spawn_upload_sweeper(service: Arc<ApiService>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            service
                .sweep_uncommitted(chrono::Duration::minutes(SWEEP_MIN_AGE_MINUTES))
                .await;
        }
    });
}
