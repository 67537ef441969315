use crate::cli::ServeArgs;
use crate::infra::{seed_sending_identity, AppState, DispatchProvider};
use crate::routes::with_outreach_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use outreach::campaigns::{
    InMemoryOutreachStore, OutreachApi, OutreachService, OutreachSettings, WorkspaceId,
};
use outreach::config::AppConfig;
use outreach::error::AppError;
use outreach::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

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

    let workspace = WorkspaceId(config.outreach.workspace.clone());
    let store = Arc::new(InMemoryOutreachStore::default());
    seed_sending_identity(store.as_ref(), &workspace, &config.provider)
        .map_err(outreach::campaigns::OutreachError::from)?;

    let provider = Arc::new(DispatchProvider::from_config(&config.provider));
    let settings = OutreachSettings {
        scheduler_batch_size: config.outreach.scheduler_batch_size,
        worker_batch_size: config.outreach.worker_batch_size,
        event_batch_size: config.outreach.event_batch_size,
        max_send_attempts: config.outreach.max_send_attempts,
        send_timeout: config.outreach.send_timeout,
    };
    let service = Arc::new(OutreachService::new(store, provider, settings));
    let api = Arc::new(OutreachApi {
        service,
        workspace,
        cron_secret: config.outreach.cron_secret.clone(),
    });

    let app = with_outreach_routes(api)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "outreach delivery engine ready");

    axum::serve(listener, app).await?;
    Ok(())
}
