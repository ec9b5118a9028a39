use crate::cli::ServeArgs;
use crate::infra::{engine_config, AppState, InMemoryComplaintStore, LoggingEventPublisher};
use crate::routes::with_complaint_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use chrono::Utc;
use hostel_desk::complaints::{ComplaintService, ComplaintStore, EventPublisher};
use hostel_desk::config::AppConfig;
use hostel_desk::error::AppError;
use hostel_desk::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

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

    let store = Arc::new(InMemoryComplaintStore::default());
    let events = Arc::new(LoggingEventPublisher);
    let service = Arc::new(ComplaintService::new(
        store,
        events,
        engine_config(&config.sweep),
    ));

    spawn_sweep_scheduler(service.clone(), config.sweep.interval_minutes);

    let app = with_complaint_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "hostel complaint desk ready");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Periodic background pass: flag SLA breaches first so the escalation
/// evaluation in the same tick sees them.
fn spawn_sweep_scheduler<S, P>(service: Arc<ComplaintService<S, P>>, interval_minutes: i64)
where
    S: ComplaintStore + 'static,
    P: EventPublisher + 'static,
{
    let period = Duration::from_secs(interval_minutes.unsigned_abs() * 60);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // the first tick fires immediately; skip it so startup stays quiet
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let now = Utc::now();
            if let Err(err) = service.run_sla_breach_scan(None, now) {
                warn!(%err, "sla breach scan failed");
            }
            match service.run_escalation_sweep(None, now) {
                Ok(report) => info!(
                    evaluated = report.evaluated,
                    escalated = report.escalated.len(),
                    "scheduled escalation sweep finished"
                ),
                Err(err) => warn!(%err, "escalation sweep failed"),
            }
        }
    });
}
