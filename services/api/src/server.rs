use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryPacketArchive, LoggingNotifier};
use crate::routes::with_generation_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use coachdesk::config::AppConfig;
use coachdesk::error::AppError;
use coachdesk::telemetry;
use coachdesk::workflows::generation::{
    run_periodic, GenerationQueue, GenerationService, InMemoryJobStore, QueueMonitor,
    SystemClock, WorkerPool, DEFAULT_JOB_RETENTION,
};
use coachdesk::workflows::intake::IntakeCatalog;
use coachdesk::workflows::packets::TemplateLibrary;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if let Some(workers) = args.workers.take() {
        config.generation.worker_count = workers;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let packets = InMemoryPacketArchive::default();
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        packets: packets.clone(),
    };

    // The monitor's failure window reads archived outcomes, so retention must cover it.
    let retention = config.monitor.failure_window.max(DEFAULT_JOB_RETENTION);
    let store = Arc::new(InMemoryJobStore::with_retention(retention));
    let queue = Arc::new(
        GenerationQueue::new(
            Arc::clone(&store),
            Arc::new(packets),
            Arc::new(LoggingNotifier::default()),
            &config.generation,
        )
        .with_templates(Arc::new(TemplateLibrary::standard())),
    );
    let monitor = Arc::new(QueueMonitor::new(
        store,
        Arc::new(SystemClock),
        config.monitor.clone(),
    ));
    let service = Arc::new(GenerationService::new(
        Arc::new(IntakeCatalog::standard()),
        Arc::clone(&queue),
        Arc::clone(&monitor),
        config.intake.hidden_answers,
    ));

    let workers = WorkerPool::spawn(
        Arc::clone(&queue),
        config.generation.worker_count,
        config.generation.poll_interval,
    );
    let (monitor_stop, monitor_signal) = watch::channel(false);
    let monitor_task = tokio::spawn(run_periodic(monitor, monitor_signal));

    let app = with_generation_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        workers = workers.size(),
        "coaching packet service ready"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    readiness_flag.store(false, Ordering::Release);
    // The monitor task holds the receiver until it exits, so a send error means it already stopped.
    let _ = monitor_stop.send(true);
    if let Err(err) = monitor_task.await {
        warn!(error = %err, "queue monitor task ended abnormally");
    }
    workers.shutdown().await;
    info!("coaching packet service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
