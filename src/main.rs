use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::prelude::*;

use art_queue::api::task_routes;
use art_queue::config::{GeneratorConfig, QueueConfig, ServerConfig};
use art_queue::generation::create_generator;
use art_queue::storage::{HttpStorageService, StorageService};
use art_queue::store::{HistoryStore, LibSqlBackend};
use art_queue::tasks::{ExpirySweep, TaskQueueService, TaskStore};
use art_queue::worker::{Worker, WorkerDeps};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Settings {
        server: server_config,
        queue: queue_config,
        generator: generator_config,
    } = load_settings().context("invalid configuration")?;
    let _log_guard = init_tracing(server_config.log_dir.as_deref());

    eprintln!("🎨 Art Queue v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", server_config.db_path.display());
    eprintln!(
        "   Generator: {}",
        generator_config
            .as_ref()
            .map(|c| c.base_url.as_str())
            .unwrap_or("mock")
    );
    eprintln!("   API: http://0.0.0.0:{}/api", server_config.port);

    let db = open_database(&server_config.db_path)
        .await
        .context("failed to open task database")?;

    let service = Arc::new(TaskQueueService::new(
        TaskStore::new(db.clone(), queue_config.write_queue_capacity),
        queue_config.clone(),
    ));

    let storage = server_config.storage_url.as_ref().map(|url| {
        tracing::info!(endpoint = %url, "Image re-hosting enabled");
        Arc::new(HttpStorageService::new(url.clone())) as Arc<dyn StorageService>
    });

    let worker = Arc::new(Worker::new(WorkerDeps {
        service: Arc::clone(&service),
        generator: create_generator(generator_config.as_ref()),
        storage,
        history: Some(db.clone() as Arc<dyn HistoryStore>),
        timeout: queue_config.generation_timeout,
        storage_domain: queue_config.storage_domain.clone(),
    }));

    // Settle tasks interrupted by the previous run
    let recovered = service
        .recover_pending_tasks(queue_config.recovery_max_age)
        .await;
    let _resume_handle = worker.resume(recovered, queue_config.recovery_stagger);

    let sweep = ExpirySweep::spawn(
        Arc::clone(&service),
        queue_config.sweep_interval,
        queue_config.retention,
    );

    let app = task_routes(Arc::clone(&service), worker);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", server_config.port))
        .await
        .with_context(|| format!("failed to bind port {}", server_config.port))?;
    tracing::info!(port = server_config.port, "HTTP server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    tracing::info!("Shutting down");
    sweep.shutdown().await;
    service.flush().await;
    Ok(())
}

/// Everything read from the environment at startup.
struct Settings {
    server: ServerConfig,
    queue: QueueConfig,
    generator: Option<GeneratorConfig>,
}

fn load_settings() -> art_queue::error::Result<Settings> {
    Ok(Settings {
        server: ServerConfig::from_env()?,
        queue: QueueConfig::from_env()?,
        generator: GeneratorConfig::from_env(),
    })
}

async fn open_database(path: &Path) -> art_queue::error::Result<Arc<LibSqlBackend>> {
    Ok(Arc::new(LibSqlBackend::new_local(path).await?))
}

/// Stderr logging, plus a daily rolling file when `log_dir` is set.
fn init_tracing(log_dir: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "art-queue.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    guard
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
