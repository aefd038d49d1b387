//! Daemon bootstrap
//!
//! Wires the ambient services together: logging, configuration, the
//! queue manager context, the worker registration table, and
//! signal-driven shutdown. The manager is constructed exactly once here
//! and passed by reference to everything that needs it.

use crate::app::args::Args;
use crate::core::config::{self, ConnectionSettings, FileConfig, Overrides};
use crate::core::logging;
use crate::core::shutdown::ShutdownCoordinator;
use crate::notifications::{EventKind, ManagerEvent};
use crate::queue::{
    async_trait, JobEnvelope, ProcessingError, Processor, QueueManager, QueueResult, SharedQueue,
    WorkerOptions,
};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use strum::IntoEnumIterator;

/// Daemon entry point: parse arguments, bring the stack up, park until
/// a termination signal, then close the manager.
pub async fn run() -> ExitCode {
    let args = Args::parse();

    if let Err(err) = logging::init_logging(
        args.log_level.as_deref(),
        args.log_format.as_deref(),
        args.log_file.as_deref(),
        !args.no_color,
    ) {
        eprintln!("failed to initialise logging: {err}");
        return ExitCode::FAILURE;
    }
    logging::set_verbosity(args.verbosity());

    log::info!("jobq {} starting", env!("CARGO_PKG_VERSION"));

    match bootstrap(&args).await {
        Ok(()) => {
            log::info!("jobq stopped");
            ExitCode::SUCCESS
        }
        Err(err) => {
            // Construction-time errors are fatal and end startup here
            log::error!("startup failed: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn bootstrap(args: &Args) -> QueueResult<()> {
    let settings = load_settings(args)?;
    let manager = QueueManager::new(settings)?;

    attach_monitoring(&manager);
    register_workers(&manager)?;

    let manager_ref = Arc::clone(&manager);
    ShutdownCoordinator::guard(|mut shutdown_rx| async move {
        let _ = shutdown_rx.recv().await;
        log::info!("shutdown signal received, closing queue manager");
        manager_ref.close().await;
        Ok::<(), crate::queue::QueueError>(())
    })
    .await
}

/// Resolve connection settings from CLI overrides, the environment and
/// the configuration file.
fn load_settings(args: &Args) -> QueueResult<ConnectionSettings> {
    let file = match (&args.config, config::default_config_path()) {
        (Some(path), _) => config::load_config_file(path, true)?,
        (None, Some(path)) => config::load_config_file(&path, false)?,
        (None, None) => FileConfig::default(),
    };

    config::resolve(
        &Overrides {
            host: args.host.clone(),
            port: args.port,
        },
        &file,
    )
}

/// Mirror structural changes into the log - the same integration point
/// a monitoring dashboard uses: register existing queues in bulk, then
/// follow the event stream.
fn attach_monitoring(manager: &Arc<QueueManager>) {
    for queue in manager.get_all_queues() {
        log::info!("monitoring queue '{}'", queue.name());
    }

    manager.subscribe(
        EventKind::QueueCreated,
        Arc::new(|event: &ManagerEvent| {
            if let ManagerEvent::QueueCreated(queue) = event {
                log::info!("queue '{}' created", queue.name());
            }
        }),
    );
    manager.subscribe(
        EventKind::QueueRemoved,
        Arc::new(|event: &ManagerEvent| {
            if let ManagerEvent::QueueRemoved(queue) = event {
                log::info!("queue '{}' removed", queue.name());
            }
        }),
    );
    manager.subscribe(
        EventKind::WorkerCreated,
        Arc::new(|event: &ManagerEvent| {
            if let ManagerEvent::WorkerCreated(worker) = event {
                log::info!(
                    "worker {} consuming '{}'",
                    worker.id(),
                    worker.queue_name()
                );
            }
        }),
    );
    manager.subscribe(
        EventKind::WorkerRemoved,
        Arc::new(|event: &ManagerEvent| {
            if let ManagerEvent::WorkerRemoved(worker) = event {
                log::info!("worker {} released", worker.id());
            }
        }),
    );
    manager.subscribe(
        EventKind::ManagerClosed,
        Arc::new(|_event: &ManagerEvent| {
            log::info!("queue manager closed");
        }),
    );
}

/// Explicit registration table: one worker per predefined queue. The
/// bootstrap owns this table; the manager never discovers processors on
/// its own.
fn register_workers(manager: &Arc<QueueManager>) -> QueueResult<()> {
    for shared in SharedQueue::iter() {
        manager.create_worker(
            shared.queue_name(),
            Arc::new(LogProcessor),
            WorkerOptions::default(),
        )?;
    }
    Ok(())
}

/// Default processor for predefined queues: records the envelope and
/// acknowledges it.
pub struct LogProcessor;

#[async_trait]
impl Processor for LogProcessor {
    async fn process(&self, envelope: &JobEnvelope) -> Result<(), ProcessingError> {
        log::info!("job {}: {}", envelope.id, envelope.payload);
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}
