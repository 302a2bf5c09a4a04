pub mod config;
pub mod dispatcher;
pub mod logging_system;
#[cfg(feature = "metrics")]
pub mod metrics_server;
pub mod shutdown;

pub use config::{Config, ConfigError, LogFormat, LogLevel, SinkType};
pub use dispatcher::{DispatchSummary, Dispatcher, DispatcherOptions};
pub use logging_system::{InitializationError, LoggingSystem, setup_logging_safe};
pub use shutdown::ShutdownSignal;

use crate::buffer::{BatchBuffer, BufferError};
use crate::collector::{CollectorError, SyslogListener};
use crate::sender::{DeliveryStats, Sink, SinkBuildError, SinkKind};
use std::process;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Initialization error: {0}")]
    Initialization(#[from] InitializationError),
    #[error("Sink error: {0}")]
    Sink(#[from] SinkBuildError),
    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),
    #[error("Collector error: {0}")]
    Collector(#[from] CollectorError),
    #[cfg(feature = "metrics")]
    #[error("Metrics error: {0}")]
    Metrics(#[from] metrics_server::MetricsError),
}

pub struct App {
    config: Config,
    buffer: Arc<BatchBuffer<SinkKind>>,
    stats: Arc<DeliveryStats>,
    shutdown: ShutdownSignal,
}

impl App {
    pub async fn from_args<I, T>(args: I) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let config = Config::from_args(args)?;
        setup_logging_safe(config.effective_log_level(), config.log_format)?;
        Self::from_config(config).await
    }

    /// Builds the sink and buffer. Logging is expected to be set up already.
    pub async fn from_config(config: Config) -> Result<Self, AppError> {
        config.validate()?;

        let sink = SinkKind::from_settings(config.sink_settings()).await?;
        let stats = Arc::new(DeliveryStats::new());
        let buffer = Arc::new(BatchBuffer::with_stats(
            config.buffer_config(),
            sink,
            stats.clone(),
        )?);

        info!("Starting logfwrd v{}", crate::VERSION);
        info!(
            sink = buffer.sink().name(),
            endpoint = %config.endpoint,
            max_records = config.max_records,
            max_interval = ?config.max_interval,
            delivery_timeout = ?config.delivery_timeout,
            "Configuration loaded"
        );

        Ok(Self {
            config,
            buffer,
            stats,
            shutdown: ShutdownSignal::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> &Arc<DeliveryStats> {
        &self.stats
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Runs until SIGINT/SIGTERM (or [`ShutdownSignal::trigger`]).
    pub async fn run(self) -> Result<(), AppError> {
        let cancel = self.shutdown.token();
        self.shutdown.listen();

        let (tx, rx) = mpsc::channel(self.config.queue_capacity);
        let listener = SyslogListener::bind(&self.config.listen, tx, self.stats.clone()).await?;
        let listener_task = tokio::spawn(listener.run(cancel.child_token()));

        if let Some(port) = self.config.metrics_port {
            self.spawn_metrics(port, cancel.child_token())?;
        }

        let dispatcher =
            Dispatcher::with_options(self.buffer.clone(), self.config.dispatcher_options());
        let summary = dispatcher.run(rx, cancel.child_token()).await;

        // The dispatcher also stops when the listener goes away.
        cancel.cancel();
        match listener_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Syslog listener failed"),
            Err(e) => error!(error = %e, "Syslog listener task panicked"),
        }

        let snapshot = self.stats.snapshot();
        info!(
            records = summary.records,
            batches_delivered = snapshot.batches_delivered,
            batches_failed = snapshot.batches_failed(),
            records_dropped = snapshot.records_dropped,
            "logfwrd stopped"
        );
        Ok(())
    }

    #[cfg(feature = "metrics")]
    fn spawn_metrics(
        &self,
        port: u16,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<(), AppError> {
        let exporter = metrics_server::PrometheusExporter::new(self.stats.clone())?;
        tokio::spawn(async move {
            if let Err(e) = exporter.serve(port, cancel).await {
                error!(error = %e, "Metrics server failed");
            }
        });
        Ok(())
    }

    #[cfg(not(feature = "metrics"))]
    fn spawn_metrics(
        &self,
        port: u16,
        _cancel: tokio_util::sync::CancellationToken,
    ) -> Result<(), AppError> {
        tracing::warn!(port, "Metrics feature is disabled, ignoring --metrics-port");
        Ok(())
    }
}

/// Process entry point. Exits with status 1 on any startup or runtime error.
pub async fn main() {
    let app = match App::from_args(std::env::args_os()).await {
        Ok(app) => app,
        Err(AppError::Config(ConfigError::Cli(e))) if !e.use_stderr() => {
            // --help / --version
            let _ = e.print();
            return;
        }
        Err(AppError::Config(ConfigError::Cli(e))) => {
            let _ = e.print();
            process::exit(1);
        }
        Err(e) => {
            error!("{}", e);
            eprintln!("logfwrd: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = app.run().await {
        error!("Application error: {}", e);
        process::exit(1);
    }
}
