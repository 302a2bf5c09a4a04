use super::config::{LogFormat, LogLevel};
use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Error, Debug)]
pub enum InitializationError {
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("Logging system initialization failed: {details}")]
    LoggingInitFailed {
        details: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Dependencies that are chatty at `info` and below.
const QUIET_TARGETS: &[(&str, LogLevel)] = &[
    ("hyper", LogLevel::Warn),
    ("hyper_util", LogLevel::Warn),
    ("reqwest", LogLevel::Warn),
    ("h2", LogLevel::Warn),
    ("rustls", LogLevel::Warn),
    ("aws_smithy_runtime", LogLevel::Warn),
    ("aws_config", LogLevel::Warn),
    ("warp", LogLevel::Warn),
];

pub struct LoggingSystem {
    directives: Vec<(String, LogLevel)>,
    format: LogFormat,
}

impl LoggingSystem {
    pub fn new(format: LogFormat) -> Self {
        Self {
            directives: Vec::new(),
            format,
        }
    }

    pub fn with_default_directives(format: LogFormat) -> Self {
        let mut system = Self::new(format);
        for (target, level) in QUIET_TARGETS {
            system.add_directive(target, *level);
        }
        system
    }

    pub fn add_directive(&mut self, target: &str, level: LogLevel) {
        self.directives.push((target.to_string(), level));
    }

    pub fn directive_count(&self) -> usize {
        self.directives.len()
    }

    pub fn build_filter_string(&self, default_level: LogLevel) -> String {
        std::iter::once(default_level.as_str().to_string())
            .chain(
                self.directives
                    .iter()
                    .map(|(target, level)| format!("{target}={}", level.as_str())),
            )
            .collect::<Vec<_>>()
            .join(",")
    }

    /// `RUST_LOG` replaces the built filter entirely when set.
    pub fn env_filter(&self, default_level: LogLevel) -> Result<EnvFilter, InitializationError> {
        let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
            Ok(from_env) if !from_env.trim().is_empty() => from_env,
            _ => self.build_filter_string(default_level),
        };

        EnvFilter::try_new(&filter).map_err(|e| InitializationError::InvalidFilter {
            reason: e.to_string(),
            filter,
        })
    }

    pub fn initialize_tracing(&self, default_level: LogLevel) -> Result<(), InitializationError> {
        let env_filter = self.env_filter(default_level)?;
        let registry = tracing_subscriber::registry().with(env_filter);

        let result = match self.format {
            LogFormat::Text => registry
                .with(fmt::layer().with_target(true).compact())
                .try_init(),
            LogFormat::Json => registry
                .with(
                    fmt::layer()
                        .json()
                        .with_current_span(false)
                        .flatten_event(true),
                )
                .try_init(),
        };

        result.map_err(|e| InitializationError::LoggingInitFailed {
            details: "Failed to set global tracing subscriber".to_string(),
            source: Box::new(e),
        })
    }
}

/// Installs the global subscriber once. Later calls report whether the
/// first one succeeded.
pub fn setup_logging_safe(level: LogLevel, format: LogFormat) -> Result<(), InitializationError> {
    static INIT: Once = Once::new();
    static READY: AtomicBool = AtomicBool::new(false);

    INIT.call_once(|| {
        let system = LoggingSystem::with_default_directives(format);
        match system.initialize_tracing(level) {
            Ok(()) => READY.store(true, Ordering::Release),
            Err(e) => eprintln!("Warning: {e}"),
        }
    });

    if READY.load(Ordering::Acquire) {
        Ok(())
    } else {
        Err(InitializationError::LoggingInitFailed {
            details: "Logging system initialization failed".to_string(),
            source: Box::new(std::io::Error::other("Logging initialization error")),
        })
    }
}
