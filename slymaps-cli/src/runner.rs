//! Shared setup for commands that talk to providers.

use std::future::Future;

use slymaps::app::SlyMapsApp;
use slymaps::config::{config_file_path, ConfigFile};
use slymaps::logging::{init_logging, LoggingConfig, LoggingGuard};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::CliError;

/// Loads configuration, installs logging and owns the Tokio runtime.
pub struct CliRunner {
    config: ConfigFile,
    runtime: Runtime,
    _log_guard: LoggingGuard,
}

impl CliRunner {
    /// `log_level` overrides the configured level.
    pub fn new(log_level: Option<&str>) -> Result<Self, CliError> {
        let config = ConfigFile::load()?;

        let mut logging = LoggingConfig::from(&config.logging);
        if let Some(level) = log_level {
            logging = logging.with_level(level);
        }
        let log_guard = init_logging(&logging)?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| CliError::Runtime(e.to_string()))?;

        Ok(Self {
            config,
            runtime,
            _log_guard: log_guard,
        })
    }

    pub fn log_startup(&self, command: &str) {
        info!(
            command,
            version = env!("CARGO_PKG_VERSION"),
            config = %config_file_path().display(),
            environment = self.config.cache.environment.as_str(),
            "SlyMaps CLI starting"
        );
    }

    /// Build the application from the loaded configuration.
    pub fn create_app(&self) -> Result<SlyMapsApp, CliError> {
        let _guard = self.runtime.enter();
        Ok(SlyMapsApp::from_config(&self.config)?)
    }

    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Run `future` with a token that is cancelled on Ctrl-C.
    pub fn run_cancellable<F, Fut, T>(&self, f: F) -> Result<T, CliError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, CliError>>,
    {
        self.runtime.block_on(async {
            let cancel = CancellationToken::new();
            let watcher = cancel.clone();
            let signal = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupted");
                    watcher.cancel();
                }
            });
            let result = f(cancel).await;
            signal.abort();
            result
        })
    }
}
