//! CLI error type.

use std::fmt;

use slymaps::app::AppError;
use slymaps::config::ConfigError;
use slymaps::logging::LoggingError;
use slymaps::provider::ProviderError;
use slymaps::query::RoutingError;

/// Errors surfaced to the user by `main`.
#[derive(Debug)]
pub enum CliError {
    /// Bad or missing configuration.
    Config(String),

    /// Logging could not be initialized.
    Logging(LoggingError),

    /// Failed to create the Tokio runtime.
    Runtime(String),

    /// Application setup or preferences failure.
    App(AppError),

    /// A provider call failed.
    Provider(ProviderError),

    /// Nothing matched the request.
    NotFound(String),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => 2,
            CliError::NotFound(_) => 3,
            _ => 1,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Logging(e) => write!(f, "Failed to initialize logging: {}", e),
            CliError::Runtime(msg) => write!(f, "Failed to create Tokio runtime: {}", msg),
            CliError::App(e) => write!(f, "{}", e),
            CliError::Provider(e) => write!(f, "{}", e),
            CliError::NotFound(what) => write!(f, "Not found: {}", what),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Logging(e) => Some(e),
            CliError::App(e) => Some(e),
            CliError::Provider(e) => Some(e),
            CliError::Config(_) | CliError::Runtime(_) | CliError::NotFound(_) => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<AppError> for CliError {
    fn from(e: AppError) -> Self {
        CliError::App(e)
    }
}

impl From<ProviderError> for CliError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Config { .. } => CliError::Config(e.to_string()),
            ProviderError::NotFound(what) => CliError::NotFound(what),
            other => CliError::Provider(other),
        }
    }
}

impl From<RoutingError> for CliError {
    fn from(e: RoutingError) -> Self {
        match e {
            RoutingError::Provider(e) => e.into(),
            RoutingError::Patch(e) => CliError::Config(format!("invalid route update: {}", e)),
        }
    }
}
