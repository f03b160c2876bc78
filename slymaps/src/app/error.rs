//! Application error types.

use std::fmt;

use crate::provider::ProviderError;
use crate::store::PersistError;

/// Errors raised while building or running the application.
#[derive(Debug)]
pub enum AppError {
    /// Failed to build an HTTP client or provider.
    ProviderSetup(ProviderError),

    /// Failed to read or write saved preferences.
    Preferences(PersistError),

    /// Configuration error.
    Config(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::ProviderSetup(e) => {
                write!(f, "Failed to set up providers: {}", e)
            }
            AppError::Preferences(e) => {
                write!(f, "Preferences error: {}", e)
            }
            AppError::Config(msg) => {
                write!(f, "Configuration error: {}", msg)
            }
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::ProviderSetup(e) => Some(e),
            AppError::Preferences(e) => Some(e),
            AppError::Config(_) => None,
        }
    }
}

impl From<ProviderError> for AppError {
    fn from(e: ProviderError) -> Self {
        AppError::ProviderSetup(e)
    }
}

impl From<PersistError> for AppError {
    fn from(e: PersistError) -> Self {
        AppError::Preferences(e)
    }
}
