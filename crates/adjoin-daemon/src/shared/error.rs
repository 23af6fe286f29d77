use adjoin_core::CoreError;
use thiserror::Error;

/// Daemon specific errors
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Instance directory error: {0}")]
    Directory(String),
    #[error("Remote shell error: {0}")]
    RemoteShell(String),
    #[error("Notification error: {0}")]
    Notification(String),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Metrics error: {0}")]
    Metrics(String),
}

impl DaemonError {
    /// Only a malformed payload is hopeless; every collaborator fault may clear up.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DaemonError::InvalidRequest(_))
    }

    pub fn code(&self) -> &'static str {
        match self {
            DaemonError::InvalidRequest(_) => "INVALID_REQUEST",
            DaemonError::Config(_) => "CONFIG_ERROR",
            DaemonError::Directory(_) => "DIRECTORY_ERROR",
            DaemonError::RemoteShell(_) => "REMOTE_SHELL_ERROR",
            DaemonError::Notification(_) => "NOTIFICATION_ERROR",
            DaemonError::StorageError(_) => "STORAGE_ERROR",
            DaemonError::Metrics(_) => "METRICS_ERROR",
        }
    }
}

impl From<CoreError> for DaemonError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidRequest(msg) | CoreError::SerializationError(msg) => {
                DaemonError::InvalidRequest(msg)
            }
        }
    }
}

pub type DaemonResult<T> = std::result::Result<T, DaemonError>;
