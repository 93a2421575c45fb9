use thiserror::Error;

use crate::host::HostError;

/// Errors that can occur inside the shim engine
///
/// Public event entry points on [`Fcm2UpShim`](crate::Fcm2UpShim) log and
/// swallow these; they only escape from construction and from the
/// lower-level controllers.
#[derive(Error, Debug)]
pub enum ShimError {
    /// Error reading or persisting registration state
    #[error("State store error: {0}")]
    Store(#[from] state_store::StoreError),

    /// Error talking to the relay
    #[error("Relay error: {0}")]
    Relay(#[from] relay_client::RelayError),

    /// A host callback failed, panicked or was not registered
    #[error("Host callback error: {0}")]
    Host(#[from] HostError),

    /// A required collaborator or setting was not provided
    #[error("Missing configuration: {0}")]
    MissingConfiguration(&'static str),

    /// A setting was provided but is unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The background worker queue is full; the job was dropped
    #[error("Worker queue is full")]
    QueueFull,

    /// The background worker has shut down
    #[error("Worker has shut down")]
    WorkerDisconnected,

    /// The background worker thread could not be started
    #[error("Failed to spawn worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

/// Result type for shim operations
pub type Result<T> = std::result::Result<T, ShimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ShimError::MissingConfiguration("relay_url");
        assert_eq!(error.to_string(), "Missing configuration: relay_url");

        let error = ShimError::from(HostError::failed("boom"));
        assert_eq!(error.to_string(), "Host callback error: boom");

        let error = ShimError::from(state_store::StoreError::Corrupt("eof".to_string()));
        assert!(error.to_string().contains("Corrupt state document"));
    }
}
