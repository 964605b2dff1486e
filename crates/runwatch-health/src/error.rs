//! Errors raised by launchers and sessions.

use runwatch_state::StateError;
use thiserror::Error;

pub type BackendResult<T> = Result<T, BackendError>;

/// Failures of the two checked backend paths: listing runs and checking
/// a worker. Anything else is caught at the iteration boundary.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("deployment {0} is not configured")]
    UnknownDeployment(String),

    #[error("invalid launcher config: {0}")]
    InvalidConfig(String),

    #[error("run store error: {0}")]
    State(#[from] StateError),

    #[error("connection to {address} failed")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("http error: {0}")]
    Http(String),

    #[error("request to {0} timed out")]
    Timeout(String),

    #[error("unexpected status {status} from {uri}")]
    Status { status: u16, uri: String },

    #[error("malformed response from {uri}: {reason}")]
    Decode { uri: String, reason: String },
}
