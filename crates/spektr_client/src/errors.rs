//! Error types for the Spektr test client.

use thiserror::Error;

/// Failures of a client exchange.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("Failed to build HTTP client: {reason}")]
    Build { reason: String },

    #[error("{method} {url} failed: {reason}")]
    Request {
        method: String,
        url: String,
        reason: String,
    },

    /// The exchange completed but one or more expectations did not hold.
    #[error(
        "{method} {url} returned {status} and failed {} expectation(s):\n  - {}\nResponse body: {body}",
        .failures.len(),
        .failures.join("\n  - ")
    )]
    ExpectationFailed {
        method: String,
        url: String,
        status: u16,
        failures: Vec<String>,
        body: String,
    },

    #[error("Response body is not valid JSON: {reason}")]
    InvalidJson { reason: String },
}

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
