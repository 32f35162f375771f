//! Download error types.
//!
//! These errors are serializable and do not depend on external error types
//! like `std::io::Error` or `reqwest::Error`. For I/O errors, we capture the
//! kind and message as strings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for download operations.
///
/// Structural failures (`Validation`, `NotFound`) are returned synchronously to
/// callers. Transfer-time failures are stored on the task and observed by
/// polling.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum DownloadError {
    /// Request rejected before a task was created.
    #[error("Validation error: {message}")]
    Validation {
        /// Detailed error message.
        message: String,
    },

    /// Unknown task id.
    #[error("Download not found: {id}")]
    NotFound {
        /// The task id that was not found.
        id: String,
    },

    /// Network failure or unexpected response while transferring bytes.
    #[error("Transfer failed: {message}")]
    Transfer {
        /// Detailed error message.
        message: String,
        /// HTTP status code if available.
        #[serde(skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
    },

    /// I/O error during file operations.
    #[error("I/O error ({kind}): {message}")]
    Io {
        /// The kind of I/O error (e.g., "`NotFound`", "`PermissionDenied`").
        kind: String,
        /// Detailed error message.
        message: String,
    },

    /// The external downloader's RPC endpoint could not be reached.
    #[error("Delegate downloader unavailable: {message}")]
    DelegateUnavailable {
        /// Detailed error message.
        message: String,
    },

    /// The delegate reported a failure for its job.
    #[error("Delegate download failed: {message}")]
    DelegateFailed {
        /// Error message reported by the delegate.
        message: String,
        /// Delegate-specific error code, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },

    /// The model catalog could not be queried.
    #[error("Catalog unavailable: {message}")]
    Catalog {
        /// Detailed error message.
        message: String,
    },

    /// A task update would move the task backwards or out of a terminal state.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: String,
        /// Requested status.
        to: String,
    },

    /// The manager is draining and no longer accepts work.
    #[error("Download manager is shutting down")]
    ShuttingDown,

    /// Download was cancelled by user.
    #[error("Download cancelled")]
    Cancelled,

    /// General/uncategorized error.
    #[error("{message}")]
    Other {
        /// Error message.
        message: String,
    },
}

impl DownloadError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a not found error for a task id.
    pub fn not_found(id: impl ToString) -> Self {
        Self::NotFound { id: id.to_string() }
    }

    /// Create a transfer error.
    pub fn transfer(message: impl Into<String>) -> Self {
        Self::Transfer {
            message: message.into(),
            status_code: None,
        }
    }

    /// Create a transfer error with HTTP status code.
    pub fn transfer_with_status(message: impl Into<String>, status_code: u16) -> Self {
        Self::Transfer {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Create an I/O error from kind and message strings.
    pub fn io(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Io {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Create an I/O error from a `std::io::Error`.
    #[must_use]
    pub fn from_io_error(err: &std::io::Error) -> Self {
        let kind = err.kind();
        Self::Io {
            kind: format!("{kind:?}"),
            message: err.to_string(),
        }
    }

    /// Create a delegate unavailable error.
    pub fn delegate_unavailable(message: impl Into<String>) -> Self {
        Self::DelegateUnavailable {
            message: message.into(),
        }
    }

    /// Create a delegate failure with the delegate's own error code.
    pub fn delegate_failed(message: impl Into<String>, code: Option<String>) -> Self {
        Self::DelegateFailed {
            message: message.into(),
            code,
        }
    }

    /// Create a catalog error.
    pub fn catalog(message: impl Into<String>) -> Self {
        Self::Catalog {
            message: message.into(),
        }
    }

    /// Create an invalid transition error.
    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Create a generic error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Check if this is a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if this error means the delegate endpoint is gone.
    #[must_use]
    pub const fn is_delegate_unavailable(&self) -> bool {
        matches!(self, Self::DelegateUnavailable { .. })
    }
}

/// Convenience result type for download operations.
pub type DownloadResult<T> = Result<T, DownloadError>;
