//! Error types for selfkit operations.
//!
//! Every failure reported by the SDK boundary is expressed as a
//! [`SelfkitError`]. Callers in the correlation layer decide whether a given
//! failure is fatal for the current round or only drops one inbound event.

use std::fmt;

/// Error codes for logs and FFI consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SelfkitErrorCode {
    /// Account session could not be opened or was closed
    Session = 1000,
    /// Inbox could not be opened or listed
    Inbox = 1001,
    /// Connection negotiation, establishment or acceptance failed
    Connection = 2000,
    /// Sending a message failed
    Transport = 2001,
    /// Referenced address, object or credential is unknown
    NotFound = 4000,
    /// Invalid data supplied to a builder
    InvalidData = 5000,
    /// Cryptographic or structural validation failed
    ValidationFailed = 5001,
    /// Payload could not be encoded or decoded
    Serialization = 5002,
    /// A content value did not have the expected kind
    WrongContentType = 5003,
    /// A request was used after its advisory expiry
    Expired = 5004,
    /// Credential or presentation signing failed
    Signing = 6000,
    /// Local storage failed
    Storage = 7000,
    /// Internal/unexpected error
    Internal = 9999,
}

/// Error type for selfkit operations.
#[derive(Debug, Clone, PartialEq)]
pub enum SelfkitError {
    /// Account session could not be opened, or is already closed.
    Session(String),

    /// Inbox could not be opened or listed.
    Inbox(String),

    /// Connection negotiation or establishment failed.
    Connection {
        /// Peer or group address the operation targeted
        target: String,
        /// Underlying failure message
        reason: String,
    },

    /// Message delivery failed.
    Transport(String),

    /// Resource not found.
    NotFound {
        /// Type of resource (e.g., "inbox", "object")
        resource_type: String,
        /// Resource identifier
        identifier: String,
    },

    /// Invalid data provided.
    InvalidData {
        /// Field or parameter name
        field: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Validation of a credential or presentation failed.
    ValidationFailed(String),

    /// Serialization/deserialization error.
    Serialization(String),

    /// Content was decoded as the wrong kind.
    WrongContentType {
        /// Kind the caller asked for
        expected: String,
        /// Kind the content actually has
        actual: String,
    },

    /// Request or key package was used after its expiry.
    Expired {
        /// What expired (e.g., "key package")
        what: String,
        /// Expiry as unix seconds
        expired_at: i64,
    },

    /// Signing failed.
    Signing(String),

    /// Storage operation failed.
    Storage(String),

    /// Internal/unexpected error.
    Internal(String),
}

impl SelfkitError {
    /// Get the error code.
    pub fn code(&self) -> SelfkitErrorCode {
        match self {
            Self::Session(_) => SelfkitErrorCode::Session,
            Self::Inbox(_) => SelfkitErrorCode::Inbox,
            Self::Connection { .. } => SelfkitErrorCode::Connection,
            Self::Transport(_) => SelfkitErrorCode::Transport,
            Self::NotFound { .. } => SelfkitErrorCode::NotFound,
            Self::InvalidData { .. } => SelfkitErrorCode::InvalidData,
            Self::ValidationFailed(_) => SelfkitErrorCode::ValidationFailed,
            Self::Serialization(_) => SelfkitErrorCode::Serialization,
            Self::WrongContentType { .. } => SelfkitErrorCode::WrongContentType,
            Self::Expired { .. } => SelfkitErrorCode::Expired,
            Self::Signing(_) => SelfkitErrorCode::Signing,
            Self::Storage(_) => SelfkitErrorCode::Storage,
            Self::Internal(_) => SelfkitErrorCode::Internal,
        }
    }

    /// Get the error message as an owned String.
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Whether the failure concerns the content of one inbound item rather
    /// than the session itself.
    ///
    /// Decode and validation failures only ever discard the item they were
    /// raised for.
    pub fn is_content_error(&self) -> bool {
        matches!(
            self,
            Self::Serialization(_)
                | Self::WrongContentType { .. }
                | Self::ValidationFailed(_)
                | Self::Expired { .. }
        )
    }

    /// Create a not found error.
    pub fn not_found(resource_type: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            identifier: identifier.into(),
        }
    }

    /// Create an invalid data error.
    pub fn invalid_data(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidData {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a connection error.
    pub fn connection(target: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self::Connection {
            target: target.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for SelfkitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session(msg) => write!(f, "session error: {}", msg),
            Self::Inbox(msg) => write!(f, "inbox error: {}", msg),
            Self::Connection { target, reason } => {
                write!(f, "connection with {} failed: {}", target, reason)
            }
            Self::Transport(msg) => write!(f, "transport error: {}", msg),
            Self::NotFound {
                resource_type,
                identifier,
            } => write!(f, "{} not found: {}", resource_type, identifier),
            Self::InvalidData { field, reason } => write!(f, "invalid {}: {}", field, reason),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::Serialization(msg) => write!(f, "serialization error: {}", msg),
            Self::WrongContentType { expected, actual } => {
                write!(f, "expected {} content, got {}", expected, actual)
            }
            Self::Expired { what, expired_at } => {
                write!(f, "{} expired at timestamp {}", what, expired_at)
            }
            Self::Signing(msg) => write!(f, "signing error: {}", msg),
            Self::Storage(msg) => write!(f, "storage error: {}", msg),
            Self::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for SelfkitError {}

impl From<serde_json::Error> for SelfkitError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = SelfkitError::connection("abcd", "key package expired");
        assert_eq!(err.code(), SelfkitErrorCode::Connection);
        assert!(!err.is_content_error());
        assert!(err.to_string().contains("abcd"));
    }

    #[test]
    fn test_content_errors() {
        assert!(SelfkitError::Serialization("bad".into()).is_content_error());
        assert!(SelfkitError::ValidationFailed("sig".into()).is_content_error());
        assert!(!SelfkitError::Session("closed".into()).is_content_error());
    }

    #[test]
    fn test_helper_constructors() {
        let err = SelfkitError::not_found("object", "00ff");
        assert_eq!(err.code(), SelfkitErrorCode::NotFound);

        let err = SelfkitError::invalid_data("subject", "required");
        assert_eq!(err.code(), SelfkitErrorCode::InvalidData);
        assert_eq!(err.message(), "invalid subject: required");
    }

    #[test]
    fn test_from_serde_json() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: SelfkitError = parse.unwrap_err().into();
        assert_eq!(err.code(), SelfkitErrorCode::Serialization);
    }
}
