use opcua::types::StatusCode;
use thiserror::Error;

/// Result type alias for device fleet operations.
pub type OpcResult<T> = Result<T, OpcError>;

/// Centralized error enum for the device server and client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OpcError {
    /// A service call returned a bad OPC UA status code.
    ///
    /// The display form carries a friendly hint for the common codes.
    #[error(
        "OPC UA status: {0} ({hint})",
        hint = friendly_status_hint(*.0).unwrap_or("No hint available")
    )]
    Status(StatusCode),

    /// Connection-related errors (e.g., endpoint unreachable, session refused).
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The endpoint URL could not be parsed or uses an unsupported scheme.
    #[error("Invalid endpoint: {0}")]
    Endpoint(String),

    /// A device or register does not exist in the address space.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Errors during value conversion between OPC UA variants and device values.
    #[error("Data conversion failed: {0}")]
    Conversion(String),

    /// Operation attempted in an invalid state (e.g., server not set up).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration file could not be read or failed validation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catch-all for unexpected internal failures.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StatusCode> for OpcError {
    fn from(status: StatusCode) -> Self {
        Self::Status(status)
    }
}

impl From<anyhow::Error> for OpcError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<tokio::task::JoinError> for OpcError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("Async task join failed: {err}"))
    }
}

impl From<std::num::TryFromIntError> for OpcError {
    fn from(err: std::num::TryFromIntError) -> Self {
        Self::Conversion(format!("Integer conversion error: {err}"))
    }
}

impl From<toml::de::Error> for OpcError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Maps known OPC UA status codes to actionable user hints.
///
/// Only the severity and sub-code bits are compared, so info bits on the
/// returned code do not hide the hint.
pub fn friendly_status_hint(status: StatusCode) -> Option<&'static str> {
    match status.bits() & 0xFFFF_0000 {
        0x8005_0000 => Some("Communication error — check that the server is reachable"),
        0x800A_0000 => Some("Operation timed out — the server may be overloaded or offline"),
        0x800D_0000 => Some("Server is not connected to its underlying system"),
        0x801F_0000 => Some("Access denied for the anonymous user"),
        0x8021_0000 => Some("Identity token rejected — the server requires other credentials"),
        0x8025_0000 | 0x8026_0000 => Some("Session is no longer valid — reconnect to the server"),
        0x8034_0000 => Some("Node does not exist in the server address space (BadNodeIdUnknown)"),
        0x803B_0000 => Some("Register is read-only (BadNotWritable)"),
        0x8055_0000 => Some("Security policy rejected — the server only accepts policy None"),
        0x8056_0000 => Some("Server refused the session — too many sessions open"),
        0x8074_0000 => {
            Some("Data type mismatch — the register holds a different type (BadTypeMismatch)")
        }
        0x8083_0000 => Some("Endpoint URL is invalid for this server"),
        0x8086_0000 => Some("Secure channel closed by the server"),
        0x808A_0000 | 0x80AE_0000 => {
            Some("Connection closed — the server may have stopped or restarted")
        }
        _ => None,
    }
}

/// Maps an [`OpcError`] to a friendly hint if it carries an OPC UA status.
///
/// # Examples
/// ```
/// use fleetglue_opcua::{OpcError, friendly_hint};
/// use opcua::types::StatusCode;
///
/// let err = OpcError::Status(StatusCode::BadNotWritable);
/// assert_eq!(friendly_hint(&err), Some("Register is read-only (BadNotWritable)"));
///
/// let other = OpcError::Internal("boom".into());
/// assert_eq!(friendly_hint(&other), None);
/// ```
pub fn friendly_hint(error: &OpcError) -> Option<&'static str> {
    match error {
        OpcError::Status(status) => friendly_status_hint(*status),
        _ => None,
    }
}

/// Returns `true` when a status indicates the session or transport is gone,
/// meaning a fresh connection may succeed where the cached one failed.
pub fn is_connection_status(status: StatusCode) -> bool {
    matches!(
        status.bits() & 0xFFFF_0000,
        0x8005_0000 // BadCommunicationError
            | 0x800A_0000 // BadTimeout
            | 0x8025_0000 // BadSessionIdInvalid
            | 0x8026_0000 // BadSessionClosed
            | 0x8086_0000 // BadSecureChannelClosed
            | 0x808A_0000 // BadNotConnected
            | 0x80AE_0000 // BadConnectionClosed
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_hint_known_codes() {
        assert_eq!(
            friendly_status_hint(StatusCode::BadTypeMismatch),
            Some("Data type mismatch — the register holds a different type (BadTypeMismatch)")
        );
        assert!(friendly_status_hint(StatusCode::BadConnectionClosed).is_some());
        assert!(friendly_status_hint(StatusCode::BadNodeIdUnknown).is_some());
    }

    #[test]
    fn test_status_hint_unknown_code() {
        assert_eq!(friendly_status_hint(StatusCode::Good), None);
        assert_eq!(friendly_status_hint(StatusCode::BadInternalError), None);
    }

    #[test]
    fn test_status_error_display_includes_hint() {
        let err = OpcError::from(StatusCode::BadNotWritable);
        let msg = err.to_string();
        assert!(msg.contains("read-only"), "unexpected message: {msg}");
        assert!(msg.starts_with("OPC UA status: "), "unexpected message: {msg}");

        let unhinted = OpcError::from(StatusCode::BadInternalError).to_string();
        assert!(unhinted.ends_with("(No hint available)"), "{unhinted}");
    }

    #[test]
    fn test_connection_status_classification() {
        assert!(is_connection_status(StatusCode::BadConnectionClosed));
        assert!(is_connection_status(StatusCode::BadSessionIdInvalid));
        assert!(is_connection_status(StatusCode::BadNotConnected));
        assert!(!is_connection_status(StatusCode::BadTypeMismatch));
        assert!(!is_connection_status(StatusCode::Good));
    }

    #[test]
    fn test_friendly_hint_non_status() {
        assert_eq!(friendly_hint(&OpcError::NotFound("x".into())), None);
    }
}
