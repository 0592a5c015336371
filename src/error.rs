//! Error types for the Sotto application
//!
//! Setup failures are fatal to a session start attempt and revert the
//! session to idle; transport and protocol errors are surfaced without
//! automatic reconnect. Policy blocks (cost or response limits) are not
//! errors and never appear here.

use thiserror::Error;

/// Sotto application errors
#[derive(Error, Debug, Clone)]
pub enum SottoError {
    /// Ephemeral credential could not be obtained or was malformed
    #[error("Token error: {0}")]
    TokenError(String),

    /// Microphone access denied by the user or platform
    #[error("Media permission denied: {0}")]
    MediaPermissionDenied(String),

    /// No usable capture device present
    #[error("Media device not found: {0}")]
    MediaNotFound(String),

    /// Capture not supported on this device or browser shell
    #[error("Media unsupported: {0}")]
    MediaUnsupported(String),

    /// Capture blocked by the platform security context
    #[error("Media blocked: {0}")]
    MediaBlocked(String),

    /// Realtime channel negotiation failure
    #[error("Negotiation error: {0}")]
    NegotiationError(String),

    /// Channel closed unexpectedly or send attempted while not active
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Error event received from the vendor channel
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Streaming HTTP request failed mid-stream
    #[error("Streaming error: {0}")]
    StreamingError(String),

    /// HTTP request failure outside of streaming
    #[error("Request error: {0}")]
    RequestError(String),

    /// Channel communication error
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// File system I/O error
    #[error("IO error: {0}")]
    IOError(String),
}

impl From<std::io::Error> for SottoError {
    fn from(e: std::io::Error) -> Self {
        SottoError::IOError(e.to_string())
    }
}

impl SottoError {
    /// Check if this error is recoverable
    ///
    /// Recoverable errors allow the application to continue running,
    /// while non-recoverable errors require user intervention or a
    /// fresh session start.
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Credential problems clear up once the backend is reachable
            SottoError::TokenError(_) => true,
            // Capture problems require user intervention
            SottoError::MediaPermissionDenied(_) => false,
            SottoError::MediaNotFound(_) => false,
            SottoError::MediaUnsupported(_) => false,
            SottoError::MediaBlocked(_) => false,
            // Negotiation may succeed on a manual retry
            SottoError::NegotiationError(_) => true,
            // Transport loss requires a new session
            SottoError::TransportError(_) => false,
            // Protocol errors are typically transient
            SottoError::ProtocolError(_) => true,
            // Streaming/request failures are typically transient
            SottoError::StreamingError(_) => true,
            SottoError::RequestError(_) => true,
            // Channel errors indicate internal issues
            SottoError::ChannelError(_) => false,
            // Config errors require user intervention
            SottoError::ConfigError(_) => false,
            SottoError::IOError(_) => false,
        }
    }

    /// Get a user-friendly description of the error
    ///
    /// Returns a message suitable for display in the UI.
    pub fn user_message(&self) -> String {
        match self {
            SottoError::TokenError(_) => {
                "Could not obtain a session credential. Check that the backend is running and try again.".to_string()
            }
            SottoError::MediaPermissionDenied(_) => {
                "Could not access microphone. Please allow microphone access when prompted, then retry.".to_string()
            }
            SottoError::MediaNotFound(_) => {
                "No microphone found on this device.".to_string()
            }
            SottoError::MediaUnsupported(_) => {
                "Microphone access is not supported on this device or browser.".to_string()
            }
            SottoError::MediaBlocked(_) => {
                "Microphone access is blocked. Try refreshing and allowing permissions again.".to_string()
            }
            SottoError::NegotiationError(_) => {
                "Could not establish the realtime connection. Please try again.".to_string()
            }
            SottoError::TransportError(_) => {
                "The realtime connection was lost. Start a new session to continue.".to_string()
            }
            SottoError::ProtocolError(_) => {
                "The AI service reported an error. Please try again.".to_string()
            }
            SottoError::StreamingError(_) => {
                "The response stream was interrupted. Please try again.".to_string()
            }
            SottoError::RequestError(_) => {
                "Network error. Please check your connection and try again.".to_string()
            }
            SottoError::ChannelError(_) => {
                "Internal communication error. Please restart the application.".to_string()
            }
            SottoError::ConfigError(_) => {
                "Configuration error. Please check settings.".to_string()
            }
            SottoError::IOError(_) => {
                "File system error occurred.".to_string()
            }
        }
    }
}

/// Result type alias for Sotto operations
pub type Result<T> = std::result::Result<T, SottoError>;
