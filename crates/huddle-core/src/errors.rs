//! Error types for group-call session coordination

use thiserror::Error;

/// Errors produced by the session coordinator and its collaborators
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    /// A signaling backend request failed
    #[error("Signaling request failed: {message}")]
    Signaling { message: String },

    /// The requested call does not exist (or is no longer active)
    #[error("Call not found")]
    CallNotFound,

    /// The join handshake was rejected or returned unusable parameters
    #[error("Join failed: {message}")]
    JoinFailed { message: String },

    /// The media transport reported an unrecoverable problem
    #[error("Media transport error: {message}")]
    MediaTransport { message: String },

    /// A required permission (e.g. microphone access) was denied
    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    /// An operation was attempted in a state that does not allow it
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// Internal error (channel closed, task failure, ...)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl CallError {
    /// Create a signaling error
    pub fn signaling(message: impl Into<String>) -> Self {
        Self::Signaling { message: message.into() }
    }

    /// Create a join-failure error
    pub fn join_failed(message: impl Into<String>) -> Self {
        Self::JoinFailed { message: message.into() }
    }

    /// Create a media transport error
    pub fn media(message: impl Into<String>) -> Self {
        Self::MediaTransport { message: message.into() }
    }

    /// Create a permission-denied error
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied { message: message.into() }
    }

    /// Create an invalid-state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState { message: message.into() }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, CallError>;
