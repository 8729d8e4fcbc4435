//! Rendering errors.

use std::time::Duration;

use thiserror::Error;

use crate::request::RequestId;

/// Errors that can occur while rendering or streaming.
#[derive(Debug, Error)]
pub enum RenderError {
    /// An explicit request id was supplied that is still in flight.
    #[error("The provided request id is already in use: {0}")]
    DuplicateRequestId(RequestId),

    /// A deferred block needed a request id but none was given.
    #[error("Suspense requires a request id to be specified")]
    MissingRequestId,

    /// A deferred block referenced a request that is not being streamed.
    #[error("No streaming render is registered for request id {0}")]
    MissingRequestRecord(RequestId),

    /// Deferred work was requested outside of a tokio runtime.
    #[error("Deferred rendering requires a running tokio runtime")]
    MissingRuntime,

    /// Pending content did not settle in time.
    #[error("Children timed out after {0:?}")]
    Timeout(Duration),

    /// A detached render task panicked or was cancelled.
    #[error("Render task failed: {0}")]
    Task(String),

    /// A component failed with a message.
    #[error("{0}")]
    Component(String),

    /// Any other failure raised by user code.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl RenderError {
    /// Create a component error from anything displayable.
    pub fn msg<M: std::fmt::Display>(message: M) -> Self {
        Self::Component(message.to_string())
    }

    /// Whether this error signals misuse of the API rather than a
    /// failure of the content being rendered.
    #[must_use]
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateRequestId(_)
                | Self::MissingRequestId
                | Self::MissingRequestRecord(_)
                | Self::MissingRuntime
        )
    }
}

/// Result type for rendering operations.
pub type RenderResult<T> = Result<T, RenderError>;
