//! Error hierarchy for the fan-out layer.
//!
//! - [`FanoutError`]: everything the registry, endpoints and broadcast
//!   wrappers can surface to a caller
//! - [`DispatchError`]: a listener failed (returned an error or panicked)
//!   during one dispatch pass
//! - [`TransportError`]: failures reported by the transport collaborator
//!
//! Registry and lookup errors are returned synchronously. Dispatch errors are
//! logged where they happen and handed back to whatever triggered the pass.

use thiserror::Error;

/// Boxed error used as the source of handler failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for fan-out operations.
pub type Result<T> = std::result::Result<T, FanoutError>;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum FanoutError {
    /// An endpoint with this name is already registered.
    #[error("an endpoint named '{name}' already exists")]
    DuplicateName {
        /// The conflicting name.
        name: String,
    },

    /// No endpoint is registered under this name.
    #[error("no endpoint found with name '{name}'")]
    NotFound {
        /// The name that was looked up.
        name: String,
    },

    /// `listen` was called on an endpoint that is already listening.
    #[error("endpoint '{name}' is already listening")]
    AlreadyListening {
        /// The endpoint name.
        name: String,
    },

    /// A listener failed during a dispatch pass.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The transport reported a failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A broadcast-wrapped method failed before producing a payload.
    #[error("broadcast method for endpoint '{endpoint}' failed: {source}")]
    Broadcast {
        /// Target endpoint of the broadcast.
        endpoint: String,
        /// The method's error.
        #[source]
        source: BoxError,
    },
}

impl FanoutError {
    /// Shorthand for [`FanoutError::NotFound`].
    #[must_use]
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Shorthand for [`FanoutError::DuplicateName`].
    #[must_use]
    pub fn duplicate(name: impl Into<String>) -> Self {
        Self::DuplicateName { name: name.into() }
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateName { .. } => "DUPLICATE_NAME",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::AlreadyListening { .. } => "ALREADY_LISTENING",
            Self::Dispatch(_) => "DISPATCH_FAILED",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Broadcast { .. } => "BROADCAST_FAILED",
        }
    }
}

/// A listener failed during a dispatch pass.
///
/// The remaining listeners of that pass were not run.
#[derive(Debug, Error)]
#[error("listener '{listener}' (#{position}) on endpoint '{endpoint}' failed: {source}")]
pub struct DispatchError {
    /// Endpoint whose listener list was being dispatched.
    pub endpoint: String,
    /// Registration label of the failing listener.
    pub listener: String,
    /// Zero-based position of the listener in its list.
    pub position: usize,
    /// What the listener reported.
    #[source]
    pub source: BoxError,
}

impl DispatchError {
    /// Build a dispatch error for the listener at `position`.
    pub fn new(
        endpoint: impl Into<String>,
        listener: impl Into<String>,
        position: usize,
        source: impl Into<BoxError>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            listener: listener.into(),
            position,
            source: source.into(),
        }
    }

    /// Build a dispatch error from a caught panic payload.
    pub fn from_panic(
        endpoint: impl Into<String>,
        listener: impl Into<String>,
        position: usize,
        panic: &(dyn std::any::Any + Send),
    ) -> Self {
        let message = panic_message(panic);
        Self::new(endpoint, listener, position, format!("listener panicked: {message}"))
    }
}

/// Errors reported by a transport implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The stream has already closed.
    #[error("stream is closed")]
    StreamClosed,

    /// The transport has been closed and accepts nothing new.
    #[error("transport is closed")]
    TransportClosed,

    /// Underlying I/O failure.
    #[error("transport i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS credential problem.
    #[error("tls error: {0}")]
    Tls(String),

    /// Anything else the transport wants to report.
    #[error("{0}")]
    Other(String),
}

/// Extract a readable message from a panic payload.
pub fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic")
        .to_owned()
}
