//! The transport seam.
//!
//! The hub never parses frames or manages sockets. It consumes a transport
//! through these traits: a [`Transport`] delivers [`TransportEvent`]s once
//! listening, each stream can be written to, responded to and observed for
//! closure, and a [`TransportFactory`] builds one transport per endpoint.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use streamfan_core::{Credentials, SessionId, TransportError};
use tokio::sync::mpsc;

/// Request headers as delivered by the transport.
pub type Headers = HashMap<String, String>;

/// Callback run exactly once when a stream closes.
pub type CloseHook = Box<dyn FnOnce() + Send + 'static>;

/// One logical stream within a session.
pub trait TransportStream: Send + Sync {
    /// Write a payload to the peer.
    fn write(&self, payload: Bytes) -> Result<(), TransportError>;

    /// Send response status and headers.
    fn respond(&self, status: u16, headers: Headers) -> Result<(), TransportError>;

    /// Whether the stream has signaled closure.
    fn is_closed(&self) -> bool;

    /// Register a hook run once when the stream closes.
    ///
    /// If the stream is already closed the hook runs before this returns.
    fn on_close(&self, hook: CloseHook);
}

/// Shared handle to a live stream.
pub type StreamHandle = Arc<dyn TransportStream>;

/// A physical connection carrying many streams.
pub trait TransportSession: Send + Sync {
    /// Transport-assigned session identifier.
    fn id(&self) -> &SessionId;

    /// Peer address, when the transport knows it.
    fn remote_addr(&self) -> Option<SocketAddr>;
}

/// Shared handle to a session.
pub type SessionHandle = Arc<dyn TransportSession>;

/// Something the transport observed.
pub enum TransportEvent {
    /// A new session was established.
    Session(SessionHandle),
    /// A new stream arrived.
    Stream {
        /// The stream handle.
        stream: StreamHandle,
        /// Its request headers.
        headers: Headers,
    },
}

impl std::fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Session(session) => f.debug_tuple("Session").field(session.id()).finish(),
            Self::Stream { headers, .. } => f.debug_struct("Stream").field("headers", headers).finish(),
        }
    }
}

/// A listening server owned by exactly one endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start accepting on `port` and return the event feed.
    async fn listen(&self, port: u16) -> Result<mpsc::Receiver<TransportEvent>, TransportError>;

    /// Stop accepting new sessions.
    async fn close(&self);

    /// Whether this transport serves TLS.
    fn is_secure(&self) -> bool {
        false
    }
}

impl std::fmt::Debug for dyn Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport").field("secure", &self.is_secure()).finish_non_exhaustive()
    }
}

/// Builds the transport for a newly created endpoint.
pub trait TransportFactory: Send + Sync {
    /// Build a transport for endpoint `name`, secure when credentials are given.
    fn build(
        &self,
        name: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Arc<dyn Transport>, TransportError>;
}
