//! In-process transport backed by tokio channels.
//!
//! Used by tests and embedders that want the hub without a network. The
//! client side ([`MemorySession`], [`MemoryClientStream`]) is driven by the
//! caller; the server side is what an endpoint sees through the
//! [`Transport`] traits.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use streamfan_core::{Credentials, SessionId, TransportError};
use streamfan_settings::FanoutSettings;
use tokio::sync::mpsc;
use tracing::debug;

use crate::transport::{
    CloseHook, Headers, Transport, TransportEvent, TransportFactory, TransportSession,
    TransportStream,
};

pub use streamfan_settings::DEFAULT_EVENT_BUFFER;

/// What the client side of a memory stream receives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamFrame {
    /// Response status and headers.
    Response {
        /// HTTP-style status code.
        status: u16,
        /// Response headers.
        headers: Headers,
    },
    /// A data payload.
    Data(Bytes),
}

// ─────────────────────────────────────────────────────────────────────────────
// Factory
// ─────────────────────────────────────────────────────────────────────────────

/// Builds [`MemoryTransport`]s and keeps them addressable by endpoint name.
pub struct MemoryTransportFactory {
    event_buffer: usize,
    transports: Mutex<HashMap<String, Arc<MemoryTransport>>>,
}

impl MemoryTransportFactory {
    /// Factory whose transports buffer `event_buffer` events.
    pub fn new(event_buffer: usize) -> Self {
        Self {
            event_buffer: event_buffer.max(1),
            transports: Mutex::new(HashMap::new()),
        }
    }

    /// Factory sized by [`FanoutSettings::event_buffer`].
    pub fn from_settings(settings: &FanoutSettings) -> Self {
        Self::new(settings.event_buffer)
    }

    /// Capacity given to each transport's event channel.
    pub fn event_buffer(&self) -> usize {
        self.event_buffer
    }

    /// The transport most recently built for `name`.
    pub fn transport(&self, name: &str) -> Option<Arc<MemoryTransport>> {
        self.transports.lock().get(name).cloned()
    }
}

impl Default for MemoryTransportFactory {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}

impl TransportFactory for MemoryTransportFactory {
    fn build(
        &self,
        name: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        if let Some(creds) = credentials {
            if creds.key.is_empty() || creds.cert.is_empty() {
                return Err(TransportError::Tls("empty key or certificate".into()));
            }
        }
        let transport = Arc::new(MemoryTransport::new(
            name,
            self.event_buffer,
            credentials.is_some(),
        ));
        let _ = self
            .transports
            .lock()
            .insert(name.to_owned(), Arc::clone(&transport));
        Ok(transport)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct ListenState {
    events: Option<mpsc::Sender<TransportEvent>>,
    port: Option<u16>,
    closed: bool,
}

/// Channel-backed transport for one endpoint.
pub struct MemoryTransport {
    name: String,
    event_buffer: usize,
    secure: bool,
    state: Mutex<ListenState>,
    next_session: AtomicU64,
}

impl MemoryTransport {
    /// Create an idle transport.
    pub fn new(name: impl Into<String>, event_buffer: usize, secure: bool) -> Self {
        Self {
            name: name.into(),
            event_buffer: event_buffer.max(1),
            secure,
            state: Mutex::new(ListenState::default()),
            next_session: AtomicU64::new(1),
        }
    }

    /// Endpoint name this transport was built for.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Port passed to `listen`, if listening has started.
    pub fn port(&self) -> Option<u16> {
        self.state.lock().port
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Open a client session.
    ///
    /// Fails once the transport is closed or before it is listening.
    pub async fn connect(
        &self,
        remote_addr: Option<SocketAddr>,
    ) -> Result<MemorySession, TransportError> {
        let events = {
            let state = self.state.lock();
            match (&state.events, state.closed) {
                (Some(tx), false) => tx.clone(),
                _ => return Err(TransportError::TransportClosed),
            }
        };
        let n = self.next_session.fetch_add(1, Ordering::Relaxed);
        let handle = Arc::new(MemorySessionHandle {
            id: SessionId::from(format!("{}-session-{n}", self.name)),
            remote_addr,
        });
        events
            .send(TransportEvent::Session(handle.clone()))
            .await
            .map_err(|_| TransportError::TransportClosed)?;
        debug!(transport = %self.name, session = %handle.id, "memory session connected");
        Ok(MemorySession { handle, events })
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn listen(&self, port: u16) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TransportError::TransportClosed);
        }
        if state.events.is_some() {
            return Err(TransportError::Other(format!(
                "transport '{}' is already listening",
                self.name
            )));
        }
        let (tx, rx) = mpsc::channel(self.event_buffer);
        state.events = Some(tx);
        state.port = Some(port);
        Ok(rx)
    }

    async fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.events = None;
    }

    fn is_secure(&self) -> bool {
        self.secure
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sessions
// ─────────────────────────────────────────────────────────────────────────────

struct MemorySessionHandle {
    id: SessionId,
    remote_addr: Option<SocketAddr>,
}

impl TransportSession for MemorySessionHandle {
    fn id(&self) -> &SessionId {
        &self.id
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }
}

/// Client side of a memory session.
///
/// Sessions opened before the transport closed keep working.
pub struct MemorySession {
    handle: Arc<MemorySessionHandle>,
    events: mpsc::Sender<TransportEvent>,
}

impl std::fmt::Debug for MemorySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySession").field("id", self.id()).finish_non_exhaustive()
    }
}

impl MemorySession {
    /// Session identifier as seen by the server.
    pub fn id(&self) -> &SessionId {
        &self.handle.id
    }

    /// Open a new stream carrying `headers`.
    pub async fn open_stream(&self, headers: Headers) -> Result<MemoryClientStream, TransportError> {
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let stream = Arc::new(MemoryStream::new(frames_tx));
        self.events
            .send(TransportEvent::Stream {
                stream: stream.clone(),
                headers,
            })
            .await
            .map_err(|_| TransportError::TransportClosed)?;
        Ok(MemoryClientStream {
            stream,
            frames: frames_rx,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Streams
// ─────────────────────────────────────────────────────────────────────────────

/// Server side of a memory stream.
pub struct MemoryStream {
    frames: mpsc::UnboundedSender<StreamFrame>,
    closed: AtomicBool,
    hooks: Mutex<Vec<CloseHook>>,
}

impl MemoryStream {
    fn new(frames: mpsc::UnboundedSender<StreamFrame>) -> Self {
        Self {
            frames,
            closed: AtomicBool::new(false),
            hooks: Mutex::new(Vec::new()),
        }
    }

    /// Close the stream and run its close hooks. Idempotent.
    pub fn close(&self) {
        let hooks = {
            let mut hooks = self.hooks.lock();
            if self.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            std::mem::take(&mut *hooks)
        };
        for hook in hooks {
            hook();
        }
    }

    fn send(&self, frame: StreamFrame) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::StreamClosed);
        }
        self.frames
            .send(frame)
            .map_err(|_| TransportError::StreamClosed)
    }
}

impl TransportStream for MemoryStream {
    fn write(&self, payload: Bytes) -> Result<(), TransportError> {
        self.send(StreamFrame::Data(payload))
    }

    fn respond(&self, status: u16, headers: Headers) -> Result<(), TransportError> {
        self.send(StreamFrame::Response { status, headers })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn on_close(&self, hook: CloseHook) {
        let mut hooks = self.hooks.lock();
        if self.closed.load(Ordering::Acquire) {
            drop(hooks);
            hook();
        } else {
            hooks.push(hook);
        }
    }
}

/// Client side of a memory stream. Dropping it closes the stream.
pub struct MemoryClientStream {
    stream: Arc<MemoryStream>,
    frames: mpsc::UnboundedReceiver<StreamFrame>,
}

impl MemoryClientStream {
    /// Next frame, or `None` once closed and drained.
    pub async fn recv(&mut self) -> Option<StreamFrame> {
        if self.stream.is_closed() {
            return self.frames.try_recv().ok();
        }
        self.frames.recv().await
    }

    /// Frames already delivered, without waiting.
    pub fn drain(&mut self) -> Vec<StreamFrame> {
        let mut out = Vec::new();
        while let Ok(frame) = self.frames.try_recv() {
            out.push(frame);
        }
        out
    }

    /// Data payloads already delivered, without waiting.
    pub fn drain_data(&mut self) -> Vec<Bytes> {
        self.drain()
            .into_iter()
            .filter_map(|frame| match frame {
                StreamFrame::Data(bytes) => Some(bytes),
                StreamFrame::Response { .. } => None,
            })
            .collect()
    }

    /// Close the stream from the client side.
    pub fn close(&self) {
        self.stream.close();
    }

    /// Whether the stream is closed.
    pub fn is_closed(&self) -> bool {
        self.stream.is_closed()
    }
}

impl Drop for MemoryClientStream {
    fn drop(&mut self) {
        self.stream.close();
    }
}
