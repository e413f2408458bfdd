//! Listener trait, event payloads, and closure adapters.
//!
//! A listener is bound once at registration and the same instance handles
//! every dispatch. State a listener needs across events lives in the
//! listener itself, behind whatever synchronization it chooses.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use streamfan_core::{StreamId, TransportError};

use crate::cache::StreamCache;
use crate::transport::{Headers, SessionHandle, StreamHandle};

/// Handles one kind of event.
#[async_trait]
pub trait Listener<E>: Send + Sync
where
    E: Send + Sync + 'static,
{
    /// Handle an event. An error aborts the rest of the dispatch pass.
    async fn handle(&self, event: &E) -> anyhow::Result<()>;
}

/// A stream arrived on an endpoint.
#[derive(Clone)]
pub struct StreamEvent {
    /// Endpoint the stream arrived on.
    pub endpoint: Arc<str>,
    /// Id assigned on arrival.
    pub id: StreamId,
    /// The stream itself.
    pub stream: StreamHandle,
    /// Request headers.
    pub headers: Arc<Headers>,
    /// The endpoint's open streams, this one included.
    pub streams: Arc<StreamCache>,
}

impl StreamEvent {
    /// Write to this stream.
    pub fn write(&self, payload: impl Into<Bytes>) -> Result<(), TransportError> {
        self.stream.write(payload.into())
    }

    /// Send response status and headers on this stream.
    pub fn respond(&self, status: u16, headers: Headers) -> Result<(), TransportError> {
        self.stream.respond(status, headers)
    }

    /// A request header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Whether the stream has closed.
    pub fn is_closed(&self) -> bool {
        self.stream.is_closed()
    }
}

impl std::fmt::Debug for StreamEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamEvent")
            .field("endpoint", &self.endpoint)
            .field("id", &self.id)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// A session was established on an endpoint.
#[derive(Clone)]
pub struct SessionEvent {
    /// Endpoint the session arrived on.
    pub endpoint: Arc<str>,
    /// The session.
    pub session: SessionHandle,
}

impl std::fmt::Debug for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEvent")
            .field("endpoint", &self.endpoint)
            .field("session", self.session.id())
            .finish()
    }
}

/// A listener bound under a label, in registration order.
pub struct ListenerRef<E: Send + Sync + 'static> {
    label: Arc<str>,
    listener: Arc<dyn Listener<E>>,
}

impl<E: Send + Sync + 'static> Clone for ListenerRef<E> {
    fn clone(&self) -> Self {
        Self {
            label: Arc::clone(&self.label),
            listener: Arc::clone(&self.listener),
        }
    }
}

impl<E: Send + Sync + 'static> ListenerRef<E> {
    /// Bind `listener` under `label`.
    pub fn new(label: impl Into<Arc<str>>, listener: impl Listener<E> + 'static) -> Self {
        Self::from_arc(label, Arc::new(listener))
    }

    /// Bind an already shared listener.
    pub fn from_arc(label: impl Into<Arc<str>>, listener: Arc<dyn Listener<E>>) -> Self {
        Self {
            label: label.into(),
            listener,
        }
    }

    /// Label used in logs and dispatch errors.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The bound listener.
    pub fn listener(&self) -> &Arc<dyn Listener<E>> {
        &self.listener
    }
}

impl<E: Send + Sync + 'static> std::fmt::Debug for ListenerRef<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRef").field("label", &self.label).finish()
    }
}

impl ListenerRef<StreamEvent> {
    /// Stream listener from a synchronous closure.
    pub fn stream_fn<F>(label: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(&StreamEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::new(label, FnListener(f))
    }

    /// Stream listener from an async closure taking the event by value.
    pub fn stream_async<F, Fut>(label: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(StreamEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::new(label, AsyncFnListener(f))
    }
}

impl ListenerRef<SessionEvent> {
    /// Session listener from a synchronous closure.
    pub fn session_fn<F>(label: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(&SessionEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::new(label, FnListener(f))
    }

    /// Session listener from an async closure taking the event by value.
    pub fn session_async<F, Fut>(label: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(SessionEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::new(label, AsyncFnListener(f))
    }
}

/// Adapter for a synchronous closure.
pub struct FnListener<F>(pub F);

#[async_trait]
impl<E, F> Listener<E> for FnListener<F>
where
    E: Send + Sync + 'static,
    F: Fn(&E) -> anyhow::Result<()> + Send + Sync,
{
    async fn handle(&self, event: &E) -> anyhow::Result<()> {
        (self.0)(event)
    }
}

/// Adapter for an async closure. The event is cloned into each call.
pub struct AsyncFnListener<F>(pub F);

#[async_trait]
impl<E, F, Fut> Listener<E> for AsyncFnListener<F>
where
    E: Clone + Send + Sync + 'static,
    F: Fn(E) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, event: &E) -> anyhow::Result<()> {
        (self.0)(event.clone()).await
    }
}
