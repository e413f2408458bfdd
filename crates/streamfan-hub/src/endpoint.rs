//! A named connection acceptor.
//!
//! An endpoint owns one transport, its open-stream cache, and two ordered
//! listener lists. Once listening, an event loop turns transport events into
//! dispatch passes:
//!
//! - **Stream arrival**: assign an id, insert into the cache, arm the
//!   close hook that evicts it, optionally auto-respond, then dispatch
//!   stream listeners
//! - **Session arrival**: dispatch session listeners
//!
//! Each pass runs in its own task so a slow listener on one stream does not
//! hold up arrivals on another.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use metrics::counter;
use parking_lot::RwLock;
use streamfan_core::{DispatchError, FanoutError, IdGenerator, Result, StreamId};
use streamfan_settings::{AutoRespond, DEFAULT_POLL_INTERVAL_MS};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::StreamCache;
use crate::dispatch::digest;
use crate::listener::{Listener, ListenerRef, SessionEvent, StreamEvent};
use crate::poll::PollingListener;
use crate::registry::RegistryInner;
use crate::transport::{Headers, SessionHandle, StreamHandle, Transport, TransportEvent};

/// Per-endpoint behavior chosen at creation.
#[derive(Clone, Debug)]
pub struct EndpointOptions {
    /// Respond to each arriving stream before listeners run.
    pub auto_respond: Option<AutoRespond>,
    /// Interval for polling listeners registered without one.
    pub poll_interval: Duration,
}

impl Default for EndpointOptions {
    fn default() -> Self {
        Self {
            auto_respond: None,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

/// Outcome of writing one payload to every cached stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteReport {
    /// Streams the payload was handed to.
    pub delivered: usize,
    /// Streams whose write failed (typically closed mid-broadcast).
    pub failed: usize,
}

/// A named endpoint. Created through [`crate::Registry::create`].
pub struct Endpoint {
    name: Arc<str>,
    transport: Arc<dyn Transport>,
    cache: Arc<StreamCache>,
    stream_listeners: RwLock<Vec<ListenerRef<StreamEvent>>>,
    session_listeners: RwLock<Vec<ListenerRef<SessionEvent>>>,
    ids: Arc<dyn IdGenerator>,
    options: EndpointOptions,
    registry: Weak<RegistryInner>,
    listening: AtomicBool,
    disconnected: AtomicBool,
    cancel: CancellationToken,
}

impl Endpoint {
    pub(crate) fn new(
        name: &str,
        transport: Arc<dyn Transport>,
        ids: Arc<dyn IdGenerator>,
        options: EndpointOptions,
        registry: Weak<RegistryInner>,
    ) -> Self {
        let name: Arc<str> = Arc::from(name);
        Self {
            cache: Arc::new(StreamCache::new(Arc::clone(&name))),
            name,
            transport,
            stream_listeners: RwLock::new(Vec::new()),
            session_listeners: RwLock::new(Vec::new()),
            ids,
            options,
            registry,
            listening: AtomicBool::new(false),
            disconnected: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    // ── introspection ───────────────────────────────────────────────

    /// Endpoint name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The transport this endpoint owns.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Whether the transport serves TLS.
    pub fn is_secure(&self) -> bool {
        self.transport.is_secure()
    }

    /// The open-stream cache.
    pub fn streams(&self) -> &Arc<StreamCache> {
        &self.cache
    }

    /// Number of open streams.
    pub fn stream_count(&self) -> usize {
        self.cache.len()
    }

    /// Ids of open streams.
    pub fn stream_ids(&self) -> Vec<StreamId> {
        self.cache.ids()
    }

    /// The open stream with this id.
    pub fn stream(&self, id: &StreamId) -> Option<StreamHandle> {
        self.cache.get(id)
    }

    /// Number of registered stream listeners.
    pub fn stream_listener_count(&self) -> usize {
        self.stream_listeners.read().len()
    }

    /// Number of registered session listeners.
    pub fn session_listener_count(&self) -> usize {
        self.session_listeners.read().len()
    }

    /// Whether `listen` has succeeded.
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Acquire)
    }

    /// Whether `disconnect` has run.
    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire)
    }

    // ── registration ────────────────────────────────────────────────

    /// Append a stream listener. Registration order is dispatch order.
    pub fn add_stream_listener(&self, listener: ListenerRef<StreamEvent>) {
        debug!(endpoint = %self.name, listener = listener.label(), "stream listener added");
        self.stream_listeners.write().push(listener);
    }

    /// Append a session listener. Registration order is dispatch order.
    pub fn add_session_listener(&self, listener: ListenerRef<SessionEvent>) {
        debug!(endpoint = %self.name, listener = listener.label(), "session listener added");
        self.session_listeners.write().push(listener);
    }

    /// Append a stream listener that re-runs every `interval` until its
    /// stream closes.
    pub fn add_polling_listener(
        &self,
        label: impl Into<Arc<str>>,
        interval: Duration,
        listener: impl Listener<StreamEvent> + 'static,
    ) {
        self.add_stream_listener(ListenerRef::new(
            label,
            PollingListener::new(interval, listener),
        ));
    }

    /// Append a polling stream listener at the endpoint's configured
    /// interval.
    pub fn add_default_polling_listener(
        &self,
        label: impl Into<Arc<str>>,
        listener: impl Listener<StreamEvent> + 'static,
    ) {
        self.add_polling_listener(label, self.options.poll_interval, listener);
    }

    /// Interval used by [`Endpoint::add_default_polling_listener`].
    pub fn poll_interval(&self) -> Duration {
        self.options.poll_interval
    }

    // ── lifecycle ───────────────────────────────────────────────────

    /// Start the transport and the event loop.
    ///
    /// A second call fails with [`FanoutError::AlreadyListening`].
    pub async fn listen(self: &Arc<Self>, port: u16) -> Result<()> {
        if self.listening.swap(true, Ordering::AcqRel) {
            return Err(FanoutError::AlreadyListening {
                name: self.name.to_string(),
            });
        }
        let events = match self.transport.listen(port).await {
            Ok(events) => events,
            Err(e) => {
                self.listening.store(false, Ordering::Release);
                return Err(e.into());
            }
        };

        let _ = tokio::spawn(run_event_loop(
            Arc::downgrade(self),
            events,
            self.cancel.clone(),
        ));
        info!(endpoint = %self.name, port, secure = self.is_secure(), "endpoint listening");
        Ok(())
    }

    /// Tear down: stop the event loop, clear the cache, close the transport,
    /// and leave the registry. Idempotent.
    ///
    /// Events still queued in the transport are dropped. Open streams are not
    /// closed individually; they end however the transport ends them.
    pub async fn disconnect(&self) {
        if self.disconnected.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        let cleared = self.cache.clear();
        self.transport.close().await;
        if let Some(registry) = self.registry.upgrade() {
            registry.remove_endpoint(self);
        }
        info!(endpoint = %self.name, cleared, "endpoint disconnected");
    }

    // ── events ──────────────────────────────────────────────────────

    /// Accept a stream: cache it, arm eviction, then dispatch listeners.
    ///
    /// The cache entry exists before any listener runs. The returned handle
    /// resolves to the dispatch pass outcome. Returns `None` once the
    /// endpoint is disconnected; the stream is neither cached nor dispatched.
    pub fn handle_stream(
        &self,
        stream: StreamHandle,
        headers: Headers,
    ) -> Option<JoinHandle<std::result::Result<usize, DispatchError>>> {
        if self.is_disconnected() {
            debug!(endpoint = %self.name, "stream refused, endpoint disconnected");
            return None;
        }
        let id = self.ids.next_stream_id();
        self.cache.insert(id.clone(), Arc::clone(&stream));
        // disconnect sets the flag before clearing, so either its clear sees
        // this entry or this check sees the flag.
        if self.is_disconnected() {
            let _ = self.cache.evict(&id);
            debug!(endpoint = %self.name, stream_id = %id, "stream refused, endpoint disconnected");
            return None;
        }
        debug!(endpoint = %self.name, stream_id = %id, "stream arrived");

        let cache = Arc::downgrade(&self.cache);
        let evict_id = id.clone();
        stream.on_close(Box::new(move || {
            if let Some(cache) = cache.upgrade() {
                let _ = cache.evict(&evict_id);
            }
        }));

        if let Some(auto) = &self.options.auto_respond {
            let headers = Headers::from([("content-type".to_owned(), auto.content_type.clone())]);
            if let Err(e) = stream.respond(auto.status, headers) {
                warn!(endpoint = %self.name, stream_id = %id, error = %e, "auto-respond failed");
            }
        }

        let event = StreamEvent {
            endpoint: Arc::clone(&self.name),
            id,
            stream,
            headers: Arc::new(headers),
            streams: Arc::clone(&self.cache),
        };
        let listeners = self.stream_listeners.read().clone();
        Some(tokio::spawn(async move {
            let result = digest(&event.endpoint, &listeners, &event).await;
            if result.is_err() {
                debug!(endpoint = %event.endpoint, stream_id = %event.id, "stream dispatch aborted");
            }
            result
        }))
    }

    /// Accept a session and dispatch session listeners.
    ///
    /// Returns `None` once the endpoint is disconnected.
    pub fn handle_session(
        &self,
        session: SessionHandle,
    ) -> Option<JoinHandle<std::result::Result<usize, DispatchError>>> {
        if self.is_disconnected() {
            debug!(endpoint = %self.name, session_id = %session.id(), "session refused, endpoint disconnected");
            return None;
        }
        debug!(endpoint = %self.name, session_id = %session.id(), "session established");
        counter!(crate::metrics::SESSIONS_OPENED_TOTAL, "endpoint" => self.name.to_string())
            .increment(1);

        let event = SessionEvent {
            endpoint: Arc::clone(&self.name),
            session,
        };
        let listeners = self.session_listeners.read().clone();
        Some(tokio::spawn(async move {
            digest(&event.endpoint, &listeners, &event).await
        }))
    }

    // ── broadcast ───────────────────────────────────────────────────

    /// Write `payload` to every stream in a snapshot of the cache.
    ///
    /// Streams arriving during the write may be missed. A stream that closes
    /// mid-iteration counts as failed and is logged at `warn`.
    pub fn write_all(&self, payload: impl Into<Bytes>) -> WriteReport {
        let payload = payload.into();
        let mut report = WriteReport::default();

        for (id, stream) in self.cache.snapshot() {
            match stream.write(payload.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(endpoint = %self.name, stream_id = %id, error = %e, "broadcast write failed");
                }
            }
        }

        counter!(crate::metrics::BROADCAST_WRITES_TOTAL, "endpoint" => self.name.to_string())
            .increment(report.delivered as u64);
        if report.failed > 0 {
            counter!(crate::metrics::BROADCAST_WRITE_FAILURES_TOTAL, "endpoint" => self.name.to_string())
                .increment(report.failed as u64);
        }
        debug!(
            endpoint = %self.name,
            delivered = report.delivered,
            failed = report.failed,
            bytes = payload.len(),
            "broadcast written"
        );
        report
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("streams", &self.cache.len())
            .field("listening", &self.is_listening())
            .finish_non_exhaustive()
    }
}

/// Drive one endpoint until cancelled or the transport feed ends.
async fn run_event_loop(
    endpoint: Weak<Endpoint>,
    mut events: mpsc::Receiver<TransportEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        let Some(endpoint) = endpoint.upgrade() else {
            break;
        };
        // Dispatch outcomes are logged inside the pass; the loop keeps going.
        match event {
            TransportEvent::Stream { stream, headers } => {
                drop(endpoint.handle_stream(stream, headers));
            }
            TransportEvent::Session(session) => {
                drop(endpoint.handle_session(session));
            }
        }
    }
    debug!("endpoint event loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryTransport, StreamFrame};
    use crate::transport::TransportStream;
    use assert_matches::assert_matches;
    use parking_lot::Mutex;
    use streamfan_core::SequentialIdGenerator;
    use streamfan_core::logging::capture_logs;
    use tracing::Level;

    fn endpoint_with(options: EndpointOptions) -> (Arc<Endpoint>, Arc<MemoryTransport>) {
        let transport = Arc::new(MemoryTransport::new("test", 16, false));
        let endpoint = Arc::new(Endpoint::new(
            "test",
            transport.clone(),
            Arc::new(SequentialIdGenerator::new("s")),
            options,
            Weak::new(),
        ));
        (endpoint, transport)
    }

    fn endpoint() -> (Arc<Endpoint>, Arc<MemoryTransport>) {
        endpoint_with(EndpointOptions::default())
    }

    async fn eventually(mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn cache_entry_exists_before_first_listener() {
        let (endpoint, transport) = endpoint();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        endpoint.add_stream_listener(ListenerRef::stream_fn("peek", move |ev: &StreamEvent| {
            s.lock().push(ev.streams.contains(&ev.id));
            Ok(())
        }));
        endpoint.listen(8000).await.unwrap();

        let session = transport.connect(None).await.unwrap();
        let _client = session.open_stream(Headers::new()).await.unwrap();

        eventually(|| !seen.lock().is_empty()).await;
        assert_eq!(*seen.lock(), vec![true]);
        assert_eq!(endpoint.stream_ids(), vec![StreamId::from("s-1")]);
    }

    #[tokio::test]
    async fn close_evicts_stream() {
        let (endpoint, transport) = endpoint();
        endpoint.listen(8000).await.unwrap();
        let session = transport.connect(None).await.unwrap();
        let client = session.open_stream(Headers::new()).await.unwrap();

        eventually(|| endpoint.stream_count() == 1).await;
        client.close();
        assert_eq!(endpoint.stream_count(), 0);
    }

    #[tokio::test]
    async fn second_listen_is_rejected() {
        let (endpoint, _transport) = endpoint();
        endpoint.listen(8000).await.unwrap();
        assert!(endpoint.is_listening());
        assert_matches!(
            endpoint.listen(8000).await,
            Err(FanoutError::AlreadyListening { ref name }) if name == "test"
        );
    }

    #[tokio::test]
    async fn failed_transport_listen_leaves_endpoint_idle() {
        let (endpoint, transport) = endpoint();
        transport.close().await;
        assert_matches!(endpoint.listen(8000).await, Err(FanoutError::Transport(_)));
        assert!(!endpoint.is_listening());
    }

    #[tokio::test]
    async fn duplicate_registration_runs_twice() {
        let (endpoint, transport) = endpoint();
        let calls = Arc::new(Mutex::new(0_u32));
        for _ in 0..2 {
            let c = calls.clone();
            endpoint.add_stream_listener(ListenerRef::stream_fn("same", move |_: &StreamEvent| {
                *c.lock() += 1;
                Ok(())
            }));
        }
        assert_eq!(endpoint.stream_listener_count(), 2);
        endpoint.listen(8000).await.unwrap();

        let session = transport.connect(None).await.unwrap();
        let _client = session.open_stream(Headers::new()).await.unwrap();
        eventually(|| *calls.lock() == 2).await;
    }

    #[tokio::test]
    async fn session_listeners_receive_session() {
        let (endpoint, transport) = endpoint();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        endpoint.add_session_listener(ListenerRef::session_fn("who", move |ev: &SessionEvent| {
            s.lock().push(ev.session.id().to_string());
            Ok(())
        }));
        assert_eq!(endpoint.session_listener_count(), 1);
        endpoint.listen(8000).await.unwrap();

        let session = transport.connect(None).await.unwrap();
        eventually(|| !seen.lock().is_empty()).await;
        assert_eq!(*seen.lock(), vec![session.id().to_string()]);
    }

    #[tokio::test]
    async fn auto_respond_precedes_listener_writes() {
        let (endpoint, transport) = endpoint_with(EndpointOptions {
            auto_respond: Some(AutoRespond::default()),
            ..EndpointOptions::default()
        });
        endpoint.add_stream_listener(ListenerRef::stream_fn("hello", |ev: &StreamEvent| {
            ev.write("hello")?;
            Ok(())
        }));
        endpoint.listen(8000).await.unwrap();

        let session = transport.connect(None).await.unwrap();
        let mut client = session.open_stream(Headers::new()).await.unwrap();

        let first = client.recv().await.unwrap();
        assert_matches!(first, StreamFrame::Response { status: 200, ref headers }
            if headers["content-type"] == "text/plain");
        assert_eq!(client.recv().await, Some(StreamFrame::Data(Bytes::from_static(b"hello"))));
    }

    #[tokio::test]
    async fn write_all_reaches_every_open_stream_once() {
        let (endpoint, transport) = endpoint();
        endpoint.listen(8000).await.unwrap();
        let session = transport.connect(None).await.unwrap();
        let mut a = session.open_stream(Headers::new()).await.unwrap();
        let mut b = session.open_stream(Headers::new()).await.unwrap();
        eventually(|| endpoint.stream_count() == 2).await;

        let report = endpoint.write_all("X");

        assert_eq!(report, WriteReport { delivered: 2, failed: 0 });
        assert_eq!(a.drain_data(), vec![Bytes::from_static(b"X")]);
        assert_eq!(b.drain_data(), vec![Bytes::from_static(b"X")]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn write_to_stream_closed_after_snapshot_is_reported() {
        struct Closed;
        impl TransportStream for Closed {
            fn write(&self, _: Bytes) -> std::result::Result<(), streamfan_core::TransportError> {
                Err(streamfan_core::TransportError::StreamClosed)
            }
            fn respond(&self, _: u16, _: Headers) -> std::result::Result<(), streamfan_core::TransportError> {
                Err(streamfan_core::TransportError::StreamClosed)
            }
            fn is_closed(&self) -> bool {
                true
            }
            fn on_close(&self, _: crate::transport::CloseHook) {}
        }

        let (logs, _guard) = capture_logs();
        let (endpoint, _transport) = endpoint();
        endpoint.streams().insert(StreamId::from("gone"), Arc::new(Closed));

        let report = endpoint.write_all("X");

        assert_eq!(report, WriteReport { delivered: 0, failed: 1 });
        assert!(logs.has_event(Level::WARN, "broadcast write failed"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn failing_listener_does_not_stop_the_endpoint() {
        let (logs, _guard) = capture_logs();
        let (endpoint, transport) = endpoint();
        let ok = Arc::new(Mutex::new(0_u32));
        endpoint.add_stream_listener(ListenerRef::stream_fn("picky", |ev: &StreamEvent| {
            anyhow::ensure!(ev.header("x-ok").is_some(), "missing x-ok");
            Ok(())
        }));
        let o = ok.clone();
        endpoint.add_stream_listener(ListenerRef::stream_fn("count", move |_: &StreamEvent| {
            *o.lock() += 1;
            Ok(())
        }));
        endpoint.listen(8000).await.unwrap();

        let session = transport.connect(None).await.unwrap();
        let _bad = session.open_stream(Headers::new()).await.unwrap();
        let _good = session
            .open_stream(Headers::from([("x-ok".into(), "1".into())]))
            .await
            .unwrap();

        eventually(|| *ok.lock() == 1).await;
        eventually(|| logs.has_event(Level::ERROR, "listener failed")).await;
        assert_eq!(endpoint.stream_count(), 2);
    }

    #[tokio::test]
    async fn handle_stream_returns_pass_outcome() {
        let (endpoint, transport) = endpoint();
        endpoint.add_stream_listener(ListenerRef::stream_fn("fails", |_: &StreamEvent| {
            anyhow::bail!("boom")
        }));
        let mut events = transport.listen(9000).await.unwrap();
        let session = transport.connect(None).await.unwrap();
        let _client = session.open_stream(Headers::new()).await.unwrap();
        let _ = events.recv().await;
        let Some(TransportEvent::Stream { stream, headers }) = events.recv().await else {
            panic!("expected stream event");
        };

        let pass = endpoint.handle_stream(stream, headers).unwrap();
        let err = pass.await.unwrap().unwrap_err();
        assert_eq!(err.listener, "fails");
        assert_eq!(err.endpoint, "test");
    }

    #[tokio::test]
    async fn disconnect_clears_cache_and_closes_transport() {
        let (endpoint, transport) = endpoint();
        endpoint.listen(8000).await.unwrap();
        let session = transport.connect(None).await.unwrap();
        let client = session.open_stream(Headers::new()).await.unwrap();
        eventually(|| endpoint.stream_count() == 1).await;

        endpoint.disconnect().await;
        endpoint.disconnect().await;

        assert!(endpoint.is_disconnected());
        assert_eq!(endpoint.stream_count(), 0);
        assert!(transport.is_closed());
        assert!(!client.is_closed());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn queued_streams_are_dropped_on_disconnect() {
        let (endpoint, transport) = endpoint();
        let calls = Arc::new(Mutex::new(0_u32));
        let c = calls.clone();
        endpoint.add_stream_listener(ListenerRef::stream_fn("count", move |_: &StreamEvent| {
            *c.lock() += 1;
            Ok(())
        }));
        let s = calls.clone();
        endpoint.add_session_listener(ListenerRef::session_fn("count", move |_: &SessionEvent| {
            *s.lock() += 1;
            Ok(())
        }));
        endpoint.listen(8000).await.unwrap();

        // Nothing yields until disconnect, so every event is still queued.
        let session = transport.connect(None).await.unwrap();
        let mut clients = Vec::new();
        for _ in 0..8 {
            clients.push(session.open_stream(Headers::new()).await.unwrap());
        }
        endpoint.disconnect().await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }

        assert_eq!(endpoint.stream_count(), 0);
        assert_eq!(*calls.lock(), 0);
    }

    #[tokio::test]
    async fn disconnected_endpoint_refuses_direct_arrivals() {
        let (endpoint, transport) = endpoint();
        let calls = Arc::new(Mutex::new(0_u32));
        let c = calls.clone();
        endpoint.add_stream_listener(ListenerRef::stream_fn("count", move |_: &StreamEvent| {
            *c.lock() += 1;
            Ok(())
        }));
        let mut events = transport.listen(9000).await.unwrap();
        let session = transport.connect(None).await.unwrap();
        let _client = session.open_stream(Headers::new()).await.unwrap();
        let Some(TransportEvent::Session(server_session)) = events.recv().await else {
            panic!("expected session event");
        };
        let Some(TransportEvent::Stream { stream, headers }) = events.recv().await else {
            panic!("expected stream event");
        };

        endpoint.disconnect().await;

        assert!(endpoint.handle_stream(stream, headers).is_none());
        assert!(endpoint.handle_session(server_session).is_none());
        assert_eq!(endpoint.stream_count(), 0);
        tokio::task::yield_now().await;
        assert_eq!(*calls.lock(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn default_polling_listener_uses_configured_interval() {
        let (endpoint, transport) = endpoint_with(EndpointOptions {
            poll_interval: Duration::from_millis(100),
            ..EndpointOptions::default()
        });
        let calls = Arc::new(Mutex::new(0_u32));
        let c = calls.clone();
        endpoint.add_default_polling_listener(
            "ticker",
            crate::listener::FnListener(move |_: &StreamEvent| -> anyhow::Result<()> {
                *c.lock() += 1;
                Ok(())
            }),
        );
        assert_eq!(endpoint.poll_interval(), Duration::from_millis(100));
        endpoint.listen(8000).await.unwrap();

        let session = transport.connect(None).await.unwrap();
        let _client = session.open_stream(Headers::new()).await.unwrap();
        eventually(|| *calls.lock() == 1).await;
        let first = *calls.lock();

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        let after = *calls.lock();
        assert!((first + 9..=first + 11).contains(&after), "got {after} after {first}");
    }

    #[test]
    fn default_options_poll_every_five_seconds() {
        assert_eq!(EndpointOptions::default().poll_interval, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn polling_listener_registered_as_stream_listener() {
        let (endpoint, transport) = endpoint();
        let calls = Arc::new(Mutex::new(0_u32));
        let c = calls.clone();
        endpoint.add_polling_listener(
            "ticker",
            Duration::from_secs(1),
            crate::listener::FnListener(move |_: &StreamEvent| -> anyhow::Result<()> {
                *c.lock() += 1;
                Ok(())
            }),
        );
        assert_eq!(endpoint.stream_listener_count(), 1);
        endpoint.listen(8000).await.unwrap();

        let session = transport.connect(None).await.unwrap();
        let client = session.open_stream(Headers::new()).await.unwrap();
        eventually(|| *calls.lock() == 1).await;

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        let before_close = *calls.lock();
        assert!((3..=4).contains(&before_close));

        client.close();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(*calls.lock(), before_close);
    }
}
