//! Name-to-endpoint directory.
//!
//! A [`Registry`] is a cheap clonable handle; every clone sees the same
//! endpoints. Names are unique. Iteration (broadcast, disconnect, `names`)
//! follows creation order.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use indexmap::IndexMap;
use metrics::gauge;
use parking_lot::RwLock;
use streamfan_core::{
    Credentials, FanoutError, IdGenerator, Result, TransportError, UuidV7Generator,
};
use streamfan_settings::FanoutSettings;
use tracing::{debug, info};

use crate::broadcast::BroadcastTarget;
use crate::endpoint::{Endpoint, EndpointOptions};
use crate::listener::{Listener, ListenerRef, SessionEvent, StreamEvent};
use crate::transport::TransportFactory;

/// Totals of one process-wide broadcast.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastSummary {
    /// Endpoints asked to write.
    pub endpoints: usize,
    /// Streams the payload was handed to.
    pub delivered: usize,
    /// Streams whose write failed.
    pub failed: usize,
}

pub(crate) struct RegistryInner {
    endpoints: RwLock<IndexMap<String, Arc<Endpoint>>>,
    factory: Arc<dyn TransportFactory>,
    ids: Arc<dyn IdGenerator>,
}

impl RegistryInner {
    pub(crate) fn remove(&self, name: &str) -> Option<Arc<Endpoint>> {
        let (removed, remaining) = {
            let mut endpoints = self.endpoints.write();
            let removed = endpoints.shift_remove(name);
            (removed, endpoints.len())
        };
        if removed.is_some() {
            debug!(endpoint = name, "endpoint removed from registry");
            record_active(remaining);
        }
        removed
    }

    /// Remove `endpoint` if it is still the one registered under its name.
    pub(crate) fn remove_endpoint(&self, endpoint: &Endpoint) {
        let registered = self
            .endpoints
            .read()
            .get(endpoint.name())
            .is_some_and(|current| std::ptr::eq(Arc::as_ptr(current), endpoint));
        if registered {
            let _ = self.remove(endpoint.name());
        }
    }
}

/// Directory of named endpoints.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Registry {
    /// Registry building transports with `factory` and UUID v7 stream ids.
    pub fn new(factory: impl TransportFactory + 'static) -> Self {
        Self::with_id_generator(factory, UuidV7Generator)
    }

    /// Registry with an explicit stream id generator.
    pub fn with_id_generator(
        factory: impl TransportFactory + 'static,
        ids: impl IdGenerator + 'static,
    ) -> Self {
        Self::from_parts(Arc::new(factory), Arc::new(ids))
    }

    /// Registry from already shared parts.
    pub fn from_parts(factory: Arc<dyn TransportFactory>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                endpoints: RwLock::new(IndexMap::new()),
                factory,
                ids,
            }),
        }
    }

    /// Create and register an endpoint with default options.
    ///
    /// Fails with [`FanoutError::DuplicateName`] if `name` is taken; the
    /// existing endpoint is left untouched.
    pub fn create(&self, name: &str, credentials: Option<Credentials>) -> Result<Arc<Endpoint>> {
        self.create_with_options(name, credentials, EndpointOptions::default())
    }

    /// Create and register an endpoint.
    pub fn create_with_options(
        &self,
        name: &str,
        credentials: Option<Credentials>,
        options: EndpointOptions,
    ) -> Result<Arc<Endpoint>> {
        if self.contains(name) {
            return Err(FanoutError::duplicate(name));
        }

        // The factory runs unlocked and may call back into the registry.
        let transport = self.inner.factory.build(name, credentials.as_ref())?;
        let endpoint = Arc::new(Endpoint::new(
            name,
            transport,
            Arc::clone(&self.inner.ids),
            options,
            Arc::downgrade(&self.inner),
        ));

        let mut endpoints = self.inner.endpoints.write();
        if endpoints.contains_key(name) {
            return Err(FanoutError::duplicate(name));
        }
        let _ = endpoints.insert(name.to_owned(), Arc::clone(&endpoint));
        let active = endpoints.len();
        drop(endpoints);

        record_active(active);
        info!(endpoint = name, secure = credentials.is_some(), "endpoint created");
        Ok(endpoint)
    }

    /// Create every configured endpoint, in configuration order.
    ///
    /// TLS files are read here. Nothing is registered past the first failure.
    pub fn create_from_settings(&self, settings: &FanoutSettings) -> Result<Vec<Arc<Endpoint>>> {
        settings
            .endpoints
            .iter()
            .map(|config| {
                let credentials = config
                    .tls
                    .as_ref()
                    .map(streamfan_settings::TlsSettings::load)
                    .transpose()
                    .map_err(|e| FanoutError::Transport(TransportError::Tls(e.to_string())))?;
                let options = EndpointOptions {
                    auto_respond: config.auto_respond.clone(),
                    poll_interval: settings.default_poll_interval(),
                };
                self.create_with_options(&config.name, credentials, options)
            })
            .collect()
    }

    /// Create every configured endpoint and start each on its port.
    pub async fn listen_from_settings(&self, settings: &FanoutSettings) -> Result<Vec<Arc<Endpoint>>> {
        let endpoints = self.create_from_settings(settings)?;
        for (endpoint, config) in endpoints.iter().zip(&settings.endpoints) {
            endpoint.listen(config.port).await?;
        }
        Ok(endpoints)
    }

    /// The endpoint registered under `name`.
    pub fn get(&self, name: &str) -> Result<Arc<Endpoint>> {
        self.inner
            .endpoints
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| FanoutError::not_found(name))
    }

    /// Drop `name` from the directory. No effect if absent.
    pub fn remove(&self, name: &str) -> Option<Arc<Endpoint>> {
        self.inner.remove(name)
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.endpoints.read().contains_key(name)
    }

    /// Registered names in creation order.
    pub fn names(&self) -> Vec<String> {
        self.inner.endpoints.read().keys().cloned().collect()
    }

    /// Number of registered endpoints.
    pub fn len(&self) -> usize {
        self.inner.endpoints.read().len()
    }

    /// Whether no endpoint is registered.
    pub fn is_empty(&self) -> bool {
        self.inner.endpoints.read().is_empty()
    }

    // ── registration by name ────────────────────────────────────────

    /// Append a stream listener to endpoint `name`.
    pub fn add_stream_listener(&self, name: &str, listener: ListenerRef<StreamEvent>) -> Result<()> {
        self.get(name)?.add_stream_listener(listener);
        Ok(())
    }

    /// Append a session listener to endpoint `name`.
    pub fn add_session_listener(&self, name: &str, listener: ListenerRef<SessionEvent>) -> Result<()> {
        self.get(name)?.add_session_listener(listener);
        Ok(())
    }

    /// Append a polling stream listener to endpoint `name` at that
    /// endpoint's configured interval.
    pub fn add_default_polling_listener(
        &self,
        name: &str,
        label: impl Into<Arc<str>>,
        listener: impl Listener<StreamEvent> + 'static,
    ) -> Result<()> {
        self.get(name)?.add_default_polling_listener(label, listener);
        Ok(())
    }

    /// Append a polling stream listener to endpoint `name`.
    pub fn add_polling_listener(
        &self,
        name: &str,
        label: impl Into<Arc<str>>,
        interval: Duration,
        listener: impl Listener<StreamEvent> + 'static,
    ) -> Result<()> {
        self.get(name)?.add_polling_listener(label, interval, listener);
        Ok(())
    }

    /// Target for broadcast-wrapped methods writing to endpoint `name`.
    ///
    /// The endpoint is resolved on every call, not here.
    pub fn broadcaster(&self, name: impl Into<Arc<str>>) -> BroadcastTarget {
        BroadcastTarget::new(self.clone(), name)
    }

    // ── process-wide ────────────────────────────────────────────────

    /// Write `payload` to every stream of every endpoint, endpoint by
    /// endpoint in creation order.
    ///
    /// Returns once every endpoint has been asked to write.
    pub fn broadcast_all(&self, payload: impl Into<Bytes>) -> BroadcastSummary {
        let payload = payload.into();
        let mut summary = BroadcastSummary::default();
        for endpoint in self.snapshot() {
            let report = endpoint.write_all(payload.clone());
            summary.endpoints += 1;
            summary.delivered += report.delivered;
            summary.failed += report.failed;
        }
        debug!(
            endpoints = summary.endpoints,
            delivered = summary.delivered,
            failed = summary.failed,
            "process-wide broadcast written"
        );
        summary
    }

    /// Disconnect every endpoint in creation order, one at a time.
    pub async fn disconnect_all(&self) {
        let endpoints = self.snapshot();
        let count = endpoints.len();
        for endpoint in endpoints {
            endpoint.disconnect().await;
        }
        info!(count, "all endpoints disconnected");
    }

    fn snapshot(&self) -> Vec<Arc<Endpoint>> {
        self.inner.endpoints.read().values().cloned().collect()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("endpoints", &self.names())
            .finish_non_exhaustive()
    }
}

#[allow(clippy::cast_precision_loss)]
fn record_active(count: usize) {
    gauge!(crate::metrics::ENDPOINTS_ACTIVE).set(count as f64);
}
