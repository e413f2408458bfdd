//! Per-endpoint cache of open streams.
//!
//! An entry exists exactly while its stream is open: it is inserted when the
//! stream arrives and evicted by the stream's close hook. Broadcasts iterate a
//! [`StreamCache::snapshot`] so no lock is held while writing.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::{counter, gauge};
use parking_lot::Mutex;
use streamfan_core::StreamId;
use tracing::{debug, warn};

use crate::transport::StreamHandle;

/// Open streams of one endpoint, keyed by assigned id.
pub struct StreamCache {
    endpoint: Arc<str>,
    streams: Mutex<HashMap<StreamId, StreamHandle>>,
}

impl StreamCache {
    /// Empty cache for `endpoint`.
    pub fn new(endpoint: impl Into<Arc<str>>) -> Self {
        Self {
            endpoint: endpoint.into(),
            streams: Mutex::new(HashMap::new()),
        }
    }

    /// Record a newly arrived stream.
    pub fn insert(&self, id: StreamId, stream: StreamHandle) {
        let (previous, active) = {
            let mut streams = self.streams.lock();
            let previous = streams.insert(id.clone(), stream);
            (previous, streams.len())
        };
        if previous.is_some() {
            warn!(endpoint = %self.endpoint, stream_id = %id, "stream id reused, replacing cache entry");
        } else {
            counter!(crate::metrics::STREAMS_OPENED_TOTAL, "endpoint" => self.endpoint.to_string())
                .increment(1);
        }
        self.record_active(active);
    }

    /// Remove a closed stream. Returns whether it was present.
    pub fn evict(&self, id: &StreamId) -> bool {
        let (removed, active) = {
            let mut streams = self.streams.lock();
            let removed = streams.remove(id).is_some();
            (removed, streams.len())
        };
        if removed {
            debug!(endpoint = %self.endpoint, stream_id = %id, "stream closed, evicted from cache");
            counter!(crate::metrics::STREAMS_CLOSED_TOTAL, "endpoint" => self.endpoint.to_string())
                .increment(1);
            self.record_active(active);
        }
        removed
    }

    /// Whether `id` is cached.
    pub fn contains(&self, id: &StreamId) -> bool {
        self.streams.lock().contains_key(id)
    }

    /// The stream cached under `id`.
    pub fn get(&self, id: &StreamId) -> Option<StreamHandle> {
        self.streams.lock().get(id).cloned()
    }

    /// Number of open streams.
    pub fn len(&self) -> usize {
        self.streams.lock().len()
    }

    /// Whether no stream is open.
    pub fn is_empty(&self) -> bool {
        self.streams.lock().is_empty()
    }

    /// Ids of all open streams, in no particular order.
    pub fn ids(&self) -> Vec<StreamId> {
        self.streams.lock().keys().cloned().collect()
    }

    /// Clone of every entry taken under the lock.
    ///
    /// Streams that arrive after the snapshot are not included. Streams that
    /// close after it fail their write and are reported by the caller.
    pub fn snapshot(&self) -> Vec<(StreamId, StreamHandle)> {
        self.streams
            .lock()
            .iter()
            .map(|(id, stream)| (id.clone(), Arc::clone(stream)))
            .collect()
    }

    /// Drop every entry. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let removed = std::mem::take(&mut *self.streams.lock()).len();
        self.record_active(0);
        removed
    }

    #[allow(clippy::cast_precision_loss)]
    fn record_active(&self, active: usize) {
        gauge!(crate::metrics::STREAMS_ACTIVE, "endpoint" => self.endpoint.to_string())
            .set(active as f64);
    }
}

impl std::fmt::Debug for StreamCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCache")
            .field("endpoint", &self.endpoint)
            .field("len", &self.len())
            .finish()
    }
}
