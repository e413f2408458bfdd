//! Polling stream listeners.
//!
//! A polling listener runs its handler once when the stream arrives, then
//! again every interval until the stream closes. Closure is checked at each
//! tick, so a stream that closes between ticks can see at most one more
//! invocation before the ticker notices.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use metrics::counter;
use streamfan_core::errors::panic_message;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

use crate::listener::{Listener, StreamEvent};

/// Where a polling registration is in its life.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollPhase {
    /// First invocation done, waiting for the first tick.
    Armed,
    /// Re-invoking on every tick.
    Ticking,
    /// Stream closed; no further invocations.
    Stopped,
}

/// Wraps a stream listener so it is re-invoked on an interval.
pub struct PollingListener {
    inner: Arc<dyn Listener<StreamEvent>>,
    interval: Duration,
}

impl PollingListener {
    /// Re-invoke `inner` every `interval` while the stream is open.
    pub fn new(interval: Duration, inner: impl Listener<StreamEvent> + 'static) -> Self {
        Self::from_arc(interval, Arc::new(inner))
    }

    /// Same as [`PollingListener::new`] for an already shared listener.
    pub fn from_arc(interval: Duration, inner: Arc<dyn Listener<StreamEvent>>) -> Self {
        Self {
            inner,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    /// Re-invocation interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[async_trait]
impl Listener<StreamEvent> for PollingListener {
    async fn handle(&self, event: &StreamEvent) -> anyhow::Result<()> {
        self.inner.handle(event).await?;

        let state = PollState {
            inner: Arc::clone(&self.inner),
            event: event.clone(),
            interval: self.interval,
            phase: PollPhase::Armed,
            ticks: 0,
        };
        let _ = tokio::spawn(state.run());
        Ok(())
    }
}

/// One stream's polling loop.
struct PollState {
    inner: Arc<dyn Listener<StreamEvent>>,
    event: StreamEvent,
    interval: Duration,
    phase: PollPhase,
    ticks: u64,
}

impl PollState {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.phase != PollPhase::Stopped {
            let _ = ticker.tick().await;
            self.tick().await;
        }
        debug!(
            endpoint = %self.event.endpoint,
            stream_id = %self.event.id,
            ticks = self.ticks,
            "polling stopped"
        );
    }

    async fn tick(&mut self) {
        if self.event.is_closed() {
            self.phase = PollPhase::Stopped;
            return;
        }
        self.phase = PollPhase::Ticking;
        self.ticks += 1;
        counter!(crate::metrics::POLL_TICKS_TOTAL).increment(1);

        match AssertUnwindSafe(self.inner.handle(&self.event))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(
                endpoint = %self.event.endpoint,
                stream_id = %self.event.id,
                tick = self.ticks,
                error = %e,
                "polling listener failed, will retry next tick"
            ),
            Err(panic) => error!(
                endpoint = %self.event.endpoint,
                stream_id = %self.event.id,
                tick = self.ticks,
                panic = %panic_message(&*panic),
                "polling listener panicked, will retry next tick"
            ),
        }
    }
}
