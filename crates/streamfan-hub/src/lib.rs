//! # streamfan-hub
//!
//! Named endpoints over multiplexed connections, with ordered listener
//! dispatch and stream broadcast.
//!
//! - [`Registry`]: name-to-endpoint directory, process-wide broadcast and
//!   shutdown
//! - [`Endpoint`]: one transport, its open-stream cache, and its stream and
//!   session listener lists
//! - [`dispatch::digest`]: runs a listener list in order, awaiting each
//! - [`PollingListener`]: re-runs a stream listener on an interval until the
//!   stream closes
//! - [`BroadcastTarget`]: writes a method's result to every stream of an
//!   endpoint
//! - [`transport`]: the seam a real transport implements; [`memory`] is an
//!   in-process implementation
//!
//! ```text
//! Transport ──events──▶ Endpoint ──insert──▶ StreamCache ◀──evict── close hook
//!                          │
//!                          └──digest──▶ listener 1 ─▶ listener 2 ─▶ ...
//! ```

#![deny(unsafe_code)]

pub mod broadcast;
pub mod cache;
pub mod dispatch;
pub mod endpoint;
pub mod listener;
pub mod memory;
pub mod metrics;
pub mod poll;
pub mod registry;
pub mod transport;

pub use broadcast::BroadcastTarget;
pub use cache::StreamCache;
pub use endpoint::{Endpoint, EndpointOptions, WriteReport};
pub use listener::{
    AsyncFnListener, FnListener, Listener, ListenerRef, SessionEvent, StreamEvent,
};
pub use memory::{MemoryTransport, MemoryTransportFactory};
pub use poll::PollingListener;
pub use registry::{BroadcastSummary, Registry};
pub use transport::{
    Headers, SessionHandle, StreamHandle, Transport, TransportEvent, TransportFactory,
    TransportSession, TransportStream,
};
