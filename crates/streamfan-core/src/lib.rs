//! # streamfan-core
//!
//! Foundation types shared by every streamfan crate:
//!
//! - **Errors**: [`FanoutError`], [`DispatchError`], [`TransportError`] via `thiserror`
//! - **Branded IDs**: [`StreamId`], [`SessionId`] and the injected [`IdGenerator`]
//! - **Credentials**: [`Credentials`] passed to transport factories
//! - **Logging**: `tracing` subscriber setup and an in-memory capture layer for tests

#![deny(unsafe_code)]

pub mod credentials;
pub mod errors;
pub mod ids;
pub mod logging;

pub use credentials::Credentials;
pub use errors::{DispatchError, FanoutError, Result, TransportError};
pub use ids::{IdGenerator, SequentialIdGenerator, SessionId, StreamId, UuidV7Generator};
