//! Branded ID newtypes and the injected identifier generator.
//!
//! Stream and session IDs are opaque strings. The registry never inspects
//! them beyond equality and hashing, so any [`IdGenerator`] that yields
//! unique values is acceptable. [`UuidV7Generator`] is the default.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Identifier assigned to a stream when it arrives on an endpoint.
    StreamId
}

branded_id! {
    /// Identifier of a physical session (connection).
    SessionId
}

/// Produces opaque unique identifiers. Called once per arriving stream.
pub trait IdGenerator: Send + Sync {
    /// Return an identifier never returned before by this generator.
    fn next_stream_id(&self) -> StreamId;
}

/// UUID v7 (time-ordered) generator.
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidV7Generator;

impl IdGenerator for UuidV7Generator {
    fn next_stream_id(&self) -> StreamId {
        StreamId(Uuid::now_v7().to_string())
    }
}

/// Deterministic generator yielding `{prefix}-1`, `{prefix}-2`, ...
#[derive(Debug)]
pub struct SequentialIdGenerator {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIdGenerator {
    /// Create a generator with the given prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl Default for SequentialIdGenerator {
    fn default() -> Self {
        Self::new("stream")
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_stream_id(&self) -> StreamId {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        StreamId(format!("{}-{n}", self.prefix))
    }
}
