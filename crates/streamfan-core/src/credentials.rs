//! TLS credentials handed to a transport factory.

use std::fmt;

/// PEM-encoded key and certificate for a secure endpoint.
///
/// When an endpoint is created with credentials the transport is expected to
/// serve TLS; without them it serves plaintext.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Private key (PEM).
    pub key: Vec<u8>,
    /// Certificate chain (PEM).
    pub cert: Vec<u8>,
}

impl Credentials {
    /// Build credentials from raw PEM bytes.
    pub fn new(key: impl Into<Vec<u8>>, cert: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            cert: cert.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &format_args!("<{} bytes redacted>", self.key.len()))
            .field("cert_len", &self.cert.len())
            .finish()
    }
}
