//! Broadcast-wrapped methods.
//!
//! A [`BroadcastTarget`] turns a method into one whose result is written to
//! every open stream of a named endpoint. The endpoint is looked up after the
//! method produced its payload, so a missing endpoint is reported as
//! [`FanoutError::NotFound`] on that call and the method has still run.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;
use futures::future::BoxFuture;
use streamfan_core::errors::BoxError;
use streamfan_core::{FanoutError, Result};
use tracing::debug;

use crate::endpoint::WriteReport;
use crate::registry::Registry;

/// Writes method results to one named endpoint.
#[derive(Clone, Debug)]
pub struct BroadcastTarget {
    registry: Registry,
    endpoint: Arc<str>,
}

impl BroadcastTarget {
    /// Target `endpoint` within `registry`.
    pub fn new(registry: Registry, endpoint: impl Into<Arc<str>>) -> Self {
        Self {
            registry,
            endpoint: endpoint.into(),
        }
    }

    /// Name of the target endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Resolve the endpoint and write `payload` to all its streams.
    pub fn send(&self, payload: impl Into<Bytes>) -> Result<WriteReport> {
        let endpoint = self.registry.get(&self.endpoint)?;
        let report = endpoint.write_all(payload);
        debug!(endpoint = %self.endpoint, delivered = report.delivered, "broadcast method result sent");
        Ok(report)
    }

    /// Wrap a synchronous zero-argument method.
    pub fn wrap<F, T>(self, method: F) -> impl Fn() -> Result<WriteReport>
    where
        F: Fn() -> T,
        T: Into<Bytes>,
    {
        move || self.send(method())
    }

    /// Wrap a synchronous one-argument method. Use a tuple for more.
    pub fn wrap_with<A, F, T>(self, method: F) -> impl Fn(A) -> Result<WriteReport>
    where
        F: Fn(A) -> T,
        T: Into<Bytes>,
    {
        move |arg| self.send(method(arg))
    }

    /// Wrap an async zero-argument method. Nothing is written until its
    /// future resolves.
    pub fn wrap_async<F, Fut, T>(self, method: F) -> impl Fn() -> BoxFuture<'static, Result<WriteReport>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Into<Bytes> + Send,
    {
        move || self.clone().send_after(method())
    }

    /// Wrap an async one-argument method.
    pub fn wrap_async_with<A, F, Fut, T>(
        self,
        method: F,
    ) -> impl Fn(A) -> BoxFuture<'static, Result<WriteReport>>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Into<Bytes> + Send,
    {
        move |arg| self.clone().send_after(method(arg))
    }

    /// Wrap a fallible async zero-argument method.
    ///
    /// An error from the method becomes [`FanoutError::Broadcast`] and nothing
    /// is written.
    pub fn wrap_try_async<F, Fut, T, E>(
        self,
        method: F,
    ) -> impl Fn() -> BoxFuture<'static, Result<WriteReport>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Into<Bytes> + Send,
        E: Into<BoxError>,
    {
        move || {
            let target = self.clone();
            let pending = method();
            async move {
                let payload = pending.await.map_err(|e| FanoutError::Broadcast {
                    endpoint: target.endpoint.to_string(),
                    source: e.into(),
                })?;
                target.send(payload)
            }
            .boxed()
        }
    }

    fn send_after<Fut, T>(self, pending: Fut) -> BoxFuture<'static, Result<WriteReport>>
    where
        Fut: Future<Output = T> + Send + 'static,
        T: Into<Bytes> + Send,
    {
        async move {
            let payload = pending.await;
            self.send(payload)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryClientStream, MemoryTransportFactory};
    use crate::transport::Headers;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    async fn endpoint_with_streams(n: usize) -> (Registry, Vec<MemoryClientStream>) {
        let factory = Arc::new(MemoryTransportFactory::new(16));
        let registry = Registry::from_parts(factory.clone(), Arc::new(streamfan_core::UuidV7Generator));
        let endpoint = registry.create("test", None).unwrap();
        endpoint.listen(0).await.unwrap();

        let session = factory.transport("test").unwrap().connect(None).await.unwrap();
        let mut clients = Vec::new();
        for _ in 0..n {
            clients.push(session.open_stream(Headers::new()).await.unwrap());
        }
        for _ in 0..200 {
            if endpoint.stream_count() == n {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(endpoint.stream_count(), n);
        (registry, clients)
    }

    #[tokio::test]
    async fn sync_result_reaches_every_stream() {
        let (registry, mut clients) = endpoint_with_streams(3).await;
        let announce = registry.broadcaster("test").wrap(|| "X");

        let report = announce().unwrap();

        assert_eq!(report.delivered, 3);
        for client in &mut clients {
            assert_eq!(client.drain_data(), vec![Bytes::from_static(b"X")]);
        }
    }

    #[tokio::test]
    async fn argument_flows_through() {
        let (registry, mut clients) = endpoint_with_streams(1).await;
        let shout = registry
            .broadcaster("test")
            .wrap_with(|name: String| format!("hello {name}"));

        let _ = shout("world".to_owned()).unwrap();
        assert_eq!(clients[0].drain_data(), vec![Bytes::from("hello world")]);
    }

    #[tokio::test]
    async fn async_result_written_only_after_resolution() {
        let (registry, mut clients) = endpoint_with_streams(2).await;
        let (tx, rx) = oneshot::channel::<&'static str>();
        let rx = Arc::new(parking_lot::Mutex::new(Some(rx)));

        let later = registry.broadcaster("test").wrap_async(move || {
            let rx = rx.lock().take();
            async move {
                match rx {
                    Some(rx) => rx.await.unwrap_or("dropped"),
                    None => "again",
                }
            }
        });

        let pending = tokio::spawn(later());
        tokio::task::yield_now().await;
        for client in &mut clients {
            assert!(client.drain_data().is_empty());
        }

        tx.send("Y").unwrap();
        let report = pending.await.unwrap().unwrap();

        assert_eq!(report.delivered, 2);
        for client in &mut clients {
            assert_eq!(client.drain_data(), vec![Bytes::from_static(b"Y")]);
        }
    }

    #[tokio::test]
    async fn missing_endpoint_fails_after_method_runs() {
        let factory = MemoryTransportFactory::default();
        let registry = Registry::new(factory);
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let orphan = registry.broadcaster("missing").wrap_async(move || {
            let _ = c.fetch_add(1, Ordering::SeqCst);
            async { "payload" }
        });

        let err = orphan().await.unwrap_err();

        assert_matches!(err, FanoutError::NotFound { ref name } if name == "missing");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn failing_method_writes_nothing() {
        let (registry, mut clients) = endpoint_with_streams(1).await;
        let fallible = registry
            .broadcaster("test")
            .wrap_try_async(|| async { Err::<String, _>(anyhow::anyhow!("feed unavailable")) });

        let err = fallible().await.unwrap_err();

        assert_matches!(err, FanoutError::Broadcast { ref endpoint, .. } if endpoint == "test");
        assert!(err.to_string().contains("feed unavailable"));
        assert!(clients[0].drain_data().is_empty());
    }

    #[tokio::test]
    async fn fallible_success_is_written() {
        let (registry, mut clients) = endpoint_with_streams(1).await;
        let ok = registry
            .broadcaster("test")
            .wrap_try_async(|| async { anyhow::Ok(vec![1_u8, 2, 3]) });

        let report = ok().await.unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(clients[0].drain_data(), vec![Bytes::from_static(&[1, 2, 3])]);
    }
}
