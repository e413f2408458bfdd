//! Ordered listener dispatch.
//!
//! One pass runs every listener of a list in registration order, awaiting
//! each before starting the next. The first failure (error or panic) ends
//! the pass.

use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures::FutureExt;
use metrics::{counter, histogram};
use streamfan_core::DispatchError;
use tracing::{error, trace};

use crate::listener::ListenerRef;

/// Run `listeners` against `event` in order.
///
/// Returns how many listeners ran. On failure the listeners after the failing
/// one are not invoked and the error names the failing listener. Pass
/// duration is recorded either way.
pub async fn digest<E>(
    endpoint: &str,
    listeners: &[ListenerRef<E>],
    event: &E,
) -> Result<usize, DispatchError>
where
    E: Send + Sync + 'static,
{
    counter!(crate::metrics::DISPATCH_PASSES_TOTAL, "endpoint" => endpoint.to_owned()).increment(1);
    let start = Instant::now();

    let result = run_in_order(endpoint, listeners, event).await;

    histogram!(crate::metrics::DISPATCH_DURATION_SECONDS, "endpoint" => endpoint.to_owned())
        .record(start.elapsed().as_secs_f64());
    result
}

async fn run_in_order<E>(
    endpoint: &str,
    listeners: &[ListenerRef<E>],
    event: &E,
) -> Result<usize, DispatchError>
where
    E: Send + Sync + 'static,
{
    for (position, entry) in listeners.iter().enumerate() {
        trace!(endpoint, listener = entry.label(), position, "invoking listener");
        let outcome = AssertUnwindSafe(entry.listener().handle(event))
            .catch_unwind()
            .await;

        let err = match outcome {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => DispatchError::new(endpoint, entry.label(), position, e),
            Err(panic) => DispatchError::from_panic(endpoint, entry.label(), position, &*panic),
        };

        error!(
            endpoint,
            listener = entry.label(),
            position,
            error = %err.source,
            "listener failed, skipping remaining listeners"
        );
        counter!(crate::metrics::DISPATCH_ERRORS_TOTAL, "endpoint" => endpoint.to_owned())
            .increment(1);
        return Err(err);
    }
    Ok(listeners.len())
}
