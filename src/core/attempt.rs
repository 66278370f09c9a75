//! # Load one capability with retries.
//!
//! Runs construction + `init` of a single module until it succeeds, fails with a
//! non-retryable error, or the [`RetryPolicy`](crate::RetryPolicy) budget is spent.
//!
//! ## Flow
//! ```text
//! loop {
//!   attempt += 1
//!   ├─► factory()  ──┐ (panics caught)
//!   ├─► init().await ┘
//!   ├─► record statistics
//!   ├─► Ok        → publish module:loaded, return
//!   └─► Err(e)
//!         ├─► fatal or budget spent → publish module:failed, return LoadFailed
//!         └─► publish module:retry, sleep(backoff.next(attempt, prev))
//! }
//! ```
//!
//! ## Rules
//! - Attempts of one module run **sequentially**.
//! - Each attempt calls the factory again, so a retry never reuses a half-initialised instance.
//! - Statistics are updated after **every** attempt, successful or not.

use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use futures::FutureExt;
use tokio::time::{self, Instant};

use crate::{
    capabilities::{CapabilityRef, Factory},
    core::loader::LoaderInner,
    error::{panic_message, CapabilityError, LoaderError},
    events::{LoaderEvent, LoaderEventKind},
};

/// Loads `name` through `factory`, retrying per the loader's policy.
pub(crate) async fn load_with_retry(
    inner: &LoaderInner,
    name: &str,
    factory: &Factory,
) -> Result<CapabilityRef, LoaderError> {
    let retry = inner.cfg.retry;
    let mut attempt: u32 = 0;
    let mut prev_delay: Option<Duration> = None;

    loop {
        attempt += 1;
        let started = Instant::now();
        let res = attempt_once(factory).await;
        let elapsed = started.elapsed();
        inner.record_attempt(name, elapsed, res.is_ok());

        let err = match res {
            Ok(instance) => {
                tracing::debug!(module = %name, attempt, elapsed_ms = elapsed.as_millis() as u64, "module loaded");
                inner.publish(
                    LoaderEvent::new(LoaderEventKind::Loaded)
                        .with_module(name)
                        .with_attempt(attempt)
                        .with_elapsed(elapsed),
                );
                return Ok(instance);
            }
            Err(e) => e,
        };

        let delay = if err.is_retryable() {
            retry.next_delay(attempt, prev_delay)
        } else {
            None
        };

        match delay {
            Some(delay) => {
                tracing::debug!(
                    module = %name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "load attempt failed, retrying"
                );
                inner.publish(
                    LoaderEvent::new(LoaderEventKind::RetryScheduled)
                        .with_module(name)
                        .with_attempt(attempt)
                        .with_delay(delay)
                        .with_reason(err.as_message()),
                );
                prev_delay = Some(delay);
                time::sleep(delay).await;
            }
            None => {
                tracing::warn!(module = %name, attempts = attempt, error = %err, "module failed to load");
                inner.publish(
                    LoaderEvent::new(LoaderEventKind::Failed)
                        .with_module(name)
                        .with_attempt(attempt)
                        .with_reason(err.as_message()),
                );
                return Err(LoaderError::LoadFailed {
                    name: name.to_string(),
                    attempts: attempt,
                    error: err,
                });
            }
        }
    }
}

/// Constructs and initialises one fresh instance.
async fn attempt_once(factory: &Factory) -> Result<CapabilityRef, CapabilityError> {
    let instance = match panic::catch_unwind(AssertUnwindSafe(|| factory())) {
        Ok(made) => made?,
        Err(payload) => {
            return Err(CapabilityError::Panicked {
                info: panic_message(payload.as_ref()),
            })
        }
    };

    match AssertUnwindSafe(instance.init()).catch_unwind().await {
        Ok(Ok(())) => Ok(instance),
        Ok(Err(e)) => Err(e),
        Err(payload) => Err(CapabilityError::Panicked {
            info: panic_message(payload.as_ref()),
        }),
    }
}
