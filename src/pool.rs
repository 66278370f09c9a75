//! # Bounded async pool.
//!
//! [`async_pool`] drives a worker over a list of items with at most `limit`
//! worker futures unsettled at any time.
//!
//! ## Rules
//! - Results are returned in **input order**, whatever the completion order.
//! - A `limit` of `0` is treated as `1`.
//! - Workers are polled on the caller's task (no spawning); a worker that needs to
//!   outlive a dropped pool should spawn its own work.
//!
//! ```text
//! items:   [i0, i1, i2, i3, i4]        limit = 2
//! running:  i0 i1 → i1 i2 → i2 i3 → ...
//! results: [r0, r1, r2, r3, r4]
//! ```

use std::future::Future;

use futures::stream::{self, StreamExt};

/// Runs `worker` over every item with bounded concurrency; results follow input order.
///
/// # Example
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let doubled = capcore::async_pool(2, vec![1, 2, 3], |n| async move { n * 2 }).await;
/// assert_eq!(doubled, vec![2, 4, 6]);
/// # }
/// ```
pub async fn async_pool<I, T, F, Fut, R>(limit: usize, items: I, mut worker: F) -> Vec<R>
where
    I: IntoIterator<Item = T>,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = R>,
{
    let mut settled: Vec<(usize, R)> = stream::iter(items.into_iter().enumerate())
        .map(|(idx, item)| {
            let fut = worker(item);
            async move { (idx, fut.await) }
        })
        .buffer_unordered(limit.max(1))
        .collect()
        .await;

    settled.sort_unstable_by_key(|(idx, _)| *idx);
    settled.into_iter().map(|(_, r)| r).collect()
}
