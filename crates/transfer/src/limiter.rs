//! Bounded-parallelism executor.
//!
//! [`run_limited`] starts the first `width` producers, and every time one of
//! the in-flight futures settles it immediately starts the next producer
//! that has not run yet. A failing task (any `T`, including `Err`) does not
//! affect its siblings; the caller decides what a failure means for the
//! batch.

use std::future::Future;

use futures_util::stream::{FuturesUnordered, StreamExt};

/// Runs every producer to completion with at most `width` futures pending.
///
/// Each producer is called exactly once. Results are returned in producer
/// order, independent of completion order. A `width` of 0 is treated as 1.
///
/// There is no cancel primitive: producers that should not run after a
/// pause must check their own cancellation before doing any work.
pub async fn run_limited<P, Fut, T>(producers: impl IntoIterator<Item = P>, width: usize) -> Vec<T>
where
    P: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    let width = width.max(1);
    let producers: Vec<P> = producers.into_iter().collect();
    let mut results: Vec<Option<T>> = std::iter::repeat_with(|| None)
        .take(producers.len())
        .collect();

    let mut queue = producers.into_iter().enumerate();
    let mut in_flight = FuturesUnordered::new();

    for (index, producer) in queue.by_ref().take(width) {
        in_flight.push(start(index, producer));
    }

    while let Some((index, output)) = in_flight.next().await {
        results[index] = Some(output);
        if let Some((next, producer)) = queue.next() {
            in_flight.push(start(next, producer));
        }
    }

    // Every slot was filled exactly once above.
    results.into_iter().flatten().collect()
}

fn start<P, Fut, T>(index: usize, producer: P) -> impl Future<Output = (usize, T)>
where
    P: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    async move { (index, producer().await) }
}
