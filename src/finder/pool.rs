//! Bounded fan-out over scan candidates with in-order fan-in.

use futures::stream::{self, Stream, StreamExt};
use std::future::Future;

/// Runs at most `limit` tasks at a time. Results come back in the order the
/// items were given, each as soon as it and every earlier item are done.
#[derive(Debug, Clone, Copy)]
pub struct ScanPool {
    limit: usize,
}

impl ScanPool {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Yields `(index, output)` pairs in input order. Dropping the stream
    /// cancels every task still in flight.
    pub fn run_ordered<'a, T, R, F, Fut>(
        &self,
        items: Vec<T>,
        mut task: F,
    ) -> impl Stream<Item = (usize, R)> + 'a
    where
        T: 'a,
        F: FnMut(T) -> Fut + 'a,
        Fut: Future<Output = R> + 'a,
        R: 'a,
    {
        stream::iter(items.into_iter().enumerate())
            .map(move |(index, item)| {
                let pending = task(item);
                async move { (index, pending.await) }
            })
            .buffered(self.limit)
    }
}
