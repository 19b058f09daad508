//! Batch partitioning and fan-out/fan-in task groups.
//!
//! Both coordinators process artifacts in fixed-size batches. Inside a
//! batch every `(artifact, role)` pair becomes one future in a
//! [`TaskGroup`]; [`TaskGroup::settle`] drives all of them on the calling
//! task and returns one [`Settled`] per future, success or failure. A
//! failing future never cancels its siblings.

use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};

/// Split `items` into consecutive batches of at most `size` elements.
/// A size of zero is treated as one.
pub fn partition<T>(items: &[T], size: usize) -> std::slice::Chunks<'_, T> {
    items.chunks(size.max(1))
}

/// Number of batches [`partition`] yields.
pub fn batch_count(len: usize, size: usize) -> usize {
    len.div_ceil(size.max(1))
}

/// What one batch contained, for summaries and logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRecord {
    /// Zero-based position in the run.
    pub index: usize,
    pub artifacts: Vec<String>,
    pub elapsed_ms: u64,
}

impl BatchRecord {
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

/// Outcome of one task in a group.
#[derive(Debug)]
pub struct Settled<K, T> {
    pub key: K,
    pub result: anyhow::Result<T>,
    pub elapsed: Duration,
}

/// A set of keyed futures that are awaited together.
pub struct TaskGroup<'a, K, T> {
    tasks: Vec<(K, BoxFuture<'a, anyhow::Result<T>>)>,
}

impl<'a, K, T> TaskGroup<'a, K, T>
where
    K: Send + 'a,
    T: Send + 'a,
{
    pub fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    /// Add a task. Nothing runs until [`settle`](Self::settle).
    pub fn spawn<F>(&mut self, key: K, task: F)
    where
        F: Future<Output = anyhow::Result<T>> + Send + 'a,
    {
        self.tasks.push((key, task.boxed()));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Run every task concurrently and wait for all of them.
    /// Results come back in spawn order.
    pub async fn settle(self) -> Vec<Settled<K, T>> {
        let timed = self.tasks.into_iter().map(|(key, task)| async move {
            let started = Instant::now();
            let result = task.await;
            Settled {
                key,
                result,
                elapsed: started.elapsed(),
            }
        });
        join_all(timed).await
    }
}

impl<'a, K, T> Default for TaskGroup<'a, K, T>
where
    K: Send + 'a,
    T: Send + 'a,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn partition_sizes() {
        let items: Vec<u32> = (0..7).collect();
        let sizes: Vec<usize> = partition(&items, 3).map(|b| b.len()).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(batch_count(7, 3), 3);
        assert_eq!(batch_count(6, 3), 2);
        assert_eq!(batch_count(0, 3), 0);
        assert_eq!(partition(&items, 0).count(), 7);
    }

    #[tokio::test]
    async fn settle_keeps_spawn_order_and_failures() {
        let mut group = TaskGroup::new();
        for i in 0..4u64 {
            group.spawn(i, async move {
                // Later tasks finish first.
                tokio::time::sleep(Duration::from_millis(20 - i * 5)).await;
                if i == 2 {
                    anyhow::bail!("task {i} failed");
                }
                Ok(i * 10)
            });
        }
        assert_eq!(group.len(), 4);

        let settled = group.settle().await;
        let keys: Vec<u64> = settled.iter().map(|s| s.key).collect();
        assert_eq!(keys, vec![0, 1, 2, 3]);
        assert_eq!(*settled[3].result.as_ref().unwrap(), 30);
        assert!(settled[2].result.is_err());
        assert!(settled.iter().filter(|s| s.result.is_ok()).count() == 3);
    }

    #[tokio::test]
    async fn tasks_run_concurrently() {
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let mut group = TaskGroup::new();
        for i in 0..5 {
            let in_flight = &in_flight;
            let peak = &peak;
            group.spawn(i, async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            });
        }
        group.settle().await;
        assert_eq!(peak.load(Ordering::SeqCst), 5);
    }
}
