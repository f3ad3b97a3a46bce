//! Bounded handoff queue between reader workers and the orchestrator
//!
//! Finished shard paths flow through a bounded channel. When the
//! orchestrator falls behind, producers block on the full channel; the
//! capacity is therefore a hard bound on completed-but-unconsumed
//! shards. End of production is signalled by the channel closing once
//! every producer handle has been dropped, which gives the consumer a
//! single happens-before edge instead of a shared "finished" flag.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Statistics for the handoff queue
#[derive(Debug, Default)]
pub struct HandoffStats {
    /// Shard paths published by reader workers
    pub published: AtomicU64,

    /// Shard paths drained by the consumer
    pub drained: AtomicU64,
}

/// Bounded queue of finished shard paths
pub struct ShardQueue {
    sender: Sender<PathBuf>,
    receiver: Receiver<PathBuf>,
    capacity: usize,
    stats: Arc<HandoffStats>,
}

impl ShardQueue {
    /// Create a queue bounding in-flight shards to `capacity`
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
            stats: Arc::new(HandoffStats::default()),
        }
    }

    /// Producer handle; clone one per reader worker
    ///
    /// Production ends when every `ShardSender` (and the queue itself)
    /// has been dropped.
    pub fn sender(&self) -> ShardSender {
        ShardSender {
            sender: self.sender.clone(),
            stats: Arc::clone(&self.stats),
        }
    }

    /// Consumer handle for the orchestrator
    pub fn stream(&self) -> ShardStream {
        ShardStream {
            receiver: self.receiver.clone(),
            stats: Arc::clone(&self.stats),
        }
    }

    /// Queue capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Shards currently waiting to be drained
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// True when no shards are waiting
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Queue statistics
    pub fn stats(&self) -> Arc<HandoffStats> {
        Arc::clone(&self.stats)
    }
}

/// Producer handle held by one reader worker
#[derive(Clone)]
pub struct ShardSender {
    sender: Sender<PathBuf>,
    stats: Arc<HandoffStats>,
}

impl ShardSender {
    /// Publish a finished shard, blocking while the queue is full
    ///
    /// Returns `Err` only when the consumer side is gone, which means
    /// the run has been abandoned.
    pub fn publish(&self, path: PathBuf) -> Result<(), ()> {
        self.sender.send(path).map_err(|_| ())?;
        self.stats.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Publish without blocking
    ///
    /// Returns `Ok(false)` when the queue is at capacity.
    pub fn try_publish(&self, path: PathBuf) -> Result<bool, ()> {
        match self.sender.try_send(path) {
            Ok(()) => {
                self.stats.published.fetch_add(1, Ordering::Relaxed);
                Ok(true)
            }
            Err(TrySendError::Full(_)) => Ok(false),
            Err(TrySendError::Disconnected(_)) => Err(()),
        }
    }
}

/// Consumer handle draining finished shards in batches
pub struct ShardStream {
    receiver: Receiver<PathBuf>,
    stats: Arc<HandoffStats>,
}

impl ShardStream {
    /// Receive up to `max` newly finished shard paths
    ///
    /// Blocks until at least one path is available, then drains whatever
    /// else is immediately ready. Returns `None` once production has
    /// ended and the queue is empty; this is the orchestrator's only
    /// end-of-input signal.
    pub fn recv_batch(&self, max: usize) -> Option<Vec<PathBuf>> {
        let max = max.max(1);
        let first = self.receiver.recv().ok()?;

        let mut batch = Vec::with_capacity(max);
        batch.push(first);
        while batch.len() < max {
            match self.receiver.try_recv() {
                Ok(path) => batch.push(path),
                Err(_) => break,
            }
        }

        self.stats
            .drained
            .fetch_add(batch.len() as u64, Ordering::Relaxed);
        Some(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_capacity_bounds_unconsumed_shards() {
        let queue = ShardQueue::new(2);
        let sender = queue.sender();

        assert!(sender.try_publish(PathBuf::from("a.db")).unwrap());
        assert!(sender.try_publish(PathBuf::from("b.db")).unwrap());

        // Queue full: producers must block rather than drop
        assert!(!sender.try_publish(PathBuf::from("c.db")).unwrap());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_blocked_producer_resumes_after_drain() {
        let queue = ShardQueue::new(1);
        let sender = queue.sender();
        let stream = queue.stream();

        sender.publish(PathBuf::from("a.db")).unwrap();

        let producer = thread::spawn(move || sender.publish(PathBuf::from("b.db")));
        thread::sleep(Duration::from_millis(20));

        let batch = stream.recv_batch(1).unwrap();
        assert_eq!(batch, vec![PathBuf::from("a.db")]);

        producer.join().unwrap().unwrap();
        let batch = stream.recv_batch(1).unwrap();
        assert_eq!(batch, vec![PathBuf::from("b.db")]);
    }

    #[test]
    fn test_recv_batch_drains_up_to_max() {
        let queue = ShardQueue::new(8);
        let sender = queue.sender();
        for name in ["a.db", "b.db", "c.db"] {
            sender.publish(PathBuf::from(name)).unwrap();
        }

        let stream = queue.stream();
        let batch = stream.recv_batch(2).unwrap();
        assert_eq!(batch.len(), 2);

        let batch = stream.recv_batch(2).unwrap();
        assert_eq!(batch, vec![PathBuf::from("c.db")]);
    }

    #[test]
    fn test_closed_and_drained_queue_ends_stream() {
        let queue = ShardQueue::new(4);
        let sender = queue.sender();
        sender.publish(PathBuf::from("a.db")).unwrap();

        let stream = queue.stream();
        drop(sender);
        drop(queue);

        assert_eq!(stream.recv_batch(4), Some(vec![PathBuf::from("a.db")]));
        assert_eq!(stream.recv_batch(4), None);
    }
}
