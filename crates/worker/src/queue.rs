//! Bounded FIFO admission queue between the dispatcher and the workers.
//!
//! Backed by a bounded `tokio::sync::mpsc` channel. Producers wait up to
//! `enqueue_timeout` for a free slot and then give up with
//! [`QueueError::Full`]; consumers share the receiver behind an async mutex
//! so each queued job is handed to exactly one worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use runner_core::types::{DbId, Params, Timestamp};
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, Mutex};

/// Default number of jobs the queue holds before rejecting.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Default time a producer waits for a free slot.
pub const DEFAULT_ENQUEUE_TIMEOUT: Duration = Duration::from_secs(1);

/// A job waiting for a worker.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub job_id: DbId,
    pub project: String,
    pub params: Params,
    /// `received_at` of the stored row; later stamps never precede it.
    pub received_at: Timestamp,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue is full (capacity {capacity})")]
    Full { capacity: usize },

    #[error("queue is closed")]
    Closed,
}

pub struct AdmissionQueue {
    sender: mpsc::Sender<QueuedJob>,
    receiver: Arc<Mutex<mpsc::Receiver<QueuedJob>>>,
    capacity: usize,
    enqueue_timeout: Duration,
    closed: AtomicBool,
}

impl AdmissionQueue {
    /// Create a queue holding at most `capacity` jobs (minimum 1).
    pub fn new(capacity: usize, enqueue_timeout: Duration) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            capacity,
            enqueue_timeout,
            closed: AtomicBool::new(false),
        }
    }

    /// Append `job`, waiting up to the enqueue timeout for space.
    pub async fn enqueue(&self, job: QueuedJob) -> Result<(), QueueError> {
        if self.is_closed() {
            return Err(QueueError::Closed);
        }
        match self.sender.send_timeout(job, self.enqueue_timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(job)) => {
                tracing::warn!(
                    job_id = job.job_id,
                    capacity = self.capacity,
                    "Admission queue full",
                );
                Err(QueueError::Full {
                    capacity: self.capacity,
                })
            }
            Err(SendTimeoutError::Closed(_)) => Err(QueueError::Closed),
        }
    }

    /// Wait for the oldest queued job.
    ///
    /// Returns `None` only once the channel is closed and drained.
    pub async fn dequeue(&self) -> Option<QueuedJob> {
        let mut receiver = self.receiver.lock().await;
        receiver.recv().await
    }

    /// Stop accepting new jobs. Jobs already queued stay queued.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of jobs currently waiting.
    pub fn len(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::Utc;

    use super::*;

    fn job(id: DbId) -> QueuedJob {
        QueuedJob {
            job_id: id,
            project: "beta".to_string(),
            params: Params::new(),
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn jobs_come_out_in_arrival_order() {
        let queue = AdmissionQueue::new(10, Duration::from_millis(50));
        for id in 1..=5 {
            queue.enqueue(job(id)).await.unwrap();
        }
        assert_eq!(queue.len(), 5);

        let mut seen = Vec::new();
        while !queue.is_empty() {
            seen.push(queue.dequeue().await.unwrap().job_id);
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn full_queue_rejects_after_timeout() {
        let queue = AdmissionQueue::new(2, Duration::from_millis(20));
        queue.enqueue(job(1)).await.unwrap();
        queue.enqueue(job(2)).await.unwrap();

        let started = std::time::Instant::now();
        let err = queue.enqueue(job(3)).await.unwrap_err();
        assert_eq!(err, QueueError::Full { capacity: 2 });
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn waiting_producer_succeeds_when_slot_frees() {
        let queue = Arc::new(AdmissionQueue::new(1, Duration::from_secs(5)));
        queue.enqueue(job(1)).await.unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.enqueue(job(2)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(queue.dequeue().await.unwrap().job_id, 1);

        producer.await.unwrap().unwrap();
        assert_eq!(queue.dequeue().await.unwrap().job_id, 2);
    }

    #[tokio::test]
    async fn closed_queue_refuses_new_jobs() {
        let queue = AdmissionQueue::new(4, Duration::from_millis(20));
        queue.enqueue(job(1)).await.unwrap();
        queue.close();

        assert_eq!(queue.enqueue(job(2)).await.unwrap_err(), QueueError::Closed);
        assert_eq!(queue.dequeue().await.unwrap().job_id, 1);
    }

    #[tokio::test]
    async fn zero_capacity_is_raised_to_one() {
        let queue = AdmissionQueue::new(0, Duration::from_millis(10));
        assert_eq!(queue.capacity(), 1);
        queue.enqueue(job(1)).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn each_job_reaches_exactly_one_consumer() {
        let queue = Arc::new(AdmissionQueue::new(100, Duration::from_millis(50)));
        for id in 0..100 {
            queue.enqueue(job(id)).await.unwrap();
        }

        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move {
                    let mut got = Vec::new();
                    while let Ok(Some(job)) =
                        tokio::time::timeout(Duration::from_millis(100), queue.dequeue()).await
                    {
                        got.push(job.job_id);
                    }
                    got
                })
            })
            .collect();

        let mut all = Vec::new();
        for consumer in consumers {
            all.extend(consumer.await.unwrap());
        }
        let unique: HashSet<_> = all.iter().copied().collect();
        assert_eq!(all.len(), 100);
        assert_eq!(unique.len(), 100);
    }
}
