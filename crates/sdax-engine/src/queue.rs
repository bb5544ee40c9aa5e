//! Ingest queue and worker pool.
//!
//! Handlers enqueue response bodies and return immediately; a small
//! pool of workers drains the queue and runs ingestion. The queue is
//! bounded and drops the oldest body on overflow: under load, losing a
//! stale body only delays dictionary convergence.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::Engine;

/// Default queue capacity.
pub const DEFAULT_CAPACITY: usize = 64;

/// Default worker count.
pub const DEFAULT_WORKERS: usize = 2;

#[derive(Debug, Default)]
struct QueueInner {
    bodies: VecDeque<Bytes>,
    closed: bool,
}

/// Bounded body queue with drop-oldest overflow.
#[derive(Debug)]
pub struct IngestQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
}

impl IngestQueue {
    /// Creates a queue holding at most `capacity` bodies.
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(QueueInner::default()),
            notify: Notify::new(),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
        })
    }

    /// Enqueues a body. Returns `false` when the queue was full and the
    /// oldest pending body was evicted to make room.
    pub fn push(&self, body: Bytes) -> bool {
        let evicted = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return false;
            }
            let evicted = if inner.bodies.len() >= self.capacity {
                inner.bodies.pop_front();
                true
            } else {
                false
            };
            inner.bodies.push_back(body);
            evicted
        };
        if evicted {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!("ingest queue full, dropped oldest body");
        }
        self.notify.notify_one();
        !evicted
    }

    /// Dequeues the next body, waiting if none is pending. Returns
    /// `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<Bytes> {
        loop {
            // Register interest before checking, so a push or close
            // landing in between cannot be missed.
            let mut notified = std::pin::pin!(self.notify.notified());
            notified.as_mut().enable();
            {
                let mut inner = self.inner.lock();
                if let Some(body) = inner.bodies.pop_front() {
                    return Some(body);
                }
                if inner.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Closes the queue; workers exit after draining what is left.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.notify.notify_waiters();
    }

    /// Bodies evicted due to overflow.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Pending bodies.
    pub fn len(&self) -> usize {
        self.inner.lock().bodies.len()
    }

    /// True when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Spawns `workers` tasks draining `queue` into `engine`.
///
/// Ingest failures are logged and dropped; there is no retry.
pub fn spawn_workers(
    engine: Arc<Engine>,
    queue: Arc<IngestQueue>,
    workers: usize,
) -> Vec<JoinHandle<()>> {
    (0..workers.max(1))
        .map(|worker| {
            let engine = engine.clone();
            let queue = queue.clone();
            tokio::spawn(async move {
                debug!(worker, "ingest worker started");
                while let Some(body) = queue.pop().await {
                    if let Err(error) = engine.ingest_body(&body) {
                        warn!(worker, %error, "ingest failed, body dropped");
                    }
                }
                debug!(worker, "ingest worker stopped");
            })
        })
        .collect()
}
