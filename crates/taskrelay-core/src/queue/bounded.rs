//! Bounded task queue.
//!
//! Design:
//! - A tokio `mpsc` channel of fixed capacity is the buffer. Its capacity
//!   is the only backpressure: `enqueue` suspends while it is full.
//! - The receiver is shared by the workers; every record is received by
//!   exactly one of them.
//! - Closing drops the queue's sender, so workers see the end of the
//!   channel only after every buffered record has been handed out.
//!
//! # close の挙動
//! - ワーカー起動済み: バッファを流し切ってから join
//! - 未起動: 残ったレコードを呼び出し側へ返す（Error にするのは orchestrator）

use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::pool::{SharedReceiver, WorkerPool};
use super::{QueueError, TaskHandler};
use crate::domain::TaskRecord;

enum PoolState {
    /// No workers yet.
    Idle,
    Running(WorkerPool),
    /// `close()` has begun; the flag flips to true once the workers are gone.
    Closed(watch::Receiver<bool>),
}

pub struct TaskQueue {
    capacity: usize,
    /// `None` once the queue is closed.
    sender: Mutex<Option<mpsc::Sender<TaskRecord>>>,
    receiver: SharedReceiver,
    /// Records sent but not yet received. Advisory; may briefly dip below
    /// zero while a send and a receive race, which `size()` hides.
    buffered: Arc<AtomicIsize>,
    pool: Mutex<PoolState>,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::ZeroCapacity);
        }
        let (tx, rx) = mpsc::channel(capacity);
        Ok(Self {
            capacity,
            sender: Mutex::new(Some(tx)),
            receiver: Arc::new(tokio::sync::Mutex::new(rx)),
            buffered: Arc::new(AtomicIsize::new(0)),
            pool: Mutex::new(PoolState::Idle),
        })
    }

    /// Admit one task. Suspends while the buffer is full.
    ///
    /// Fails with `QueueError::Closed` once `close()` has started, instead
    /// of blocking forever.
    pub async fn enqueue(&self, task: TaskRecord) -> Result<(), QueueError> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(QueueError::Closed)?;

        let task_id = task.id;
        sender.send(task).await.map_err(|_| QueueError::Closed)?;
        // Counted while `sender` is still alive, so the channel cannot be
        // seen as finished before this increment lands.
        self.buffered.fetch_add(1, Ordering::SeqCst);
        debug!(%task_id, "task enqueued");
        Ok(())
    }

    /// Launch `worker_count` workers, each running `handler` on one task at
    /// a time. Allowed once; a second call fails with `AlreadyStarted`
    /// rather than starting a second pool on the same buffer.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn start(
        &self,
        worker_count: usize,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<(), QueueError> {
        if worker_count == 0 {
            return Err(QueueError::NoWorkers);
        }
        let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        match &*pool {
            PoolState::Idle => {}
            PoolState::Running(_) => return Err(QueueError::AlreadyStarted),
            PoolState::Closed(_) => return Err(QueueError::Closed),
        }

        let workers = WorkerPool::spawn(
            worker_count,
            Arc::clone(&self.receiver),
            Arc::clone(&self.buffered),
            handler,
        );
        info!(workers = workers.len(), capacity = self.capacity, "worker pool started");
        *pool = PoolState::Running(workers);
        Ok(())
    }

    /// Advisory only: may be stale by the time the caller looks at it.
    pub fn size(&self) -> usize {
        self.buffered.load(Ordering::SeqCst).max(0) as usize
    }

    /// Advisory only, see `size()`.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// `close()` has completed: no worker is left and no handler runs, so
    /// nothing will change a task's status through this queue any more.
    pub fn is_finished(&self) -> bool {
        match &*self.pool.lock().unwrap_or_else(PoisonError::into_inner) {
            PoolState::Closed(done) => *done.borrow(),
            _ => false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Stop admitting tasks, let the workers drain the buffer, and wait for
    /// all of them to exit. In-flight handlers are not cancelled.
    ///
    /// Safe to call more than once; later callers wait for the first close
    /// to finish. If the pool was never started there is nobody to drain the
    /// buffer: the call returns at once and hands the leftover tasks back
    /// to the caller. Otherwise the returned list is empty.
    pub async fn close(&self) -> Vec<TaskRecord> {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let (done_tx, done_rx) = watch::channel(false);
        let previous = {
            let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
            if let PoolState::Closed(rx) = &*pool {
                Err(rx.clone())
            } else {
                Ok(std::mem::replace(&mut *pool, PoolState::Closed(done_rx)))
            }
        };

        match previous {
            Err(mut already_closing) => {
                // ignore error: sender dropped means close finished anyway
                let _ = already_closing.wait_for(|done| *done).await;
                Vec::new()
            }
            Ok(PoolState::Running(workers)) => {
                workers.join().await;
                info!("worker pool drained and stopped");
                let _ = done_tx.send(true);
                Vec::new()
            }
            Ok(PoolState::Idle) => {
                // No consumer will ever come; make pending senders fail fast
                // and take back what is already buffered.
                let mut rx = self.receiver.lock().await;
                rx.close();
                let mut left = Vec::new();
                while let Ok(task) = rx.try_recv() {
                    self.buffered.fetch_sub(1, Ordering::SeqCst);
                    left.push(task);
                }
                drop(rx);
                if !left.is_empty() {
                    warn!(left = left.len(), "queue closed before workers were started");
                }
                let _ = done_tx.send(true);
                left
            }
            Ok(PoolState::Closed(_)) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskId, TaskSpec};
    use crate::queue::FnHandler;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::time::timeout;

    fn task(id: i64) -> TaskRecord {
        TaskRecord::from_spec(TaskSpec::new("GET", "https://example.com"))
            .with_id(TaskId::new(id))
    }

    /// Handler that records every task id it sees.
    fn recording_handler(
        seen: Arc<tokio::sync::Mutex<Vec<i64>>>,
        delay: Duration,
    ) -> Arc<dyn TaskHandler> {
        Arc::new(FnHandler(move |task: TaskRecord| {
            let seen = Arc::clone(&seen);
            async move {
                tokio::time::sleep(delay).await;
                seen.lock().await.push(task.id.get());
            }
        }))
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(TaskQueue::new(0), Err(QueueError::ZeroCapacity)));
    }

    #[tokio::test]
    async fn new_queue_is_empty() {
        let queue = TaskQueue::new(10).unwrap();
        assert!(queue.is_empty());
        assert_eq!(queue.size(), 0);
        assert_eq!(queue.capacity(), 10);
    }

    #[tokio::test]
    async fn enqueue_counts_until_dequeued() {
        let queue = TaskQueue::new(10).unwrap();
        queue.enqueue(task(1)).await.unwrap();
        queue.enqueue(task(2)).await.unwrap();
        assert_eq!(queue.size(), 2);
        assert!(!queue.is_empty());

        let seen = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        queue
            .start(1, recording_handler(Arc::clone(&seen), Duration::ZERO))
            .unwrap();
        queue.close().await;

        assert!(queue.is_empty());
        // one worker: FIFO
        assert_eq!(*seen.lock().await, vec![1, 2]);
    }

    #[tokio::test]
    async fn enqueue_blocks_when_full_until_a_worker_takes_one() {
        let queue = Arc::new(TaskQueue::new(2).unwrap());
        queue.enqueue(task(1)).await.unwrap();
        queue.enqueue(task(2)).await.unwrap();

        let q = Arc::clone(&queue);
        let mut third = tokio::spawn(async move { q.enqueue(task(3)).await });

        assert!(
            timeout(Duration::from_millis(100), &mut third).await.is_err(),
            "enqueue should block while the buffer is full"
        );
        assert_eq!(queue.size(), 2);

        let seen = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        queue
            .start(1, recording_handler(Arc::clone(&seen), Duration::ZERO))
            .unwrap();

        timeout(Duration::from_secs(1), third)
            .await
            .expect("third enqueue should unblock once a task is taken")
            .unwrap()
            .unwrap();

        queue.close().await;
        assert_eq!(*seen.lock().await, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn every_task_is_handled_exactly_once() {
        let queue = Arc::new(TaskQueue::new(8).unwrap());
        let seen = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        queue
            .start(4, recording_handler(Arc::clone(&seen), Duration::from_millis(1)))
            .unwrap();

        let mut producers = Vec::new();
        for chunk in 0..4 {
            let q = Arc::clone(&queue);
            producers.push(tokio::spawn(async move {
                for i in 0..25 {
                    q.enqueue(task(chunk * 25 + i + 1)).await.unwrap();
                }
            }));
        }
        for p in producers {
            p.await.unwrap();
        }
        queue.close().await;

        let mut ids = seen.lock().await.clone();
        ids.sort_unstable();
        assert_eq!(ids, (1..=100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn close_waits_for_buffered_and_in_flight_tasks() {
        let queue = TaskQueue::new(10).unwrap();
        let active = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));

        let handler = {
            let active = Arc::clone(&active);
            let finished = Arc::clone(&finished);
            Arc::new(FnHandler(move |_task: TaskRecord| {
                let active = Arc::clone(&active);
                let finished = Arc::clone(&finished);
                async move {
                    active.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    finished.fetch_add(1, Ordering::SeqCst);
                }
            }))
        };

        queue.start(2, handler).unwrap();
        for i in 1..=5 {
            queue.enqueue(task(i)).await.unwrap();
        }
        queue.close().await;

        assert_eq!(finished.load(Ordering::SeqCst), 5);
        assert_eq!(active.load(Ordering::SeqCst), 0);
        assert_eq!(queue.size(), 0);
    }

    #[tokio::test]
    async fn enqueue_after_close_fails_fast() {
        let queue = TaskQueue::new(1).unwrap();
        queue
            .start(1, Arc::new(FnHandler(|_task: TaskRecord| async {})))
            .unwrap();
        queue.close().await;

        assert!(queue.is_closed());
        let result = timeout(Duration::from_millis(100), queue.enqueue(task(1)))
            .await
            .expect("enqueue on a closed queue must not block");
        assert_eq!(result, Err(QueueError::Closed));
    }

    #[tokio::test]
    async fn blocked_enqueue_fails_when_closed_without_workers() {
        let queue = Arc::new(TaskQueue::new(1).unwrap());
        queue.enqueue(task(1)).await.unwrap();

        let q = Arc::clone(&queue);
        let blocked = tokio::spawn(async move { q.enqueue(task(2)).await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        queue.close().await;
        let result = timeout(Duration::from_secs(1), blocked)
            .await
            .expect("pending enqueue should be released by close")
            .unwrap();
        assert_eq!(result, Err(QueueError::Closed));
    }

    #[tokio::test]
    async fn close_without_workers_hands_back_buffered_tasks() {
        let queue = TaskQueue::new(4).unwrap();
        queue.enqueue(task(1)).await.unwrap();
        queue.enqueue(task(2)).await.unwrap();

        let left: Vec<i64> = queue.close().await.iter().map(|t| t.id.get()).collect();
        assert_eq!(left, vec![1, 2]);
        assert!(queue.is_empty());
        assert!(queue.is_finished());
        assert!(queue.close().await.is_empty());
    }

    #[tokio::test]
    async fn finished_only_after_close_joined_the_workers() {
        let queue = Arc::new(TaskQueue::new(4).unwrap());
        let seen = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        queue
            .start(1, recording_handler(Arc::clone(&seen), Duration::from_millis(100)))
            .unwrap();
        queue.enqueue(task(1)).await.unwrap();
        assert!(!queue.is_finished());

        let q = Arc::clone(&queue);
        let closing = tokio::spawn(async move { q.close().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(queue.is_closed());
        assert!(!queue.is_finished(), "handler still running");

        closing.await.unwrap();
        assert!(queue.is_finished());
        assert_eq!(*seen.lock().await, vec![1]);
    }

    #[tokio::test]
    async fn start_is_allowed_once() {
        let queue = TaskQueue::new(1).unwrap();
        let handler: Arc<dyn TaskHandler> = Arc::new(FnHandler(|_task: TaskRecord| async {}));

        assert_eq!(queue.start(0, Arc::clone(&handler)), Err(QueueError::NoWorkers));
        queue.start(1, Arc::clone(&handler)).unwrap();
        assert_eq!(
            queue.start(1, Arc::clone(&handler)),
            Err(QueueError::AlreadyStarted)
        );

        queue.close().await;
        assert_eq!(queue.start(1, handler), Err(QueueError::Closed));
    }

    #[tokio::test]
    async fn close_twice_is_harmless() {
        let queue = TaskQueue::new(1).unwrap();
        queue
            .start(1, Arc::new(FnHandler(|_task: TaskRecord| async {})))
            .unwrap();
        queue.close().await;
        queue.close().await;
        assert!(queue.is_closed());
    }

    #[tokio::test]
    async fn panicking_handler_does_not_kill_the_worker() {
        let queue = TaskQueue::new(4).unwrap();
        let seen = Arc::new(tokio::sync::Mutex::new(Vec::new()));

        let handler = {
            let seen = Arc::clone(&seen);
            Arc::new(FnHandler(move |task: TaskRecord| {
                let seen = Arc::clone(&seen);
                async move {
                    if task.id.get() == 1 {
                        panic!("boom");
                    }
                    seen.lock().await.push(task.id.get());
                }
            }))
        };

        queue.start(1, handler).unwrap();
        for i in 1..=3 {
            queue.enqueue(task(i)).await.unwrap();
        }
        queue.close().await;

        assert_eq!(*seen.lock().await, vec![2, 3]);
    }
}
