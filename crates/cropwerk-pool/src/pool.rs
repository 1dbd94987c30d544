// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bounded worker pool for compositing tasks.
//
// Tasks wait in a FIFO queue and are handed to worker slots, which are created
// lazily up to the configured concurrency. Each task runs on Tokio's blocking
// thread pool and owns everything it touches, so tasks never coordinate with
// each other. A task that returns an error fails alone; a task that panics
// also retires its worker slot, which is replaced on the next dispatch.
//
// The pool is an explicit handle: create one per run (or share one between
// runs deliberately) and pass it to whoever dispatches work.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cropwerk_core::error::{CropwerkError, Result};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinError;
use tracing::{debug, info, warn};

type Job<T> = Box<dyn FnOnce() -> Result<T> + Send + 'static>;

/// Point-in-time view of the pool, published on every state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    pub concurrency: usize,
    /// Tasks waiting for a worker.
    pub queued: usize,
    /// Tasks currently running.
    pub active: usize,
    /// Worker slots in existence, busy or idle.
    pub workers: usize,
    pub completed: u64,
    pub failed: u64,
    /// Worker slots recreated after a worker failure.
    pub respawned: u64,
}

impl PoolStats {
    pub fn is_idle(&self) -> bool {
        self.queued == 0 && self.active == 0
    }
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

struct QueuedTask<T> {
    id: u64,
    job: Job<T>,
    reply: oneshot::Sender<Result<T>>,
}

struct Worker {
    id: u32,
    busy: bool,
}

struct PoolState<T> {
    concurrency: usize,
    queue: VecDeque<QueuedTask<T>>,
    workers: Vec<Worker>,
    next_task_id: u64,
    next_worker_id: u32,
    /// Slots lost to worker failures and not yet replaced.
    retired: usize,
    completed: u64,
    failed: u64,
    respawned: u64,
}

impl<T> PoolState<T> {
    fn new(concurrency: usize) -> Self {
        Self {
            concurrency,
            queue: VecDeque::new(),
            workers: Vec::new(),
            next_task_id: 0,
            next_worker_id: 0,
            retired: 0,
            completed: 0,
            failed: 0,
            respawned: 0,
        }
    }

    fn active(&self) -> usize {
        self.workers.iter().filter(|w| w.busy).count()
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            concurrency: self.concurrency,
            queued: self.queue.len(),
            active: self.active(),
            workers: self.workers.len(),
            completed: self.completed,
            failed: self.failed,
            respawned: self.respawned,
        }
    }

    /// Index of an idle worker, creating one if every existing worker is busy.
    fn idle_worker(&mut self) -> usize {
        if let Some(slot) = self.workers.iter().position(|w| !w.busy) {
            return slot;
        }
        let id = self.next_worker_id;
        self.next_worker_id += 1;
        if self.retired > 0 {
            self.retired -= 1;
            self.respawned += 1;
            info!(worker = id, "respawning retired worker slot");
        } else {
            debug!(worker = id, "worker slot created");
        }
        self.workers.push(Worker { id, busy: false });
        self.workers.len() - 1
    }

    /// Drop idle workers above the concurrency limit.
    fn shed_idle_workers(&mut self) {
        while self.workers.len() > self.concurrency {
            match self.workers.iter().position(|w| !w.busy) {
                Some(slot) => {
                    let worker = self.workers.remove(slot);
                    debug!(worker = worker.id, "idle worker slot shed");
                }
                None => break,
            }
        }
    }

    /// Record the outcome of a task and free (or retire) its worker.
    fn finish(
        &mut self,
        worker_id: u32,
        task: u64,
        outcome: std::result::Result<Result<T>, String>,
    ) -> Result<T> {
        let slot = self.workers.iter().position(|w| w.id == worker_id);
        match outcome {
            Ok(Ok(value)) => {
                self.completed += 1;
                self.release(slot);
                Ok(value)
            }
            Ok(Err(err)) => {
                self.failed += 1;
                debug!(task, worker = worker_id, error = %err, "task failed");
                self.release(slot);
                Err(err)
            }
            Err(failure) => {
                self.failed += 1;
                if let Some(slot) = slot {
                    self.workers.remove(slot);
                }
                self.retired += 1;
                warn!(task, worker = worker_id, %failure, "worker failed; slot retired");
                Err(CropwerkError::Pool(format!(
                    "worker {worker_id} failed while running task {task}: {failure}"
                )))
            }
        }
    }

    fn release(&mut self, slot: Option<usize>) {
        let Some(slot) = slot else { return };
        if self.workers.len() > self.concurrency {
            self.workers.remove(slot);
        } else {
            self.workers[slot].busy = false;
        }
    }
}

struct Inner<T> {
    state: Mutex<PoolState<T>>,
    stats: watch::Sender<PoolStats>,
    runtime: Handle,
}

impl<T: Send + 'static> Inner<T> {
    fn lock(&self) -> MutexGuard<'_, PoolState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &PoolState<T>) {
        self.stats.send_replace(state.stats());
    }

    /// Hand queued tasks to workers while there is room under the limit.
    fn dispatch(self: &Arc<Self>, state: &mut PoolState<T>) {
        while !state.queue.is_empty() && state.active() < state.concurrency {
            let slot = state.idle_worker();
            let Some(task) = state.queue.pop_front() else {
                break;
            };
            let worker = &mut state.workers[slot];
            worker.busy = true;
            let worker_id = worker.id;
            debug!(task = task.id, worker = worker_id, "task dispatched");

            let inner = Arc::clone(self);
            self.runtime.spawn(inner.run(worker_id, task));
        }
        self.publish(state);
    }

    async fn run(self: Arc<Self>, worker_id: u32, task: QueuedTask<T>) {
        let QueuedTask { id, job, reply } = task;
        let outcome = tokio::task::spawn_blocking(job)
            .await
            .map_err(failure_message);

        let result = {
            let mut state = self.lock();
            let result = state.finish(worker_id, id, outcome);
            self.dispatch(&mut state);
            result
        };

        if reply.send(result).is_err() {
            debug!(task = id, "task handle dropped before completion");
        }
    }
}

fn failure_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    panic_text(&*payload)
}

fn panic_text(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panic with non-string payload".to_owned()
    }
}

// ---------------------------------------------------------------------------
// Public handle
// ---------------------------------------------------------------------------

/// Handle to a bounded worker pool. Clones share the same pool.
pub struct WorkerPool<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for WorkerPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Create a pool on the current Tokio runtime. A concurrency of zero is
    /// treated as one.
    pub fn new(concurrency: usize) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|err| {
            CropwerkError::Pool(format!("worker pool requires a Tokio runtime: {err}"))
        })?;
        let state = PoolState::new(concurrency.max(1));
        let (stats, _) = watch::channel(state.stats());
        info!(concurrency = state.concurrency, "worker pool created");
        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                stats,
                runtime,
            }),
        })
    }

    /// Queue a job. Returns immediately; the job starts as soon as a worker
    /// is free and every earlier job has started.
    pub fn enqueue<F>(&self, job: F) -> TaskHandle<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        let mut state = self.inner.lock();
        let id = state.next_task_id;
        state.next_task_id += 1;
        state.queue.push_back(QueuedTask {
            id,
            job: Box::new(job),
            reply,
        });
        debug!(task = id, queued = state.queue.len(), "task enqueued");
        self.inner.dispatch(&mut state);
        TaskHandle { id, rx }
    }

    /// Queue a job and wait for its result.
    pub async fn submit<F>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        self.enqueue(job).join().await
    }

    /// Change the concurrency limit (minimum one). Running tasks are not
    /// affected; the new limit applies from the next dispatch.
    pub fn set_concurrency(&self, concurrency: usize) {
        let concurrency = concurrency.max(1);
        let mut state = self.inner.lock();
        if state.concurrency != concurrency {
            info!(from = state.concurrency, to = concurrency, "pool concurrency changed");
            state.concurrency = concurrency;
        }
        state.shed_idle_workers();
        self.inner.dispatch(&mut state);
    }

    pub fn concurrency(&self) -> usize {
        self.inner.lock().concurrency
    }

    /// Drop every task that has not started yet. Their handles resolve to
    /// `CropwerkError::Cancelled`. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let dropped: Vec<QueuedTask<T>> = {
            let mut state = self.inner.lock();
            let dropped = state.queue.drain(..).collect();
            self.inner.publish(&state);
            dropped
        };
        let count = dropped.len();
        for task in dropped {
            // A dropped handle means nobody is waiting for this task.
            let _ = task.reply.send(Err(CropwerkError::Cancelled));
        }
        if count > 0 {
            info!(count, "queued tasks cleared");
        }
        count
    }

    /// Resolve once nothing is queued and nothing is running.
    pub async fn on_idle(&self) {
        let mut rx = self.inner.stats.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(PoolStats::is_idle).await;
    }

    pub fn stats(&self) -> PoolStats {
        *self.inner.stats.borrow()
    }

    /// Receiver that observes every published `PoolStats`.
    pub fn subscribe(&self) -> watch::Receiver<PoolStats> {
        self.inner.stats.subscribe()
    }
}

/// Pending result of an enqueued job.
#[derive(Debug)]
pub struct TaskHandle<T> {
    id: u64,
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> TaskHandle<T> {
    /// Sequence number assigned at enqueue time.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn join(self) -> Result<T> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(CropwerkError::Pool(format!(
                "task {} was dropped by the pool",
                self.id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn sleep_ms(ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }

    #[test]
    fn new_outside_runtime_is_a_pool_error() {
        let result = WorkerPool::<u32>::new(2);
        assert!(matches!(result, Err(CropwerkError::Pool(_))));
    }

    #[tokio::test]
    async fn submit_returns_job_value() {
        let pool = WorkerPool::new(2).expect("pool");
        assert_eq!(pool.submit(|| Ok(21 * 2)).await.expect("job"), 42);
    }

    #[tokio::test]
    async fn single_worker_runs_in_fifo_order() {
        let pool = WorkerPool::new(1).expect("pool");
        let order = Arc::new(Mutex::new(Vec::new()));
        let handles: Vec<_> = (0..10)
            .map(|i| {
                let order = Arc::clone(&order);
                pool.enqueue(move || {
                    order.lock().expect("order lock").push(i);
                    Ok(i)
                })
            })
            .collect();
        for handle in handles {
            handle.join().await.expect("job");
        }
        assert_eq!(*order.lock().expect("order lock"), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn never_exceeds_concurrency() {
        let pool = WorkerPool::new(2).expect("pool");
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.enqueue(move || {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                sleep_ms(10);
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            });
        }
        pool.on_idle().await;
        assert!(peak.load(Ordering::SeqCst) <= 2);
        let stats = pool.stats();
        assert_eq!(stats.completed, 8);
        assert!(stats.workers <= 2);
    }

    #[tokio::test]
    async fn failing_job_does_not_affect_siblings() {
        let pool = WorkerPool::new(4).expect("pool");
        let handles: Vec<_> = (1..=50u32)
            .map(|n| {
                pool.enqueue(move || {
                    if n == 7 {
                        Err(CropwerkError::Compositing("task 7 refused".into()))
                    } else {
                        Ok(n)
                    }
                })
            })
            .collect();
        let mut ok = 0;
        for (i, handle) in handles.into_iter().enumerate() {
            match handle.join().await {
                Ok(n) => {
                    assert_eq!(n as usize, i + 1);
                    ok += 1;
                }
                Err(err) => {
                    assert_eq!(i + 1, 7);
                    assert!(matches!(err, CropwerkError::Compositing(_)));
                }
            }
        }
        assert_eq!(ok, 49);
        pool.on_idle().await;
        assert_eq!(pool.stats().failed, 1);
        assert_eq!(pool.stats().respawned, 0);
    }

    #[tokio::test]
    async fn panicking_job_retires_and_respawns_its_slot() {
        let pool = WorkerPool::new(1).expect("pool");
        let handles: Vec<_> = (1..=10u32)
            .map(|n| {
                pool.enqueue(move || {
                    if n == 7 {
                        panic!("boom");
                    }
                    Ok(n)
                })
            })
            .collect();
        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.join().await);
        }
        match &results[6] {
            Err(CropwerkError::Pool(msg)) => assert!(msg.contains("boom"), "{msg}"),
            other => panic!("expected pool error, got {other:?}"),
        }
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 9);

        pool.on_idle().await;
        let stats = pool.stats();
        assert_eq!(stats.respawned, 1);
        assert_eq!(stats.workers, 1);
        assert_eq!(stats.completed, 9);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn clear_cancels_only_queued_tasks() {
        let pool = WorkerPool::new(1).expect("pool");
        let running = pool.enqueue(|| {
            sleep_ms(50);
            Ok(0)
        });
        let queued: Vec<_> = (1..=5).map(|i| pool.enqueue(move || Ok(i))).collect();
        assert_eq!(pool.stats().queued, 5);

        assert_eq!(pool.clear(), 5);
        assert_eq!(running.join().await.expect("in-flight task"), 0);
        for handle in queued {
            assert!(matches!(handle.join().await, Err(CropwerkError::Cancelled)));
        }
        pool.on_idle().await;
        assert_eq!(pool.stats().completed, 1);
    }

    #[tokio::test]
    async fn on_idle_resolves_immediately_when_empty() {
        let pool = WorkerPool::<()>::new(3).expect("pool");
        tokio::time::timeout(Duration::from_secs(1), pool.on_idle())
            .await
            .expect("idle");
        assert_eq!(pool.stats().workers, 0);
    }

    #[tokio::test]
    async fn raised_concurrency_lets_more_tasks_run_together() {
        let pool = WorkerPool::new(1).expect("pool");
        pool.set_concurrency(4);
        assert_eq!(pool.concurrency(), 4);

        // Every job waits for all four, so this only finishes if four run at once.
        let barrier = Arc::new(Barrier::new(4));
        for _ in 0..4 {
            let barrier = Arc::clone(&barrier);
            pool.enqueue(move || {
                barrier.wait();
                Ok(())
            });
        }
        tokio::time::timeout(Duration::from_secs(5), pool.on_idle())
            .await
            .expect("four concurrent workers");
    }

    #[tokio::test]
    async fn lowered_concurrency_spares_running_tasks() {
        let pool = WorkerPool::new(2).expect("pool");
        for _ in 0..4 {
            pool.enqueue(|| {
                sleep_ms(30);
                Ok(())
            });
        }
        pool.set_concurrency(0);
        assert_eq!(pool.concurrency(), 1);
        assert_eq!(pool.stats().active, 2);

        pool.on_idle().await;
        let stats = pool.stats();
        assert_eq!(stats.completed, 4);
        assert_eq!(stats.workers, 1);
    }

    #[tokio::test]
    async fn subscribers_see_progress() {
        let pool = WorkerPool::new(2).expect("pool");
        let mut rx = pool.subscribe();
        for i in 0..3 {
            pool.enqueue(move || Ok(i));
        }
        rx.wait_for(|s| s.completed == 3).await.expect("stats");
        assert!(pool.stats().is_idle());
    }
}
