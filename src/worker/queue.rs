//! Single-concurrency FIFO task queue.
//!
//! At most one enqueued unit of work runs at any time, and units run in the
//! order they were enqueued. While the queue has work it is drained by one
//! spawned Tokio task; when the backlog empties that task exits and the next
//! enqueue starts a fresh one.
//!
//! # Trailers
//!
//! A task may carry a trailer: a fire-and-forget future the queue runs right
//! after the task settles and before the next pending task starts. Trailers do
//! not count against the capacity bound.

use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, error};
use uuid::Uuid;

use crate::errors::QueueError;

/// Identifier attached to every queued task for log correlation.
pub type TaskId = Uuid;

struct QueuedTask {
    id: TaskId,
    work: BoxFuture<'static, ()>,
    trailer: Option<BoxFuture<'static, ()>>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<QueuedTask>,
    running: bool,
    /// Admitted tasks whose work has not settled yet.
    in_flight: usize,
}

struct Shared {
    state: Mutex<QueueState>,
    capacity: Option<usize>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// FIFO executor that runs one task at a time.
///
/// Cloning yields another handle onto the same queue.
#[derive(Clone)]
pub struct TaskQueue {
    shared: Arc<Shared>,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    /// An unbounded queue; `enqueue` never reports [`QueueError::Full`].
    #[must_use]
    pub fn new() -> Self {
        Self::build(None)
    }

    /// A queue admitting at most `capacity` unsettled tasks (running or pending).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::build(Some(capacity))
    }

    fn build(capacity: Option<usize>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                capacity,
            }),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> Option<usize> {
        self.shared.capacity
    }

    /// Number of tasks waiting to start.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// Whether a task (or its trailer) is currently executing.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    /// Queue `work` for execution and return a handle to its outcome.
    ///
    /// Returns immediately. `work` is not invoked until every task enqueued
    /// before it has settled; its result is delivered through the handle
    /// unchanged.
    ///
    /// # Errors
    ///
    /// [`QueueError::Full`] when the capacity bound is reached, and
    /// [`QueueError::NoRuntime`] when called outside a Tokio runtime.
    pub fn enqueue<F, Fut, T, E>(&self, work: F) -> Result<TaskHandle<T, E>, QueueError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.submit(work, None)
    }

    /// Like [`TaskQueue::enqueue`], with `trailer` run once `work` settles
    /// (successfully, with an error, or by panicking) and before any other
    /// pending task starts.
    ///
    /// # Errors
    ///
    /// Same as [`TaskQueue::enqueue`]. On error neither `work` nor `trailer`
    /// is scheduled.
    pub fn enqueue_with_trailer<F, Fut, T, E, Tr>(
        &self,
        work: F,
        trailer: Tr,
    ) -> Result<TaskHandle<T, E>, QueueError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
        Tr: Future<Output = ()> + Send + 'static,
    {
        self.submit(work, Some(trailer.boxed()))
    }

    fn submit<F, Fut, T, E>(
        &self,
        work: F,
        trailer: Option<BoxFuture<'static, ()>>,
    ) -> Result<TaskHandle<T, E>, QueueError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| QueueError::NoRuntime)?;

        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        let work = async move {
            let outcome = work().await;
            // The caller may have dropped its handle; the work still counts.
            let _ = tx.send(outcome);
        }
        .boxed();

        let start_drain = {
            let mut state = self.shared.lock();
            if let Some(capacity) = self.shared.capacity
                && state.in_flight >= capacity
            {
                debug!(task_id = %id, capacity, "Rejecting task, queue is full");
                return Err(QueueError::Full { capacity });
            }

            state.in_flight += 1;
            state.pending.push_back(QueuedTask { id, work, trailer });
            debug!(
                task_id = %id,
                pending = state.pending.len(),
                "Task enqueued"
            );

            !std::mem::replace(&mut state.running, true)
        };

        if start_drain {
            runtime.spawn(drain(Arc::clone(&self.shared)));
        }

        Ok(TaskHandle { id, rx })
    }
}

/// Cleans up if the drain loop is dropped mid-flight (runtime shutdown): clears
/// the running flag so a later enqueue can start draining again, and releases
/// the capacity slot of the task that was interrupted.
struct DrainGuard {
    shared: Arc<Shared>,
    finished: bool,
    /// The current task's work has started but not settled.
    task_in_flight: bool,
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        if !self.finished {
            let mut state = self.shared.lock();
            state.running = false;
            if self.task_in_flight {
                state.in_flight = state.in_flight.saturating_sub(1);
            }
        }
    }
}

async fn drain(shared: Arc<Shared>) {
    let mut guard = DrainGuard {
        shared,
        finished: false,
        task_in_flight: false,
    };

    loop {
        let next = {
            let mut state = guard.shared.lock();
            match state.pending.pop_front() {
                Some(task) => {
                    guard.task_in_flight = true;
                    task
                }
                None => {
                    state.running = false;
                    guard.finished = true;
                    return;
                }
            }
        };

        let QueuedTask { id, work, trailer } = next;
        debug!(task_id = %id, "Task started");

        if AssertUnwindSafe(work).catch_unwind().await.is_err() {
            error!(task_id = %id, "Queued task panicked");
        }

        {
            let mut state = guard.shared.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
            guard.task_in_flight = false;
        }

        if let Some(trailer) = trailer {
            debug!(task_id = %id, "Running trailing task");
            if AssertUnwindSafe(trailer).catch_unwind().await.is_err() {
                error!(task_id = %id, "Trailing task panicked");
            }
        }

        debug!(task_id = %id, "Task settled");
    }
}

/// Eventual outcome of a queued task.
///
/// Dropping the handle does not cancel the task.
#[must_use = "the task runs regardless, but its outcome is only observable through the handle"]
pub struct TaskHandle<T, E> {
    id: TaskId,
    rx: oneshot::Receiver<Result<T, E>>,
}

impl<T, E> TaskHandle<T, E> {
    pub fn id(&self) -> TaskId {
        self.id
    }
}

impl<T, E> Future for TaskHandle<T, E>
where
    E: From<QueueError>,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.get_mut().rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(QueueError::TaskAborted.into())),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::{Instant, sleep};

    #[derive(Debug, PartialEq)]
    enum TestError {
        Failed(&'static str),
        Queue(QueueError),
    }

    impl From<QueueError> for TestError {
        fn from(e: QueueError) -> Self {
            TestError::Queue(e)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tasks_run_one_at_a_time_in_order() {
        let queue = TaskQueue::new();
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..8u64 {
            let active = Arc::clone(&active);
            let max_active = Arc::clone(&max_active);
            let order = Arc::clone(&order);
            let handle = queue
                .enqueue(move || async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_active.fetch_max(now, Ordering::SeqCst);
                    // Later tasks sleep less, so any overlap would reorder them.
                    sleep(Duration::from_millis(80 - i * 10)).await;
                    order.lock().unwrap().push(i);
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok::<u64, TestError>(i)
                })
                .unwrap();
            handles.push(handle);
        }

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await, Ok(i as u64));
        }
        assert_eq!(max_active.load(Ordering::SeqCst), 1);
        assert_eq!(*order.lock().unwrap(), (0..8).collect::<Vec<_>>());
        assert!(!queue.is_running());
    }

    #[tokio::test]
    async fn test_failed_task_does_not_poison_queue() {
        let queue = TaskQueue::new();

        let first = queue
            .enqueue(|| async { Err::<u32, _>(TestError::Failed("boom")) })
            .unwrap();
        let second = queue.enqueue(|| async { Ok::<u32, TestError>(2) }).unwrap();

        assert_eq!(first.await, Err(TestError::Failed("boom")));
        assert_eq!(second.await, Ok(2));
    }

    #[tokio::test]
    async fn test_panicking_task_reports_aborted_and_queue_continues() {
        let queue = TaskQueue::new();

        let doomed = queue
            .enqueue(|| async {
                if true {
                    panic!("task blew up");
                }
                Ok::<u32, TestError>(0)
            })
            .unwrap();
        let survivor = queue.enqueue(|| async { Ok::<u32, TestError>(7) }).unwrap();

        assert_eq!(doomed.await, Err(TestError::Queue(QueueError::TaskAborted)));
        assert_eq!(survivor.await, Ok(7));
    }

    #[tokio::test]
    async fn test_bounded_queue_rejects_when_full() {
        let queue = TaskQueue::with_capacity(2);
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let blocker = queue
            .enqueue(move || async move {
                let _ = release_rx.await;
                Ok::<(), TestError>(())
            })
            .unwrap();
        let waiting = queue.enqueue(|| async { Ok::<(), TestError>(()) }).unwrap();

        // The running blocker still holds a slot, so one pending task fills it.
        tokio::task::yield_now().await;
        assert_eq!(queue.pending_len(), 1);
        let rejected = queue.enqueue(|| async { Ok::<(), TestError>(()) });
        assert_eq!(rejected.err(), Some(QueueError::Full { capacity: 2 }));

        release_tx.send(()).unwrap();
        assert_eq!(blocker.await, Ok(()));
        assert_eq!(waiting.await, Ok(()));

        // Capacity frees up once tasks settle.
        let again = queue.enqueue(|| async { Ok::<(), TestError>(()) }).unwrap();
        assert_eq!(again.await, Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_trailer_runs_before_next_pending_task() {
        let queue = TaskQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&order);
        let trailer_log = Arc::clone(&order);
        let first = queue
            .enqueue_with_trailer(
                move || async move {
                    log.lock().unwrap().push("first");
                    Err::<(), _>(TestError::Failed("nope"))
                },
                async move {
                    sleep(Duration::from_secs(10)).await;
                    trailer_log.lock().unwrap().push("trailer");
                },
            )
            .unwrap();

        let log = Arc::clone(&order);
        let second = queue
            .enqueue(move || async move {
                log.lock().unwrap().push("second");
                Ok::<Instant, TestError>(Instant::now())
            })
            .unwrap();

        let start = Instant::now();
        assert!(first.await.is_err());
        // The caller of the first task is not held up by its trailer.
        assert!(start.elapsed() < Duration::from_secs(1));

        let second_started = second.await.unwrap();
        assert!(second_started - start >= Duration::from_secs(10));
        assert_eq!(*order.lock().unwrap(), vec!["first", "trailer", "second"]);
    }

    #[test]
    fn test_runtime_shutdown_mid_task_releases_capacity() {
        let queue = TaskQueue::with_capacity(1);

        let first_runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let interrupted = first_runtime.block_on(async {
            let handle = queue
                .enqueue(|| async {
                    sleep(Duration::from_secs(3600)).await;
                    Ok::<u32, TestError>(0)
                })
                .unwrap();
            // Let the drain task pick the work up.
            tokio::task::yield_now().await;
            handle
        });
        assert!(queue.is_running());
        first_runtime.shutdown_timeout(Duration::from_millis(50));

        assert!(!queue.is_running());
        assert_eq!(queue.pending_len(), 0);

        let second_runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        second_runtime.block_on(async {
            assert_eq!(
                interrupted.await,
                Err(TestError::Queue(QueueError::TaskAborted))
            );
            let handle = queue.enqueue(|| async { Ok::<u32, TestError>(1) }).unwrap();
            assert_eq!(handle.await, Ok(1));
        });
    }

    #[test]
    fn test_enqueue_outside_runtime_fails() {
        let queue = TaskQueue::new();
        let result = queue.enqueue(|| async { Ok::<(), TestError>(()) });
        assert_eq!(result.err(), Some(QueueError::NoRuntime));
        assert_eq!(queue.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_dropped_handle_still_runs_task() {
        let queue = TaskQueue::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&ran);
        drop(
            queue
                .enqueue(move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), TestError>(())
                })
                .unwrap(),
        );
        let after = queue.enqueue(|| async { Ok::<(), TestError>(()) }).unwrap();

        assert_eq!(after.await, Ok(()));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
