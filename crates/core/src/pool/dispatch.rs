//! FIFO dispatch of jobs onto a worker pool.

use std::collections::VecDeque;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::engine::EngineError;
use crate::job::JobStatus;
use crate::worker::{WorkerEngine, WorkerError};

use super::slots::{Lease, WorkerPool};
use super::types::{PoolStats, PoolStatus};

type Reply<W> = oneshot::Sender<Result<<W as WorkerEngine>::Response, WorkerError>>;

/// A job waiting for a worker slot.
struct QueuedJob<W: WorkerEngine> {
    label: String,
    request: W::Request,
    progress: Option<mpsc::Sender<JobStatus>>,
    reply: Reply<W>,
}

enum DispatchEvent<W: WorkerEngine> {
    Enqueue(QueuedJob<W>),
    SlotReleased { slot: usize, failed: bool },
    /// A round trip timed out; the slot stays leased until its worker has
    /// answered the abandoned attempts.
    SlotDraining { slot: usize },
    SlotDrained { slot: usize },
    Preload,
    Status(oneshot::Sender<PoolStatus>),
}

/// Handle to a pool's dispatch loop.
///
/// Jobs are started strictly in submission order, each on the first free
/// slot. The loop runs on the tokio runtime and stops once every handle has
/// been dropped and no round trip is in flight.
pub struct Dispatcher<W: WorkerEngine> {
    events: mpsc::UnboundedSender<DispatchEvent<W>>,
}

impl<W: WorkerEngine> Clone for Dispatcher<W> {
    fn clone(&self) -> Self {
        Self {
            events: self.events.clone(),
        }
    }
}

impl<W: WorkerEngine> Dispatcher<W> {
    /// Starts the dispatch loop for `pool`. Must be called inside a tokio runtime.
    pub fn spawn(pool: WorkerPool<W>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let dispatch_loop = DispatchLoop {
            pool,
            queue: VecDeque::new(),
            stats: PoolStats::default(),
            events: events_tx.downgrade(),
        };
        tokio::spawn(dispatch_loop.run(events_rx));
        Self { events: events_tx }
    }

    /// Queues a request and waits for its response.
    ///
    /// `Processing` is sent on `progress` when the job is handed to a worker.
    /// That notification is best effort and never blocks dispatch.
    pub async fn execute(
        &self,
        label: impl Into<String>,
        request: W::Request,
        progress: Option<mpsc::Sender<JobStatus>>,
    ) -> Result<W::Response, WorkerError> {
        let (reply, response) = oneshot::channel();
        let job = QueuedJob {
            label: label.into(),
            request,
            progress,
            reply,
        };
        self.events
            .send(DispatchEvent::Enqueue(job))
            .map_err(|_| WorkerError::Disconnected)?;
        response.await.map_err(|_| WorkerError::Disconnected)?
    }

    /// Creates the first worker ahead of demand.
    pub fn preload(&self) {
        let _ = self.events.send(DispatchEvent::Preload);
    }

    /// Current pool status. `None` if the dispatch loop has stopped.
    pub async fn status(&self) -> Option<PoolStatus> {
        let (tx, rx) = oneshot::channel();
        self.events.send(DispatchEvent::Status(tx)).ok()?;
        rx.await.ok()
    }
}

struct DispatchLoop<W: WorkerEngine> {
    pool: WorkerPool<W>,
    queue: VecDeque<QueuedJob<W>>,
    stats: PoolStats,
    events: mpsc::WeakUnboundedSender<DispatchEvent<W>>,
}

impl<W: WorkerEngine> DispatchLoop<W> {
    async fn run(mut self, mut events: mpsc::UnboundedReceiver<DispatchEvent<W>>) {
        debug!(pool = %self.pool.name(), "Dispatch loop started");

        while let Some(event) = events.recv().await {
            match event {
                DispatchEvent::Enqueue(job) => {
                    self.queue.push_back(job);
                }
                DispatchEvent::SlotReleased { slot, failed } => {
                    self.stats.record(failed);
                    self.pool.release(slot);
                }
                DispatchEvent::SlotDraining { slot } => {
                    self.stats.record(true);
                    debug!(pool = %self.pool.name(), slot, "Slot draining abandoned attempts");
                    continue;
                }
                DispatchEvent::SlotDrained { slot } => {
                    debug!(pool = %self.pool.name(), slot, "Slot drained");
                    self.pool.release(slot);
                }
                DispatchEvent::Preload => {
                    if let Err(e) = self.pool.preload() {
                        warn!(pool = %self.pool.name(), error = %e, "Failed to preload worker");
                    }
                }
                DispatchEvent::Status(reply) => {
                    let _ = reply.send(self.pool.status(
                        self.queue.len(),
                        self.stats.total_processed,
                        self.stats.total_failed,
                    ));
                    continue;
                }
            }
            self.dispatch();
        }

        debug!(pool = %self.pool.name(), "Dispatch loop stopped");
    }

    /// Hands queued jobs to free slots until either runs out.
    fn dispatch(&mut self) {
        while !self.queue.is_empty() {
            match self.pool.acquire() {
                Ok(Some(lease)) => match self.queue.pop_front() {
                    Some(job) => self.start(lease, job),
                    None => self.pool.release(lease.slot),
                },
                Ok(None) => break,
                Err(e) => {
                    error!(pool = %self.pool.name(), error = %e, "Failed to spawn worker");
                    // Busy slots will release and retry; with none alive the
                    // queue would wait forever.
                    if self.pool.slot_count() == 0 {
                        self.fail_queued(&e);
                    }
                    break;
                }
            }
        }
    }

    fn start(&mut self, lease: Lease<W>, job: QueuedJob<W>) {
        let Some(events) = self.events.upgrade() else {
            self.pool.release(lease.slot);
            let _ = job.reply.send(Err(WorkerError::Disconnected));
            return;
        };

        if let Some(progress) = &job.progress {
            let _ = progress.try_send(JobStatus::Processing);
        }
        debug!(
            pool = %self.pool.name(),
            job = %job.label,
            slot = lease.slot,
            queued = self.queue.len(),
            "Dispatching job"
        );

        tokio::spawn(async move {
            let result = lease.client.request(job.request).await;
            let timed_out = result.as_ref().is_err_and(|e| e.is_timeout());
            if !timed_out {
                let _ = events.send(DispatchEvent::SlotReleased {
                    slot: lease.slot,
                    failed: result.is_err(),
                });
                let _ = job.reply.send(result);
                return;
            }

            // Keep the slot leased until the worker answers the abandoned attempts.
            let _ = events.send(DispatchEvent::SlotDraining { slot: lease.slot });
            let _ = job.reply.send(result);
            lease.client.drained().await;
            let _ = events.send(DispatchEvent::SlotDrained { slot: lease.slot });
        });
    }

    fn fail_queued(&mut self, cause: &std::io::Error) {
        info!(pool = %self.pool.name(), jobs = self.queue.len(), "Failing queued jobs");
        for job in self.queue.drain(..) {
            self.stats.record(true);
            let err = EngineError::Initialization(format!("failed to spawn worker: {cause}"));
            let _ = job.reply.send(Err(WorkerError::Engine(err)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolSettings;
    use crate::worker::EngineFactory;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Records the order requests start and the peak number in flight.
    #[derive(Default)]
    struct Tracker {
        started: Mutex<Vec<u32>>,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    struct Sleeper {
        tracker: Arc<Tracker>,
    }

    /// Request that keeps its worker busy for 300 ms.
    const STALL: u32 = 99;

    impl WorkerEngine for Sleeper {
        type Request = u32;
        type Response = u32;

        fn handle(&mut self, request: u32) -> Result<u32, EngineError> {
            self.tracker.started.lock().unwrap().push(request);
            let now = self.tracker.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.tracker.peak.fetch_max(now, Ordering::SeqCst);
            let pause = if request == STALL { 300 } else { 30 };
            std::thread::sleep(Duration::from_millis(pause));
            self.tracker.running.fetch_sub(1, Ordering::SeqCst);
            if request == 13 {
                return Err(EngineError::decode("unlucky"));
            }
            Ok(request * 10)
        }
    }

    fn dispatcher(capacity: usize) -> (Dispatcher<Sleeper>, Arc<Tracker>) {
        dispatcher_with_timeout(capacity, Duration::from_secs(2))
    }

    fn dispatcher_with_timeout(
        capacity: usize,
        timeout: Duration,
    ) -> (Dispatcher<Sleeper>, Arc<Tracker>) {
        let tracker = Arc::new(Tracker::default());
        let engine_tracker = tracker.clone();
        let factory: EngineFactory<Sleeper> = Arc::new(move || {
            Ok(Sleeper {
                tracker: engine_tracker.clone(),
            })
        });
        let pool = WorkerPool::new(
            PoolSettings::new("test", capacity, timeout),
            factory,
        );
        (Dispatcher::spawn(pool), tracker)
    }

    #[tokio::test]
    async fn test_execute_returns_response() {
        let (dispatcher, _) = dispatcher(2);
        assert_eq!(dispatcher.execute("a", 4, None).await.unwrap(), 40);
    }

    #[tokio::test]
    async fn test_capacity_is_never_exceeded() {
        let (dispatcher, tracker) = dispatcher(2);
        let jobs = (0..8).map(|n| dispatcher.execute(format!("job-{n}"), n, None));
        let results = futures::future::join_all(jobs).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert!(tracker.peak.load(Ordering::SeqCst) <= 2);

        let status = dispatcher.status().await.unwrap();
        assert_eq!(status.slots, 2);
        assert_eq!(status.total_processed, 8);
    }

    #[tokio::test]
    async fn test_jobs_start_in_submission_order() {
        let (dispatcher, tracker) = dispatcher(1);
        let jobs = (0..5).map(|n| dispatcher.execute(format!("job-{n}"), n, None));
        futures::future::join_all(jobs).await;

        assert_eq!(*tracker.started.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_processing_is_reported_on_dispatch() {
        let (dispatcher, _) = dispatcher(1);
        let (tx, mut rx) = mpsc::channel(4);
        dispatcher.execute("a", 1, Some(tx)).await.unwrap();
        assert_eq!(rx.recv().await, Some(JobStatus::Processing));
    }

    #[tokio::test]
    async fn test_failures_release_the_slot() {
        let (dispatcher, _) = dispatcher(1);
        let err = dispatcher.execute("bad", 13, None).await.unwrap_err();
        assert!(matches!(err, WorkerError::Engine(EngineError::Decode(_))));
        assert_eq!(dispatcher.execute("good", 2, None).await.unwrap(), 20);

        let status = dispatcher.status().await.unwrap();
        assert_eq!(status.busy, 0);
        assert_eq!(status.total_failed, 1);
        assert_eq!(status.total_processed, 1);
    }

    #[tokio::test]
    async fn test_preload_creates_idle_slot() {
        let (dispatcher, tracker) = dispatcher(3);
        dispatcher.preload();
        let status = dispatcher.status().await.unwrap();
        assert_eq!(status.slots, 1);
        assert_eq!(status.busy, 0);
        assert!(tracker.started.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_timed_out_slot_is_not_reused_until_drained() {
        let (dispatcher, tracker) = dispatcher_with_timeout(4, Duration::from_millis(100));

        let err = dispatcher.execute("stall", STALL, None).await.unwrap_err();
        assert!(err.is_timeout());

        // Slot 0 is still working through both stalled attempts, so the next
        // job gets a fresh slot and answers at once.
        assert_eq!(dispatcher.execute("quick", 1, None).await.unwrap(), 10);
        let status = dispatcher.status().await.unwrap();
        assert_eq!(status.slots, 2);
        assert_eq!(status.busy, 1);
        assert_eq!(status.total_failed, 1);
        assert_eq!(status.total_processed, 1);

        tokio::time::sleep(Duration::from_millis(800)).await;
        let status = dispatcher.status().await.unwrap();
        assert_eq!(status.busy, 0);
        assert_eq!(
            *tracker.started.lock().unwrap(),
            vec![STALL, 1, STALL]
        );

        // Once drained the slot is handed out again.
        assert_eq!(dispatcher.execute("again", 2, None).await.unwrap(), 20);
        assert_eq!(dispatcher.status().await.unwrap().slots, 2);
    }
}
