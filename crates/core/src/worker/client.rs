//! Request/response correlation over a worker's shared response stream.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use super::error::WorkerError;
use super::thread::WorkerEngine;
use super::types::{CorrelationId, WorkerMessage, WorkerRequest};

/// Attempts per round trip: the original plus one retry on timeout.
pub const ROUND_TRIP_ATTEMPTS: u32 = 2;

/// Handle for posting requests to one worker thread.
pub struct WorkerClient<W: WorkerEngine> {
    name: String,
    requests: mpsc::UnboundedSender<WorkerRequest<W::Request>>,
    responses: broadcast::Sender<WorkerMessage<W::Response>>,
    /// Attempts sent to the worker that it has not answered yet.
    in_flight: Arc<watch::Sender<usize>>,
    timeout: Duration,
}

impl<W: WorkerEngine> Clone for WorkerClient<W> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            requests: self.requests.clone(),
            responses: self.responses.clone(),
            in_flight: self.in_flight.clone(),
            timeout: self.timeout,
        }
    }
}

impl<W: WorkerEngine> WorkerClient<W> {
    pub(super) fn new(
        name: String,
        requests: mpsc::UnboundedSender<WorkerRequest<W::Request>>,
        responses: broadcast::Sender<WorkerMessage<W::Response>>,
        in_flight: Arc<watch::Sender<usize>>,
        timeout: Duration,
    ) -> Self {
        Self {
            name,
            requests,
            responses,
            in_flight,
            timeout,
        }
    }

    /// The worker's thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of attempts the worker has not answered yet, abandoned ones
    /// included.
    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Waits until the worker has answered every attempt sent to it.
    pub async fn drained(&self) {
        let mut counter = self.in_flight.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = counter.wait_for(|pending| *pending == 0).await;
    }

    /// Sends `payload` and waits for the correlated response.
    ///
    /// Each attempt uses a fresh [`CorrelationId`]. A timed-out attempt is
    /// retried once; engine errors are returned without retry.
    pub async fn request(&self, payload: W::Request) -> Result<W::Response, WorkerError> {
        for attempt in 1..=ROUND_TRIP_ATTEMPTS {
            let id = CorrelationId::new();
            // Subscribe before sending so the response cannot be missed.
            let mut inbound = self.responses.subscribe();
            self.in_flight.send_modify(|pending| *pending += 1);
            let sent = self.requests.send(WorkerRequest {
                id,
                payload: payload.clone(),
            });
            if sent.is_err() {
                self.in_flight
                    .send_modify(|pending| *pending = pending.saturating_sub(1));
                return Err(WorkerError::Disconnected);
            }

            match tokio::time::timeout(self.timeout, wait_for(&mut inbound, id)).await {
                Ok(result) => return result,
                Err(_) => warn!(
                    worker = %self.name,
                    %id,
                    attempt,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Worker response timed out"
                ),
            }
        }

        Err(WorkerError::Timeout {
            attempts: ROUND_TRIP_ATTEMPTS,
            timeout_ms: self.timeout.as_millis() as u64,
        })
    }
}

async fn wait_for<T: Clone>(
    inbound: &mut broadcast::Receiver<WorkerMessage<T>>,
    id: CorrelationId,
) -> Result<T, WorkerError> {
    loop {
        match inbound.recv().await {
            Ok(message) if message.id == id => return message.payload.map_err(WorkerError::from),
            Ok(_) => continue,
            Err(RecvError::Lagged(skipped)) => {
                debug!(%id, skipped, "Response stream lagged");
            }
            Err(RecvError::Closed) => return Err(WorkerError::Disconnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineError;
    use crate::worker::{spawn_worker, EngineFactory};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Doubles numbers; negative input fails, zero panics, >= 1000 stalls.
    struct Doubler {
        calls: Arc<AtomicUsize>,
    }

    impl WorkerEngine for Doubler {
        type Request = i64;
        type Response = i64;

        fn handle(&mut self, request: i64) -> Result<i64, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if request >= 1000 {
                std::thread::sleep(Duration::from_millis(request as u64 / 5));
            }
            match request {
                0 => panic!("zero"),
                n if n < 0 => Err(EngineError::decode("negative")),
                n => Ok(n * 2),
            }
        }
    }

    fn doubler(timeout: Duration) -> (WorkerClient<Doubler>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let factory_calls = Arc::clone(&calls);
        let factory: EngineFactory<Doubler> = Arc::new(move || {
            Ok(Doubler {
                calls: Arc::clone(&factory_calls),
            })
        });
        let client = spawn_worker("test-doubler", factory, timeout).unwrap();
        (client, calls)
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (client, calls) = doubler(Duration::from_secs(5));
        assert_eq!(client.request(21).await.unwrap(), 42);
        assert_eq!(client.request(5).await.unwrap(), 10);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(client.name(), "test-doubler");
    }

    #[tokio::test]
    async fn test_concurrent_requests_are_correlated() {
        let (client, _) = doubler(Duration::from_secs(5));
        let results =
            futures::future::join_all((1..=10).map(|n| {
                let client = client.clone();
                async move { (n, client.request(n).await.unwrap()) }
            }))
            .await;
        for (n, doubled) in results {
            assert_eq!(doubled, n * 2);
        }
    }

    #[tokio::test]
    async fn test_engine_error_is_not_retried() {
        let (client, calls) = doubler(Duration::from_secs(5));
        let err = client.request(-1).await.unwrap_err();
        assert_eq!(err, WorkerError::Engine(EngineError::decode("negative")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_retries_exactly_once() {
        let (client, calls) = doubler(Duration::from_millis(30));

        // Each call stalls for 300 ms, well past the 30 ms timeout.
        let err = client.request(1500).await.unwrap_err();
        assert_eq!(
            err,
            WorkerError::Timeout {
                attempts: 2,
                timeout_ms: 30
            }
        );
        assert!(err.is_timeout());

        // Let the worker drain both queued attempts.
        tokio::time::sleep(Duration::from_millis(900)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_drained_waits_for_abandoned_attempts() {
        let (client, calls) = doubler(Duration::from_millis(30));

        // Two 200 ms attempts are still queued on the worker after this.
        assert!(client.request(1000).await.unwrap_err().is_timeout());
        assert!(client.in_flight() > 0);

        tokio::time::timeout(Duration::from_secs(2), client.drained())
            .await
            .unwrap();
        assert_eq!(client.in_flight(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_answered_requests_leave_nothing_in_flight() {
        let (client, _) = doubler(Duration::from_secs(5));
        assert_eq!(client.request(2).await.unwrap(), 4);
        assert!(client.request(-2).await.is_err());
        client.drained().await;
        assert_eq!(client.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_stale_responses_are_ignored() {
        let (client, _) = doubler(Duration::from_millis(150));

        // The first attempt answers (200 ms) while the retry is waiting; that
        // answer carries the old id and must not satisfy the retry.
        let err = client.request(1000).await.unwrap_err();
        assert!(err.is_timeout());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(client.request(3).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_panic_is_reported_and_engine_rebuilt() {
        let (client, _) = doubler(Duration::from_secs(5));
        let err = client.request(0).await.unwrap_err();
        assert!(matches!(err, WorkerError::Engine(EngineError::Crashed(_))));
        assert_eq!(client.request(4).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_failed_initialization_answers_with_error() {
        let factory: EngineFactory<Doubler> =
            Arc::new(|| Err(EngineError::Initialization("no wasm".to_string())));
        let client = spawn_worker("test-broken", factory, Duration::from_secs(5)).unwrap();
        let err = client.request(1).await.unwrap_err();
        assert_eq!(
            err,
            WorkerError::Engine(EngineError::Initialization("no wasm".to_string()))
        );
    }
}
