//! Worker threads: one long-lived OS thread per codec engine instance.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::engine::EngineError;

use super::client::WorkerClient;
use super::types::{WorkerMessage, WorkerRequest};

/// Capacity of a worker's inbound response stream.
const RESPONSE_BUFFER: usize = 16;

/// Unit of codec work executed on a worker thread.
///
/// Implementations own their engine exclusively; the thread never shares it.
pub trait WorkerEngine: Send + 'static {
    type Request: Clone + Send + Sync + 'static;
    type Response: Clone + Send + Sync + 'static;

    /// Handles one request. Called only from the owning worker thread.
    fn handle(&mut self, request: Self::Request) -> Result<Self::Response, EngineError>;
}

/// Builds a fresh engine; called on the worker thread.
pub type EngineFactory<W> = Arc<dyn Fn() -> Result<W, EngineError> + Send + Sync>;

/// Starts a named worker thread and returns a client for it.
///
/// The engine is built on the new thread, so initialization cost never lands
/// on the caller. Requests sent before initialization finishes wait in the
/// channel. The thread exits once every client has been dropped.
pub fn spawn_worker<W: WorkerEngine>(
    name: impl Into<String>,
    factory: EngineFactory<W>,
    timeout: Duration,
) -> std::io::Result<WorkerClient<W>> {
    let name = name.into();
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (response_tx, _) = broadcast::channel(RESPONSE_BUFFER);
    let (in_flight, _) = watch::channel(0usize);
    let in_flight = Arc::new(in_flight);

    let thread_responses = response_tx.clone();
    let thread_in_flight = in_flight.clone();
    let thread_name = name.clone();
    std::thread::Builder::new().name(name.clone()).spawn(move || {
        run_worker(
            thread_name,
            factory,
            request_rx,
            thread_responses,
            thread_in_flight,
        )
    })?;

    Ok(WorkerClient::new(
        name,
        request_tx,
        response_tx,
        in_flight,
        timeout,
    ))
}

fn build_engine<W: WorkerEngine>(name: &str, factory: &EngineFactory<W>) -> Result<W, EngineError> {
    match catch_unwind(AssertUnwindSafe(|| factory())) {
        Ok(Ok(engine)) => Ok(engine),
        Ok(Err(e)) => {
            error!(worker = %name, error = %e, "Engine initialization failed");
            Err(e)
        }
        Err(_) => {
            error!(worker = %name, "Engine initialization panicked");
            Err(EngineError::Initialization("engine factory panicked".to_string()))
        }
    }
}

fn run_worker<W: WorkerEngine>(
    name: String,
    factory: EngineFactory<W>,
    mut requests: mpsc::UnboundedReceiver<WorkerRequest<W::Request>>,
    responses: broadcast::Sender<WorkerMessage<W::Response>>,
    in_flight: Arc<watch::Sender<usize>>,
) {
    let started = std::time::Instant::now();
    let mut engine = build_engine(&name, &factory);
    info!(
        worker = %name,
        ready = engine.is_ok(),
        init_ms = started.elapsed().as_millis() as u64,
        "Worker started"
    );

    while let Some(request) = requests.blocking_recv() {
        debug!(worker = %name, id = %request.id, "Worker handling request");

        let payload = match engine.as_mut() {
            Ok(engine) => {
                match catch_unwind(AssertUnwindSafe(|| engine.handle(request.payload))) {
                    Ok(result) => result,
                    Err(panic) => Err(EngineError::Crashed(panic_message(&panic))),
                }
            }
            Err(e) => Err(e.clone()),
        };

        if matches!(payload, Err(EngineError::Crashed(_))) {
            warn!(worker = %name, "Engine crashed, rebuilding");
            engine = build_engine(&name, &factory);
        }

        // Nobody listening means the requester already gave up on this id.
        let _ = responses.send(WorkerMessage {
            id: request.id,
            payload,
        });
        in_flight.send_modify(|pending| *pending = pending.saturating_sub(1));
    }

    info!(worker = %name, "Worker shutting down");
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
