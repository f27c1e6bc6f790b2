// EventBridge - Delivers worker events to the frontend on its own thread
//
// The query worker runs on the tokio runtime and must never block on the frontend.
// It sends RunEvents into an unbounded channel; a dedicated handler thread drains
// the channel and calls the EventSink in order.

use crate::models::RunOutcome;
use crate::services::orchestrator::{EventSender, RunEvent};
use std::thread::JoinHandle;
use tokio::sync::mpsc;

/// Frontend-side receiver of run events
///
/// Called from the bridge's handler thread, one event at a time, in emission order.
pub trait EventSink: Send + 'static {
    fn on_log(&mut self, text: &str);

    fn on_record_displayed(&mut self, field: &str, value: &str);

    fn on_region_completed(&mut self, region: &str);

    fn on_progress(&mut self, completed: usize, total: usize, percent: f64);

    fn on_warning(&mut self, text: &str) {
        self.on_log(text);
    }

    fn on_run_finished(&mut self, outcome: RunOutcome);
}

/// Route one event to the matching sink callback.
pub fn dispatch<S: EventSink + ?Sized>(sink: &mut S, event: RunEvent) {
    match event {
        RunEvent::Log(text) => sink.on_log(&text),
        RunEvent::RecordDisplayed { field, value } => sink.on_record_displayed(&field, &value),
        RunEvent::RegionCompleted(region) => sink.on_region_completed(&region),
        RunEvent::Progress {
            completed,
            total,
            percent,
        } => sink.on_progress(completed, total, percent),
        RunEvent::Warning(text) => sink.on_warning(&text),
        RunEvent::RunFinished(outcome) => sink.on_run_finished(outcome),
    }
}

/// Owns the event channel and the handler thread
///
/// # Example
/// ```ignore
/// let bridge = EventBridge::new(ConsoleSink::new(stdout()));
/// let orchestrator = QueryOrchestrator::new(fetcher, catalog, state, bridge.sender());
/// // ... run ...
/// drop(orchestrator);
/// let sink = bridge.shutdown();
/// ```
pub struct EventBridge<S: EventSink> {
    tx: EventSender,
    handle: JoinHandle<S>,
}

impl<S: EventSink> EventBridge<S> {
    /// Create the channel and start the handler thread
    pub fn new(mut sink: S) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<RunEvent>();

        let handle = std::thread::spawn(move || {
            tracing::debug!("EventBridge handler thread started");

            while let Some(event) = rx.blocking_recv() {
                dispatch(&mut sink, event);
            }

            tracing::debug!("EventBridge handler thread terminated");
            sink
        });

        Self { tx, handle }
    }

    /// Sender for the worker; clone freely
    pub fn sender(&self) -> EventSender {
        self.tx.clone()
    }

    /// Close the bridge and hand back the sink
    ///
    /// Blocks until every sender (including clones held by an orchestrator) is
    /// dropped and all queued events are delivered. Returns `None` if the handler
    /// thread panicked.
    pub fn shutdown(self) -> Option<S> {
        drop(self.tx);
        match self.handle.join() {
            Ok(sink) => Some(sink),
            Err(_) => {
                tracing::error!("EventBridge handler thread panicked");
                None
            }
        }
    }
}
