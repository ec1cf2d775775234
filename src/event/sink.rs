use std::any::type_name;
use std::io::{self, Result as IoResult};
use std::sync::Arc;

use parking_lot::Mutex as ParkingMutex;

use super::event::ProgressEvent;

/// Abstraction over an output target that consumes full progress events.
pub trait EventSink: Send + Sync {
    /// Handle one event. The sink decides how to serialize or forward it.
    fn handle(&mut self, event: &ProgressEvent) -> IoResult<()>;

    /// A stable, human-friendly identifier for this sink instance.
    fn name(&self) -> String {
        type_name::<Self>().to_string()
    }
}

/// Sink that logs events through `tracing`; the default for server-side runs.
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn handle(&mut self, event: &ProgressEvent) -> IoResult<()> {
        tracing::info!(
            target: "graphmill::events",
            kind = event.kind.as_str(),
            graph = %event.graph_name,
            step = event.step.as_deref().unwrap_or(""),
            "progress event"
        );
        Ok(())
    }

    fn name(&self) -> String {
        "TracingSink".to_string()
    }
}

/// In-memory sink for tests and snapshots.
#[derive(Clone, Default)]
pub struct MemorySink {
    entries: Arc<ParkingMutex<Vec<ProgressEvent>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone of all captured events, in emission order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ProgressEvent> {
        self.entries.lock().clone()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl EventSink for MemorySink {
    fn handle(&mut self, event: &ProgressEvent) -> IoResult<()> {
        self.entries.lock().push(event.clone());
        Ok(())
    }

    fn name(&self) -> String {
        "MemorySink".to_string()
    }
}

/// Channel-based sink for streaming events to async consumers.
///
/// Forwards each event into a flume channel; the HTTP layer drains the
/// receiver and frames events for the client. If the receiver is dropped
/// (client went away) the error is logged by the bus and the run keeps
/// executing — connection drop never cancels a run.
pub struct ChannelSink {
    tx: flume::Sender<ProgressEvent>,
}

impl ChannelSink {
    #[must_use]
    pub fn new(tx: flume::Sender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn handle(&mut self, event: &ProgressEvent) -> IoResult<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "channel receiver dropped"))
    }

    fn name(&self) -> String {
        "ChannelSink".to_string()
    }
}
