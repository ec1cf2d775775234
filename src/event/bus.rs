use std::sync::Arc;

use parking_lot::Mutex;

use super::emitter::{EmitterError, EventEmitter};
use super::event::ProgressEvent;
use super::sink::{ChannelSink, EventSink, TracingSink};

/// Fan-out point between the executor and its event consumers.
///
/// The bus is owned by one run. Emission is synchronous: each event is
/// handed to every sink before the executor proceeds, which is what makes
/// the per-run event order a total order as observed by any single sink.
///
/// A sink error (e.g. the streaming client dropped its connection) is
/// logged and does not stop delivery to the remaining sinks, and never
/// interrupts the run.
pub struct EventBus {
    sinks: Arc<Mutex<Vec<Box<dyn EventSink>>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_sink(TracingSink)
    }
}

impl EventBus {
    pub fn with_sink<T>(sink: T) -> Self
    where
        T: EventSink + 'static,
    {
        Self::with_sinks(vec![Box::new(sink)])
    }

    #[must_use]
    pub fn with_sinks(sinks: Vec<Box<dyn EventSink>>) -> Self {
        Self {
            sinks: Arc::new(Mutex::new(sinks)),
        }
    }

    pub fn add_sink<T: EventSink + 'static>(&self, sink: T) {
        self.sinks.lock().push(Box::new(sink));
    }

    /// Attach a channel sink and return its receiving side.
    ///
    /// Convenience for the HTTP layer: the receiver yields events in
    /// emission order and closes once the bus is dropped.
    pub fn subscribe(&self) -> flume::Receiver<ProgressEvent> {
        let (tx, rx) = flume::unbounded();
        self.add_sink(ChannelSink::new(tx));
        rx
    }

    /// Cloneable emitter handle for this bus.
    #[must_use]
    pub fn emitter(&self) -> Arc<dyn EventEmitter> {
        Arc::new(BusEmitter {
            sinks: Arc::clone(&self.sinks),
        })
    }

    pub fn emit(&self, event: ProgressEvent) {
        deliver(&self.sinks, &event);
    }
}

fn deliver(sinks: &Mutex<Vec<Box<dyn EventSink>>>, event: &ProgressEvent) {
    let mut sinks = sinks.lock();
    for sink in sinks.iter_mut() {
        if let Err(err) = sink.handle(event) {
            tracing::debug!(
                sink = %sink.name(),
                error = %err,
                "event sink failed; continuing"
            );
        }
    }
}

struct BusEmitter {
    sinks: Arc<Mutex<Vec<Box<dyn EventSink>>>>,
}

impl EventEmitter for BusEmitter {
    fn emit(&self, event: ProgressEvent) -> Result<(), EmitterError> {
        deliver(&self.sinks, &event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::MemorySink;
    use serde_json::json;

    #[test]
    fn events_reach_every_sink_in_order() {
        let memory = MemorySink::new();
        let bus = EventBus::with_sink(memory.clone());
        let rx = bus.subscribe();

        bus.emit(ProgressEvent::workflow_start("g", json!({})));
        bus.emit(ProgressEvent::workflow_paused("g", json!({})));

        let captured = memory.snapshot();
        assert_eq!(captured.len(), 2);
        assert_eq!(captured[0].kind.as_str(), "workflow_start");
        assert_eq!(rx.drain().count(), 2);
    }
}
