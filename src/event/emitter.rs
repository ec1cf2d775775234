use miette::Diagnostic;
use thiserror::Error;

use super::event::ProgressEvent;

/// Errors from publishing an event.
#[derive(Debug, Error, Diagnostic)]
pub enum EmitterError {
    /// Every consumer of the stream is gone.
    #[error("event stream closed")]
    #[diagnostic(
        code(graphmill::event::closed),
        help("The subscriber side of the event stream was dropped; the run keeps executing.")
    )]
    Closed,
}

/// Publishing side of a run's event stream.
///
/// The executor owns emission; step bodies reach the emitter only through
/// the step kit (notifications). Emission is synchronous so the per-run
/// event order is exactly the executor's production order.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: ProgressEvent) -> Result<(), EmitterError>;
}

/// Emitter that drops every event; used for non-streaming execution.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullEmitter;

impl EventEmitter for NullEmitter {
    fn emit(&self, _event: ProgressEvent) -> Result<(), EmitterError> {
        Ok(())
    }
}
