//! Progress events and the fan-out machinery behind them.
//!
//! The executor translates run transitions into a strictly ordered sequence
//! of typed [`ProgressEvent`]s and publishes them through an [`EventBus`]
//! to pluggable [`EventSink`]s. The HTTP layer drains a [`ChannelSink`] and
//! frames each event as a server-sent event via [`sse_frame`].

pub mod bus;
pub mod emitter;
pub mod event;
pub mod sink;
pub mod sse;

pub use bus::EventBus;
pub use emitter::{EmitterError, EventEmitter};
pub use event::{EventKind, Progress, ProgressEvent};
pub use sink::{ChannelSink, EventSink, MemorySink, TracingSink};
pub use sse::{sse_frame, SSE_CONTENT_TYPE};
