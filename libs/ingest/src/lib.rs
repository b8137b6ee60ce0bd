pub mod config;
pub mod error;
pub mod queue;
mod link;
mod orchestrator;
mod sink;

pub use error::{IngestError, LinkError, SinkError};
pub use link::{LinkHandle, LinkPhase, LinkQueues, LinkState, LinkStats, LinkStatsSnapshot, ServerLink};
pub use orchestrator::{Orchestrator, ShutdownReport};
pub use sink::{RecordSink, format_line};
