//! Operational plumbing shared by all byline executables: the structured
//! JSON event stream on stdout, and `tracing` diagnostics on stderr.
//!
//! The two channels never mix. Machine consumers read stdout; humans and log
//! collectors read stderr.

mod events;
mod logging;

pub use events::{emit_event, emit_fetch_log, event_line, fetch_log_value};
pub use logging::{init_logging, LogArgs, LogFormat, LogLevel};
