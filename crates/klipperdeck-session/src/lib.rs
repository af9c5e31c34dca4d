//! Printer session for klipperdeck.
//!
//! A [`Session`] owns the link to one printer host: it connects with bounded
//! retries, keeps the telemetry snapshot current from the bulk query and the
//! push channel, falls back to the [`Simulator`] when the host stays
//! unreachable, and routes every command to whichever side is active.

mod activity;
mod error;
mod policy;
mod session;
mod simulation;

pub use activity::{ActivityLog, LOG_CAPACITY, LogEntry, LogLevel};
pub use error::SessionError;
pub use policy::{Fallback, RetryPolicy};
pub use session::{FILE_POLL_INTERVAL, Session, SessionOptions};
pub use simulation::{Simulator, TICK_INTERVAL};
