//! Moonraker transport for klipperdeck.
//!
//! - [`MoonrakerClient`]: request/response calls with bounded timeouts and
//!   classified failures, plus the push subscription.
//! - [`PrinterHost`]: the operations a session needs from a host, so a fake
//!   can stand in for tests.
//! - [`diagnose`]: a structured reachability probe with remediation hints.

mod diagnostics;
mod error;
mod host;
mod http;
mod info;
mod live;

pub use diagnostics::{DiagnosticReport, ProbeOutcome, diagnose};
pub use error::TransportError;
pub use host::PrinterHost;
pub use http::{GCODE_ROOT, MoonrakerClient, Timeouts};
pub use info::{PrinterInfo, ServerInfo};
pub use live::{LiveEvent, LiveFeed, LivePolicy, LiveSubscription, subscribe_request};
