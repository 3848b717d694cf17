//! Projector Protocol
//!
//! Implements the BenQ text protocol: `*KEY=VALUE#` commands framed by
//! carriage returns, answered in order with no request identifier.
//!
//! Responses are correlated to commands purely by submission order, with at
//! most one command on the wire at a time.

pub mod commands;
mod engine;
mod error;
pub mod matcher;
mod poller;
mod queue;
pub mod transport;
mod watchdog;

pub use commands::Command;
pub use engine::ProtocolEngine;
pub use error::ProtocolError;
pub use matcher::{Matcher, ResponseKind};
pub use poller::spawn_status_poller;
pub use queue::{CorrelationQueue, Resolution};
pub use transport::{ChannelTransport, ReceiveHandler, Transport};
pub use watchdog::Watchdog;

/// Default time to wait for a response before resetting, in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 3000;

/// Default bound on unresolved commands
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Sent by the projector when a value is unavailable in its current state
pub const UNAVAILABLE_MARKER: &str = "*Block item#";
