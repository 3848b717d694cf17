//! # BenqLink Core Library
//!
//! Core functionality for controlling BenQ projectors over their text
//! control protocol.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Command/response correlation for a protocol without request identifiers
//! - A pipelining engine with a response watchdog
//! - An observable projector state model
//! - A simulated projector for running without hardware
//!
//! ## Example
//!
//! ```rust,ignore
//! use benqlink_core::prelude::*;
//! use std::sync::Arc;
//!
//! let projector = SimulatedProjector::new()?;
//! let device = Arc::new(DeviceState::new());
//! let engine = ProtocolEngine::new(projector, device.clone(), EngineConfig::default())?;
//!
//! engine.turn_power_on()?;
//! engine.set_aspect_ratio(AspectRatio::Auto)?;
//! engine.update_status()?;
//! ```

pub mod config;
pub mod device;
pub mod protocol;
pub mod sim;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{ConfigError, EngineConfig};
    pub use crate::device::{
        AspectRatio, DeviceChange, DeviceField, DeviceSnapshot, DeviceState, PictureMode,
        SourceType,
    };
    pub use crate::protocol::{
        spawn_status_poller, ChannelTransport, Command, CorrelationQueue, Matcher,
        ProtocolEngine, ProtocolError, ResponseKind, Transport,
    };
    pub use crate::sim::SimulatedProjector;
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
