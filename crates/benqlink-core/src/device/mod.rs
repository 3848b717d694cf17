//! Projector Device Model
//!
//! The externally visible projector state and the name tables used to
//! decode it.

mod state;
mod tables;

pub use state::{DeviceChange, DeviceField, DeviceSnapshot, DeviceState, ObserverId};
pub use tables::{AspectRatio, PictureMode, SourceType};
