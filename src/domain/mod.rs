//! Domain models - core types shared by the station
//!
//! This module contains the canonical data types used throughout the system:
//! - `Code` - a non-empty decoded payload
//! - `TrackingMode` - inbound or outbound counting
//! - `DecodedFrame` - one frame's decode result from the decoder feed
//! - `CountedEvent` - an object counted for the first time under a mode
//! - `OperatorCommand` - discrete operator actions

pub mod types;

pub use types::{
    epoch_ms, Code, CountedEvent, DecodedFrame, OperatorCommand, StationInput, TrackingMode,
};
