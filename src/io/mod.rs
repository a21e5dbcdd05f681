//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `decoder_feed` - TCP listener for per-frame decode results
//! - `operator` - Operator commands on stdin
//! - `report_channel` - Typed channel for remote report messages
//! - `report_sink` - Remote reporting sink trait and the log-only sink
//! - `firebase` - Firebase Realtime Database sink
//! - `prometheus` - Prometheus metrics HTTP endpoint

pub mod decoder_feed;
pub mod firebase;
pub mod operator;
pub mod prometheus;
pub mod report_channel;
pub mod report_sink;

// Re-export commonly used types
pub use decoder_feed::{start_decoder_feed, DecoderFeedConfig};
pub use firebase::FirebaseSink;
pub use report_channel::{create_report_channel, ReportMessage, ReportSender, SummaryReport};
pub use report_sink::{LogSink, ReportSink};
