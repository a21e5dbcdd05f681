//! Services - business logic and state management
//!
//! - `detection_tracker` - Debounce, counting and display expiry of decoded codes
//! - `station` - Control loop feeding frames and operator commands to the tracker
//! - `report_worker` - Async worker delivering reports to the remote store

pub mod detection_tracker;
pub mod report_worker;
pub mod station;

// Re-export commonly used types
pub use detection_tracker::{Counters, DetectionTracker, StockBalance};
pub use report_worker::ReportWorker;
pub use station::{Station, StationSummary};
