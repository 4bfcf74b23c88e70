//! Stock polling pipeline: upstream sessions, change detection, tracking
//! state and rate-limited notification delivery.

pub mod analytics;
pub mod broadcast;
pub mod cache;
pub mod checker;
pub mod delivery;
pub mod diff;
pub mod dispatch;
pub mod error;
pub mod ops_log;
pub mod render;
pub mod report;
pub mod session;
pub mod store;
pub mod upstream;
pub mod users;
