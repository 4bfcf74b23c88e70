//! Region session registry.

pub mod manager;

pub use manager::{FetchOptions, RegionSession, SessionLookup, SessionManager};
