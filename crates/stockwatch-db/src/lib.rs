//! PostgreSQL persistence for users, tracking records, stock history and activity.

pub mod db;
pub mod error;
pub mod model;
