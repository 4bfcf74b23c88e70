//! Shared configuration, error types and catalog domain types for stockwatch.

pub mod config;
pub mod constants;
pub mod error;
pub mod product;
pub mod types;
pub mod util;
