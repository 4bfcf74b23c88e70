pub mod bootstrap;
pub mod error;
pub mod scheduler;
