use thiserror::Error;

/// Application-level errors (process bootstrap and scheduling)
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    ServiceError(#[from] stockwatch_service::error::ServiceError),

    #[error(transparent)]
    DatabaseError(#[from] stockwatch_db::error::DbError),

    #[error(transparent)]
    CoreError(#[from] stockwatch_core::error::CoreError),

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Signal handler failed: {0}")]
    Signal(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type AppResult<T> = std::result::Result<T, AppError>;
