use thiserror::Error;

/// Errors raised while loading settings or validating domain values.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Settings could not be assembled from defaults, `config.toml` and the
    /// environment.
    #[error("Configuration error: {0}")]
    ConfigError(#[from] config::ConfigError),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
