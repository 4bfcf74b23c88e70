use thiserror::Error;

/// Service layer errors - combines all error types
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    DatabaseError(#[from] stockwatch_db::error::DbError),

    #[error(transparent)]
    CoreError(#[from] stockwatch_core::error::CoreError),

    #[error(transparent)]
    UpstreamError(#[from] UpstreamError),

    #[error(transparent)]
    DeliveryError(#[from] DeliveryError),

    #[error(transparent)]
    TrackingError(#[from] TrackingError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl From<diesel::result::Error> for ServiceError {
    fn from(e: diesel::result::Error) -> Self {
        Self::DatabaseError(e.into())
    }
}

impl ServiceError {
    /// Text safe to show an end user. Internal details stay in the logs.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::TrackingError(TrackingError::AlreadyTracking { .. }) => {
                "You are already tracking this product."
            }
            Self::TrackingError(TrackingError::NotTracking { .. }) => {
                "You are not tracking this product."
            }
            Self::CoreError(stockwatch_core::error::CoreError::ValidationError(_)) => {
                "That value is not allowed. Please try again."
            }
            Self::UpstreamError(UpstreamError::UnknownPincode(_)) => {
                "We could not find a store for that pincode."
            }
            Self::NotFound(_) => "We could not find what you were looking for.",
            _ => "Something went wrong. Please try again later.",
        }
    }
}

/// Tracking state violations surfaced to interactive callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackingError {
    #[error("{sku} is already tracked")]
    AlreadyTracking { sku: String },

    #[error("{sku} is not tracked")]
    NotTracking { sku: String },
}

/// Failures talking to the upstream catalog.
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("No cookies received from upstream")]
    MissingCookies,

    #[error("No store found for pincode {0}")]
    UnknownPincode(String),

    #[error("Malformed upstream response: {0}")]
    Decode(String),

    #[error("Invalid upstream URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid request header: {0}")]
    InvalidHeader(String),
}

/// Outcome of a failed delivery job.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The recipient can never be reached again (blocked or deactivated).
    #[error("Recipient {recipient} is unreachable: {reason}")]
    Unreachable { recipient: i64, reason: String },

    #[error("Transient delivery failure: {0}")]
    Transient(String),

    #[error("Delivery queue is closed")]
    QueueClosed,
}

impl DeliveryError {
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_hides_internal_details() {
        let err = ServiceError::InvalidConfiguration("secret token missing".to_string());
        assert!(!err.user_message().contains("secret"));

        let err = ServiceError::from(TrackingError::AlreadyTracking {
            sku: "A".to_string(),
        });
        assert_eq!(err.user_message(), "You are already tracking this product.");
    }

    #[test]
    fn query_errors_are_database_errors() {
        let err = ServiceError::from(diesel::result::Error::NotFound);
        assert!(matches!(
            err,
            ServiceError::DatabaseError(stockwatch_db::error::DbError::DatabaseError(
                diesel::result::Error::NotFound
            ))
        ));
    }

    #[test]
    fn only_unreachable_is_permanent() {
        assert!(
            DeliveryError::Unreachable {
                recipient: 1,
                reason: "blocked".to_string()
            }
            .is_permanent()
        );
        assert!(!DeliveryError::Transient("timeout".to_string()).is_permanent());
        assert!(!DeliveryError::QueueClosed.is_permanent());
    }
}
