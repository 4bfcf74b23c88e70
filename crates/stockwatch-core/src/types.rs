use serde::{Deserialize, Serialize};

use crate::constants::{MAX_MAX_NOTIFY_COUNT, MIN_MAX_NOTIFY_COUNT};
use crate::error::{CoreError, CoreResult};

/// Geographic catalog partition (an upstream "substore" alias).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Region(String);

impl Region {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Region {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Region {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Per-user repeat-notification policy, without database dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStyle {
    /// Notify once, then drop the tracking record.
    #[default]
    Once,
    /// Notify up to the user's budget on every restock.
    Always,
}

impl TrackingStyle {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Once => "once",
            Self::Always => "always",
        }
    }

    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Once => Self::Always,
            Self::Always => Self::Once,
        }
    }
}

impl std::fmt::Display for TrackingStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TrackingStyle {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "once" => Ok(Self::Once),
            "always" => Ok(Self::Always),
            other => Err(CoreError::InvalidInput(format!(
                "unknown tracking style: {other}"
            ))),
        }
    }
}

/// A user's tracking style together with the parameters that style needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingPolicy {
    Once,
    Always { max_count: i32 },
}

impl TrackingPolicy {
    #[must_use]
    pub const fn from_settings(style: TrackingStyle, max_notify_count: i32) -> Self {
        match style {
            TrackingStyle::Once => Self::Once,
            TrackingStyle::Always => Self::Always {
                max_count: max_notify_count,
            },
        }
    }

    #[must_use]
    pub const fn style(self) -> TrackingStyle {
        match self {
            Self::Once => TrackingStyle::Once,
            Self::Always { .. } => TrackingStyle::Always,
        }
    }
}

/// ## Summary
/// Checks that a per-user notification budget is within `1..=100`.
///
/// ## Errors
/// Returns `ValidationError` when the value is out of range.
pub fn validate_max_notify_count(value: i32) -> CoreResult<i32> {
    if (MIN_MAX_NOTIFY_COUNT..=MAX_MAX_NOTIFY_COUNT).contains(&value) {
        Ok(value)
    } else {
        Err(CoreError::ValidationError(format!(
            "max notify count must be between {MIN_MAX_NOTIFY_COUNT} and {MAX_MAX_NOTIFY_COUNT}, got {value}"
        )))
    }
}
