//! Database enum types with Diesel serialization.
//!
//! Each enum implements `ToSql` and `FromSql` for automatic conversion between Rust and `PostgreSQL`.

use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use std::fmt;
use std::io::Write;

/// Per-user tracking style.
///
/// Maps to `app_user.tracking_style` CHECK constraint.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    AsExpression,
    FromSqlRow,
    serde::Serialize,
    serde::Deserialize,
)]
#[diesel(sql_type = Text)]
pub enum TrackingStyle {
    Once,
    Always,
}

impl ToSql<Text, Pg> for TrackingStyle {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for TrackingStyle {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"once" => Ok(Self::Once),
            b"always" => Ok(Self::Always),
            _ => Err("Unrecognized enum variant".into()),
        }
    }
}

impl TrackingStyle {
    /// Returns the database string representation of this tracking style.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Once => "once",
            Self::Always => "always",
        }
    }
}

impl From<TrackingStyle> for stockwatch_core::types::TrackingStyle {
    fn from(db_style: TrackingStyle) -> Self {
        match db_style {
            TrackingStyle::Once => Self::Once,
            TrackingStyle::Always => Self::Always,
        }
    }
}

impl From<stockwatch_core::types::TrackingStyle> for TrackingStyle {
    fn from(core_style: stockwatch_core::types::TrackingStyle) -> Self {
        match core_style {
            stockwatch_core::types::TrackingStyle::Once => Self::Once,
            stockwatch_core::types::TrackingStyle::Always => Self::Always,
        }
    }
}

impl fmt::Display for TrackingStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_to_and_from_core_style() {
        for style in [TrackingStyle::Once, TrackingStyle::Always] {
            let core: stockwatch_core::types::TrackingStyle = style.into();
            assert_eq!(core.as_str(), style.as_str());
            assert_eq!(TrackingStyle::from(core), style);
        }
    }
}
