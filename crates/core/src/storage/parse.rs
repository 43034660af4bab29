//! Database value parsing utilities
//!
//! Provides error-safe parsing of stored values.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Error as SqlError;
use serde::de::DeserializeOwned;

use crate::models::RoomStatus;

fn conversion_error<E>(column: usize, e: E) -> SqlError
where
    E: std::error::Error + Send + Sync + 'static,
{
    SqlError::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
}

/// Fixed-width UTC timestamp so stored values sort and compare as text
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a DateTime from an RFC3339 string
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, SqlError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(0, e))
}

/// Parse a JSON column
pub fn parse_json<T: DeserializeOwned>(column: usize, s: &str) -> Result<T, SqlError> {
    serde_json::from_str(s).map_err(|e| conversion_error(column, e))
}

/// Parse a stored room status
pub fn parse_status(s: &str) -> Result<RoomStatus, SqlError> {
    RoomStatus::parse(s).ok_or_else(|| {
        conversion_error(
            0,
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unknown room status: {s}"),
            ),
        )
    })
}

/// Extension trait for converting rusqlite Results to Option
pub trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, SqlError>;
}

impl<T> OptionalExt<T> for Result<T, SqlError> {
    fn optional(self) -> Result<Option<T>, SqlError> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(SqlError::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
