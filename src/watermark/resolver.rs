// ABOUTME: WatermarkResolver - reads the per-table high-water mark from the destination
// ABOUTME: MAX() of the timestamp column, typed from the result descriptor

use crate::config::TableSpec;
use crate::error::{ReplicationError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use tokio_postgres::Client;

/// The maximum value of a table's timestamp column, typed to match it.
///
/// Carrying the concrete type lets the fetch query compare against the
/// watermark with a properly typed parameter instead of a string round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Watermark {
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Date(NaiveDate),
}

impl std::fmt::Display for Watermark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timestamp(ts) => write!(f, "{}", ts),
            Self::TimestampTz(ts) => write!(f, "{}", ts),
            Self::Date(d) => write!(f, "{}", d),
        }
    }
}

/// Resolves the resume point for a table from the destination database.
///
/// The watermark is derived from destination content on every pass rather
/// than stored anywhere. This assumes the timestamp column is append-only
/// monotonic: rows are never mutated after insertion and the column is never
/// updated downward. Under that assumption the maximum value present in the
/// destination is exactly the point replication last reached.
pub struct WatermarkResolver<'a> {
    client: &'a Client,
}

impl<'a> WatermarkResolver<'a> {
    /// Create a new WatermarkResolver for the given destination connection.
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Resolve the current watermark for a table.
    ///
    /// Returns `None` when the table is empty or the column holds only NULLs,
    /// which triggers the full-copy path. A missing table or column is a
    /// schema error and fatal for this table; defaulting to "no watermark"
    /// there would mask misconfiguration as a full re-copy.
    pub async fn resolve(&self, spec: &TableSpec) -> Result<Option<Watermark>> {
        let context = format!("resolve watermark for \"{}\"", spec.table);
        let query = max_query(spec);

        let row = self
            .client
            .query_one(&query, &[])
            .await
            .map_err(|e| ReplicationError::classify_pg(&context, e))?;

        // MAX() preserves the column's type; read it from the descriptor so
        // the comparison parameter in the fetch query matches exactly.
        match row.columns()[0].type_().name() {
            "timestamp" => {
                let value: Option<NaiveDateTime> = row
                    .try_get(0)
                    .map_err(|e| ReplicationError::schema(format!("{}: {}", context, e)))?;
                Ok(value.map(Watermark::Timestamp))
            }
            "timestamptz" => {
                let value: Option<DateTime<Utc>> = row
                    .try_get(0)
                    .map_err(|e| ReplicationError::schema(format!("{}: {}", context, e)))?;
                Ok(value.map(Watermark::TimestampTz))
            }
            "date" => {
                let value: Option<NaiveDate> = row
                    .try_get(0)
                    .map_err(|e| ReplicationError::schema(format!("{}: {}", context, e)))?;
                Ok(value.map(Watermark::Date))
            }
            other => Err(ReplicationError::schema(format!(
                "{}: column \"{}\" has type {} which is not a supported watermark type \
                 (expected timestamp, timestamptz, or date)",
                context, spec.timestamp_column, other
            ))),
        }
    }
}

fn max_query(spec: &TableSpec) -> String {
    format!(
        "SELECT MAX(\"{}\") FROM \"{}\"",
        spec.timestamp_column, spec.table
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(table: &str, column: &str) -> TableSpec {
        TableSpec {
            table: table.to_string(),
            timestamp_column: column.to_string(),
        }
    }

    #[test]
    fn test_max_query_quotes_identifiers() {
        let query = max_query(&spec("events", "updated_at"));
        assert_eq!(query, "SELECT MAX(\"updated_at\") FROM \"events\"");
    }

    #[test]
    fn test_watermark_display() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(10, 5, 0)
            .unwrap();
        assert_eq!(Watermark::Timestamp(ts).to_string(), "2024-03-01 10:05:00");

        let d = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(Watermark::Date(d).to_string(), "2024-03-01");
    }

    #[test]
    fn test_watermark_serializes_untagged() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let json = serde_json::to_string(&Watermark::Date(d)).unwrap();
        assert_eq!(json, "\"2024-03-01\"");
    }
}
