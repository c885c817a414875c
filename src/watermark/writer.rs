// ABOUTME: AppendWriter - appends fetched rows into the destination table
// ABOUTME: One transaction per batch, chunked multi-row INSERTs under the parameter limit

use super::reader::RowBatch;
use crate::error::{ReplicationError, Result};
use tokio_postgres::types::{FromSql, ToSql};
use tokio_postgres::{Client, Row};

/// Appends rows to the destination database.
///
/// Strictly additive: rows are only ever inserted, never updated or deleted.
/// A whole batch is loaded inside a single transaction so a mid-batch fault
/// leaves the destination table unchanged instead of half-written.
pub struct AppendWriter<'a> {
    client: &'a mut Client,
}

impl<'a> AppendWriter<'a> {
    /// Create a new AppendWriter for the given destination connection.
    pub fn new(client: &'a mut Client) -> Self {
        Self { client }
    }

    /// Append all rows of a batch into a table.
    ///
    /// An empty batch is a no-op returning 0; nothing new since the watermark
    /// is not an error. Otherwise the batch is written with multi-row INSERT
    /// statements, chunked to stay under PostgreSQL's parameter limit, all
    /// inside one transaction committed at the end.
    ///
    /// Returns the number of rows written. Constraint violations (duplicate
    /// keys from a re-run after a partial prior failure) surface as integrity
    /// errors; the transaction rolls back on drop.
    pub async fn load(&mut self, table: &str, batch: &RowBatch) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }

        let context = format!("load into \"{}\"", table);
        let classify = |e| ReplicationError::classify_pg(&context, e);

        let chunk_rows = rows_per_statement(batch.columns.len());
        let tx = self.client.transaction().await.map_err(classify)?;

        let mut written = 0u64;
        for chunk in batch.rows.chunks(chunk_rows) {
            let query = build_insert_query(table, &batch.columns, chunk.len());

            let values: Vec<Vec<Box<dyn ToSql + Sync + Send>>> = chunk
                .iter()
                .map(row_values)
                .collect::<Result<_>>()?;
            let params: Vec<&(dyn ToSql + Sync)> = values
                .iter()
                .flat_map(|row| row.iter().map(|v| v.as_ref() as &(dyn ToSql + Sync)))
                .collect();

            written += tx.execute(&query, &params).await.map_err(classify)?;
        }

        tx.commit().await.map_err(classify)?;

        Ok(written)
    }
}

/// Rows per INSERT statement for a given column count.
///
/// PostgreSQL has a limit of ~65535 parameters per query; leave some margin.
fn rows_per_statement(num_columns: usize) -> usize {
    std::cmp::max(1, 65_000 / num_columns.max(1))
}

/// Build a multi-row insert for the batch's columns.
///
/// Generates a query like:
/// ```sql
/// INSERT INTO "table" ("col1", "col2") VALUES ($1, $2), ($3, $4), ...
/// ```
fn build_insert_query(table: &str, columns: &[String], num_rows: usize) -> String {
    let quoted_columns: Vec<String> = columns.iter().map(|c| format!("\"{}\"", c)).collect();

    let num_cols = columns.len();
    let value_rows: Vec<String> = (0..num_rows)
        .map(|row_idx| {
            let placeholders: Vec<String> = (0..num_cols)
                .map(|col_idx| format!("${}", row_idx * num_cols + col_idx + 1))
                .collect();
            format!("({})", placeholders.join(", "))
        })
        .collect();

    format!(
        "INSERT INTO \"{}\" ({}) VALUES {}",
        table,
        quoted_columns.join(", "),
        value_rows.join(", ")
    )
}

/// Convert a row into boxed ToSql values, driven by the result descriptor.
///
/// The descriptor type of each column decides how the value is extracted, so
/// what the reader fetched is exactly what gets written. An unsupported type
/// is a schema error rather than a lossy fallback: every column of the
/// source result must be transferred faithfully or not at all.
pub fn row_values(row: &Row) -> Result<Vec<Box<dyn ToSql + Sync + Send>>> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| match col.type_().name() {
            "int2" => take::<i16>(row, idx, col.name()),
            "int4" => take::<i32>(row, idx, col.name()),
            "int8" => take::<i64>(row, idx, col.name()),
            "float4" => take::<f32>(row, idx, col.name()),
            "float8" => take::<f64>(row, idx, col.name()),
            "bool" => take::<bool>(row, idx, col.name()),
            "text" | "varchar" | "bpchar" | "name" => take::<String>(row, idx, col.name()),
            "bytea" => take::<Vec<u8>>(row, idx, col.name()),
            "uuid" => take::<uuid::Uuid>(row, idx, col.name()),
            "timestamp" => take::<chrono::NaiveDateTime>(row, idx, col.name()),
            "timestamptz" => take::<chrono::DateTime<chrono::Utc>>(row, idx, col.name()),
            "date" => take::<chrono::NaiveDate>(row, idx, col.name()),
            "time" => take::<chrono::NaiveTime>(row, idx, col.name()),
            "json" | "jsonb" => take::<serde_json::Value>(row, idx, col.name()),
            "numeric" => take::<rust_decimal::Decimal>(row, idx, col.name()),
            other => Err(ReplicationError::schema(format!(
                "unsupported column type {} for column \"{}\"",
                other,
                col.name()
            ))),
        })
        .collect()
}

fn take<T>(row: &Row, idx: usize, name: &str) -> Result<Box<dyn ToSql + Sync + Send>>
where
    T: for<'b> FromSql<'b> + ToSql + Sync + Send + 'static,
{
    let value: Option<T> = row.try_get(idx).map_err(|e| {
        ReplicationError::schema(format!("failed to read column \"{}\": {}", name, e))
    })?;
    Ok(Box::new(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_insert_query_single_row() {
        let columns = vec!["id".to_string(), "name".to_string(), "ts".to_string()];
        let query = build_insert_query("events", &columns, 1);

        assert_eq!(
            query,
            "INSERT INTO \"events\" (\"id\", \"name\", \"ts\") VALUES ($1, $2, $3)"
        );
    }

    #[test]
    fn test_build_insert_query_multiple_rows() {
        let columns = vec!["id".to_string(), "name".to_string()];
        let query = build_insert_query("events", &columns, 3);

        assert!(query.contains("($1, $2), ($3, $4), ($5, $6)"));
    }

    #[test]
    fn test_build_insert_query_never_upserts() {
        let columns = vec!["id".to_string()];
        let query = build_insert_query("events", &columns, 1);

        assert!(!query.contains("ON CONFLICT"));
        assert!(!query.contains("UPDATE"));
    }

    #[test]
    fn test_rows_per_statement() {
        assert_eq!(rows_per_statement(1), 65_000);
        assert_eq!(rows_per_statement(10), 6_500);
        // Very wide rows still make progress one row at a time
        assert_eq!(rows_per_statement(100_000), 1);
        // Degenerate zero-column case must not divide by zero
        assert_eq!(rows_per_statement(0), 65_000);
    }
}
