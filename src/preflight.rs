// ABOUTME: Pre-flight validation checks for replication prerequisites
// ABOUTME: Validates connectivity and per-table watermark column readiness on both ends

use crate::config::TableSpec;
use crate::error::Result;
use tokio_postgres::Client;

/// Column types usable as a watermark.
const WATERMARK_TYPES: [&str; 3] = [
    "timestamp without time zone",
    "timestamp with time zone",
    "date",
];

/// Individual check result
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
}

impl CheckResult {
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: message.into(),
            details: None,
        }
    }

    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Complete pre-flight results
#[derive(Debug, Default)]
pub struct PreflightResult {
    pub connectivity: Vec<CheckResult>,
    pub tables: Vec<CheckResult>,
}

impl PreflightResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all_passed(&self) -> bool {
        self.connectivity
            .iter()
            .chain(self.tables.iter())
            .all(|check| check.passed)
    }

    pub fn failed_count(&self) -> usize {
        self.connectivity
            .iter()
            .chain(self.tables.iter())
            .filter(|check| !check.passed)
            .count()
    }

    /// Print formatted output
    pub fn print(&self) {
        println!();
        println!("Pre-flight Checks");
        println!("{}", "═".repeat(61));
        println!();

        if !self.connectivity.is_empty() {
            println!("Connectivity:");
            for check in &self.connectivity {
                let icon = if check.passed { "✓" } else { "✗" };
                println!("  {} {}", icon, check.message);
                if let Some(ref details) = check.details {
                    println!("      {}", details);
                }
            }
            println!();
        }

        if !self.tables.is_empty() {
            println!("Tables:");
            for check in &self.tables {
                let icon = if check.passed { "✓" } else { "✗" };
                println!("  {} {}", icon, check.message);
                if let Some(ref details) = check.details {
                    println!("      {}", details);
                }
            }
            println!();
        }

        if self.all_passed() {
            println!("All checks passed.");
        } else {
            println!("{} check(s) failed.", self.failed_count());
        }
    }
}

/// Run all pre-flight checks.
///
/// Connectivity failures short-circuit the table checks for that side; there
/// is nothing meaningful to report about tables on a database we cannot
/// reach.
pub async fn run_preflight(
    source_url: &str,
    dest_url: &str,
    tables: &[TableSpec],
) -> PreflightResult {
    let mut result = PreflightResult::new();

    let source = match crate::postgres::connect(source_url).await {
        Ok(client) => {
            result
                .connectivity
                .push(CheckResult::pass("source-connect", "Source database reachable"));
            Some(client)
        }
        Err(e) => {
            result.connectivity.push(
                CheckResult::fail("source-connect", "Cannot reach source database")
                    .with_details(e.to_string()),
            );
            None
        }
    };

    let dest = match crate::postgres::connect(dest_url).await {
        Ok(client) => {
            result.connectivity.push(CheckResult::pass(
                "dest-connect",
                "Destination database reachable",
            ));
            Some(client)
        }
        Err(e) => {
            result.connectivity.push(
                CheckResult::fail("dest-connect", "Cannot reach destination database")
                    .with_details(e.to_string()),
            );
            None
        }
    };

    for spec in tables {
        if let Some(ref client) = source {
            result
                .tables
                .push(check_watermark_column(client, "source", spec).await);
        }
        if let Some(ref client) = dest {
            result
                .tables
                .push(check_watermark_column(client, "destination", spec).await);
        }
    }

    result
}

/// Check that a table exists and its timestamp column has a watermark type.
async fn check_watermark_column(client: &Client, side: &str, spec: &TableSpec) -> CheckResult {
    let name = format!("{}-{}", side, spec.table);

    let oid = match lookup_table_oid(client, &spec.table).await {
        Ok(Some(oid)) => oid,
        Ok(None) => {
            return CheckResult::fail(
                name,
                format!("Table \"{}\" does not exist on {}", spec.table, side),
            );
        }
        Err(e) => {
            return CheckResult::fail(
                name,
                format!("Failed to look up \"{}\" on {}", spec.table, side),
            )
            .with_details(e.to_string());
        }
    };

    match lookup_column_type(client, oid, &spec.timestamp_column).await {
        Ok(Some(data_type)) if WATERMARK_TYPES.contains(&data_type.as_str()) => CheckResult::pass(
            name,
            format!(
                "{}: \"{}\".\"{}\" is {}",
                side, spec.table, spec.timestamp_column, data_type
            ),
        ),
        Ok(Some(data_type)) => CheckResult::fail(
            name,
            format!(
                "{}: \"{}\".\"{}\" has type {} (not usable as a watermark)",
                side, spec.table, spec.timestamp_column, data_type
            ),
        ),
        Ok(None) => CheckResult::fail(
            name,
            format!(
                "Column \"{}\" does not exist in \"{}\" on {}",
                spec.timestamp_column, spec.table, side
            ),
        ),
        Err(e) => CheckResult::fail(
            name,
            format!(
                "Failed to inspect \"{}\".\"{}\" on {}",
                spec.table, spec.timestamp_column, side
            ),
        )
        .with_details(e.to_string()),
    }
}

/// Resolve a table name through the search path to its relation OID.
async fn lookup_table_oid(client: &Client, table: &str) -> Result<Option<u32>> {
    let row = client
        .query_one("SELECT to_regclass($1)::oid", &[&table])
        .await
        .map_err(|e| {
            crate::error::ReplicationError::classify_pg(&format!("look up \"{}\"", table), e)
        })?;
    Ok(row.get(0))
}

/// Fetch a column's type name from the catalog.
async fn lookup_column_type(client: &Client, oid: u32, column: &str) -> Result<Option<String>> {
    let rows = client
        .query(
            "SELECT format_type(atttypid, atttypmod)
             FROM pg_attribute
             WHERE attrelid = $1 AND attname = $2 AND attnum > 0 AND NOT attisdropped",
            &[&oid, &column],
        )
        .await
        .map_err(|e| {
            crate::error::ReplicationError::classify_pg(
                &format!("inspect column \"{}\"", column),
                e,
            )
        })?;
    Ok(rows.first().map(|row| row.get(0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_result_pass_fail() {
        let pass = CheckResult::pass("x", "fine");
        assert!(pass.passed);
        assert!(pass.details.is_none());

        let fail = CheckResult::fail("x", "broken").with_details("why");
        assert!(!fail.passed);
        assert_eq!(fail.details.as_deref(), Some("why"));
    }

    #[test]
    fn test_preflight_result_counts() {
        let mut result = PreflightResult::new();
        assert!(result.all_passed());

        result.connectivity.push(CheckResult::pass("a", "ok"));
        result.tables.push(CheckResult::fail("b", "bad"));
        result.tables.push(CheckResult::fail("c", "bad"));

        assert!(!result.all_passed());
        assert_eq!(result.failed_count(), 2);
    }
}
