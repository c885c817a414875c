// ABOUTME: Error types for replication operations
// ABOUTME: Classifies PostgreSQL failures into the kinds the sync loop distinguishes

use serde::Serialize;
use thiserror::Error;

/// Error kinds surfaced in the run summary.
///
/// Every failure recorded for a table carries one of these so an operator can
/// tell a misconfiguration (`Schema`) from a transient fault (`Connection`)
/// from a destination needing manual reconciliation (`Integrity`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or invalid configuration; fatal before any table is processed
    Config,
    /// Cannot reach or lost connection to a database (includes timeouts)
    Connection,
    /// Missing table/column or incompatible column type
    Schema,
    /// Constraint violation on load
    Integrity,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Config => "config",
            Self::Connection => "connection",
            Self::Schema => "schema",
            Self::Integrity => "integrity",
        };
        f.write_str(s)
    }
}

/// Replication errors.
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection error (network, timeout, lost session)
    #[error("connection error: {0}")]
    Connection(String),

    /// Schema error (missing table/column, type mismatch)
    #[error("schema error: {0}")]
    Schema(String),

    /// Integrity error (constraint violation on load)
    #[error("integrity error: {0}")]
    Integrity(String),
}

impl ReplicationError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a schema error
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Create an integrity error
    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }

    /// Get the error kind for the run summary.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Connection(_) => ErrorKind::Connection,
            Self::Schema(_) => ErrorKind::Schema,
            Self::Integrity(_) => ErrorKind::Integrity,
        }
    }

    /// Classify a PostgreSQL error by SQLSTATE class.
    ///
    /// `context` names the operation that failed (e.g. `fetch from "events"`)
    /// and is prefixed to the database message.
    pub fn classify_pg(context: &str, e: tokio_postgres::Error) -> Self {
        if let Some(db_error) = e.as_db_error() {
            let code = db_error.code().code();
            // Integrity constraint violation class (23xxx)
            if code.starts_with("23") {
                let mut msg = format!("{}: {}", context, db_error.message());
                if code == "23505" {
                    // Duplicate keys after a partial prior failure are a state
                    // needing manual reconciliation, not a transient fault.
                    msg.push_str(
                        " (likely a re-run after a partially failed load; \
                         the destination needs manual reconciliation)",
                    );
                }
                return Self::Integrity(msg);
            }
            // Syntax/access class (42xxx: undefined table/column, datatype
            // mismatch) and data exception class (22xxx: bad comparison)
            if code.starts_with("42") || code.starts_with("22") {
                return Self::Schema(format!("{}: {}", context, db_error.message()));
            }
            // Everything else - connection exception (08xxx), insufficient
            // resources (53xxx), operator intervention (57xxx), transaction
            // rollback (40xxx) - is a fault of the session, not the schema
            // or the data; preserve the message and let the operator decide.
            return Self::Connection(format!("{}: {}", context, db_error.message()));
        }

        // No SQLSTATE: socket-level failure, closed session, or client-side
        // conversion problem. tokio-postgres does not expose a public
        // discriminant beyond is_closed(), so everything here is treated as
        // a connection fault and the full message is preserved.
        Self::Connection(format!("{}: {}", context, e))
    }
}

/// Result type for replication operations
pub type Result<T> = std::result::Result<T, ReplicationError>;
