// ABOUTME: CLI entry point for incremental-replicator
// ABOUTME: Parses commands and routes to sync or validation

use clap::{Args, Parser, Subcommand};
use incremental_replicator::watermark::{display_watermark, RunSummary, RunnerConfig, SyncRunner};
use incremental_replicator::{config, postgres, preflight};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "incremental-replicator")]
#[command(about = "Watermark-based incremental PostgreSQL replication CLI", long_about = None)]
#[command(version)]
struct Cli {
    /// Allow self-signed TLS certificates (insecure - use only for testing)
    #[arg(
        long = "allow-self-signed-certs",
        global = true,
        default_value_t = false
    )]
    allow_self_signed_certs: bool,
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ConnectionArgs {
    /// Source database host
    #[arg(long, env = "SOURCE_DB_HOST")]
    source_host: String,
    /// Source database name
    #[arg(long, env = "SOURCE_DB_NAME")]
    source_db: String,
    /// Source database user
    #[arg(long, env = "SOURCE_DB_USER")]
    source_user: String,
    /// Source database password
    #[arg(long, env = "SOURCE_DB_PASSWORD", hide_env_values = true)]
    source_password: String,
    /// Source database port
    #[arg(long, env = "SOURCE_DB_PORT")]
    source_port: u16,
    /// Destination connection string
    #[arg(long, env = "DEST_DB_URL", hide_env_values = true)]
    dest_url: String,
}

impl ConnectionArgs {
    fn source_url(&self) -> anyhow::Result<String> {
        let params = config::SourceParams {
            host: self.source_host.clone(),
            database: self.source_db.clone(),
            user: self.source_user.clone(),
            password: self.source_password.clone(),
            port: self.source_port,
        };
        Ok(params.url()?)
    }
}

#[derive(Args, Clone)]
struct TableArgs {
    /// Tables to replicate (comma-separated; each entry is table or table:column)
    #[arg(long, value_delimiter = ',', required = true)]
    tables: Vec<String>,
    /// Timestamp column used as the high-water mark unless overridden per table
    #[arg(long, default_value = "timestamp")]
    timestamp_column: String,
}

impl TableArgs {
    fn specs(&self) -> anyhow::Result<Vec<config::TableSpec>> {
        Ok(config::parse_table_specs(
            &self.tables,
            &self.timestamp_column,
        )?)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Copy rows newer than each table's watermark from source to destination
    Run {
        #[command(flatten)]
        connection: ConnectionArgs,
        #[command(flatten)]
        tables: TableArgs,
        /// Per-operation timeout in seconds (0 disables the deadline)
        #[arg(long, default_value_t = 0)]
        timeout: u64,
        /// Repeat sync passes at this interval in seconds (default: single pass)
        #[arg(long)]
        interval: Option<u64>,
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate that source and destination are ready for replication
    Validate {
        #[command(flatten)]
        connection: ConnectionArgs,
        #[command(flatten)]
        tables: TableArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // 1. RUST_LOG environment variable has highest precedence
    // 2. --log flag is used if RUST_LOG is not set
    // 3. Default to "info" if neither are provided
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    postgres::init_tls_policy(cli.allow_self_signed_certs);

    match cli.command {
        Commands::Run {
            connection,
            tables,
            timeout,
            interval,
            json,
        } => {
            let specs = tables.specs()?;
            let runner = SyncRunner::new(
                connection.source_url()?,
                connection.dest_url.clone(),
                RunnerConfig {
                    tables: specs,
                    op_timeout: (timeout > 0).then(|| Duration::from_secs(timeout)),
                },
            );

            if let Some(secs) = interval {
                // Continuous mode: repeat passes until Ctrl-C
                let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);
                tokio::spawn(async move {
                    tokio::signal::ctrl_c()
                        .await
                        .expect("Failed to listen for Ctrl+C");
                    tracing::info!("Received shutdown signal");
                    let _ = shutdown_tx.send(());
                });

                runner.run(Duration::from_secs(secs), shutdown_rx).await?;
                return Ok(());
            }

            let summary = runner.run_once().await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }

            if !summary.is_success() {
                anyhow::bail!(
                    "{} of {} tables failed to sync",
                    summary.failures.len(),
                    summary.failures.len() + summary.outcomes.len()
                );
            }
            Ok(())
        }
        Commands::Validate { connection, tables } => {
            let specs = tables.specs()?;
            let result =
                preflight::run_preflight(&connection.source_url()?, &connection.dest_url, &specs)
                    .await;
            result.print();

            if !result.all_passed() {
                anyhow::bail!("{} pre-flight check(s) failed", result.failed_count());
            }
            Ok(())
        }
    }
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("========================================");
    println!("Sync pass complete");
    println!("========================================");
    println!("  Tables synced: {}", summary.outcomes.len());
    println!("  Rows copied: {}", summary.rows_copied());
    println!("  Duration: {}ms", summary.duration_ms);
    for outcome in &summary.outcomes {
        println!(
            "  ✓ {}: {} rows (watermark {} -> {})",
            outcome.table,
            outcome.rows_copied,
            display_watermark(&outcome.watermark_before),
            display_watermark(&outcome.watermark_after),
        );
    }
    for failure in &summary.failures {
        println!(
            "  ✗ {}: {} error while {}: {}",
            failure.table, failure.kind, failure.phase, failure.error
        );
    }
}
