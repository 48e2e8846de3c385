//! osb-cli — the operator command surface: add/edit/delete/list/
//! test-connection; tail sync logs; list/retry-now/discard retry items;
//! reset-breaker; manual re-send of the last N orders. Every mutating
//! subcommand prints the affected row id(s) as its sole stdout payload on
//! success; explanation goes to stderr. Exit code 0 on success, non-zero on
//! failure.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::open_store;

#[derive(Parser)]
#[command(name = "osb-cli")]
#[command(about = "Operator CLI for the order-sync bridge", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database bootstrap.
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },
    /// Connection CRUD + credential test.
    Connection {
        #[command(subcommand)]
        cmd: ConnectionCmd,
    },
    /// Tail a connection's sync logs.
    Logs {
        #[command(subcommand)]
        cmd: LogsCmd,
    },
    /// Inspect and act on a connection's retry queue.
    Retry {
        #[command(subcommand)]
        cmd: RetryCmd,
    },
    /// Reset a connection's breaker to CLOSED.
    ResetBreaker {
        /// Connection id.
        id: String,
    },
    /// Manually re-send the last N confirmed orders for a connection,
    /// bypassing the delivery ledger.
    Resend {
        /// Connection id.
        id: String,
        #[arg(long, default_value_t = 10)]
        count: i64,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    /// Apply embedded migrations (idempotent).
    Migrate,
}

#[derive(Subcommand)]
enum ConnectionCmd {
    /// Create a new connection.
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        upstream_base_url: String,
        #[arg(long)]
        upstream_db: String,
        #[arg(long)]
        upstream_username: String,
        #[arg(long)]
        api_key: String,
        #[arg(long)]
        webhook_url: String,
        #[arg(long)]
        webhook_secret: String,
        #[arg(long)]
        store_id: String,
        #[arg(long)]
        client_id: String,
        #[arg(long)]
        poll_interval_secs: Option<i64>,
    },
    /// Replace every field of an existing connection.
    Edit {
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        upstream_base_url: String,
        #[arg(long)]
        upstream_db: String,
        #[arg(long)]
        upstream_username: String,
        #[arg(long)]
        api_key: String,
        #[arg(long)]
        webhook_url: String,
        #[arg(long)]
        webhook_secret: String,
        #[arg(long)]
        store_id: String,
        #[arg(long)]
        client_id: String,
        #[arg(long)]
        poll_interval_secs: Option<i64>,
    },
    /// Delete a connection and its dependent rows.
    Delete { id: String },
    /// List every configured connection.
    List,
    /// Mark a connection active or inactive without editing other fields.
    Activate { id: String },
    Deactivate { id: String },
    /// Exchange credentials for a session id without dispatching anything.
    Test { id: String },
}

#[derive(Subcommand)]
enum LogsCmd {
    Tail {
        connection_id: String,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
}

#[derive(Subcommand)]
enum RetryCmd {
    List {
        connection_id: String,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    RetryNow {
        connection_id: String,
        retry_id: i64,
    },
    Discard {
        connection_id: String,
        retry_id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => match cmd {
            DbCmd::Migrate => {
                // open_store() runs embedded migrations as part of connecting;
                // this subcommand exists so an operator can apply them without
                // also standing up a connection or running a cycle.
                open_store().await?;
                println!("migrations_applied=true");
            }
        },

        Commands::Connection { cmd } => {
            let store = open_store().await?;
            match cmd {
                ConnectionCmd::Add {
                    name,
                    upstream_base_url,
                    upstream_db,
                    upstream_username,
                    api_key,
                    webhook_url,
                    webhook_secret,
                    store_id,
                    client_id,
                    poll_interval_secs,
                } => {
                    commands::connections::add(
                        &store,
                        name,
                        upstream_base_url,
                        upstream_db,
                        upstream_username,
                        api_key,
                        webhook_url,
                        webhook_secret,
                        store_id,
                        client_id,
                        poll_interval_secs,
                    )
                    .await?
                }
                ConnectionCmd::Edit {
                    id,
                    name,
                    upstream_base_url,
                    upstream_db,
                    upstream_username,
                    api_key,
                    webhook_url,
                    webhook_secret,
                    store_id,
                    client_id,
                    poll_interval_secs,
                } => {
                    commands::connections::edit(
                        &store,
                        id,
                        name,
                        upstream_base_url,
                        upstream_db,
                        upstream_username,
                        api_key,
                        webhook_url,
                        webhook_secret,
                        store_id,
                        client_id,
                        poll_interval_secs,
                    )
                    .await?
                }
                ConnectionCmd::Delete { id } => commands::connections::delete(&store, id).await?,
                ConnectionCmd::List => commands::connections::list(&store).await?,
                ConnectionCmd::Activate { id } => {
                    commands::connections::set_active(&store, id, true).await?
                }
                ConnectionCmd::Deactivate { id } => {
                    commands::connections::set_active(&store, id, false).await?
                }
                ConnectionCmd::Test { id } => {
                    commands::connections::test_connection(&store, id).await?
                }
            }
        }

        Commands::Logs { cmd } => {
            let store = open_store().await?;
            match cmd {
                LogsCmd::Tail { connection_id, limit } => {
                    commands::logs::tail(&store, connection_id, limit).await?
                }
            }
        }

        Commands::Retry { cmd } => {
            let store = open_store().await?;
            match cmd {
                RetryCmd::List { connection_id, limit } => {
                    commands::retries::list(&store, connection_id, limit).await?
                }
                RetryCmd::RetryNow { connection_id, retry_id } => {
                    commands::retries::retry_now(&store, connection_id, retry_id).await?
                }
                RetryCmd::Discard { connection_id, retry_id } => {
                    commands::retries::discard(&store, connection_id, retry_id).await?
                }
            }
        }

        Commands::ResetBreaker { id } => {
            let store = open_store().await?;
            commands::connections::reset_breaker(&store, id).await?
        }

        Commands::Resend { id, count } => {
            let store = open_store().await?;
            commands::resend::resend_last_n(&store, id, count).await?
        }
    }

    Ok(())
}
