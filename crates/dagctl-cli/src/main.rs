//! CLI entry point for dagctl.
//!
//! This binary provides the `dagctl` command with subcommands for serving
//! the HTTP front end, running one-off queries, speaking the tool protocol
//! over stdio, and printing the tool catalog.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dagctl_adapters::{AirflowApi, AirflowClient};
use dagctl_intent::{Dispatcher, tool_catalog};
use dagctl_web::{McpServer, WebServer};

use crate::config::AppConfig;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// dagctl: control Airflow DAGs with plain-language queries.
#[derive(Parser)]
#[command(
    name = "dagctl",
    version,
    about = "Control Airflow DAGs with plain-language queries",
    long_about = "Interprets free-text queries and tool calls into Airflow REST actions \
                  (list, search, details, pause, unpause, trigger, latest run)."
)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API and the MCP endpoint.
    Serve {
        /// Override the bind address.
        #[arg(long)]
        bind: Option<String>,
        /// Override the port.
        #[arg(long)]
        port: Option<u16>,
    },

    /// Run one free-text query and print the response envelope.
    Query {
        /// The query text; multiple words are joined with spaces.
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Speak the MCP tool protocol over stdin/stdout.
    Mcp,

    /// Print the tool catalog as JSON.
    Tools,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Serve { bind, port } => {
            init_tracing("info");
            let mut config = AppConfig::load(config_path)?;
            if let Some(bind) = bind {
                config.web.bind_addr = bind;
            }
            if let Some(port) = port {
                config.web.port = port;
            }
            cmd_serve(config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Query { text } => {
            init_tracing("warn");
            cmd_query(AppConfig::load(config_path)?, &text.join(" ")).await
        }
        Commands::Mcp => {
            init_tracing("info");
            cmd_mcp(AppConfig::load(config_path)?).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Tools => {
            println!("{}", serde_json::to_string_pretty(&tool_catalog())?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

async fn cmd_serve(config: AppConfig) -> Result<()> {
    let client = connect(&config)?;
    let server =
        WebServer::new(config.web, client).context("failed to build the query interpreter")?;

    server
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("web server failed: {e}"))
}

async fn cmd_query(config: AppConfig, text: &str) -> Result<ExitCode> {
    let client = connect(&config)?;
    let dispatcher = dispatcher(&client)?;

    let result = dispatcher.run_query(text).await;
    client.close();

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn cmd_mcp(config: AppConfig) -> Result<()> {
    let client = connect(&config)?;
    let mcp = McpServer::new(Arc::new(dispatcher(&client)?));

    info!("serving MCP over stdio");
    let served = mcp
        .serve_lines(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await;
    client.close();
    served.context("stdio transport failed")
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn connect(config: &AppConfig) -> Result<Arc<AirflowClient>> {
    let client = AirflowClient::new(config.airflow.clone())
        .context("invalid Airflow client configuration")?;
    Ok(Arc::new(client))
}

fn dispatcher(client: &Arc<AirflowClient>) -> Result<Dispatcher> {
    let api: Arc<dyn AirflowApi> = client.clone();
    Dispatcher::new(api).context("failed to build the query interpreter")
}

/// Initialize the tracing subscriber with the given default log level.
///
/// Logs go to stderr so stdout stays free for command output and protocol
/// frames.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
