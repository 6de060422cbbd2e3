use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use rmcp::ServiceExt;
use std::io;
use tracing_subscriber::{self, EnvFilter};

mod cloud_server;
mod config;
mod envelope;
mod error;
mod health;
mod logging;
mod open_cloud;
mod openai;

use cloud_server::CloudServer;
use logging::Logger;
use open_cloud::OpenCloudClient;

/// MCP bridge exposing OpenAI and Roblox Open Cloud operations as tools
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Run the MCP server using stdio transport (legacy flag maintained for backwards compatibility)
    #[arg(long = "stdio", hide = true)]
    legacy_stdio: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the MCP server using stdio transport
    #[command(alias = "stdio")]
    Server,
    /// Run the repository quality gates, printing per-check pass/fail and timing
    #[command(name = "health-check")]
    HealthCheck,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();
    let command = if args.legacy_stdio {
        Some(Command::Server)
    } else {
        args.command
    };

    match command {
        Some(Command::HealthCheck) => health::run(),
        Some(Command::Server) | None => run_server().await,
    }
}

async fn run_server() -> Result<()> {
    let logger = Logger::default();
    config::load_env(None);

    // Missing credentials are reported but never fatal: tools that do not
    // need the absent key keep working.
    let report = config::validate_environment();
    for warning in &report.warnings {
        logger.warn("bootstrap", warning, None);
    }
    for error in &report.errors {
        logger.error("bootstrap", error, None);
    }

    let server = CloudServer::new(OpenCloudClient::new(logger.clone()), logger.clone());
    logger.info(
        "bootstrap",
        &format!("Serving {} tools over stdio", server.tool_count()),
        None,
    );

    let service = server
        .serve(rmcp::transport::stdio())
        .await
        .inspect_err(|e| {
            tracing::error!("serving error: {:?}", e);
        })?;
    service.waiting().await?;
    tracing::info!("Bye!");
    Ok(())
}
