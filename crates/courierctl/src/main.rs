//! courierctl: Command-line interface for courier HTTP tokens.
//!
//! Fetches a URL through a request token, optionally backed by a file cache,
//! and prints the outcome from the terminal.

mod cache;
mod commands;
mod outcome;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use courier::{ClientConfig, TextEncoding};

/// Command-line interface for courier HTTP tokens.
#[derive(Parser)]
#[command(name = "courierctl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// OpenTelemetry OTLP endpoint for metrics export
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    otel_endpoint: Option<String>,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    output: OutputFormat,

    #[command(flatten)]
    client: ClientConfig,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown output format: {}", s)),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a URL and print the response
    Get {
        /// Target URL
        url: String,
        /// HTTP method
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,
        /// Request header as 'Name: value' (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
        /// Request body
        #[arg(short = 'd', long)]
        data: Option<String>,
        /// Serve from and store into this file
        #[arg(long)]
        cache: Option<PathBuf>,
        /// Ignore an existing cache file
        #[arg(long)]
        refresh: bool,
        /// Text encoding used to print the body
        #[arg(long, default_value = "utf-8")]
        encoding: TextEncoding,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    courier::observability::tracing::init_tracing("courierctl", &cli.log_level);
    courier::observability::metrics::init_metrics_with_endpoint(cli.otel_endpoint.as_deref());

    match cli.command {
        Commands::Get {
            url,
            method,
            headers,
            data,
            cache,
            refresh,
            encoding,
        } => {
            let options = commands::get::GetOptions {
                url,
                method,
                headers,
                data,
                cache,
                refresh,
                encoding,
            };
            commands::get::run(&cli.client, options, cli.output).await?;
        }
    }

    Ok(())
}
