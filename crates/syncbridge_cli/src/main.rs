//! syncbridge CLI
//!
//! Command-line tools for syncbridge.
//!
//! # Commands
//!
//! - `upload` - Stream a file or remote resource to an attachment URL
//! - `simulate` - Drive the replication controls against the in-memory engine
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// syncbridge command-line tools.
#[derive(Parser)]
#[command(name = "syncbridge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload an attachment with PUT, printing progress
    Upload {
        /// Source: absolute path, file: URI or http(s) URL
        #[arg(short, long)]
        source: String,

        /// Target attachment URL
        #[arg(short, long)]
        target: String,

        /// Value of the Authorization header
        #[arg(short, long)]
        auth: String,

        /// Value of the Content-Type header
        #[arg(short = 'c', long, default_value = "application/octet-stream")]
        content_type: String,

        /// HTTP method (only PUT is accepted)
        #[arg(short, long, default_value = "PUT")]
        method: String,

        /// Bytes per chunk
        #[arg(long, default_value = "1024")]
        chunk_size: usize,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Run a replication scenario against the in-memory engine
    Simulate {
        /// Database name
        #[arg(short, long, default_value = "app")]
        database: String,

        /// Remote sync endpoint
        #[arg(short, long)]
        remote: String,

        /// Replication type (push, pull)
        #[arg(short = 't', long = "type", default_value = "pull")]
        kind: String,

        /// Session token
        #[arg(long, default_value = "session")]
        session_id: String,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Upload {
            source,
            target,
            auth,
            content_type,
            method,
            chunk_size,
            format,
        } => {
            let request = syncbridge_transfer::UploadRequest::new(
                method,
                auth,
                source,
                target,
                content_type,
            );
            commands::upload::run(request, chunk_size, &format).await?;
        }
        Commands::Simulate {
            database,
            remote,
            kind,
            session_id,
        } => {
            commands::simulate::run(&database, &remote, &kind, &session_id)?;
        }
        Commands::Version => {
            println!("syncbridge CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("syncbridge core v{}", syncbridge_core::VERSION);
        }
    }

    Ok(())
}
