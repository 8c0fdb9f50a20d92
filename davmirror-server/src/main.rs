mod config;
use anyhow::Context;
use clap::{Parser, Subcommand};
use config::Config;
use davmirror_core::{ReplicatedStore, UploadSource, hashed_name};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod server;
use server::run_server;

#[derive(Parser)]
#[command(name = "davmirror")]
#[command(about = "Replicated file storage over WebDAV-style endpoints")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml", global = true)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a local file to every location
    Put {
        name: String,
        file: PathBuf,

        /// Store under the md5-hashed file name
        #[arg(long)]
        hash: bool,
    },
    /// Download an object from one location
    Get {
        name: String,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete an object from every location
    Delete { name: String },
    /// Exit with status 0 when any location holds the object
    Exists { name: String },
    /// Print the object size reported by the first reachable location
    Size { name: String },
    /// Print the public URL of an object
    Url { name: String },
    /// Start the HTTP gateway
    Serve {
        /// Overrides bind_addr from the configuration file
        #[arg(long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "davmirror=info,davmirror_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let cfg = match Config::from_file(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let store = match cfg.build_store() {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to build store: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run_command(cli.command, &cfg, store).await {
        Ok(code) => code,
        Err(error) => {
            tracing::error!("{:#}", error);
            ExitCode::FAILURE
        }
    }
}

async fn run_command(
    command: Commands,
    cfg: &Config,
    store: ReplicatedStore,
) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Put { name, file, hash } => {
            let name = if hash { hashed_name(&name) } else { name };
            let stored = store
                .save(&name, &UploadSource::file(&file))
                .await
                .with_context(|| format!("failed to upload {}", file.display()))?;
            println!("{}", stored);
        }
        Commands::Get { name, output } => {
            let object = store.open(&name).await?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, object.bytes())
                        .await
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    tracing::info!("Wrote {} bytes to {}", object.len(), path.display());
                }
                None => {
                    let mut stdout = std::io::stdout().lock();
                    std::io::copy(&mut object.reader(), &mut stdout)?;
                    stdout.flush()?;
                }
            }
        }
        Commands::Delete { name } => {
            store.delete(&name).await?;
            tracing::info!("Deleted {} from {} locations", name, store.locations().len());
        }
        Commands::Exists { name } => {
            let found = store.exists(&name).await;
            println!("{}", found);
            if !found {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Size { name } => match store.size(&name).await {
            Some(size) => println!("{}", size),
            None => println!("unknown"),
        },
        Commands::Url { name } => {
            println!("{}", store.url(&name));
        }
        Commands::Serve { bind } => {
            let bind_addr = bind.unwrap_or_else(|| cfg.bind_addr.clone());
            tracing::info!(
                "Serving {} locations, replication mode {:?}",
                store.locations().len(),
                store.replication_mode()
            );
            run_server(store, &bind_addr, cfg.max_upload_bytes).await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
