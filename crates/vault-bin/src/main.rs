//! deskvault - encrypted workspace store.

mod app;
mod handlers;
mod protocol;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use handlers::Handlers;
use protocol::Request;
use tracing::info;
use vault_config::{init_logging, Config, Paths};
use vault_keyring::{KeyManager, KeyStatus};

/// deskvault command-line interface.
#[derive(Parser)]
#[command(name = "deskvault")]
#[command(about = "Encrypted store for workspaces, file content and preferences")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Defaults to the config file's.
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for the database, config and logs. Defaults to ~/.deskvault
    #[arg(long, global = true, env = "DESKVAULT_BASE_DIR")]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one request and print the response
    Call {
        /// Method name, e.g. workspace.list
        method: String,
        /// Params as a JSON object
        params: Option<String>,
    },
    /// Read NDJSON requests from stdin and write responses to stdout
    Serve,
    /// Inspect the database key
    Key {
        #[command(subcommand)]
        command: KeyCommand,
    },
}

#[derive(Subcommand)]
enum KeyCommand {
    /// Report whether a usable key exists, without printing it
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = Paths::resolve(cli.base_dir)?;
    paths.ensure_dirs()?;
    let config = Config::load(&paths)?;
    let level = cli.log_level.unwrap_or_else(|| config.log_level.clone());
    init_logging(&level, &paths.log_file(), false);

    match cli.command {
        Commands::Call { method, params } => {
            let params = params
                .map(|p| serde_json::from_str::<serde_json::Value>(&p))
                .transpose()?;
            let store = app::open_store(&paths, &config).await?;
            let response = Handlers::new(store.clone())
                .handle(Request::new(&method, params))
                .await;
            store.close().await?;

            println!("{}", response.to_json()?);
            if !response.is_success() {
                std::process::exit(1);
            }
        }
        Commands::Serve => {
            let store = app::open_store(&paths, &config).await?;
            info!("Serving requests on stdin");
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            serve::serve(Handlers::new(store.clone()), stdin, tokio::io::stdout()).await?;
            store.close().await?;
        }
        Commands::Key {
            command: KeyCommand::Status,
        } => {
            let keys = KeyManager::platform()?;
            let status = match keys.status()? {
                KeyStatus::Missing => "missing",
                KeyStatus::Present => "present",
                KeyStatus::ForeignDevice => "foreign_device",
                KeyStatus::Corrupted => "corrupted",
            };
            println!(
                "{}",
                serde_json::json!({ "status": status, "device_tag": keys.device().tag() })
            );
        }
    }

    Ok(())
}
