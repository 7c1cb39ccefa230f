use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ats::auth::TokenHasher;
use ats::config::ServerConfig;
use ats::server::{AppState, create_router};
use ats::store::{AccessTokenRepository, SqliteStore};

#[cfg(unix)]
fn set_restrictive_permissions(path: &std::path::Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        tracing::warn!("Failed to set permissions on {}: {e}", path.display());
    }
}

#[derive(Parser)]
#[command(name = "ats")]
#[command(about = "Asset service for the automation task server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Start the server
    Serve {
        /// TOML config file; flags given on the command line take precedence
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Host to bind to [default: 127.0.0.1]
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to [default: 8080]
        #[arg(long, short)]
        port: Option<u16>,

        /// Data directory for the database [default: ./data]
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Initialize the server (create database and access token)
    Init {
        /// Data directory for the database
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,
    },
}

fn run_init(data_dir: PathBuf) -> anyhow::Result<()> {
    let config = ServerConfig {
        data_dir,
        ..ServerConfig::default()
    };
    fs::create_dir_all(&config.data_dir)?;

    let store = SqliteStore::new(config.db_path())?;
    store.initialize()?;

    let token_file = config.token_path();

    let issued = TokenHasher::new().issue(Utc::now())?;

    store.unit_of_work(|uow| {
        let tokens = uow.access_tokens();
        if tokens.count_active()? > 0 {
            return Err(ats::error::Error::Config(format!(
                "server already initialized, access token exists at {}",
                token_file.display()
            )));
        }
        tokens.create(&issued.record)
    })?;

    fs::write(&token_file, &issued.raw)?;

    #[cfg(unix)]
    set_restrictive_permissions(&token_file);

    println!();
    println!("========================================");
    println!("Access token (save this, it won't be shown again):");
    println!();
    println!("  {}", issued.raw);
    println!();
    if let Some(expires_at) = issued.record.expires_at {
        println!("Expires: {}", expires_at.to_rfc3339());
    }
    println!("Token also written to: {}", token_file.display());
    println!("========================================");
    println!();

    Ok(())
}

fn serve_config(
    config_file: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
    data_dir: Option<PathBuf>,
) -> anyhow::Result<ServerConfig> {
    let mut config = match config_file {
        Some(path) => ServerConfig::load(&path)?,
        None => ServerConfig::default(),
    };

    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(data_dir) = data_dir {
        config.data_dir = data_dir;
    }

    Ok(config)
}

async fn run_serve(config: ServerConfig) -> anyhow::Result<()> {
    if !config.data_dir.is_dir() {
        bail!(
            "Data directory {} does not exist. Run 'ats admin init' first.",
            config.data_dir.display()
        );
    }

    let store = SqliteStore::new(config.db_path())?;
    store.initialize()?;

    let active_tokens = store.unit_of_work(|uow| uow.access_tokens().count_active())?;
    if active_tokens == 0 {
        warn!("No access tokens exist; all requests will be admitted. Run 'ats admin init' to create one.");
    }

    let state = Arc::new(AppState::new(Arc::new(store)));

    let app = create_router(state);
    let addr = config.socket_addr()?;

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ats=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Admin { command } => match command {
            AdminCommands::Init { data_dir } => {
                run_init(data_dir)?;
            }
        },
        Commands::Serve {
            config,
            host,
            port,
            data_dir,
        } => {
            let config = serve_config(config, host, port, data_dir)?;
            run_serve(config).await?;
        }
    }

    Ok(())
}
