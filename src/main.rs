use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shroomlog::auth::AuthContext;
use shroomlog::commands::{AddCommand, ConfigCommand, ListCommand, WatchCommand};
use shroomlog::config::Config;
use shroomlog::repository::{MushroomRepository, RemoteMushroomRepository};

#[derive(Parser)]
#[command(name = "shroom")]
#[command(version)]
#[command(about = "Log and browse your mushroom finds", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log a new mushroom find
    Add(AddCommand),

    /// List your recorded finds
    List(ListCommand),

    /// Follow your finds as they change
    Watch(WatchCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shroomlog=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::Add(cmd)) => {
            let (repository, user_id) = connect(&config)?;
            cmd.run(repository, &user_id).await?;
        }
        Some(Commands::List(cmd)) => {
            let (repository, user_id) = connect(&config)?;
            cmd.run(repository, &user_id).await?;
        }
        Some(Commands::Watch(cmd)) => {
            let (repository, user_id) = connect(&config)?;
            cmd.run(repository, &user_id).await?;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(&config)?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}

/// Builds the remote repository and resolves the signed-in user.
fn connect(
    config: &Config,
) -> Result<(Arc<dyn MushroomRepository>, String), Box<dyn std::error::Error>> {
    let repository = RemoteMushroomRepository::from_config(&config.store)?;

    let auth = AuthContext::new(config.user_id.value.clone());
    let user_id = auth.current_user_id().ok_or(
        "No user signed in. Set user_id in the config file or SHROOMLOG_USER_ID.",
    )?;

    Ok((Arc::new(repository), user_id))
}
