use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fanout_core::config::Config;
use fanout_core::core_fanout::{
    BatchStore, ChatId, DestinationId, FanoutService, FanoutSqlStore, MessageId, OriginRef,
    RegisterOutcome,
};
use fanout_core::logging::{init_logging_with_config, LogConfig};
use fanout_core::metrics;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

mod loopback;

use loopback::LoopbackTransport;

#[derive(Parser, Debug)]
#[command(name = "fanout")]
#[command(author, version, about = "Broadcast fan-out and batch retraction", long_about = None)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database file, overriding the configuration
    #[arg(long)]
    db: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register destination channels
    #[command(allow_negative_numbers = true)]
    Register {
        /// Channel ids
        #[arg(required = true)]
        destinations: Vec<i64>,
    },

    /// List registered destination channels
    Destinations,

    /// Show how many channels are registered
    Status,

    /// Copy a message to every registered channel
    #[command(allow_negative_numbers = true)]
    Broadcast {
        /// Chat holding the source message
        #[arg(long)]
        chat: i64,

        /// Source message id
        #[arg(long)]
        message: i64,

        /// Channels the loopback transport treats as unreachable
        #[arg(long = "unreachable")]
        unreachable: Vec<i64>,
    },

    /// Delete every copy of a broadcast message
    #[command(allow_negative_numbers = true)]
    Retract {
        /// Chat holding the source message
        #[arg(long)]
        chat: i64,

        /// Source message id
        #[arg(long)]
        message: i64,

        /// Channels the loopback transport treats as unreachable
        #[arg(long = "unreachable")]
        unreachable: Vec<i64>,
    },

    /// Show the most recent broadcast batches
    Batches {
        /// Maximum number of batches
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    config.apply_env(|key| std::env::var(key).ok())?;

    if let Some(db) = &args.db {
        config.store.db_path = db.clone();
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.to_lowercase();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }

    config.validate()?;
    Ok(config)
}

fn print<T: Serialize + std::fmt::Display>(value: &T, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", value);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    init_logging_with_config(LogConfig::try_from(&config.logging)?)?;
    metrics::init_metrics();

    debug!(db = %config.store.db_path.display(), "Fanout CLI started");

    let store = Arc::new(
        FanoutSqlStore::open(&config.store).with_context(|| {
            format!("Failed to open database {}", config.store.db_path.display())
        })?,
    );

    let unreachable = match &args.command {
        Command::Broadcast { unreachable, .. } | Command::Retract { unreachable, .. } => {
            unreachable.iter().copied().map(DestinationId).collect()
        }
        _ => Vec::new(),
    };
    let transport = Arc::new(LoopbackTransport::new(unreachable));
    let service = FanoutService::new(store.clone(), transport, &config.broadcast);

    match args.command {
        Command::Register { destinations } => {
            for id in destinations {
                let outcome = service.handle_register(DestinationId(id))?;
                match outcome {
                    RegisterOutcome::Registered => println!("Channel {} registered.", id),
                    RegisterOutcome::AlreadyRegistered => {
                        println!("Channel {} is already registered.", id)
                    }
                }
            }
        }
        Command::Destinations => {
            let destinations = service.destinations()?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&destinations)?);
            } else {
                for destination in destinations {
                    println!("{}", destination);
                }
            }
        }
        Command::Status => {
            print(&service.status()?, args.json)?;
        }
        Command::Broadcast { chat, message, .. } => {
            let origin = OriginRef::new(ChatId(chat), MessageId(message));
            let summary = service.handle_broadcast(origin).await?;
            info!(batch_id = %summary.batch_id, "Broadcast recorded");
            print(&summary, args.json)?;
        }
        Command::Retract { chat, message, .. } => {
            let origin = OriginRef::new(ChatId(chat), MessageId(message));
            let summary = service.handle_retract(origin).await?;
            print(&summary, args.json)?;
        }
        Command::Batches { limit } => {
            let batches = store.recent_batches(limit)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&batches)?);
            } else if batches.is_empty() {
                println!("No broadcasts recorded.");
            } else {
                for batch in batches {
                    println!(
                        "{}  origin {}  {} copies  {}",
                        batch.batch_id,
                        batch.origin,
                        batch.members.len(),
                        batch.state.as_str()
                    );
                }
            }
        }
    }

    Ok(())
}
