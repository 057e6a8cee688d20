use anyhow::Result;
use clap::{Parser, Subcommand};
use metatx_types::{Address, U160};
use std::path::PathBuf;
use tokio::signal;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod bundle_file;
mod commands;

#[derive(Parser)]
#[command(name = "metatx")]
#[command(about = "Meta transaction id derivation and confirmation", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Commands,

	#[arg(short, long, value_name = "FILE", default_value = "config/metatx.toml")]
	config: PathBuf,

	/// Overrides the level from the config file
	#[arg(long, env = "METATX_LOG_LEVEL")]
	log_level: Option<String>,

	#[arg(long)]
	json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
	/// Print the meta transaction id of a bundle file
	Id {
		#[arg(long, value_name = "FILE")]
		bundle: PathBuf,
	},
	/// Wait for a meta transaction to execute or fail
	Wait {
		id: String,
		#[arg(long)]
		timeout_secs: Option<u64>,
	},
	/// Read a wallet nonce through the local relayer
	Nonce {
		#[arg(long)]
		wallet: Address,
		#[arg(long, default_value = "0")]
		space: U160,
	},
	/// Relay a signed bundle through the local relayer
	Relay {
		#[arg(long, value_name = "FILE")]
		signed: PathBuf,
		/// Wait for the bundle outcome after relaying
		#[arg(long)]
		wait: bool,
		#[arg(long)]
		timeout_secs: Option<u64>,
	},
	/// Validate the configuration file
	Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	// Deriving an id needs no configuration
	if let Commands::Id { bundle } = &cli.command {
		setup_tracing(cli.log_level.as_deref().unwrap_or("info"), cli.json_logs)?;
		return commands::compute_id(bundle);
	}

	let config = commands::load_config(&cli.config).await?;
	let log_level = cli
		.log_level
		.clone()
		.unwrap_or_else(|| config.logging.level.clone());
	setup_tracing(&log_level, cli.json_logs || config.logging.json)?;

	match cli.command {
		Commands::Id { .. } => Ok(()),
		Commands::Wait { id, timeout_secs } => commands::wait(&config, &id, timeout_secs).await,
		Commands::Nonce { wallet, space } => commands::nonce(&config, wallet, space).await,
		Commands::Relay {
			signed,
			wait,
			timeout_secs,
		} => commands::relay(&config, &signed, wait, timeout_secs).await,
		Commands::Validate => commands::validate(&config),
	}
}

fn setup_tracing(log_level: &str, json: bool) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	let registry = tracing_subscriber::registry().with(env_filter);
	if json {
		registry
			.with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
			.init();
	} else {
		registry
			.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
			.init();
	}

	Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
pub(crate) async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			warn!("Failed to install Ctrl+C handler: {}", e);
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut stream) => {
				stream.recv().await;
			}
			Err(e) => {
				warn!("Failed to install SIGTERM handler: {}", e);
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
