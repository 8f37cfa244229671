mod config_commands;
mod setup_commands;

use std::path::{Path, PathBuf};

use {
    clap::{Parser, Subcommand},
    lazytrader_config::LazyTraderConfig,
    tracing::{debug, info},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(
    name = "lazytrader",
    version,
    about = "Lazy Trader: set up an automated Ostium trading agent"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file to use instead of the discovered one.
    #[arg(long, global = true, env = "LAZYTRADER_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk through agent setup for a wallet.
    Setup {
        /// Connected wallet address.
        #[arg(long, env = "LAZYTRADER_WALLET")]
        wallet: String,
        /// Use the built-in simulated backend instead of the HTTP API.
        #[arg(long)]
        simulate: bool,
        /// Run every step without asking.
        #[arg(short, long)]
        yes: bool,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so they never interleave with the chat on stdout.
    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// The file given with `--config`, or the discovered one. Env overrides
/// apply either way.
fn load_config(path: Option<&Path>) -> anyhow::Result<LazyTraderConfig> {
    match path {
        Some(path) => {
            let mut config = lazytrader_config::load_config(path)?;
            lazytrader_config::apply_env_overrides(&mut config);
            Ok(config)
        },
        None => Ok(lazytrader_config::discover_and_load()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "lazytrader starting");

    match cli.command {
        Commands::Setup {
            ref wallet,
            simulate,
            yes,
        } => {
            let config = load_config(cli.config.as_deref())?;
            debug!(base_url = %config.backend.base_url, simulate, "running setup");
            setup_commands::handle_setup(&config, wallet, simulate, yes).await
        },
        Commands::Config { ref action } => {
            config_commands::handle_config(action, cli.config.as_deref())
        },
    }
}
