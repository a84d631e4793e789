mod config_commands;
mod replay_commands;

use std::path::PathBuf;

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
    vesper_config::{LogFormat, VesperConfig},
};

#[derive(Parser)]
#[command(name = "vesper", about = "Vesper directive dispatch tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file to load instead of searching the standard locations.
    #[arg(long, global = true, env = "VESPER_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scripted scenario through the directive processor.
    Replay {
        /// Scenario file (TOML).
        scenario: PathBuf,
    },
    /// Configuration inspection.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli, config: &VesperConfig) {
    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs || config.logging.format == LogFormat::Json {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<VesperConfig> {
    match &cli.config {
        Some(path) => vesper_config::load_config(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(vesper_config::discover_and_load()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    init_telemetry(&cli, &config);

    info!(version = env!("CARGO_PKG_VERSION"), "vesper starting");

    match cli.command {
        Commands::Replay { scenario } => {
            replay_commands::handle_replay(&scenario, &config.directives).await
        },
        Commands::Config { action } => config_commands::handle_config(action, &config),
    }
}
