mod config_commands;
mod settings_commands;
mod storage_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    termvault_config::TermvaultConfig,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "termvault", about = "Termvault: encrypted connection profile storage")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file to load instead of the discovered one.
    #[arg(long, global = true, env = "TERMVAULT_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the database (overrides config value).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Storage password for encrypted data.
    #[arg(long, global = true, env = "TERMVAULT_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show backend, lock state and whether data is stored or encrypted.
    Status,
    /// Measure this host and propose a PBKDF2 iteration count.
    Benchmark {
        /// Persist the result as the `pbkdf2Iterations` setting.
        #[arg(long)]
        save: bool,
    },
    /// Store connections read from a JSON file.
    Save {
        /// JSON file: `{"connections": [...]}` or a bare array of connections.
        #[arg(short, long)]
        input: PathBuf,
        /// Encrypt with the storage password.
        #[arg(long)]
        encrypt: bool,
    },
    /// Print the stored connections as JSON.
    Load,
    /// Delete the stored connections and their metadata.
    Clear,
    /// Check the storage password against the stored data.
    Verify,
    /// Re-encrypt stored data under a new password.
    ChangePassword {
        #[arg(long, env = "TERMVAULT_NEW_PASSWORD", hide_env_values = true)]
        new_password: String,
    },
    /// Application settings.
    Settings {
        #[command(subcommand)]
        action: settings_commands::SettingsAction,
    },
    /// Action log.
    Actions {
        #[command(subcommand)]
        action: settings_commands::LogAction,
    },
    /// Performance metrics.
    Metrics {
        #[command(subcommand)]
        action: settings_commands::LogAction,
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

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Explicit `--config` file, or discovery; then env and CLI overrides.
fn resolve_config(cli: &Cli) -> anyhow::Result<TermvaultConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = termvault_config::load_config(path)?;
            termvault_config::apply_env_overrides(&mut config);
            config
        },
        None => termvault_config::discover_and_load(),
    };
    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = Some(dir.clone());
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "termvault starting");

    // `config init` may target a file that doesn't exist yet.
    let config = match &cli.command {
        Commands::Config {
            action: config_commands::ConfigAction::Init { .. },
        } => TermvaultConfig::default(),
        _ => resolve_config(&cli)?,
    };
    let password = cli.password.as_deref();

    match cli.command {
        Commands::Config { action } => {
            config_commands::handle_config(action, &config, cli.config.as_deref())
        },
        Commands::Benchmark { save } => storage_commands::benchmark(&config, save).await,
        Commands::Status => {
            let svc = storage_commands::open_service(&config, password).await?;
            storage_commands::status(&svc).await
        },
        Commands::Save { input, encrypt } => {
            let svc = storage_commands::open_service(&config, password).await?;
            storage_commands::save(&svc, &input, encrypt).await
        },
        Commands::Load => {
            let svc = storage_commands::open_service(&config, password).await?;
            storage_commands::load(&svc).await
        },
        Commands::Clear => {
            let svc = storage_commands::open_service(&config, password).await?;
            storage_commands::clear(&svc).await
        },
        Commands::Verify => {
            let svc = storage_commands::open_service(&config, None).await?;
            storage_commands::verify(&svc, password).await
        },
        Commands::ChangePassword { new_password } => {
            let svc = storage_commands::open_service(&config, password).await?;
            storage_commands::change_password(&svc, &new_password).await
        },
        Commands::Settings { action } => {
            let svc = storage_commands::open_service(&config, None).await?;
            settings_commands::handle_settings(svc.settings(), action).await
        },
        Commands::Actions { action } => {
            let svc = storage_commands::open_service(&config, None).await?;
            settings_commands::handle_action_log(svc.settings(), action).await
        },
        Commands::Metrics { action } => {
            let svc = storage_commands::open_service(&config, None).await?;
            settings_commands::handle_metrics(svc.settings(), action).await
        },
    }
}
