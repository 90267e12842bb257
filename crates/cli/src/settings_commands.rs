use {
    anyhow::{Result, bail},
    clap::Subcommand,
    serde_json::Value,
    termvault_storage::SettingsStore,
};

#[derive(Subcommand)]
pub enum SettingsAction {
    /// Print all settings as JSON.
    Show,
    /// Print one setting.
    Get { key: String },
    /// Set one setting. The value is parsed as JSON, or stored as a string.
    Set { key: String, value: String },
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum LogAction {
    /// Print entries, newest first.
    List {
        /// Show at most this many entries.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Remove all entries.
    Clear,
}

/// `true` → bool, `14` → number, `dark` → string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()))
}

pub async fn handle_settings(store: &SettingsStore, action: SettingsAction) -> Result<()> {
    match action {
        SettingsAction::Show => {
            let settings = store.settings().await?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
        },
        SettingsAction::Get { key } => match store.setting(&key).await? {
            Some(value) => println!("{value}"),
            None => bail!("setting '{key}' is not set"),
        },
        SettingsAction::Set { key, value } => {
            let value = parse_value(&value);
            store.update_setting(&key, value.clone()).await?;
            println!("{key} = {value}");
        },
    }
    Ok(())
}

pub async fn handle_action_log(store: &SettingsStore, action: LogAction) -> Result<()> {
    match action {
        LogAction::List { limit } => {
            let entries = store.action_log().await?;
            if entries.is_empty() {
                println!("Action log is empty.");
            }
            for entry in entries.iter().take(limit.unwrap_or(usize::MAX)) {
                if entry.details.is_null() {
                    println!("{}  {}", entry.timestamp, entry.action);
                } else {
                    println!("{}  {}  {}", entry.timestamp, entry.action, entry.details);
                }
            }
        },
        LogAction::Clear => {
            store.clear_action_log().await?;
            println!("Action log cleared.");
        },
    }
    Ok(())
}

pub async fn handle_metrics(store: &SettingsStore, action: LogAction) -> Result<()> {
    match action {
        LogAction::List { limit } => {
            let metrics = store.performance_metrics().await?;
            if metrics.is_empty() {
                println!("No performance metrics recorded.");
            }
            for metric in metrics.iter().take(limit.unwrap_or(usize::MAX)) {
                println!(
                    "{}  {:<16} {:>9.2}ms",
                    metric.timestamp, metric.name, metric.duration_ms
                );
            }
        },
        LogAction::Clear => {
            store.clear_performance_metrics().await?;
            println!("Performance metrics cleared.");
        },
    }
    Ok(())
}
