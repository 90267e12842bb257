use std::path::Path;

use {
    anyhow::{Context, Result, bail},
    serde_json::{Value, json},
    termvault_config::TermvaultConfig,
    termvault_storage::{StorageData, StorageService},
    termvault_vault::{BenchmarkParams, benchmark::benchmark_async},
};

/// Open the configured store, unlocking it when a password was given.
pub async fn open_service(config: &TermvaultConfig, password: Option<&str>) -> Result<StorageService> {
    let svc = StorageService::open(config, None).await?;
    if let Some(password) = password {
        svc.unlock(password).await?;
    }
    Ok(svc)
}

pub async fn status(svc: &StorageService) -> Result<()> {
    let status = svc.status().await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

/// Run the benchmark. With `save`, persist it through the service instead.
pub async fn benchmark(config: &TermvaultConfig, save: bool) -> Result<()> {
    if save {
        let svc = open_service(config, None).await?;
        let iterations = svc.calibrate().await?;
        println!("Saved pbkdf2Iterations = {iterations}");
        return Ok(());
    }

    let kdf = &config.kdf;
    let params = BenchmarkParams::new(
        kdf.benchmark_target_secs,
        kdf.benchmark_max_total_secs,
        kdf.benchmark_max_rounds,
    );
    let outcome = benchmark_async(params).await?;
    println!("Iterations: {}", outcome.iterations);
    println!("Rounds:     {}", outcome.rounds);
    println!("Elapsed:    {:.3}s", outcome.elapsed_secs);
    println!("Stopped:    {:?}", outcome.stop);
    Ok(())
}

/// Parse a save input: a full payload object or a bare connection array.
fn parse_input(raw: &str) -> Result<StorageData> {
    let value: Value = serde_json::from_str(raw).context("input is not valid JSON")?;
    let value = match value {
        Value::Array(_) => json!({ "connections": value }),
        other => other,
    };
    let mut data: StorageData =
        serde_json::from_value(value).context("input is not a connection list")?;
    if data.timestamp == 0 {
        data.timestamp = StorageData::new(Vec::new()).timestamp;
    }
    Ok(data)
}

pub async fn save(svc: &StorageService, input: &Path, encrypt: bool) -> Result<()> {
    if encrypt && !svc.is_unlocked().await {
        bail!("--encrypt needs a password (--password or TERMVAULT_PASSWORD)");
    }
    let raw = std::fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let data = parse_input(&raw)?;

    svc.save(&data, encrypt).await?;
    svc.settings()
        .log_action(
            "connections.save",
            json!({"count": data.connections.len(), "encrypted": encrypt}),
        )
        .await?;
    println!(
        "Saved {} connection(s){}.",
        data.connections.len(),
        if encrypt { " (encrypted)" } else { "" }
    );
    Ok(())
}

pub async fn load(svc: &StorageService) -> Result<()> {
    match svc.load().await? {
        Some(data) => println!("{}", serde_json::to_string_pretty(&data)?),
        None => eprintln!("No stored connections."),
    }
    Ok(())
}

pub async fn clear(svc: &StorageService) -> Result<()> {
    svc.clear().await?;
    svc.settings()
        .log_action("connections.clear", Value::Null)
        .await?;
    println!("Stored connections cleared.");
    Ok(())
}

pub async fn verify(svc: &StorageService, password: Option<&str>) -> Result<()> {
    let Some(password) = password else {
        bail!("verify needs a password (--password or TERMVAULT_PASSWORD)");
    };
    svc.verify_password(password).await?;
    println!("Password OK.");
    Ok(())
}

pub async fn change_password(svc: &StorageService, new_password: &str) -> Result<()> {
    if new_password.is_empty() {
        bail!("new password must not be empty");
    }
    svc.change_password(new_password).await?;
    svc.settings()
        .log_action("storage.password_changed", Value::Null)
        .await?;
    println!("Password changed.");
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, tempfile::TempDir};

    fn config_in(dir: &TempDir) -> TermvaultConfig {
        let mut config = TermvaultConfig::default();
        config.storage.data_dir = Some(dir.path().to_path_buf());
        config.kdf.iterations = Some(1_000);
        config
    }

    #[test]
    fn parse_input_accepts_bare_array() {
        let data = parse_input(r#"[{"id": "a"}, {"id": "b", "hostname": "h"}]"#).unwrap();
        assert_eq!(data.connections.len(), 2);
        assert!(data.timestamp > 0);
    }

    #[test]
    fn parse_input_keeps_payload_object() {
        let data = parse_input(r#"{"connections": [{"id": "a"}], "timestamp": 5}"#).unwrap();
        assert_eq!(data.connections[0].id, "a");
        assert_eq!(data.timestamp, 5);
    }

    #[test]
    fn parse_input_rejects_non_list() {
        assert!(parse_input(r#"{"hosts": []}"#).is_err());
        assert!(parse_input("not json").is_err());
    }

    #[tokio::test]
    async fn save_then_load_through_database_file() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let input = dir.path().join("conns.json");
        std::fs::write(&input, r#"[{"id": "a"}]"#).unwrap();

        let svc = open_service(&config, Some("pw")).await.unwrap();
        save(&svc, &input, true).await.unwrap();
        assert!(dir.path().join("termvault.db").exists());

        let reopened = open_service(&config, Some("pw")).await.unwrap();
        let data = reopened.load().await.unwrap().unwrap();
        assert_eq!(data.connections[0].id, "a");
        assert_eq!(
            reopened.settings().action_log().await.unwrap()[0].action,
            "connections.save"
        );
    }

    #[tokio::test]
    async fn encrypt_without_password_is_rejected() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("conns.json");
        std::fs::write(&input, "[]").unwrap();

        let svc = open_service(&config_in(&dir), None).await.unwrap();
        assert!(save(&svc, &input, true).await.is_err());
        assert!(!svc.has_stored_data().await.unwrap());
    }
}
