use crate::App;
use anyhow::{Context, Result};
use provisioning::GlobalConfig;

pub fn show(app: &App) -> Result<()> {
    let mut config = app.stores.config.load().context("failed to read config")?;
    if let Some(api) = config.management_api.as_mut() {
        api.password = "********".to_string();
    }
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

pub fn set(app: &App, key: &str, value: &str) -> Result<()> {
    let mut config = app.stores.config.load().context("failed to read config")?;
    config.set(key, value).with_context(|| {
        format!("settable keys: {}", GlobalConfig::KEYS.join(", "))
    })?;
    app.stores.config.save(&config).context("failed to write config")?;
    println!("{} = {}", key, value);
    Ok(())
}
