use super::print_log;
use crate::{App, OutputFormat};
use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, Table};
use provisioning::{EnvironmentManager, EnvironmentState, EnvironmentStatus};
use service_templates::Tool;

pub async fn create(app: &App, name: &str, tools: &[Tool]) -> Result<()> {
    let manager = EnvironmentManager::new(app.provisioner.clone());
    let report = manager
        .create(name, tools, Some(&print_log))
        .await
        .with_context(|| format!("failed to create environment {}", name))?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "success": report.success,
            "name": report.name,
            "environment": report.environment,
            "error": report.error,
        }))?
    );
    if !report.success {
        bail!(
            "environment {} is incomplete: {}; run `toolstack env destroy {}` to clean up",
            name,
            report.error.as_deref().unwrap_or("unknown error"),
            name
        );
    }
    Ok(())
}

pub async fn destroy(app: &App, name: &str) -> Result<()> {
    let manager = EnvironmentManager::new(app.provisioner.clone());
    let report = manager
        .destroy(name, Some(&print_log))
        .await
        .with_context(|| format!("failed to destroy environment {}", name))?;

    let failed: Vec<&str> = report.failures().map(|s| s.stack.as_str()).collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "success": report.is_clean(),
            "name": report.name,
            "stacks": report.stacks,
            "network": report.network,
        }))?
    );
    if !failed.is_empty() {
        bail!(
            "environment {} removed but stacks were left behind: {}",
            name,
            failed.join(", ")
        );
    }
    if !report.is_clean() {
        bail!(
            "environment {} removed but network {} was left behind",
            name,
            report.network.network
        );
    }
    Ok(())
}

pub async fn status(app: &App, format: OutputFormat) -> Result<()> {
    let manager = EnvironmentManager::new(app.provisioner.clone());
    let statuses = manager.status().await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&statuses)?),
        OutputFormat::Table => print_table(&statuses),
    }
    Ok(())
}

fn print_table(statuses: &[EnvironmentStatus]) {
    if statuses.is_empty() {
        println!("No environments");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["ENVIRONMENT", "STATUS", "LIVE", "CREATED", "STACKS"]);
    for status in statuses {
        let color = match status.status {
            EnvironmentState::Running => Color::Green,
            EnvironmentState::Creating => Color::Yellow,
            EnvironmentState::Destroyed => Color::DarkGrey,
        };
        table.add_row(vec![
            Cell::new(&status.environment.name),
            Cell::new(status.status).fg(color),
            Cell::new(format!("{}/{}", status.live, status.total)),
            Cell::new(status.environment.created_at.format("%Y-%m-%d %H:%M")),
            Cell::new(status.environment.stacks.join(", ")),
        ]);
    }
    println!("{}", table);
}
