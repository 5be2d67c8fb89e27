use crate::{App, OutputFormat};
use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use comfy_table::{Cell, Color, Table};
use orchestrator_gateway::ServiceClass;
use serde::Serialize;

/// Lifecycle action on a single container
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ContainerAction {
    /// Start a stopped container
    Start,
    /// Stop a running container
    Stop,
    /// Restart a container
    Restart,
}

impl ContainerAction {
    fn verb(self) -> &'static str {
        match self {
            ContainerAction::Start => "start",
            ContainerAction::Stop => "stop",
            ContainerAction::Restart => "restart",
        }
    }
}

#[derive(Serialize)]
struct Row<'a> {
    #[serde(flatten)]
    container: &'a orchestrator_gateway::ContainerRecord,
    class: ServiceClass,
}

pub async fn ps(app: &App, format: OutputFormat) -> Result<()> {
    let containers = app
        .orchestrator
        .list()
        .await
        .context("failed to list containers")?;

    if format == OutputFormat::Json {
        let rows: Vec<Row<'_>> = containers
            .iter()
            .map(|container| Row {
                container,
                class: container.class(),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "NAME", "CLASS", "STATE", "STATUS", "IMAGE", "PORTS"]);
    for container in &containers {
        let color = if container.is_running() {
            Color::Green
        } else {
            Color::DarkGrey
        };
        table.add_row(vec![
            Cell::new(container.id.chars().take(12).collect::<String>()),
            Cell::new(&container.name),
            Cell::new(class_label(container.class())),
            Cell::new(&container.state).fg(color),
            Cell::new(&container.status),
            Cell::new(&container.image),
            Cell::new(&container.ports),
        ]);
    }
    println!("{}", table);
    Ok(())
}

pub async fn stats(app: &App, format: OutputFormat) -> Result<()> {
    let snapshot = app.orchestrator.stats().await;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }
    if !snapshot.available {
        bail!(
            "stats unavailable: {}",
            snapshot.error.as_deref().unwrap_or("unknown error")
        );
    }

    let mut table = Table::new();
    table.set_header(vec!["NAME", "CPU %", "MEMORY", "MEM %", "NET I/O", "BLOCK I/O"]);
    for stats in &snapshot.containers {
        table.add_row(vec![
            Cell::new(&stats.name),
            Cell::new(format!("{:.2}", stats.cpu_percent)),
            Cell::new(&stats.memory_usage),
            Cell::new(format!("{:.2}", stats.memory_percent)),
            Cell::new(&stats.net_io),
            Cell::new(&stats.block_io),
        ]);
    }
    println!("{}", table);
    Ok(())
}

pub async fn control(app: &App, action: ContainerAction, id: &str) -> Result<()> {
    let result = match action {
        ContainerAction::Start => app.orchestrator.start(id).await,
        ContainerAction::Stop => app.orchestrator.stop(id).await,
        ContainerAction::Restart => app.orchestrator.restart(id).await,
    };
    result.with_context(|| format!("failed to {} container {}", action.verb(), id))?;
    println!("{}: {}", action.verb(), id);
    Ok(())
}

fn class_label(class: ServiceClass) -> &'static str {
    match class {
        ServiceClass::Database => "database",
        ServiceClass::WorkflowEngine => "workflow-engine",
        ServiceClass::MessagingGateway => "messaging-gateway",
        ServiceClass::ManagementUi => "management-ui",
        ServiceClass::Proxy => "proxy",
        ServiceClass::Other => "other",
    }
}
