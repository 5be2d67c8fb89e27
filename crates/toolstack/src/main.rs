//! `toolstack`: install catalog tools and manage sandbox environments.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use management_api::PortainerProvider;
use orchestrator_gateway::{DockerGateway, Orchestrator};
use provisioning::{Provisioner, Stores};
use service_templates::Tool;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, debug};

mod commands;

#[derive(Parser)]
#[command(name = "toolstack")]
#[command(about = "Provision self-hosted tools on a container host")]
#[command(version)]
struct Cli {
    /// Directory holding config.json, credentials.json and environments.json
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// More log output; repeat for more
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install a tool (postgres, n8n, evolution, portainer)
    Install {
        /// Tool id or alias
        tool: Tool,

        /// Public domain routed to the tool
        #[arg(long)]
        domain: Option<String>,

        /// Override a setting (cpus, memory, timezone)
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = commands::install::parse_setting)]
        settings: Vec<(String, String)>,
    },

    /// Uninstall a tool
    Uninstall {
        /// Tool id or alias
        tool: Tool,
    },

    /// Sandbox environments
    Env {
        #[command(subcommand)]
        command: EnvCommands,
    },

    /// List containers
    Ps {
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Resource usage of running containers
    Stats {
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Start, stop or restart a container
    Container {
        /// Action to take
        action: commands::containers::ContainerAction,

        /// Container id or name
        id: String,
    },

    /// Show or edit the global config
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum EnvCommands {
    /// Create an environment with its own database
    Create {
        /// Environment name
        name: String,

        /// Tools to deploy into it
        #[arg(long, value_delimiter = ',', default_values_t = [Tool::WorkflowEngine])]
        tools: Vec<Tool>,
    },

    /// Remove an environment and all of its stacks
    Destroy {
        /// Environment name
        name: String,
    },

    /// Environments with live container counts
    Status {
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the config as JSON
    Show,

    /// Set network_name, domain_base, cert_resolver or timezone
    Set {
        /// Setting name
        key: String,
        /// New value
        value: String,
    },
}

/// How listings are printed
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// Pretty JSON
    Json,
}

/// Everything a command needs
pub struct App {
    /// Container host
    pub orchestrator: Arc<dyn Orchestrator>,
    /// Persistent stores
    pub stores: Stores,
    /// Install and environment workflows
    pub provisioner: Arc<Provisioner>,
}

impl App {
    fn open(data_dir: PathBuf) -> Self {
        let orchestrator: Arc<dyn Orchestrator> = Arc::new(DockerGateway::new());
        let stores = Stores::open(&data_dir);
        let provisioner = Arc::new(Provisioner::new(
            orchestrator.clone(),
            Arc::new(PortainerProvider),
            stores.clone(),
        ));
        Self {
            orchestrator,
            stores,
            provisioner,
        }
    }
}

fn default_data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join("toolstack"))
        .context("no data directory on this platform; pass --data-dir")
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };
    debug!(data_dir = %data_dir.display(), "opening stores");
    let app = App::open(data_dir);

    match cli.command {
        Commands::Install {
            tool,
            domain,
            settings,
        } => commands::install::install(&app, tool, domain, settings).await,
        Commands::Uninstall { tool } => commands::install::uninstall(&app, tool).await,
        Commands::Env { command } => match command {
            EnvCommands::Create { name, tools } => commands::env::create(&app, &name, &tools).await,
            EnvCommands::Destroy { name } => commands::env::destroy(&app, &name).await,
            EnvCommands::Status { format } => commands::env::status(&app, format).await,
        },
        Commands::Ps { format } => commands::containers::ps(&app, format).await,
        Commands::Stats { format } => commands::containers::stats(&app, format).await,
        Commands::Container { action, id } => {
            commands::containers::control(&app, action, &id).await
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => commands::config::show(&app),
            ConfigCommands::Set { key, value } => commands::config::set(&app, &key, &value),
        },
    }
}
