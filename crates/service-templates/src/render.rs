//! Rendering typed tool configs into service definition documents.

use crate::config::{
    DatabaseConfig, DbCoordinates, ManagementUiConfig, MessagingGatewayConfig, StackContext,
    ToolConfig, WorkflowEngineConfig,
};
use crate::document::{
    ComposeDocument, DeploySpec, NetworkRef, Placement, Resources, RestartPolicy,
    ServiceNetwork, ServiceSpec, VolumeSpec,
};
use crate::{Error, Result, Tool};
use std::collections::BTreeMap;

const COMPOSE_VERSION: &str = "3.8";
const ENTRYPOINT: &str = "websecure";
const PGDATA: &str = "/var/lib/postgresql/data/pgdata";
const DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Render the document for `config` as YAML text
pub fn render(config: &ToolConfig) -> Result<String> {
    Ok(serde_yaml::to_string(&build_document(config)?)?)
}

/// Build the document model for `config`
pub fn build_document(config: &ToolConfig) -> Result<ComposeDocument> {
    validate_context(config.context())?;
    let tool = config.tool();
    let mut service = base_service(tool, config.context());
    let mut volumes = BTreeMap::new();

    match config {
        ToolConfig::Database(c) => database(c, &mut service, &mut volumes)?,
        ToolConfig::WorkflowEngine(c) => workflow_engine(c, &mut service, &mut volumes)?,
        ToolConfig::MessagingGateway(c) => messaging_gateway(c, &mut service, &mut volumes)?,
        ToolConfig::ManagementUi(c) => management_ui(c, &mut service, &mut volumes),
    }

    let context = config.context();
    Ok(ComposeDocument {
        version: COMPOSE_VERSION.to_string(),
        services: BTreeMap::from([(tool.id().to_string(), service)]),
        networks: BTreeMap::from([(
            context.network.clone(),
            NetworkRef {
                external: true,
                name: context.network.clone(),
            },
        )]),
        volumes,
    })
}

/// Edge-router labels routing `context.domain` to `port`
///
/// Empty when no domain is configured.
pub fn routing_labels(context: &StackContext, port: u16) -> BTreeMap<String, String> {
    let Some(domain) = &context.domain else {
        return BTreeMap::new();
    };
    let router = &context.stack_name;
    BTreeMap::from([
        ("traefik.enable".to_string(), "true".to_string()),
        ("traefik.docker.network".to_string(), context.network.clone()),
        (
            format!("traefik.http.routers.{}.rule", router),
            format!("Host(`{}`)", domain),
        ),
        (
            format!("traefik.http.routers.{}.entrypoints", router),
            ENTRYPOINT.to_string(),
        ),
        (
            format!("traefik.http.routers.{}.tls.certresolver", router),
            context.cert_resolver.clone(),
        ),
        (
            format!("traefik.http.services.{}.loadbalancer.server.port", router),
            port.to_string(),
        ),
    ])
}

fn validate_context(context: &StackContext) -> Result<()> {
    if context.stack_name.trim().is_empty() {
        return Err(Error::InvalidConfig("stack name is empty".into()));
    }
    if context.network.trim().is_empty() {
        return Err(Error::InvalidConfig("network name is empty".into()));
    }
    if let Some(domain) = &context.domain {
        if domain.is_empty() || domain.contains(|c: char| c == '`' || c.is_whitespace()) {
            return Err(Error::InvalidConfig(format!("invalid domain: {:?}", domain)));
        }
    }
    Ok(())
}

fn require(value: &str, what: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::InvalidConfig(format!("{} is empty", what)));
    }
    Ok(())
}

fn base_service(tool: Tool, context: &StackContext) -> ServiceSpec {
    let labels = routing_labels(context, tool.port());
    ServiceSpec {
        image: tool.image().to_string(),
        command: None,
        environment: BTreeMap::new(),
        volumes: Vec::new(),
        ports: Vec::new(),
        networks: BTreeMap::from([(
            context.network.clone(),
            ServiceNetwork {
                aliases: vec![tool.service_host(&context.stack_name)],
            },
        )]),
        labels: labels.clone(),
        restart: Some("unless-stopped".to_string()),
        deploy: DeploySpec {
            mode: "replicated".to_string(),
            replicas: 1,
            placement: None,
            resources: Resources {
                limits: context.limits.clone(),
            },
            restart_policy: RestartPolicy {
                condition: "on-failure".to_string(),
            },
            labels,
        },
    }
}

fn data_volume(
    tool: Tool,
    target: &str,
    service: &mut ServiceSpec,
    volumes: &mut BTreeMap<String, VolumeSpec>,
) {
    let name = format!("{}_data", tool.id());
    service.volumes.push(format!("{}:{}", name, target));
    volumes.insert(name, VolumeSpec::default());
}

fn env(service: &mut ServiceSpec, pairs: impl IntoIterator<Item = (&'static str, String)>) {
    service
        .environment
        .extend(pairs.into_iter().map(|(k, v)| (k.to_string(), v)));
}

fn require_db(db: &DbCoordinates) -> Result<()> {
    require(&db.host, "database host")?;
    require(&db.database, "database name")?;
    require(&db.user, "database user")?;
    require(&db.password, "database password")
}

fn database(
    config: &DatabaseConfig,
    service: &mut ServiceSpec,
    volumes: &mut BTreeMap<String, VolumeSpec>,
) -> Result<()> {
    require(&config.root_password, "root password")?;
    env(
        service,
        [
            ("POSTGRES_PASSWORD", config.root_password.clone()),
            ("PGDATA", PGDATA.to_string()),
        ],
    );
    data_volume(Tool::Database, "/var/lib/postgresql/data", service, volumes);
    Ok(())
}

fn workflow_engine(
    config: &WorkflowEngineConfig,
    service: &mut ServiceSpec,
    volumes: &mut BTreeMap<String, VolumeSpec>,
) -> Result<()> {
    require_db(&config.db)?;
    require(&config.encryption_key, "encryption key")?;
    let tool = Tool::WorkflowEngine;
    let context = &config.context;
    let host = context.domain.clone().unwrap_or_else(|| "localhost".to_string());
    let protocol = if context.domain.is_some() { "https" } else { "http" };
    env(
        service,
        [
            ("DB_TYPE", "postgresdb".to_string()),
            ("DB_POSTGRESDB_HOST", config.db.host.clone()),
            ("DB_POSTGRESDB_PORT", config.db.port.to_string()),
            ("DB_POSTGRESDB_DATABASE", config.db.database.clone()),
            ("DB_POSTGRESDB_USER", config.db.user.clone()),
            ("DB_POSTGRESDB_PASSWORD", config.db.password.clone()),
            ("N8N_ENCRYPTION_KEY", config.encryption_key.clone()),
            ("N8N_HOST", host),
            ("N8N_PORT", tool.port().to_string()),
            ("N8N_PROTOCOL", protocol.to_string()),
            ("WEBHOOK_URL", format!("{}/", context.public_url(tool.port()))),
            ("GENERIC_TIMEZONE", config.timezone.clone()),
        ],
    );
    data_volume(tool, "/home/node/.n8n", service, volumes);
    Ok(())
}

fn messaging_gateway(
    config: &MessagingGatewayConfig,
    service: &mut ServiceSpec,
    volumes: &mut BTreeMap<String, VolumeSpec>,
) -> Result<()> {
    require_db(&config.db)?;
    require(&config.api_key, "API key")?;
    let tool = Tool::MessagingGateway;
    env(
        service,
        [
            ("AUTHENTICATION_API_KEY", config.api_key.clone()),
            ("SERVER_URL", config.context.public_url(tool.port())),
            ("DATABASE_ENABLED", "true".to_string()),
            ("DATABASE_PROVIDER", "postgresql".to_string()),
            ("DATABASE_CONNECTION_URI", config.db.connection_uri()),
            (
                "DATABASE_CONNECTION_CLIENT_NAME",
                config.context.stack_name.clone(),
            ),
            ("CACHE_LOCAL_ENABLED", "true".to_string()),
        ],
    );
    data_volume(tool, "/evolution/instances", service, volumes);
    Ok(())
}

fn management_ui(
    config: &ManagementUiConfig,
    service: &mut ServiceSpec,
    volumes: &mut BTreeMap<String, VolumeSpec>,
) {
    let tool = Tool::ManagementUi;
    service.command = Some(format!("-H unix://{}", DOCKER_SOCKET));
    service
        .volumes
        .push(format!("{}:{}", DOCKER_SOCKET, DOCKER_SOCKET));
    data_volume(tool, "/data", service, volumes);
    // Without a routed domain the UI is only reachable on the host port
    if config.context.domain.is_none() {
        service.ports.push(format!("{}:{}", tool.port(), tool.port()));
    }
    service.deploy.placement = Some(Placement {
        constraints: vec!["node.role == manager".to_string()],
    });
}
