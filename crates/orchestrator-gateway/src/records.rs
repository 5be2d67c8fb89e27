//! Typed records parsed from the orchestrator's tabular output.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Field separator used in every `--format` template the gateway issues
pub(crate) const FIELD_SEPARATOR: char = '|';

/// `--format` template for container listings
pub(crate) const LIST_FORMAT: &str =
    "{{.ID}}|{{.Names}}|{{.Status}}|{{.Image}}|{{.Ports}}|{{.State}}|{{.CreatedAt}}";

/// `--format` template for resource-usage listings
pub(crate) const STATS_FORMAT: &str =
    "{{.ID}}|{{.Name}}|{{.CPUPerc}}|{{.MemUsage}}|{{.MemPerc}}|{{.NetIO}}|{{.BlockIO}}";

/// `--format` template for swarm service listings
pub(crate) const SERVICE_FORMAT: &str = "{{.Name}}|{{.Replicas}}";

/// One container as reported by the orchestrator's list command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    /// Container id
    pub id: String,
    /// Container name
    pub name: String,
    /// Human status ("Up 3 hours")
    pub status: String,
    /// Image reference
    pub image: String,
    /// Published ports as printed by the CLI
    pub ports: String,
    /// Machine state ("running", "exited", ...)
    pub state: String,
    /// Creation timestamp as printed by the CLI
    pub created: String,
}

impl ContainerRecord {
    /// Whether the container is currently running
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }

    /// Whether this container was created for `stack`
    ///
    /// Stacks hold a single service named after the last `-`-separated
    /// segment of the stack name. Swarm tasks are named
    /// `<stack>_<service>.<slot>.<id>`, compose containers
    /// `<stack>-<service>-<n>`. Anything else, including containers of a
    /// stack whose name merely starts with `stack`, does not belong to it.
    pub fn belongs_to(&self, stack: &str) -> bool {
        let service = stack.rsplit('-').next().unwrap_or(stack);
        let Some(rest) = self.name.trim_start_matches('/').strip_prefix(stack) else {
            return false;
        };
        if let Some(task) = rest.strip_prefix('_') {
            return task
                .strip_prefix(service)
                .is_some_and(|r| r.is_empty() || r.starts_with('.'));
        }
        rest.strip_prefix('-')
            .and_then(|r| r.strip_prefix(service))
            .and_then(|r| r.strip_prefix('-'))
            .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
    }

    /// Classify this container by name
    pub fn class(&self) -> ServiceClass {
        classify(&self.name)
    }
}

/// Catalog category a container belongs to, judged by its name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceClass {
    /// Relational database
    Database,
    /// Workflow automation engine
    WorkflowEngine,
    /// Messaging gateway
    MessagingGateway,
    /// Container-management UI
    ManagementUi,
    /// Edge router / reverse proxy
    Proxy,
    /// Anything else
    Other,
}

const CLASS_PATTERNS: &[(&str, ServiceClass)] = &[
    ("postgres", ServiceClass::Database),
    ("pgsql", ServiceClass::Database),
    ("n8n", ServiceClass::WorkflowEngine),
    ("evolution", ServiceClass::MessagingGateway),
    ("portainer", ServiceClass::ManagementUi),
    ("traefik", ServiceClass::Proxy),
];

/// Classify a service or container by name pattern
pub fn classify(name: &str) -> ServiceClass {
    let name = name.to_ascii_lowercase();
    CLASS_PATTERNS
        .iter()
        .find(|(pattern, _)| name.contains(pattern))
        .map(|(_, class)| *class)
        .unwrap_or(ServiceClass::Other)
}

/// Parse the output of the list command
///
/// Lines that do not have exactly the expected number of fields are dropped;
/// values containing the separator character are therefore lost.
pub fn parse_container_list(output: &str) -> Vec<ContainerRecord> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.trim_end().split(FIELD_SEPARATOR).collect();
            let [id, name, status, image, ports, state, created] = fields.as_slice() else {
                return None;
            };
            if id.is_empty() || name.is_empty() {
                return None;
            }
            Some(ContainerRecord {
                id: id.trim().to_string(),
                name: name.trim().to_string(),
                status: status.trim().to_string(),
                image: image.trim().to_string(),
                ports: ports.trim().to_string(),
                state: state.trim().to_string(),
                created: created.trim().to_string(),
            })
        })
        .collect()
}

/// Resource usage of a single container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerStats {
    /// Container id
    pub id: String,
    /// Container name
    pub name: String,
    /// CPU usage in percent
    pub cpu_percent: f64,
    /// Memory usage as printed ("12MiB / 1GiB")
    pub memory_usage: String,
    /// Memory usage in percent
    pub memory_percent: f64,
    /// Network I/O as printed
    pub net_io: String,
    /// Block I/O as printed
    pub block_io: String,
    /// False when this is the "unavailable" sentinel
    pub available: bool,
}

impl ContainerStats {
    /// Sentinel returned when stats could not be collected
    pub fn unavailable(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            cpu_percent: 0.0,
            memory_usage: String::new(),
            memory_percent: 0.0,
            net_io: String::new(),
            block_io: String::new(),
            available: false,
        }
    }
}

/// Host-wide resource usage snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// False when collection failed
    pub available: bool,
    /// Per-container usage
    pub containers: Vec<ContainerStats>,
    /// Why collection failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatsSnapshot {
    /// Sentinel returned when stats could not be collected
    pub fn unavailable(error: impl Into<String>) -> Self {
        Self {
            available: false,
            containers: Vec::new(),
            error: Some(error.into()),
        }
    }
}

fn parse_percent(value: &str) -> f64 {
    value.trim().trim_end_matches('%').parse().unwrap_or(0.0)
}

/// Parse the output of the stats command
pub fn parse_stats(output: &str) -> Vec<ContainerStats> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.trim_end().split(FIELD_SEPARATOR).collect();
            let [id, name, cpu, mem_usage, mem_percent, net_io, block_io] = fields.as_slice()
            else {
                return None;
            };
            Some(ContainerStats {
                id: id.trim().to_string(),
                name: name.trim().to_string(),
                cpu_percent: parse_percent(cpu),
                memory_usage: mem_usage.trim().to_string(),
                memory_percent: parse_percent(mem_percent),
                net_io: net_io.trim().to_string(),
                block_io: block_io.trim().to_string(),
                available: true,
            })
        })
        .collect()
}

/// Convergence state of one service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaState {
    /// Service or container name
    pub name: String,
    /// Replicas currently running
    pub running: u32,
    /// Replicas desired
    pub desired: u32,
}

impl ReplicaState {
    /// All desired replicas are running
    pub fn is_converged(&self) -> bool {
        self.desired > 0 && self.running >= self.desired
    }
}

static REPLICAS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)/(\d+)").ok());

/// Parse swarm service listings of the form `name|running/desired`
pub fn parse_replicas(output: &str) -> Vec<ReplicaState> {
    output
        .lines()
        .filter_map(|line| {
            let (name, replicas) = line.trim_end().split_once(FIELD_SEPARATOR)?;
            let caps = REPLICAS.as_ref()?.captures(replicas)?;
            Some(ReplicaState {
                name: name.trim().to_string(),
                running: caps[1].parse().ok()?,
                desired: caps[2].parse().ok()?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
3f2a|postgres_postgres.1.x7k|Up 2 hours|postgres:16-alpine|5432/tcp|running|2024-05-01 10:00:00 +0000 UTC
9bc1|n8n-n8n-1|Exited (1) 3 minutes ago|n8nio/n8n:latest||exited|2024-05-01 10:05:00 +0000 UTC
garbage line without separators
77aa|weird|name|Up|img|80/tcp|running|2024-05-01
";

    #[test]
    fn test_list_drops_malformed_lines() {
        let records = parse_container_list(LISTING);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "postgres_postgres.1.x7k");
        assert!(records[0].is_running());
        assert_eq!(records[1].state, "exited");
        assert_eq!(records[1].ports, "");
    }

    #[test]
    fn test_list_tolerates_trailing_whitespace() {
        let records = parse_container_list("a|b|Up|img|80/tcp|running|now   \n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].created, "now");
    }

    #[test]
    fn test_belongs_to_matches_both_naming_schemes() {
        let swarm = parse_container_list("1|postgres_postgres.1.abc|Up|i||running|t").remove(0);
        let compose = parse_container_list("2|env-demo-n8n-n8n-1|Up|i||running|t").remove(0);

        assert!(swarm.belongs_to("postgres"));
        assert!(!swarm.belongs_to("postgre"));
        assert!(compose.belongs_to("env-demo-n8n"));
        assert!(!compose.belongs_to("n8n"));
    }

    #[test]
    fn test_belongs_to_keeps_similarly_named_stacks_apart() {
        let nested = parse_container_list(
            "1|env-qa-postgres-postgres-postgres-1|Up|i||running|t\n\
             2|env-qa-n8n-postgres_postgres.1.x|Up|i||running|t\n\
             3|postgres-legacy_db.1|Up|i||running|t",
        );

        assert!(!nested[0].belongs_to("env-qa-postgres"));
        assert!(nested[0].belongs_to("env-qa-postgres-postgres"));
        assert!(!nested[1].belongs_to("env-qa-n8n"));
        assert!(nested[1].belongs_to("env-qa-n8n-postgres"));
        assert!(!nested[2].belongs_to("postgres"));
    }

    #[test]
    fn test_classify_by_name_pattern() {
        assert_eq!(classify("postgres_postgres.1"), ServiceClass::Database);
        assert_eq!(classify("env-qa-n8n-n8n-1"), ServiceClass::WorkflowEngine);
        assert_eq!(classify("Evolution_api"), ServiceClass::MessagingGateway);
        assert_eq!(classify("portainer_portainer.1"), ServiceClass::ManagementUi);
        assert_eq!(classify("traefik_traefik.1"), ServiceClass::Proxy);
        assert_eq!(classify("redis"), ServiceClass::Other);
    }

    #[test]
    fn test_parse_stats() {
        let stats = parse_stats("ab|n8n|1.50%|120MiB / 1GiB|11.72%|1kB / 2kB|0B / 0B\nbroken\n");
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].cpu_percent, 1.5);
        assert_eq!(stats[0].memory_percent, 11.72);
        assert!(stats[0].available);
    }

    #[test]
    fn test_parse_replicas() {
        let states = parse_replicas("n8n_n8n|1/1\nportainer_portainer|0/1 (max 1 per node)\nbad\n");
        assert_eq!(states.len(), 2);
        assert!(states[0].is_converged());
        assert_eq!(states[1].running, 0);
        assert!(!states[1].is_converged());
    }
}
