//! In-memory fakes for the orchestrator and management API that record the
//! calls made against them.

#![allow(dead_code)]

use async_trait::async_trait;
use management_api::{ManagementApi, ManagementApiProvider, ManagementApiSettings, Session, Stack};
use orchestrator_gateway::{
    ContainerRecord, ContainerStats, DeployMode, NativeDeployment, NetworkAction, Orchestrator,
    ReplicaState, StackAction, StatsSnapshot,
};
use provisioning::{GlobalConfig, ProvisionOptions, Provisioner, Stores};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct OrchestratorState {
    calls: Vec<String>,
    containers: Vec<ContainerRecord>,
    stacks: BTreeSet<String>,
    networks: BTreeSet<String>,
    documents: BTreeMap<String, String>,
    failing_removals: BTreeSet<String>,
    stalled: bool,
}

/// Orchestrator whose deploys immediately produce one running container
#[derive(Default)]
pub struct FakeOrchestrator {
    state: Mutex<OrchestratorState>,
}

pub fn container(name: &str, state: &str) -> ContainerRecord {
    ContainerRecord {
        id: format!("id-{}", name),
        name: name.to_string(),
        status: if state == "running" { "Up 1 minute" } else { "Exited (0)" }.to_string(),
        image: "image:latest".to_string(),
        ports: String::new(),
        state: state.to_string(),
        created: "2024-05-01 10:00:00 +0000 UTC".to_string(),
    }
}

impl FakeOrchestrator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Replicas never converge
    pub fn stalled() -> Arc<Self> {
        let fake = Self::default();
        fake.state.lock().unwrap().stalled = true;
        Arc::new(fake)
    }

    /// Pretend `stack` is already deployed with one container in `state`
    pub fn seed_stack(&self, stack: &str, state: &str) {
        let mut s = self.state.lock().unwrap();
        s.stacks.insert(stack.to_string());
        s.containers
            .push(container(&task_name(stack), state));
    }

    /// Make native removal of the stack or network `stack` fail with a command error
    pub fn fail_removal(&self, stack: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_removals
            .insert(stack.to_string());
    }

    pub fn set_state(&self, stack: &str, state: &str) {
        let mut s = self.state.lock().unwrap();
        let name = task_name(stack);
        for c in s.containers.iter_mut().filter(|c| c.name == name) {
            c.state = state.to_string();
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Index of the first call equal to `call`
    pub fn position(&self, call: &str) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }

    pub fn stacks(&self) -> BTreeSet<String> {
        self.state.lock().unwrap().stacks.clone()
    }

    pub fn networks(&self) -> BTreeSet<String> {
        self.state.lock().unwrap().networks.clone()
    }

    pub fn document(&self, stack: &str) -> Option<String> {
        self.state.lock().unwrap().documents.get(stack).cloned()
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

/// Swarm task name of the single service in `stack`
fn task_name(stack: &str) -> String {
    let service = stack.rsplit('-').next().unwrap_or(stack);
    format!("{}_{}.1", stack, service)
}

#[async_trait]
impl Orchestrator for FakeOrchestrator {
    async fn list(&self) -> orchestrator_gateway::Result<Vec<ContainerRecord>> {
        Ok(self.state.lock().unwrap().containers.clone())
    }

    async fn stats(&self) -> StatsSnapshot {
        StatsSnapshot::unavailable("not supported by the fake")
    }

    async fn stats_for(&self, id: &str) -> ContainerStats {
        ContainerStats::unavailable(id)
    }

    async fn start(&self, id: &str) -> orchestrator_gateway::Result<()> {
        self.record(format!("start {}", id));
        Ok(())
    }

    async fn stop(&self, id: &str) -> orchestrator_gateway::Result<()> {
        self.record(format!("stop {}", id));
        Ok(())
    }

    async fn restart(&self, id: &str) -> orchestrator_gateway::Result<()> {
        self.record(format!("restart {}", id));
        Ok(())
    }

    async fn exec_in(
        &self,
        id: &str,
        _cmd: &[String],
        _timeout: Duration,
    ) -> orchestrator_gateway::Result<String> {
        self.record(format!("exec_in {}", id));
        Ok(String::new())
    }

    async fn copy_to(&self, _id: &str, _host: &str, _container: &str) -> orchestrator_gateway::Result<()> {
        Ok(())
    }

    async fn copy_from(&self, _id: &str, _container: &str, _host: &str) -> orchestrator_gateway::Result<()> {
        Ok(())
    }

    async fn is_cluster_active(&self) -> orchestrator_gateway::Result<bool> {
        Ok(true)
    }

    async fn ensure_network(&self, name: &str) -> orchestrator_gateway::Result<NetworkAction> {
        self.record(format!("ensure_network {}", name));
        let created = self.state.lock().unwrap().networks.insert(name.to_string());
        Ok(if created {
            NetworkAction::Created
        } else {
            NetworkAction::Existing
        })
    }

    async fn remove_network(&self, name: &str) -> orchestrator_gateway::Result<bool> {
        self.record(format!("remove_network {}", name));
        let mut s = self.state.lock().unwrap();
        if s.failing_removals.contains(name) {
            return Err(orchestrator_gateway::Error::CommandFailed {
                command: format!("docker network rm {}", name),
                code: Some(1),
                stderr: format!("network {} has active endpoints", name),
            });
        }
        Ok(s.networks.remove(name))
    }

    async fn deploy_native(
        &self,
        name: &str,
        document: &str,
    ) -> orchestrator_gateway::Result<NativeDeployment> {
        self.record(format!("deploy_native {}", name));
        let mut s = self.state.lock().unwrap();
        s.documents.insert(name.to_string(), document.to_string());
        let action = if s.stacks.insert(name.to_string()) {
            s.containers.push(container(&task_name(name), "running"));
            StackAction::Created
        } else {
            StackAction::Updated
        };
        Ok(NativeDeployment {
            mode: DeployMode::Swarm,
            action,
        })
    }

    async fn remove_native(&self, name: &str) -> orchestrator_gateway::Result<()> {
        self.record(format!("remove_native {}", name));
        let mut s = self.state.lock().unwrap();
        if s.failing_removals.contains(name) {
            return Err(orchestrator_gateway::Error::CommandFailed {
                command: format!("docker stack rm {}", name),
                code: Some(1),
                stderr: "daemon busy".to_string(),
            });
        }
        if !s.stacks.remove(name) {
            return Err(orchestrator_gateway::Error::StackNotFound(name.to_string()));
        }
        let task = task_name(name);
        s.containers.retain(|c| c.name != task);
        Ok(())
    }

    async fn replica_states(&self, prefix: &str) -> orchestrator_gateway::Result<Vec<ReplicaState>> {
        self.record(format!("replicas {}", prefix));
        let s = self.state.lock().unwrap();
        Ok(s.containers
            .iter()
            .filter(|c| c.belongs_to(prefix))
            .map(|c| ReplicaState {
                name: c.name.clone(),
                running: u32::from(c.is_running() && !s.stalled),
                desired: 1,
            })
            .collect())
    }
}

#[derive(Default)]
struct ApiState {
    calls: Vec<String>,
    stacks: Vec<Stack>,
    next_id: i64,
}

/// Management API keeping stacks in memory
#[derive(Default)]
pub struct FakeApi {
    state: Mutex<ApiState>,
    fail_auth: bool,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every login is rejected
    pub fn rejecting_logins() -> Arc<Self> {
        Arc::new(Self {
            fail_auth: true,
            ..Self::default()
        })
    }

    pub fn seed_stack(&self, name: &str) {
        let mut s = self.state.lock().unwrap();
        s.next_id += 1;
        let id = s.next_id;
        s.stacks.push(Stack {
            id,
            name: name.to_string(),
            endpoint_id: 1,
        });
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    pub fn stack_names(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .stacks
            .iter()
            .map(|s| s.name.clone())
            .collect()
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl ManagementApi for FakeApi {
    async fn authenticate(&self) -> management_api::Result<Session> {
        self.record("authenticate".to_string());
        if self.fail_auth {
            return Err(management_api::Error::Auth(
                "login rejected (422): Invalid credentials".to_string(),
            ));
        }
        Ok(Session {
            token: "token".to_string(),
            endpoint_id: 1,
            cluster_id: "swarm-1".to_string(),
        })
    }

    async fn list_stacks(&self, _session: &Session) -> management_api::Result<Vec<Stack>> {
        Ok(self.state.lock().unwrap().stacks.clone())
    }

    async fn create_stack(
        &self,
        _session: &Session,
        name: &str,
        _document: &str,
    ) -> management_api::Result<Stack> {
        self.record(format!("create_stack {}", name));
        let mut s = self.state.lock().unwrap();
        s.next_id += 1;
        let stack = Stack {
            id: s.next_id,
            name: name.to_string(),
            endpoint_id: 1,
        };
        s.stacks.push(stack.clone());
        Ok(stack)
    }

    async fn update_stack(
        &self,
        _session: &Session,
        stack: &Stack,
        _document: &str,
    ) -> management_api::Result<Stack> {
        self.record(format!("update_stack {}", stack.name));
        Ok(stack.clone())
    }

    async fn remove_stack(&self, _session: &Session, stack: &Stack) -> management_api::Result<()> {
        self.record(format!("remove_stack {}", stack.name));
        self.state
            .lock()
            .unwrap()
            .stacks
            .retain(|s| s.id != stack.id);
        Ok(())
    }

    async fn system_ready(&self) -> bool {
        self.record("system_ready".to_string());
        true
    }

    async fn init_admin(&self, username: &str, _password: &str) -> management_api::Result<()> {
        self.record(format!("init_admin {}", username));
        Ok(())
    }
}

/// Hands out the same fake for any settings
pub struct FakeApiProvider {
    pub api: Arc<FakeApi>,
}

impl ManagementApiProvider for FakeApiProvider {
    fn connect(
        &self,
        _settings: &ManagementApiSettings,
    ) -> management_api::Result<Arc<dyn ManagementApi>> {
        Ok(self.api.clone())
    }
}

pub fn api_settings() -> ManagementApiSettings {
    ManagementApiSettings {
        url: "http://localhost:9000".to_string(),
        username: "admin".to_string(),
        password: "secret".to_string(),
    }
}

/// Options with millisecond timings
pub fn fast_options() -> ProvisionOptions {
    ProvisionOptions {
        database_timeout: Duration::from_millis(60),
        tool_timeout: Duration::from_millis(60),
        settle_delay: Duration::ZERO,
        poll_interval: Duration::from_millis(5),
        bootstrap_attempts: 2,
        bootstrap_interval: Duration::ZERO,
        strict_database_readiness: true,
    }
}

pub fn config(domain_base: &str, management_api: bool) -> GlobalConfig {
    GlobalConfig {
        domain_base: domain_base.to_string(),
        management_api: management_api.then(api_settings),
        ..GlobalConfig::default()
    }
}

pub fn provisioner(
    orchestrator: Arc<FakeOrchestrator>,
    api: Arc<FakeApi>,
    config: GlobalConfig,
) -> Provisioner {
    Provisioner::new(
        orchestrator,
        Arc::new(FakeApiProvider { api }),
        Stores::in_memory(config),
    )
    .with_options(fast_options())
}
