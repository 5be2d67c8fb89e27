//! Environment create, destroy and status against fake backends

mod common;

use common::{FakeApi, FakeOrchestrator, config, provisioner};
use provisioning::{
    Backend, Environment, EnvironmentManager, EnvironmentState, LogKind, ProvisionError,
    RemovalOutcome, Stores,
};
use service_templates::Tool;
use std::sync::Arc;

const BOTH: [Tool; 2] = [Tool::WorkflowEngine, Tool::MessagingGateway];

fn setup(
    orchestrator: &Arc<FakeOrchestrator>,
    api: &Arc<FakeApi>,
    with_api: bool,
) -> (EnvironmentManager, Stores) {
    let provisioner = provisioner(
        orchestrator.clone(),
        api.clone(),
        config("example.com", with_api),
    );
    let stores = provisioner.stores().clone();
    (EnvironmentManager::new(Arc::new(provisioner)), stores)
}

fn stored(stores: &Stores, name: &str) -> Option<Environment> {
    stores.environments.get(name).unwrap()
}

async fn create(manager: &EnvironmentManager, name: &str, tools: &[Tool]) -> Environment {
    let report = manager.create(name, tools, None).await.unwrap();
    assert!(report.success, "{:?}", report.error);
    report.environment.unwrap()
}

#[smol_potat::test]
async fn test_create_deploys_private_database_then_tools() {
    let orchestrator = FakeOrchestrator::new();
    let (manager, _) = setup(&orchestrator, &FakeApi::new(), false);

    let env = create(&manager, "qa", &BOTH).await;

    assert_eq!(env.status, EnvironmentState::Running);
    assert_eq!(env.stacks, vec!["env-qa-postgres", "env-qa-n8n", "env-qa-evolution"]);
    assert_eq!(env.credentials["n8n"]["domain"], "n8n-qa.example.com");
    assert_eq!(env.credentials["evolution"]["db_host"], "env-qa-postgres_postgres");
    assert!(env.credentials.contains_key("postgres"));

    assert_eq!(orchestrator.position("ensure_network env-qa-net"), Some(0));
    assert!(orchestrator.position("deploy_native postgres").is_none());
    assert!(orchestrator.position("exec_in id-env-qa-postgres_postgres.1").is_some());
    let db_ready = orchestrator.position("replicas env-qa-postgres").unwrap();
    assert!(db_ready < orchestrator.position("deploy_native env-qa-n8n").unwrap());

    let document = orchestrator.document("env-qa-n8n").unwrap();
    assert!(document.contains("env-qa-net"));
    assert!(document.contains("Host(`n8n-qa.example.com`)"));
}

#[smol_potat::test]
async fn test_duplicate_name_is_rejected_without_touching_the_record() {
    let orchestrator = FakeOrchestrator::new();
    let (manager, stores) = setup(&orchestrator, &FakeApi::new(), false);
    let original = create(&manager, "qa", &[Tool::WorkflowEngine]).await;
    let calls_before = orchestrator.calls().len();

    let err = manager.create("qa", &BOTH, None).await.unwrap_err();

    assert!(matches!(err, ProvisionError::EnvironmentExists(name) if name == "qa"));
    assert_eq!(orchestrator.calls().len(), calls_before);
    assert_eq!(stored(&stores, "qa"), Some(original));
}

#[smol_potat::test]
async fn test_rejects_bad_names_and_tools() {
    let orchestrator = FakeOrchestrator::new();
    let (manager, stores) = setup(&orchestrator, &FakeApi::new(), false);

    assert!(matches!(
        manager.create("Bad_Name", &BOTH, None).await,
        Err(ProvisionError::InvalidEnvironmentName(_))
    ));
    assert!(matches!(
        manager.create("qa", &[Tool::ManagementUi], None).await,
        Err(ProvisionError::UnsupportedTool(tool)) if tool == "portainer"
    ));
    assert!(orchestrator.calls().is_empty());
    assert!(stores.environments.list().unwrap().is_empty());
}

#[smol_potat::test]
async fn test_failed_create_leaves_partial_record() {
    let orchestrator = FakeOrchestrator::stalled();
    let (manager, stores) = setup(&orchestrator, &FakeApi::new(), false);

    let report = manager.create("qa", &BOTH, None).await.unwrap();
    assert!(!report.success);
    assert!(report.environment.is_none());
    assert!(report.error.unwrap().contains("not ready"));
    assert_eq!(report.logs.first().unwrap().text, "creating environment qa");
    assert_eq!(report.logs.last().unwrap().kind, LogKind::Error);

    let partial = stored(&stores, "qa").unwrap();
    assert_eq!(partial.status, EnvironmentState::Creating);
    assert_eq!(partial.stacks, vec!["env-qa-postgres"]);
    assert!(partial.credentials["postgres"].contains_key("password"));

    let destroyed = manager.destroy("qa", None).await.unwrap();
    assert!(destroyed.is_clean());
    assert_eq!(stored(&stores, "qa"), None);
}

#[smol_potat::test]
async fn test_destroy_continues_past_a_failing_stack() {
    let orchestrator = FakeOrchestrator::new();
    let (manager, stores) = setup(&orchestrator, &FakeApi::new(), false);
    create(&manager, "qa", &BOTH).await;
    orchestrator.fail_removal("env-qa-n8n");

    let report = manager.destroy("qa", None).await.unwrap();

    let stacks: Vec<_> = report.stacks.iter().map(|s| s.stack.as_str()).collect();
    assert_eq!(stacks, vec!["env-qa-postgres", "env-qa-n8n", "env-qa-evolution"]);
    assert_eq!(
        report.stacks[0].outcome,
        RemovalOutcome::Removed {
            backend: Backend::Native
        }
    );
    assert!(matches!(
        &report.stacks[1].outcome,
        RemovalOutcome::Failed { error } if error.contains("daemon busy")
    ));
    assert!(matches!(report.stacks[2].outcome, RemovalOutcome::Removed { .. }));
    assert!(orchestrator.position("remove_native env-qa-evolution").is_some());
    assert_eq!(report.failures().count(), 1);

    assert_eq!(stored(&stores, "qa"), None);
}

#[smol_potat::test]
async fn test_destroy_removes_the_private_network_last() {
    let orchestrator = FakeOrchestrator::new();
    let (manager, _) = setup(&orchestrator, &FakeApi::new(), false);
    create(&manager, "qa", &[Tool::WorkflowEngine]).await;
    assert!(orchestrator.networks().contains("env-qa-net"));

    let report = manager.destroy("qa", None).await.unwrap();

    assert!(report.is_clean());
    assert_eq!(report.network.network, "env-qa-net");
    assert_eq!(
        report.network.outcome,
        RemovalOutcome::Removed {
            backend: Backend::Native
        }
    );
    assert!(!orchestrator.networks().contains("env-qa-net"));
    let network = orchestrator.position("remove_network env-qa-net").unwrap();
    assert!(orchestrator.position("remove_native env-qa-n8n").unwrap() < network);
}

#[smol_potat::test]
async fn test_network_removal_failure_is_reported_not_fatal() {
    let orchestrator = FakeOrchestrator::new();
    let (manager, stores) = setup(&orchestrator, &FakeApi::new(), false);
    create(&manager, "qa", &[Tool::WorkflowEngine]).await;
    orchestrator.fail_removal("env-qa-net");

    let report = manager.destroy("qa", None).await.unwrap();

    assert_eq!(report.failures().count(), 0);
    assert!(matches!(
        &report.network.outcome,
        RemovalOutcome::Failed { error } if error.contains("active endpoints")
    ));
    assert!(!report.is_clean());
    assert_eq!(stored(&stores, "qa"), None);
}

#[smol_potat::test]
async fn test_destroy_authenticates_once() {
    let orchestrator = FakeOrchestrator::new();
    let api = FakeApi::new();
    let (manager, stores) = setup(&orchestrator, &api, true);
    api.seed_stack("env-qa-postgres");
    api.seed_stack("env-qa-n8n");

    let mut record = Environment::new("qa");
    record.stacks = vec![
        "env-qa-postgres".to_string(),
        "env-qa-n8n".to_string(),
        "env-qa-gone".to_string(),
    ];
    assert!(stores.environments.create(record).unwrap());

    let report = manager.destroy("qa", None).await.unwrap();

    assert_eq!(api.count("authenticate"), 1);
    assert_eq!(api.count("remove_stack env-qa-postgres"), 1);
    assert_eq!(api.count("remove_stack env-qa-n8n"), 1);
    assert_eq!(
        report.stacks[0].outcome,
        RemovalOutcome::Removed {
            backend: Backend::Api
        }
    );
    assert_eq!(report.stacks[2].outcome, RemovalOutcome::AlreadyAbsent);
    assert_eq!(report.network.outcome, RemovalOutcome::AlreadyAbsent);
    assert!(report.is_clean());
}

#[smol_potat::test]
async fn test_destroy_of_unknown_environment() {
    let (manager, _) = setup(&FakeOrchestrator::new(), &FakeApi::new(), false);
    assert!(matches!(
        manager.destroy("ghost", None).await,
        Err(ProvisionError::EnvironmentNotFound(_))
    ));
}

#[smol_potat::test]
async fn test_status_counts_live_containers() {
    let orchestrator = FakeOrchestrator::new();
    let (manager, stores) = setup(&orchestrator, &FakeApi::new(), false);
    orchestrator.seed_stack("env-dev-postgres", "running");
    orchestrator.seed_stack("env-dev-n8n", "exited");
    orchestrator.seed_stack("env-dev-n8n-postgres", "running");

    let mut record = Environment::new("dev");
    record.stacks = vec!["env-dev-postgres".to_string(), "env-dev-n8n".to_string()];
    stores.environments.create(record).unwrap();

    let status = manager.status().await.unwrap();
    assert_eq!(status.len(), 1);
    assert_eq!((status[0].live, status[0].total), (1, 2));
    assert_eq!(status[0].status, EnvironmentState::Creating);

    orchestrator.set_state("env-dev-n8n", "running");
    let status = manager.status().await.unwrap();
    assert_eq!((status[0].live, status[0].total), (2, 2));
    assert_eq!(status[0].status, EnvironmentState::Running);
    assert_eq!(status[0].environment.status, EnvironmentState::Creating);
}
