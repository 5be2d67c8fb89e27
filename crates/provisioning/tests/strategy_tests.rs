//! Deployment strategy fallback and readiness polling

mod common;

use common::{FakeApi, FakeApiProvider, FakeOrchestrator, api_settings};
use provisioning::{
    Backend, DeployAction, DeployError, DeploymentStrategy, Readiness, ReadinessPoller, Removal,
};
use std::sync::Arc;
use std::time::Duration;

const DOCUMENT: &str = "version: '3.8'\nservices:\n  n8n:\n    image: n8nio/n8n:latest\n";

fn strategy(orchestrator: &Arc<FakeOrchestrator>, api: &Arc<FakeApi>) -> DeploymentStrategy {
    let provider = FakeApiProvider { api: api.clone() };
    DeploymentStrategy::from_settings(orchestrator.clone(), &provider, Some(&api_settings()))
}

#[smol_potat::test]
async fn test_auth_failure_falls_back_to_native() {
    let orchestrator = FakeOrchestrator::new();
    let strategy = strategy(&orchestrator, &FakeApi::rejecting_logins());

    let deployment = strategy.deploy("n8n", DOCUMENT).await.unwrap();

    assert_eq!(deployment.backend, Backend::Native);
    assert_eq!(deployment.action, DeployAction::Created);
    assert!(deployment.fallback_reason.unwrap().contains("Invalid credentials"));
    assert_eq!(orchestrator.calls(), vec!["deploy_native n8n"]);
}

#[smol_potat::test]
async fn test_api_deploy_is_create_then_update() {
    let orchestrator = FakeOrchestrator::new();
    let api = FakeApi::new();
    let strategy = strategy(&orchestrator, &api);

    let first = strategy.deploy("n8n", DOCUMENT).await.unwrap();
    let second = strategy.deploy("n8n", DOCUMENT).await.unwrap();

    assert_eq!((first.backend, first.action), (Backend::Api, DeployAction::Created));
    assert_eq!((second.backend, second.action), (Backend::Api, DeployAction::Updated));
    assert_eq!(api.count("authenticate"), 1);
    assert!(orchestrator.calls().is_empty());
}

#[smol_potat::test]
async fn test_invalid_document_reaches_no_backend() {
    let orchestrator = FakeOrchestrator::new();
    let api = FakeApi::new();
    let strategy = strategy(&orchestrator, &api);

    let err = strategy.deploy("n8n", "image: [broken").await.unwrap_err();

    assert!(matches!(err, DeployError::InvalidDocument(_)));
    assert!(api.calls().is_empty());
    assert!(orchestrator.calls().is_empty());
}

#[smol_potat::test]
async fn test_native_failure_is_final() {
    let orchestrator = FakeOrchestrator::new();
    orchestrator.seed_stack("n8n", "running");
    orchestrator.fail_removal("n8n");
    let strategy = DeploymentStrategy::native_only(orchestrator.clone());

    let err = strategy.remove("n8n").await.unwrap_err();

    assert!(matches!(err, DeployError::Native(_)));
    assert!(!err.is_not_found());
}

#[smol_potat::test]
async fn test_remove_unknown_everywhere_is_already_absent() {
    let orchestrator = FakeOrchestrator::new();
    let api = FakeApi::new();
    let strategy = strategy(&orchestrator, &api);

    assert_eq!(strategy.remove("ghost").await.unwrap(), Removal::AlreadyAbsent);
    assert_eq!(orchestrator.calls(), vec!["remove_native ghost"]);
}

#[smol_potat::test]
async fn test_connected_strategy_without_login_is_native_only() {
    let orchestrator = FakeOrchestrator::new();
    let api = FakeApi::rejecting_logins();
    let provider = FakeApiProvider { api: api.clone() };

    let strategy =
        DeploymentStrategy::connected(orchestrator.clone(), &provider, Some(&api_settings())).await;
    assert!(!strategy.has_remote());

    strategy.deploy("a", DOCUMENT).await.unwrap();
    strategy.deploy("b", DOCUMENT).await.unwrap();
    assert_eq!(api.count("authenticate"), 1);
}

#[smol_potat::test]
async fn test_readiness_ready_when_replicas_converge() {
    let orchestrator = FakeOrchestrator::new();
    orchestrator.seed_stack("n8n", "running");
    let poller = ReadinessPoller::new(orchestrator.clone(), Duration::from_millis(5));

    assert_eq!(poller.wait("n8n", Duration::from_millis(100)).await, Readiness::Ready);
}

#[smol_potat::test]
async fn test_readiness_times_out_with_last_seen_state() {
    let orchestrator = FakeOrchestrator::stalled();
    orchestrator.seed_stack("n8n", "running");
    let poller = ReadinessPoller::new(orchestrator.clone(), Duration::from_millis(5));

    match poller.wait("n8n", Duration::from_millis(30)).await {
        Readiness::TimedOut { last_seen } => {
            assert_eq!(last_seen.len(), 1);
            assert_eq!((last_seen[0].running, last_seen[0].desired), (0, 1));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    let polls = orchestrator
        .calls()
        .iter()
        .filter(|c| c.as_str() == "replicas n8n")
        .count();
    assert!(polls >= 2);
}

#[smol_potat::test]
async fn test_readiness_of_missing_stack_is_not_ready() {
    let orchestrator = FakeOrchestrator::new();
    let poller = ReadinessPoller::new(orchestrator.clone(), Duration::from_millis(5));

    assert_eq!(
        poller.wait("ghost", Duration::from_millis(20)).await,
        Readiness::TimedOut { last_seen: vec![] }
    );
}

#[smol_potat::test]
async fn test_readiness_wait_can_be_cancelled() {
    let orchestrator = FakeOrchestrator::stalled();
    let poller = ReadinessPoller::new(orchestrator.clone(), Duration::from_millis(5));

    let (wait, handle) = poller.wait_cancellable("n8n", Duration::from_secs(60));
    handle.abort();

    assert_eq!(wait.await, Readiness::Cancelled);
}
