//! Integration tests for the container lifecycle and address resolution.
//!
//! All tests run against the in-memory runtime from the `testing` module.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use kafka_kraft_core::container::{CLUSTER_ID_LABEL, MANAGED_LABEL};
use kafka_kraft_core::error::{KafkaError, ResolutionError};
use kafka_kraft_core::script::{STARTER_SCRIPT_MODE, STARTER_SCRIPT_PATH};
use kafka_kraft_core::testing::{
    BootstrapHarness, RuntimeOperation, StartupBehavior, TestHarnessBuilder,
};
use kafka_kraft_core::{
    ContainerRuntime, KafkaContainer, KafkaListener, LifecycleState, RunOptions,
};

// =============================================================================
// Startup
// =============================================================================

/// Test that a supplied cluster id is kept verbatim.
#[tokio::test]
async fn test_cluster_id_kept() {
    let harness = BootstrapHarness::new();
    let container = harness
        .run(RunOptions::default().with_cluster_id("kraftCluster"))
        .await
        .unwrap();

    assert_eq!(container.cluster_id(), "kraftCluster");
    assert_eq!(container.state(), LifecycleState::Ready);

    let managed = harness.managed_containers().await;
    assert_eq!(managed.len(), 1);
    assert_eq!(managed[0].labels[CLUSTER_ID_LABEL], "kraftCluster");
    assert_eq!(managed[0].labels[MANAGED_LABEL], "true");
}

/// Test that a supplied cluster id is not treated as a template.
#[tokio::test]
async fn test_cluster_id_with_placeholder_kept() {
    std::env::set_var("KRAFT_BOOTSTRAP_PLACEHOLDER", "expanded");
    let harness = BootstrapHarness::new();
    let container = harness
        .run(RunOptions::default().with_cluster_id("a${KRAFT_BOOTSTRAP_PLACEHOLDER}b"))
        .await
        .unwrap();
    std::env::remove_var("KRAFT_BOOTSTRAP_PLACEHOLDER");

    assert_eq!(container.cluster_id(), "a${KRAFT_BOOTSTRAP_PLACEHOLDER}b");
    let script = container.startup_script().await.unwrap();
    assert!(script.contains("cluster.id=a${KRAFT_BOOTSTRAP_PLACEHOLDER}b"));
}

/// Test that the startup script is copied in with the right mode and content.
#[tokio::test]
async fn test_startup_script_injected() {
    let harness = BootstrapHarness::new();
    let network = harness.network("kafka-net").await.unwrap();
    let container = harness
        .run(
            RunOptions::default()
                .with_network(network.name(), ["kafka"])
                .with_listeners(vec![KafkaListener::new("BROKER", "kafka", "9092")]),
        )
        .await
        .unwrap();

    let (_, mode) = harness
        .runtime
        .file(container.id(), STARTER_SCRIPT_PATH)
        .await
        .unwrap();
    assert_eq!(mode, STARTER_SCRIPT_MODE);

    let script = container.startup_script().await.unwrap();
    let hostname = container.hostname().unwrap();
    assert!(script.contains(&format!("BROKER://{hostname}:9092")));
    assert!(!script.contains("BROKER://kafka:9092"));
    assert!(!script.contains("BROKER://localhost"));
    assert!(script.contains("controller.quorum.voters=1@localhost:9094"));

    container.terminate().await.unwrap();
    network.remove().await.unwrap();
}

/// Test that the advertised plaintext listener uses the mapped host port.
#[tokio::test]
async fn test_advertised_plaintext_uses_mapped_port() {
    let harness = BootstrapHarness::new();
    let container = harness.run_default().await.unwrap();

    let brokers = container.brokers().await.unwrap();
    let script = container.startup_script().await.unwrap();
    assert!(script.contains(&format!("PLAINTEXT://{}", brokers[0])));
}

/// Test that joining a network that does not exist fails without leaking.
#[tokio::test]
async fn test_missing_network_rejected() {
    let harness = BootstrapHarness::new();
    let err = harness
        .run(RunOptions::default().with_network("missing-net", ["kafka"]))
        .await
        .unwrap_err();

    assert!(matches!(err, KafkaError::Runtime(_)));
    assert!(harness.managed_containers().await.is_empty());
}

/// Test that extra properties and environment reach the container.
#[tokio::test]
async fn test_extra_properties_and_env() {
    let harness = BootstrapHarness::new();
    let container = harness
        .run(
            RunOptions::default()
                .with_broker_property("auto.create.topics.enable", "false")
                .with_env("KAFKA_HEAP_OPTS", "-Xmx256m"),
        )
        .await
        .unwrap();

    let script = container.startup_script().await.unwrap();
    assert!(script.contains("auto.create.topics.enable=false\n"));

    let request = harness.runtime.request(container.id()).await.unwrap();
    assert_eq!(request.env["KAFKA_HEAP_OPTS"], "-Xmx256m");
}

/// Test that the image is pulled before the container is created.
#[tokio::test]
async fn test_image_pulled_before_create() {
    let harness = BootstrapHarness::new();
    harness.run_default().await.unwrap();

    let calls = harness.runtime.calls().await;
    let pull = calls
        .iter()
        .position(|c| c.operation == RuntimeOperation::EnsureImage)
        .unwrap();
    let create = calls
        .iter()
        .position(|c| c.operation == RuntimeOperation::Create)
        .unwrap();
    assert!(pull < create);
    assert!(harness.runtime.has_image("confluentinc/confluent-local:7.5.0").await);
}

// =============================================================================
// Version gate
// =============================================================================

/// Test that images predating KRaft support are rejected with no container left.
#[tokio::test]
async fn test_unsupported_version_rejected() {
    let harness = BootstrapHarness::new();
    let err = harness
        .run(RunOptions::new("confluentinc/confluent-local:6.3.3").with_cluster_id("kraftCluster"))
        .await
        .unwrap_err();

    match err {
        KafkaError::UnsupportedVersion {
            image,
            version,
            minimum,
        } => {
            assert_eq!(image, "confluentinc/confluent-local");
            assert_eq!(version, "6.3.3");
            assert_eq!(minimum, "7.4.0");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(harness.managed_containers().await.is_empty());
    assert!(harness
        .runtime
        .calls_for(RuntimeOperation::Create)
        .await
        .is_empty());
}

// =============================================================================
// Failure and cleanup
// =============================================================================

/// Test that a broker that never becomes ready times out and is removed.
#[tokio::test]
async fn test_startup_timeout_cleans_up() {
    let harness = TestHarnessBuilder::new()
        .startup_behavior(StartupBehavior::NeverReady)
        .build();

    let err = harness
        .run(RunOptions::default().with_startup_timeout(Duration::from_secs(1)))
        .await
        .unwrap_err();

    match err {
        KafkaError::StartupTimeout { elapsed, .. } => {
            assert!(elapsed >= Duration::from_secs(1));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(harness.managed_containers().await.is_empty());
    assert_eq!(harness.runtime.container_count().await, 0);
}

/// Test that cancellation aborts the readiness wait and removes the container.
#[tokio::test]
async fn test_cancellation_cleans_up() {
    let harness = TestHarnessBuilder::new()
        .startup_behavior(StartupBehavior::NeverReady)
        .build();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(250)).await;
        trigger.cancel();
    });

    let err = KafkaContainer::run_with_cancellation(harness.runtime(), RunOptions::default(), cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, KafkaError::Cancelled { .. }));
    assert!(harness.managed_containers().await.is_empty());
}

/// Test that cancellation interrupts a slow image pull before creation.
#[tokio::test]
async fn test_cancellation_during_pull() {
    let harness = TestHarnessBuilder::new()
        .pull_delay(Duration::from_secs(30))
        .build();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        KafkaContainer::run_with_cancellation(harness.runtime(), RunOptions::default(), cancel),
    )
    .await
    .expect("pull was not interrupted")
    .unwrap_err();

    assert!(matches!(err, KafkaError::PullCancelled { .. }));
    assert!(harness.runtime.calls_for(RuntimeOperation::Create).await.is_empty());
    assert_eq!(harness.runtime.container_count().await, 0);
}

/// Test that readiness polling only refetches recent log lines.
#[tokio::test]
async fn test_readiness_polls_recent_logs() {
    let harness = TestHarnessBuilder::new()
        .startup_behavior(StartupBehavior::NeverReady)
        .build();

    let err = harness
        .run(RunOptions::default().with_startup_timeout(Duration::from_secs(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, KafkaError::StartupTimeout { .. }));

    let windows = harness.runtime.log_windows().await;
    assert!(windows.len() > 1);
    assert_eq!(windows[0], None);
    assert!(windows[1..].iter().all(Option::is_some));
}

/// Test that a broker exiting early is reported and removed.
#[tokio::test]
async fn test_container_exit_cleans_up() {
    let harness = TestHarnessBuilder::new()
        .startup_behavior(StartupBehavior::ExitBeforeReady)
        .build();

    let err = harness.run_default().await.unwrap_err();

    assert!(matches!(err, KafkaError::ContainerExited { .. }));
    assert!(harness.managed_containers().await.is_empty());
}

/// Test that a runtime failure after creation still removes the container.
#[tokio::test]
async fn test_runtime_failure_cleans_up() {
    let harness = TestHarnessBuilder::new()
        .failing(RuntimeOperation::Start)
        .build();

    let err = harness.run_default().await.unwrap_err();

    assert!(matches!(err, KafkaError::Runtime(_)));
    assert_eq!(harness.runtime.calls_for(RuntimeOperation::Remove).await.len(), 1);
    assert!(harness.managed_containers().await.is_empty());
}

// =============================================================================
// Two-phase lifecycle
// =============================================================================

/// Test the created -> starting -> ready transitions.
#[tokio::test]
async fn test_create_then_start() {
    let harness = BootstrapHarness::new();
    let mut container = KafkaContainer::create(harness.runtime(), RunOptions::default())
        .await
        .unwrap();

    assert_eq!(container.state(), LifecycleState::Created);
    assert!(container.hostname().is_none());
    assert!(matches!(
        container.brokers().await,
        Err(KafkaError::Resolution(ResolutionError::NotReady { .. }))
    ));

    container.start(CancellationToken::new()).await.unwrap();
    assert_eq!(container.state(), LifecycleState::Ready);
    assert!(container.hostname().is_some());
}

/// Test that starting twice is rejected.
#[tokio::test]
async fn test_start_twice_rejected() {
    let harness = BootstrapHarness::new();
    let mut container = harness.run_default().await.unwrap();

    let err = container.start(CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, KafkaError::InvalidState { .. }));
    assert_eq!(container.state(), LifecycleState::Ready);
}

/// Test that a failed container is terminal.
#[tokio::test]
async fn test_failed_state_is_terminal() {
    let harness = TestHarnessBuilder::new()
        .startup_behavior(StartupBehavior::ExitBeforeReady)
        .build();
    let mut container = KafkaContainer::create(harness.runtime(), RunOptions::default())
        .await
        .unwrap();

    assert!(container.start(CancellationToken::new()).await.is_err());
    assert_eq!(container.state(), LifecycleState::Failed);
    assert!(matches!(
        container.start(CancellationToken::new()).await,
        Err(KafkaError::InvalidState { .. })
    ));
    assert!(matches!(
        container.exec(["true"]).await,
        Err(KafkaError::InvalidState { .. })
    ));
    container.terminate().await.unwrap();
}

// =============================================================================
// Address resolution
// =============================================================================

/// Test that brokers() is idempotent and points at the mapped port.
#[tokio::test]
async fn test_brokers_idempotent() {
    let harness = BootstrapHarness::new();
    let container = harness.run_default().await.unwrap();

    let first = container.brokers().await.unwrap();
    let second = container.brokers().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.len(), 1);
    let port = container.inspect().await.unwrap().host_port(9093).unwrap();
    assert_eq!(first[0], format!("localhost:{port}"));
}

/// Test sibling-container addressing through network aliases.
#[tokio::test]
async fn test_network_brokers() {
    let harness = BootstrapHarness::new();
    let network = harness.network("kafka-net").await.unwrap();
    let container = harness
        .run(
            RunOptions::default()
                .with_network(network.name(), ["kafka", "broker-1"])
                .with_listeners(vec![KafkaListener::new("BROKER", "kafka", "9092")]),
        )
        .await
        .unwrap();

    assert_eq!(
        container.network_brokers().unwrap(),
        ["kafka:9092".to_string(), "broker-1:9092".to_string()]
    );
}

/// Test that siblings are pointed at the listener declared on an alias.
#[tokio::test]
async fn test_network_brokers_use_alias_listener() {
    let harness = BootstrapHarness::new();
    let network = harness.network("kafka-net").await.unwrap();
    let container = harness
        .run(
            RunOptions::default()
                .with_network(network.name(), ["kafka"])
                .with_listeners(vec![
                    KafkaListener::new("zeta", "zeta.example", "19092"),
                    KafkaListener::new("alpha", "kafka", "19093"),
                ]),
        )
        .await
        .unwrap();

    assert_eq!(container.network_brokers().unwrap(), ["kafka:19093".to_string()]);

    let script = container.startup_script().await.unwrap();
    let hostname = container.hostname().unwrap();
    assert!(script.contains(&format!("ALPHA://{hostname}:19093")));
    assert!(script.contains("ZETA://zeta.example:19092"));
}

/// Test that network brokers require an attachment.
#[tokio::test]
async fn test_network_brokers_without_network() {
    let harness = BootstrapHarness::new();
    let container = harness.run_default().await.unwrap();

    assert!(matches!(
        container.network_brokers(),
        Err(KafkaError::Resolution(ResolutionError::NoNetworkAlias))
    ));
}

/// Test that resolution fails once the broker process is gone.
#[tokio::test]
async fn test_brokers_after_container_removed() {
    let harness = BootstrapHarness::new();
    let container = harness.run_default().await.unwrap();
    let id = container.id().to_string();

    harness.runtime.remove(&id).await.unwrap();

    assert!(matches!(
        container.brokers().await,
        Err(KafkaError::Resolution(ResolutionError::Inspect(_)))
    ));
}
