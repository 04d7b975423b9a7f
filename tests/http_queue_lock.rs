//! HTTP queue lock gateway against a mock queueing engine.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use queue_circuit_breaker::breaker::{BreakerError, QueueCircuitBreaker};
use queue_circuit_breaker::config::{CircuitBreakerConfig, RuleConfig};
use queue_circuit_breaker::queue_lock::{HttpQueueLockGateway, QueueLockError, QueueLockGateway};
use queue_circuit_breaker::store::MemoryCircuitStore;
use queue_circuit_breaker::{CircuitState, QueueResponseType, QueuedRequest};
use url::Url;

mod common;

fn gateway(base: &str) -> HttpQueueLockGateway {
    HttpQueueLockGateway::new(Url::parse(base).unwrap(), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_acquire_and_release() {
    let (base, mock) = common::start_mock_queueing_engine().await;
    let gateway = gateway(&base);

    gateway.acquire_lock("queue-a", "breaker").await.unwrap();
    assert_eq!(mock.locked(), vec!["queue-a".to_string()]);
    assert_eq!(mock.owner("queue-a").as_deref(), Some("breaker"));

    gateway.release_lock("queue-a").await.unwrap();
    assert!(mock.locked().is_empty());

    // already released
    gateway.release_lock("queue-a").await.unwrap();
}

#[tokio::test]
async fn test_rejection_is_reported() {
    let (base, mock) = common::start_mock_queueing_engine().await;
    let gateway = gateway(&base);
    mock.fail_with(Some(StatusCode::SERVICE_UNAVAILABLE));

    let err = gateway.acquire_lock("queue-a", "breaker").await.unwrap_err();
    assert!(matches!(err, QueueLockError::Rejected { status: 503, .. }));
    let err = gateway.release_lock("queue-a").await.unwrap_err();
    assert!(matches!(err, QueueLockError::Rejected { status: 503, .. }));
}

#[tokio::test]
async fn test_unreachable_engine() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let gateway = gateway(&format!("http://{}/queuing", addr));
    let err = gateway.acquire_lock("queue-a", "breaker").await.unwrap_err();
    assert!(matches!(err, QueueLockError::Request(_)));
}

#[tokio::test]
async fn test_breaker_locks_through_http() {
    let (base, mock) = common::start_mock_queueing_engine().await;
    let breaker = QueueCircuitBreaker::new(
        Arc::new(MemoryCircuitStore::new()),
        Arc::new(gateway(&base)),
        &[RuleConfig::new("/backend/.*")],
        CircuitBreakerConfig {
            circuit_check_enabled: true,
            statistics_update_enabled: true,
            error_threshold_percentage: 50,
            min_queue_sample_count: 1,
            ..CircuitBreakerConfig::default()
        },
        "queue_circuit_breaker",
    );

    breaker
        .update_statistics(
            "queue-a",
            &QueuedRequest::new("/backend/x").with_unique_id("1"),
            QueueResponseType::Failure,
        )
        .await
        .unwrap();
    assert_eq!(mock.owner("queue-a").as_deref(), Some("queue_circuit_breaker"));

    // lock failures on the request path surface to the caller
    mock.fail_with(Some(StatusCode::INTERNAL_SERVER_ERROR));
    let err = breaker
        .handle_queued_request("queue-b", &QueuedRequest::new("/backend/y"))
        .await
        .unwrap_err();
    assert!(matches!(err, BreakerError::QueueLock { ref queue, .. } if queue == "queue-b"));
    assert_eq!(
        breaker.admit("queue-b", &QueuedRequest::new("/backend/y")).await,
        queue_circuit_breaker::Admission::Blocked
    );

    mock.fail_with(None);
    breaker.close_all_circuits().await.unwrap();
    let id = queue_circuit_breaker::routing::CircuitId::from_pattern("/backend/.*", None);
    assert_eq!(breaker.get_circuit_state(&id).await.unwrap(), CircuitState::Closed);
    while breaker.unlock_next_queue().await.unwrap().is_some() {}
    assert!(mock.locked().is_empty());
}
