//! Shared utilities for integration tests.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::put,
    Json, Router,
};
use serde_json::Value;
use tokio::net::TcpListener;

/// Lock table of the mock queueing engine: queue → owner.
#[derive(Clone, Default)]
pub struct MockLocks {
    pub locks: Arc<Mutex<BTreeMap<String, String>>>,
    /// When set, every request is answered with this status.
    pub fail_with: Arc<Mutex<Option<StatusCode>>>,
}

#[allow(dead_code)]
impl MockLocks {
    pub fn locked(&self) -> Vec<String> {
        self.locks.lock().unwrap().keys().cloned().collect()
    }

    pub fn owner(&self, queue: &str) -> Option<String> {
        self.locks.lock().unwrap().get(queue).cloned()
    }

    pub fn fail_with(&self, status: Option<StatusCode>) {
        *self.fail_with.lock().unwrap() = status;
    }
}

async fn acquire(
    State(mock): State<MockLocks>,
    Path(queue): Path<String>,
    Json(body): Json<Value>,
) -> StatusCode {
    if let Some(status) = *mock.fail_with.lock().unwrap() {
        return status;
    }
    let owner = body["owner"].as_str().unwrap_or_default().to_string();
    mock.locks.lock().unwrap().insert(queue, owner);
    StatusCode::OK
}

async fn release(State(mock): State<MockLocks>, Path(queue): Path<String>) -> StatusCode {
    if let Some(status) = *mock.fail_with.lock().unwrap() {
        return status;
    }
    match mock.locks.lock().unwrap().remove(&queue) {
        Some(_) => StatusCode::OK,
        None => StatusCode::NOT_FOUND,
    }
}

/// Start a mock queueing engine lock API on an ephemeral port.
///
/// Returns its base URL (`http://addr/queuing`) and lock table.
#[allow(dead_code)]
pub async fn start_mock_queueing_engine() -> (String, MockLocks) {
    let mock = MockLocks::default();
    let app = Router::new()
        .route("/queuing/locks/{queue}", put(acquire).delete(release))
        .with_state(mock.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/queuing", addr), mock)
}
