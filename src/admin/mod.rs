//! Admin HTTP API for inspecting and closing circuits.
//!
//! Routes below the configured prefix:
//! - `GET  {prefix}` and `GET {prefix}/_all`: all circuits
//! - `PUT  {prefix}/_all/status`: close all circuits
//! - `GET  {prefix}/{id}`: circuit info
//! - `GET  {prefix}/{id}/status`: circuit state
//! - `PUT  {prefix}/{id}/status`: close one circuit

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, routing::get, Router};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::breaker::QueueCircuitBreaker;

#[derive(Clone)]
pub struct AdminState {
    pub breaker: Arc<QueueCircuitBreaker>,
    /// Bearer key; empty disables authentication.
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(breaker: Arc<QueueCircuitBreaker>, api_key: &str) -> Self {
        Self {
            breaker,
            api_key: Arc::from(api_key),
        }
    }
}

const ADMIN_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub fn setup_admin_router(state: AdminState, path_prefix: &str) -> Router {
    let prefix = path_prefix.trim_end_matches('/');
    let root = if prefix.is_empty() { "/" } else { prefix };
    #[allow(deprecated)]
    let timeout = TimeoutLayer::new(ADMIN_REQUEST_TIMEOUT);

    Router::new()
        .route(root, get(list_circuits))
        .route(&format!("{prefix}/_all"), get(list_circuits))
        .route(&format!("{prefix}/_all/status"), axum::routing::put(close_all_circuits))
        .route(&format!("{prefix}/{{id}}"), get(get_circuit))
        .route(
            &format!("{prefix}/{{id}}/status"),
            get(get_circuit_status).put(set_circuit_status),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .with_state(state)
        .layer(timeout)
        .layer(TraceLayer::new_for_http())
}
