use std::collections::BTreeMap;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::breaker::error::BreakerError;
use crate::breaker::types::{CircuitInfo, CircuitState};
use crate::routing::matcher::CircuitId;
use crate::store::StoreError;

/// Body of status reads and updates.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusBody {
    pub status: String,
}

#[derive(Debug)]
pub enum AdminError {
    BadRequest(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AdminError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            AdminError::Forbidden(m) => (StatusCode::FORBIDDEN, m),
            AdminError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            AdminError::Conflict(m) => (StatusCode::CONFLICT, m),
            AdminError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<BreakerError> for AdminError {
    fn from(e: BreakerError) -> Self {
        match e {
            BreakerError::NoMapping { .. } => AdminError::NotFound(e.to_string()),
            BreakerError::Storage(StoreError::IllegalTransition { .. }) => {
                AdminError::Conflict(e.to_string())
            }
            other => {
                tracing::error!(error = %other, "Admin request failed");
                AdminError::Internal(other.to_string())
            }
        }
    }
}

/// Only `closed` may be set from outside; every other state is owned by the breaker.
fn require_closed(body: Result<Json<StatusBody>, JsonRejection>) -> Result<(), AdminError> {
    let Json(body) = body.map_err(|e| AdminError::BadRequest(e.body_text()))?;
    match body.status.parse::<CircuitState>() {
        Ok(CircuitState::Closed) => Ok(()),
        _ => Err(AdminError::Forbidden(format!(
            "status '{}' cannot be set, only 'closed' is allowed",
            body.status
        ))),
    }
}

pub async fn list_circuits(
    State(state): State<AdminState>,
) -> Result<Json<BTreeMap<CircuitId, CircuitInfo>>, AdminError> {
    Ok(Json(state.breaker.get_all_circuits().await?))
}

pub async fn close_all_circuits(
    State(state): State<AdminState>,
    body: Result<Json<StatusBody>, JsonRejection>,
) -> Result<Json<StatusBody>, AdminError> {
    require_closed(body)?;
    state.breaker.close_all_circuits().await?;
    Ok(Json(StatusBody {
        status: CircuitState::Closed.to_string(),
    }))
}

pub async fn get_circuit(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> Result<Json<CircuitInfo>, AdminError> {
    let id = CircuitId::from(id);
    state
        .breaker
        .get_circuit_info(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AdminError::NotFound(format!("circuit {} not found", id)))
}

pub async fn get_circuit_status(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> Result<Json<StatusBody>, AdminError> {
    let id = CircuitId::from(id);
    let info = state
        .breaker
        .get_circuit_info(&id)
        .await?
        .ok_or_else(|| AdminError::NotFound(format!("circuit {} not found", id)))?;
    Ok(Json(StatusBody {
        status: info.state.to_string(),
    }))
}

pub async fn set_circuit_status(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    body: Result<Json<StatusBody>, JsonRejection>,
) -> Result<Json<StatusBody>, AdminError> {
    require_closed(body)?;
    let id = CircuitId::from(id);
    state.breaker.close_circuit_by_id(&id).await?;
    Ok(Json(StatusBody {
        status: CircuitState::Closed.to_string(),
    }))
}
