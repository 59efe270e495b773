use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{patch, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::agent::AgentRecord;
use crate::models::job::ServiceKind;
use crate::models::position::PositionSample;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/agents", post(register_agent).get(list_agents))
        .route("/agents/:id/availability", patch(update_availability))
        .route("/agents/:id/position", post(update_position))
}

#[derive(Deserialize)]
pub struct RegisterAgentRequest {
    pub name: String,
    pub capabilities: Vec<ServiceKind>,
    pub rating: f64,
}

async fn register_agent(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterAgentRequest>,
) -> Result<Json<AgentRecord>, DispatchError> {
    if payload.name.trim().is_empty() {
        return Err(DispatchError::BadRequest("name cannot be empty".to_string()));
    }

    if payload.capabilities.is_empty() {
        return Err(DispatchError::BadRequest(
            "at least one service capability is required".to_string(),
        ));
    }

    let agent = AgentRecord {
        id: Uuid::new_v4(),
        name: payload.name,
        online: true,
        capabilities: payload.capabilities,
        rating: payload.rating.clamp(0.0, 5.0),
        current_job: None,
        updated_at: Utc::now(),
    };

    state.agents.register(agent.clone());
    state
        .metrics
        .agents_online
        .set(state.agents.online_count() as i64);

    Ok(Json(agent))
}

async fn list_agents(State(state): State<Arc<AppState>>) -> Json<Vec<AgentRecord>> {
    Json(state.agents.list())
}

#[derive(Deserialize)]
pub struct UpdateAvailabilityRequest {
    pub online: bool,
}

async fn update_availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAvailabilityRequest>,
) -> Result<Json<AgentRecord>, DispatchError> {
    let agent = state.agents.set_online(id, payload.online)?;
    state
        .metrics
        .agents_online
        .set(state.agents.online_count() as i64);

    Ok(Json(agent))
}

#[derive(Deserialize)]
pub struct UpdatePositionRequest {
    pub lat: f64,
    pub lng: f64,
    pub heading: f64,
    pub speed: f64,
    /// Sender-side sample time; defaults to arrival time when omitted.
    pub recorded_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct UpdatePositionResponse {
    pub ok: bool,
}

/// Fire-and-forget position ingest: last-write-wins, idempotent, never
/// touches job or agent locks.
async fn update_position(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePositionRequest>,
) -> Result<Json<UpdatePositionResponse>, DispatchError> {
    if !payload.lat.is_finite() || !payload.lng.is_finite() {
        return Err(DispatchError::BadRequest(
            "coordinates must be finite".to_string(),
        ));
    }

    state.agents.get(id)?;

    let sample = PositionSample {
        lat: payload.lat,
        lng: payload.lng,
        heading: payload.heading,
        speed: payload.speed,
        recorded_at: payload.recorded_at.unwrap_or_else(Utc::now),
    };

    state.positions.update(id, sample);
    state.fanout.position_refreshed(id, &sample);

    Ok(Json(UpdatePositionResponse { ok: true }))
}
