use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::dispatch::respond_to_offer;
use crate::engine::lifecycle;
use crate::engine::queue::enqueue_job;
use crate::error::DispatchError;
use crate::geo::{eta_seconds, haversine_m};
use crate::models::agent::GeoPoint;
use crate::models::job::{Actor, Job, JobStatus, ServiceKind};
use crate::models::offer::{Offer, OfferDecision};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", post(create_job))
        .route("/jobs/:id", get(job_status))
        .route("/jobs/:id/cancel", post(cancel_job))
        .route("/jobs/:id/respond", post(respond))
        .route("/jobs/:id/advance", post(advance_status))
        .route("/offers", get(list_offers))
}

#[derive(Deserialize)]
pub struct CreateJobRequest {
    pub requester_id: Uuid,
    pub service_kind: ServiceKind,
    pub origin: GeoPoint,
    pub destination: GeoPoint,
}

async fn create_job(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateJobRequest>,
) -> Result<Json<Job>, DispatchError> {
    for point in [&payload.origin, &payload.destination] {
        if !point.lat.is_finite() || !point.lng.is_finite() {
            return Err(DispatchError::BadRequest(
                "coordinates must be finite".to_string(),
            ));
        }
    }

    let job = Job::new(
        payload.requester_id,
        payload.service_kind,
        payload.origin,
        payload.destination,
    );

    let job_id = state.jobs.create(job.clone());
    enqueue_job(&state, job_id).await?;

    Ok(Json(job))
}

#[derive(Serialize)]
pub struct JobStatusResponse {
    #[serde(flatten)]
    pub job: Job,
    /// Live distance from the assigned agent to the current leg target;
    /// null when position is unknown or no agent is assigned.
    pub distance_m: Option<f64>,
    pub eta_secs: Option<u64>,
}

async fn job_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>, DispatchError> {
    let job = state.jobs.get(id)?;
    let (distance_m, eta_secs) = live_leg(&state, &job);

    Ok(Json(JobStatusResponse {
        job,
        distance_m,
        eta_secs,
    }))
}

/// Distance/ETA for the active leg: toward the origin until the service is
/// underway, toward the destination while in progress. Stale or missing
/// position degrades to unknown, never to zero.
fn live_leg(state: &AppState, job: &Job) -> (Option<f64>, Option<u64>) {
    let target = match job.status {
        JobStatus::Accepted | JobStatus::EnRouteToOrigin | JobStatus::ArrivedAtOrigin => {
            &job.origin
        }
        JobStatus::InProgress => &job.destination,
        _ => return (None, None),
    };

    let Some(agent_id) = job.assigned_agent else {
        return (None, None);
    };
    let Some(sample) = state
        .positions
        .latest(agent_id, state.config.position_staleness)
    else {
        return (None, None);
    };

    let here = GeoPoint {
        lat: sample.lat,
        lng: sample.lng,
    };
    let distance = haversine_m(&here, target);
    let eta = eta_seconds(
        distance,
        state.config.average_speed_mps,
        state.config.min_eta_secs,
    );

    (Some(distance), Some(eta))
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CancelRole {
    Requester,
    Agent,
}

#[derive(Deserialize)]
pub struct CancelJobRequest {
    pub role: CancelRole,
    pub actor_id: Uuid,
    pub reason: Option<String>,
}

async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelJobRequest>,
) -> Result<Json<Job>, DispatchError> {
    let actor = match payload.role {
        CancelRole::Requester => Actor::Requester(payload.actor_id),
        CancelRole::Agent => Actor::Agent(payload.actor_id),
    };

    let job = lifecycle::cancel(&state, id, actor, payload.reason)?;
    Ok(Json(job))
}

#[derive(Deserialize)]
pub struct RespondRequest {
    pub agent_id: Uuid,
    pub decision: OfferDecision,
}

#[derive(Serialize)]
pub struct RespondResponse {
    pub job: Job,
}

async fn respond(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RespondRequest>,
) -> Result<Json<RespondResponse>, DispatchError> {
    respond_to_offer(
        &state,
        id,
        payload.agent_id,
        payload.decision == OfferDecision::Accept,
    )?;

    let job = state.jobs.get(id)?;
    Ok(Json(RespondResponse { job }))
}

#[derive(Deserialize)]
pub struct AdvanceStatusRequest {
    pub agent_id: Uuid,
    pub status: JobStatus,
}

async fn advance_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdvanceStatusRequest>,
) -> Result<Json<Job>, DispatchError> {
    let job = lifecycle::advance(&state, id, payload.agent_id, payload.status)?;
    Ok(Json(job))
}

async fn list_offers(State(state): State<Arc<AppState>>) -> Json<Vec<Offer>> {
    Json(state.offers.all())
}
