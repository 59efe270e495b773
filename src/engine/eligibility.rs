use uuid::Uuid;

use crate::geo::haversine_m;
use crate::models::job::Job;
use crate::state::AppState;

#[derive(Debug, Clone, Copy)]
pub struct RankedCandidate {
    pub agent_id: Uuid,
    pub distance_m: f64,
    pub rating: f64,
}

/// Builds the eligibility pool for a job at the given search radius:
/// online, capable of the job's service kind, not engaged, with a fresh
/// position within the radius. Ordered by distance to origin, rating as
/// tie-break. An empty pool is a valid outcome, not an error.
pub fn candidates(state: &AppState, job: &Job, radius_m: f64) -> Vec<RankedCandidate> {
    let staleness = state.config.position_staleness;

    let mut pool: Vec<RankedCandidate> = state
        .agents
        .list()
        .into_iter()
        .filter(|agent| agent.online && agent.current_job.is_none() && agent.accepts(job.service_kind))
        .filter_map(|agent| {
            let sample = state.positions.latest(agent.id, staleness)?;
            let here = crate::models::agent::GeoPoint {
                lat: sample.lat,
                lng: sample.lng,
            };
            let distance_m = haversine_m(&here, &job.origin);

            (distance_m <= radius_m).then_some(RankedCandidate {
                agent_id: agent.id,
                distance_m,
                rating: agent.rating,
            })
        })
        .collect();

    pool.sort_by(|a, b| {
        a.distance_m
            .total_cmp(&b.distance_m)
            .then(b.rating.total_cmp(&a.rating))
    });

    pool
}
