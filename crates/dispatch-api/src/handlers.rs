//! REST endpoint handlers for the dispatch API.
//!
//! Every handler goes through the shared [`AgentStore`](dispatch_store::AgentStore)
//! in [`AppState`]; the store takes its own lock, so handlers never hold
//! one across an `.await`.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/drivers` | Ingest a position ping |
//! | `GET` | `/api/drivers/nearest` | k-nearest live drivers to a point |
//! | `GET` | `/api/drivers/{id}` | Point lookup |
//! | `DELETE` | `/api/drivers/{id}` | Remove a driver |
//! | `GET` | `/api/drivers/{id}/history` | Recent positions of a driver |

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use dispatch_types::{
    AgentId, AgentResponse, DefaultResponse, HistoryPoint, HistoryResponse, Location,
    NearestResponse, Payload,
};
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::state::AppState;

/// Number of neighbours returned when `limit` is omitted.
pub const DEFAULT_NEAREST_LIMIT: usize = 10;

/// Upper bound on `limit` for a single nearest query.
pub const MAX_NEAREST_LIMIT: usize = 1_000;

/// Query parameters for `GET /api/drivers/nearest`.
#[derive(Debug, serde::Deserialize)]
pub struct NearestQuery {
    /// Latitude of the query point.
    pub lat: f64,
    /// Longitude of the query point.
    pub lon: f64,
    /// Maximum number of drivers to return (default 10).
    pub limit: Option<usize>,
    /// Only return drivers within this planar distance.
    pub radius: Option<f64>,
}

impl NearestQuery {
    fn validate(&self) -> Result<(Location, usize), ApiError> {
        if !self.lat.is_finite() || !self.lon.is_finite() {
            return Err(ApiError::InvalidQuery(String::from(
                "lat and lon must be finite numbers",
            )));
        }
        let limit = self.limit.unwrap_or(DEFAULT_NEAREST_LIMIT);
        if limit == 0 || limit > MAX_NEAREST_LIMIT {
            return Err(ApiError::InvalidQuery(format!(
                "limit must be between 1 and {MAX_NEAREST_LIMIT}"
            )));
        }
        if let Some(radius) = self.radius
            && !(radius.is_finite() && radius >= 0.0)
        {
            return Err(ApiError::InvalidQuery(String::from(
                "radius must be a non-negative number",
            )));
        }
        Ok((Location::new(self.lat, self.lon), limit))
    }
}

fn agent_path(path: Result<Path<i64>, PathRejection>) -> Result<AgentId, ApiError> {
    path.map(|Path(raw)| AgentId(raw))
        .map_err(|rejection| ApiError::InvalidQuery(rejection.body_text()))
}

// ---------------------------------------------------------------------------
// POST /api/drivers
// ---------------------------------------------------------------------------

/// Record a position ping, creating the driver on first sight.
///
/// The expiry deadline is derived from the ping timestamp via the
/// configured [`ExpiryPolicy`](crate::state::ExpiryPolicy).
pub async fn ingest(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Payload>, JsonRejection>,
) -> Result<Json<DefaultResponse>, ApiError> {
    let Json(payload) = payload.map_err(|rejection| {
        warn!(error = %rejection, "rejected position payload");
        ApiError::InvalidPayload(rejection.body_text())
    })?;

    let expires_at = state.expiry.expires_at(payload.timestamp);
    state.store.upsert(
        payload.agent_id,
        payload.location,
        payload.timestamp,
        expires_at,
    )?;

    debug!(agent = %payload.agent_id, timestamp = payload.timestamp, "position recorded");
    Ok(Json(DefaultResponse::ok("position recorded")))
}

// ---------------------------------------------------------------------------
// GET /api/drivers/{id}
// ---------------------------------------------------------------------------

/// Look up a single live driver.
pub async fn get_agent(
    State(state): State<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<AgentResponse>, ApiError> {
    let id = agent_path(path)?;
    let snapshot = state.store.get(id)?;
    Ok(Json(AgentResponse {
        success: true,
        message: String::from("driver found"),
        agent: snapshot.id,
    }))
}

// ---------------------------------------------------------------------------
// DELETE /api/drivers/{id}
// ---------------------------------------------------------------------------

/// Remove a driver from the store.
pub async fn delete_agent(
    State(state): State<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<DefaultResponse>, ApiError> {
    let id = agent_path(path)?;
    state.store.delete(id)?;
    info!(agent = %id, "driver removed");
    Ok(Json(DefaultResponse::ok("driver removed")))
}

// ---------------------------------------------------------------------------
// GET /api/drivers/{id}/history
// ---------------------------------------------------------------------------

/// List a driver's retained positions, least recently used first.
pub async fn agent_history(
    State(state): State<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let id = agent_path(path)?;
    let history = state
        .store
        .history(id)?
        .into_iter()
        .map(|(timestamp, location)| HistoryPoint {
            timestamp,
            lat: location.latitude,
            lon: location.longitude,
        })
        .collect();

    Ok(Json(HistoryResponse {
        success: true,
        message: String::from("history found"),
        agent: id,
        history,
    }))
}

// ---------------------------------------------------------------------------
// GET /api/drivers/nearest
// ---------------------------------------------------------------------------

/// Return up to `limit` live drivers ordered by distance to `(lat, lon)`.
pub async fn nearest(
    State(state): State<Arc<AppState>>,
    query: Result<Query<NearestQuery>, QueryRejection>,
) -> Result<Json<NearestResponse>, ApiError> {
    let Query(query) = query.map_err(|rejection| ApiError::InvalidQuery(rejection.body_text()))?;
    let (point, limit) = query.validate()?;

    let neighbors = match query.radius {
        Some(radius) => state.store.nearest_within(&point, limit, radius),
        None => state.store.nearest(&point, limit),
    };

    Ok(Json(NearestResponse {
        success: true,
        message: format!("{} drivers found", neighbors.len()),
        agents: neighbors.into_iter().map(|n| n.id).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(limit: Option<usize>, radius: Option<f64>) -> NearestQuery {
        NearestQuery {
            lat: 1.0,
            lon: 2.0,
            limit,
            radius,
        }
    }

    #[test]
    fn limit_defaults_and_bounds() {
        assert!(matches!(
            query(None, None).validate(),
            Ok((_, DEFAULT_NEAREST_LIMIT))
        ));
        assert!(query(Some(0), None).validate().is_err());
        assert!(query(Some(MAX_NEAREST_LIMIT + 1), None).validate().is_err());
        assert!(matches!(query(Some(3), None).validate(), Ok((_, 3))));
    }

    #[test]
    fn radius_must_be_non_negative() {
        assert!(query(None, Some(-1.0)).validate().is_err());
        assert!(query(None, Some(f64::NAN)).validate().is_err());
        assert!(query(None, Some(0.0)).validate().is_ok());
    }

    #[test]
    fn non_finite_point_is_rejected() {
        let bad = NearestQuery {
            lat: f64::INFINITY,
            lon: 0.0,
            limit: None,
            radius: None,
        };
        assert!(bad.validate().is_err());
    }
}
