//! HTTP endpoints
//!
//! The CRUD API reports mutations here; clients read presence after a
//! reconnect.

use super::{ApiError, ApiResult, HubState};
use crate::broadcast::DeliveryReport;
use crate::types::{DocumentId, SessionId};
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use collab_common::{AppError, Identity, PresenceSnapshot};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authenticated caller extracted from the bearer token
#[derive(Debug, Clone)]
pub struct AuthUser(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    HubState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::MissingAuth)?;

        let hub_state = HubState::from_ref(state);
        let identity = hub_state
            .authenticator()
            .authenticate(bearer.token())
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Invalid access token");
                ApiError::from(e)
            })?;

        Ok(Self(identity))
    }
}

/// Body of a change notification
#[derive(Debug, Deserialize)]
pub struct ChangeRequest {
    /// Dataset that was mutated
    pub table: String,
    /// Session of the editor that made the change, if it came from one
    #[serde(default)]
    pub origin_session: Option<Uuid>,
}

/// Result of a change notification
#[derive(Debug, Serialize)]
pub struct ChangeResponse {
    pub delivered: usize,
    pub dropped: usize,
}

impl From<DeliveryReport> for ChangeResponse {
    fn from(report: DeliveryReport) -> Self {
        Self {
            delivered: report.delivered,
            dropped: report.dropped,
        }
    }
}

/// Presence of one document
#[derive(Debug, Serialize)]
pub struct PresenceResponse {
    pub proposal_id: String,
    pub version: u64,
    pub presence: PresenceSnapshot,
}

/// Liveness and load
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub rooms: usize,
    pub connections: usize,
}

fn document_id(raw: &str) -> ApiResult<DocumentId> {
    DocumentId::parse(raw).ok_or_else(|| ApiError::invalid_path("proposal_id must not be empty"))
}

/// Fan a mutation out to the document's editors
///
/// POST /api/proposals/:proposal_id/changes
pub async fn publish_change(
    State(state): State<HubState>,
    AuthUser(caller): AuthUser,
    Path(proposal_id): Path<String>,
    Json(request): Json<ChangeRequest>,
) -> ApiResult<(StatusCode, Json<ChangeResponse>)> {
    let document_id = document_id(&proposal_id)?;
    let table = request.table.trim();
    if table.is_empty() {
        return Err(AppError::validation("table must not be empty").into());
    }

    let origin = request.origin_session.map(SessionId::from_uuid);
    let report = state.hub().notify_mutation(&document_id, table, origin);

    tracing::info!(
        document_id = %document_id,
        table,
        user_id = %caller.user_id,
        delivered = report.delivered,
        "Change notified"
    );

    Ok((StatusCode::ACCEPTED, Json(report.into())))
}

/// Current presence of a document
///
/// GET /api/proposals/:proposal_id/presence
pub async fn get_presence(
    State(state): State<HubState>,
    _caller: AuthUser,
    Path(proposal_id): Path<String>,
) -> ApiResult<Json<PresenceResponse>> {
    let document_id = document_id(&proposal_id)?;
    let (version, presence) = state.hub().presence(&document_id).unwrap_or_default();

    Ok(Json(PresenceResponse {
        proposal_id: document_id.to_string(),
        version,
        presence,
    }))
}

/// Basic health check (liveness probe)
///
/// GET /health
pub async fn health_check(State(state): State<HubState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        rooms: state.hub().room_count(),
        connections: state.hub().connection_count(),
    })
}
