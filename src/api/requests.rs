use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::auth::{AdminCaller, ClientCaller};
use super::error::ApiError;
use super::validation::parse_date_bound;
use crate::auth::Caller;
use crate::db::{
    AnalysisRequest, AssociationPatch, ListRequestsQuery, RequestFilter, RequestStatus,
    RequestView, ResolveRequest, Resolution,
};
use crate::AppState;

/// GET /api/requests?status=&from=&to=
///
/// Clients see their own submitted requests, admins see everyone's.
pub async fn list_requests(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<ListRequestsQuery>,
) -> Result<Json<Vec<AnalysisRequest>>, ApiError> {
    let status = match query.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => Some(
            s.parse::<RequestStatus>()
                .map_err(|e| ApiError::validation_field("status", e))?,
        ),
        None => None,
    };

    let filter = RequestFilter {
        status,
        formed_from: parse_date_bound(query.from.as_deref())
            .map_err(|e| ApiError::validation_field("from", e))?,
        formed_to: parse_date_bound(query.to.as_deref())
            .map_err(|e| ApiError::validation_field("to", e))?,
    };

    Ok(Json(state.lifecycle.list_requests(&filter, &caller).await?))
}

/// GET /api/requests/:id
pub async fn get_request(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Json<RequestView>, ApiError> {
    Ok(Json(state.lifecycle.get_request_view(id, &caller).await?))
}

/// GET /api/requests/draft
pub async fn get_draft(
    State(state): State<Arc<AppState>>,
    ClientCaller(caller): ClientCaller,
) -> Result<Json<RequestView>, ApiError> {
    Ok(Json(
        state.lifecycle.current_draft_view(caller.user_id).await?,
    ))
}

/// PUT /api/requests/draft/modelings/:modeling_id
///
/// Sparse merge: fields missing from the body keep their stored value.
pub async fn update_draft_modeling(
    State(state): State<Arc<AppState>>,
    ClientCaller(caller): ClientCaller,
    Path(modeling_id): Path<i64>,
    Json(patch): Json<AssociationPatch>,
) -> Result<Json<RequestView>, ApiError> {
    state
        .lifecycle
        .update_association_parameters(caller.user_id, modeling_id, &patch)
        .await?;
    Ok(Json(
        state.lifecycle.current_draft_view(caller.user_id).await?,
    ))
}

/// DELETE /api/requests/draft/modelings/:modeling_id
pub async fn remove_draft_modeling(
    State(state): State<Arc<AppState>>,
    ClientCaller(caller): ClientCaller,
    Path(modeling_id): Path<i64>,
) -> Result<Json<RequestView>, ApiError> {
    Ok(Json(
        state
            .lifecycle
            .remove_modeling_from_draft(caller.user_id, modeling_id)
            .await?,
    ))
}

/// POST /api/requests/draft/submit
pub async fn submit_draft(
    State(state): State<Arc<AppState>>,
    ClientCaller(caller): ClientCaller,
) -> Result<Json<RequestView>, ApiError> {
    let request_id = state.lifecycle.submit_draft(caller.user_id).await?;
    Ok(Json(
        state.lifecycle.get_request_view(request_id, &caller).await?,
    ))
}

/// DELETE /api/requests/draft
pub async fn delete_draft(
    State(state): State<Arc<AppState>>,
    ClientCaller(caller): ClientCaller,
) -> Result<StatusCode, ApiError> {
    state.lifecycle.delete_draft(caller.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/requests/:id/resolve
///
/// Body: `{"status": "complete"}` or `{"status": "canceled"}`.
pub async fn resolve_request(
    State(state): State<Arc<AppState>>,
    AdminCaller(admin): AdminCaller,
    Path(id): Path<i64>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<RequestView>, ApiError> {
    let outcome: Resolution = request
        .status
        .parse()
        .map_err(|e: String| ApiError::validation_field("status", e))?;

    state
        .lifecycle
        .resolve_by_admin(id, admin.user_id, outcome)
        .await?;
    Ok(Json(state.lifecycle.get_request_view(id, &admin).await?))
}
