use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::{info, warn};

use super::auth::{AdminCaller, ClientCaller, OptionalCaller};
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{parse_price_bound, validate_name, validate_price};
use crate::db::{
    CreateModelingRequest, Modeling, ModelingFilter, ModelingListQuery, ModelingListResponse,
    RequestView, UpdateModelingRequest,
};
use crate::AppState;

/// Multipart field carrying the image
const IMAGE_FIELD: &str = "image";

/// GET /api/modelings?query=&from=&to=
///
/// Public. An authenticated client also gets its draft id and item count.
pub async fn list_modelings(
    State(state): State<Arc<AppState>>,
    OptionalCaller(caller): OptionalCaller,
    Query(query): Query<ModelingListQuery>,
) -> Result<Json<ModelingListResponse>, ApiError> {
    let ceiling = state.config.catalog.price_ceiling;
    let price_min = parse_price_bound(query.from.as_deref(), 0)
        .map_err(|e| ApiError::validation_field("from", e))?;
    let price_max = parse_price_bound(query.to.as_deref(), ceiling)
        .map_err(|e| ApiError::validation_field("to", e))?;

    let filter = ModelingFilter {
        name: query.query.map(|q| q.trim().to_string()),
        price_min,
        price_max,
    };
    let modelings = Modeling::list(&state.db, &filter).await?;

    let (draft_request_id, draft_items) = match caller {
        Some(caller) if !caller.is_admin => state.lifecycle.draft_summary(caller.user_id).await?,
        _ => (None, 0),
    };

    Ok(Json(ModelingListResponse {
        modelings,
        draft_request_id,
        draft_items,
    }))
}

/// GET /api/modelings/:id
pub async fn get_modeling(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Modeling>, ApiError> {
    Ok(Json(Modeling::find_live(&state.db, id).await?))
}

/// POST /api/modelings
pub async fn create_modeling(
    State(state): State<Arc<AppState>>,
    AdminCaller(admin): AdminCaller,
    Json(request): Json<CreateModelingRequest>,
) -> Result<(StatusCode, Json<Modeling>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("name", validate_name(&request.name))
        .check(
            "price",
            validate_price(request.price, state.config.catalog.price_ceiling),
        );
    errors.finish()?;

    let modeling = Modeling::create(&state.db, &request).await?;

    info!(modeling_id = modeling.id, admin_id = admin.user_id, "Modeling created");
    Ok((StatusCode::CREATED, Json(modeling)))
}

/// PUT /api/modelings/:id
///
/// Only supplied, non-empty fields change.
pub async fn update_modeling(
    State(state): State<Arc<AppState>>,
    AdminCaller(admin): AdminCaller,
    Path(id): Path<i64>,
    Json(request): Json<UpdateModelingRequest>,
) -> Result<Json<Modeling>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(name) = request.name.as_deref().filter(|n| !n.is_empty()) {
        errors.check("name", validate_name(name));
    }
    if let Some(price) = request.price {
        errors.check(
            "price",
            validate_price(price, state.config.catalog.price_ceiling),
        );
    }
    errors.finish()?;

    let modeling = Modeling::update(&state.db, id, &request).await?;

    info!(modeling_id = id, admin_id = admin.user_id, "Modeling updated");
    Ok(Json(modeling))
}

/// DELETE /api/modelings/:id
///
/// Soft delete; requests that already reference the modeling keep resolving it.
pub async fn delete_modeling(
    State(state): State<Arc<AppState>>,
    AdminCaller(admin): AdminCaller,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    Modeling::soft_delete(&state.db, id).await?;

    info!(modeling_id = id, admin_id = admin.user_id, "Modeling deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/modelings/:id/image
///
/// Stores the uploaded image and deletes the one it replaces.
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    AdminCaller(admin): AdminCaller,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> Result<Json<Modeling>, ApiError> {
    Modeling::find_live(&state.db, id).await?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {}", e)))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let content_type = field
            .content_type()
            .map(str::to_string)
            .or_else(|| {
                file_name
                    .as_deref()
                    .and_then(|name| mime_guess::from_path(name).first())
                    .map(|mime| mime.essence_str().to_string())
            })
            .unwrap_or_default();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {}", e)))?;

        upload = Some((file_name, content_type, data));
        break;
    }

    let (file_name, content_type, data) = upload
        .ok_or_else(|| ApiError::validation_field(IMAGE_FIELD, "An image file is required"))?;
    if !content_type.starts_with("image/") {
        return Err(ApiError::validation_field(
            IMAGE_FIELD,
            "Only image uploads are accepted",
        ));
    }
    if data.is_empty() {
        return Err(ApiError::validation_field(IMAGE_FIELD, "The image is empty"));
    }

    let url = state
        .blobs
        .put(data, file_name.as_deref(), &content_type)
        .await?;

    let previous = match Modeling::set_image(&state.db, id, &url).await {
        Ok(previous) => previous,
        Err(e) => {
            if let Err(cleanup) = state.blobs.delete(&url).await {
                warn!(url = %url, error = %cleanup, "Failed to remove orphaned image");
            }
            return Err(e.into());
        }
    };

    if let Some(previous) = previous.filter(|p| *p != url) {
        if let Err(e) = state.blobs.delete(&previous).await {
            warn!(url = %previous, error = %e, "Failed to delete replaced image");
        }
    }

    info!(modeling_id = id, admin_id = admin.user_id, url = %url, "Modeling image replaced");
    Ok(Json(Modeling::find(&state.db, id).await?))
}

/// POST /api/modelings/:id/draft
///
/// Adds the modeling to the caller's draft, opening one if needed.
pub async fn add_to_draft(
    State(state): State<Arc<AppState>>,
    ClientCaller(caller): ClientCaller,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<RequestView>), ApiError> {
    state
        .lifecycle
        .add_modeling_to_draft(caller.user_id, id)
        .await?;
    let view = state.lifecycle.current_draft_view(caller.user_id).await?;
    Ok((StatusCode::CREATED, Json(view)))
}
