use axum::{
    Extension,
    extract::{Json, Path, State},
    http::StatusCode,
};
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;
use crate::routes::group::model::{Group, GroupRole};
use crate::utils::Claims;

use super::model::{Venue, VenueInput};

#[derive(Debug, Serialize)]
pub struct VenuesResponse {
    pub venues: Vec<Venue>,
}

#[axum::debug_handler]
pub async fn list_group_venues(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
) -> Result<Json<VenuesResponse>, ApiError> {
    let group = Group::find_or_404(&state.pool, group_id).await?;
    group
        .require_role(&state.pool, claims.sub, GroupRole::CoHost)
        .await?;

    let venues = Venue::list_for_group(&state.pool, group_id).await?;
    Ok(Json(VenuesResponse { venues }))
}

#[axum::debug_handler]
pub async fn create_venue(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
    Json(req): Json<VenueInput>,
) -> Result<(StatusCode, Json<Venue>), ApiError> {
    let input = req.validate()?;

    let group = Group::find_or_404(&state.pool, group_id).await?;
    group
        .require_role(&state.pool, claims.sub, GroupRole::CoHost)
        .await?;

    let venue = Venue::create(&state.pool, group_id, input).await?;
    Ok((StatusCode::CREATED, Json(venue)))
}

#[axum::debug_handler]
pub async fn update_venue(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(venue_id): Path<i64>,
    Json(req): Json<VenueInput>,
) -> Result<Json<Venue>, ApiError> {
    let input = req.validate()?;

    let venue = Venue::find_or_404(&state.pool, venue_id).await?;
    let group = Group::find_or_404(&state.pool, venue.group_id).await?;
    group
        .require_role(&state.pool, claims.sub, GroupRole::CoHost)
        .await?;

    let updated = Venue::update(&state.pool, venue_id, input).await?;
    Ok(Json(updated))
}
