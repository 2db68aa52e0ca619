use axum::{
    Extension,
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;
use crate::routes::MessageResponse;
use crate::routes::group::model::{Group, GroupRole, Membership, role_satisfied};
use crate::routes::user::model::User;
use crate::utils::Claims;

use super::model::{
    Attendance, AttendanceStatus, AttendeeInfo, Event, EventDetail, EventImage, EventInput,
    EventScope, EventSummary, partition_by_start,
};

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub events: Vec<EventSummary>,
}

#[derive(Debug, Serialize)]
pub struct AttendeesResponse {
    pub attendees: Vec<AttendeeInfo>,
}

#[derive(Debug, Deserialize)]
pub struct EventListQuery {
    pub scope: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventImageRequest {
    pub url: Option<String>,
    pub preview: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceUpdateRequest {
    pub user_id: Option<i64>,
    pub status: Option<String>,
}

#[axum::debug_handler]
pub async fn list_events(State(state): State<AppState>) -> Result<Json<EventsResponse>, ApiError> {
    let events = Event::list(&state.pool).await?;
    Ok(Json(EventsResponse { events }))
}

#[axum::debug_handler]
pub async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> Result<Json<EventDetail>, ApiError> {
    let detail = Event::detail(&state.pool, event_id).await?;
    Ok(Json(detail))
}

#[axum::debug_handler]
pub async fn list_group_events(
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
    Query(query): Query<EventListQuery>,
) -> Result<Json<EventsResponse>, ApiError> {
    let scope = match query.scope.as_deref() {
        None => None,
        Some(raw) => Some(
            EventScope::parse(raw)
                .ok_or_else(|| ApiError::field("scope", "Scope must be 'past' or 'upcoming'"))?,
        ),
    };

    Group::find_or_404(&state.pool, group_id).await?;
    let events = Event::list_for_group(&state.pool, group_id).await?;

    // 分桶只在取数时算一次
    let events = match scope {
        None => events,
        Some(EventScope::Past) => partition_by_start(events, Utc::now()).0,
        Some(EventScope::Upcoming) => partition_by_start(events, Utc::now()).1,
    };

    Ok(Json(EventsResponse { events }))
}

#[axum::debug_handler]
pub async fn create_event(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
    Json(req): Json<EventInput>,
) -> Result<(StatusCode, Json<Event>), ApiError> {
    let input = req.validate(Utc::now())?;

    let group = Group::find_or_404(&state.pool, group_id).await?;
    group
        .require_role(&state.pool, claims.sub, GroupRole::CoHost)
        .await?;

    let event = Event::create(&state.pool, group_id, input, claims.sub).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

#[axum::debug_handler]
pub async fn update_event(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
    Json(req): Json<EventInput>,
) -> Result<Json<Event>, ApiError> {
    let input = req.validate(Utc::now())?;

    let event = Event::find_or_404(&state.pool, event_id).await?;
    let group = Group::find_or_404(&state.pool, event.group_id).await?;
    group
        .require_role(&state.pool, claims.sub, GroupRole::CoHost)
        .await?;

    let updated = Event::update(&state.pool, event_id, event.group_id, input).await?;
    Ok(Json(updated))
}

#[axum::debug_handler]
pub async fn delete_event(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    let event = Event::find_or_404(&state.pool, event_id).await?;
    let group = Group::find_or_404(&state.pool, event.group_id).await?;
    group
        .require_role(&state.pool, claims.sub, GroupRole::CoHost)
        .await?;

    Event::delete(&state.pool, event_id).await?;
    Ok(Json(MessageResponse {
        message: "Successfully deleted",
    }))
}

#[axum::debug_handler]
pub async fn add_event_image(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
    Json(req): Json<EventImageRequest>,
) -> Result<(StatusCode, Json<EventImage>), ApiError> {
    let url = req.url.unwrap_or_default();
    if url.trim().is_empty() {
        return Err(ApiError::field("url", "Image url is required"));
    }

    let event = Event::find_or_404(&state.pool, event_id).await?;
    let group = Group::find_or_404(&state.pool, event.group_id).await?;

    // 出席者或副主持以上可以传图
    let membership = Membership::status_for(&state.pool, group.id, claims.sub).await?;
    let attending = matches!(
        Attendance::status_for(&state.pool, event_id, claims.sub).await?,
        Some(AttendanceStatus::Attending)
    );
    if !attending
        && !role_satisfied(group.organizer_id == claims.sub, membership, GroupRole::CoHost)
    {
        return Err(ApiError::Forbidden(
            "Requires attendance or co-host standing",
        ));
    }

    let image =
        Event::add_image(&state.pool, event_id, &url, req.preview.unwrap_or_default()).await?;
    Ok((StatusCode::CREATED, Json(image)))
}

#[axum::debug_handler]
pub async fn list_attendees(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> Result<Json<AttendeesResponse>, ApiError> {
    let event = Event::find_or_404(&state.pool, event_id).await?;
    let group = Group::find_or_404(&state.pool, event.group_id).await?;

    let membership = Membership::status_for(&state.pool, group.id, claims.sub).await?;
    let include_pending =
        role_satisfied(group.organizer_id == claims.sub, membership, GroupRole::CoHost);

    let attendees = Attendance::list_for_event(&state.pool, event_id, include_pending).await?;
    Ok(Json(AttendeesResponse { attendees }))
}

#[axum::debug_handler]
pub async fn request_attendance(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> Result<Json<Attendance>, ApiError> {
    let event = Event::find_or_404(&state.pool, event_id).await?;
    let group = Group::find_or_404(&state.pool, event.group_id).await?;
    group
        .require_role(&state.pool, claims.sub, GroupRole::Member)
        .await?;

    let attendance = Attendance::request(&state.pool, event_id, claims.sub).await?;
    Ok(Json(attendance))
}

#[axum::debug_handler]
pub async fn update_attendance(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
    Json(req): Json<AttendanceUpdateRequest>,
) -> Result<Json<Attendance>, ApiError> {
    let user_id = req
        .user_id
        .ok_or_else(|| ApiError::field("userId", "User id is required"))?;
    let status = req
        .status
        .as_deref()
        .and_then(AttendanceStatus::parse)
        .ok_or_else(|| ApiError::field("status", "Status must be 'attending' or 'waitlist'"))?;
    if status == AttendanceStatus::Pending {
        return Err(ApiError::field(
            "status",
            "Cannot change an attendance status to pending",
        ));
    }

    let event = Event::find_or_404(&state.pool, event_id).await?;
    let group = Group::find_or_404(&state.pool, event.group_id).await?;
    User::find_by_id(&state.pool, user_id)
        .await?
        .ok_or(ApiError::NotFound("User couldn't be found"))?;

    group
        .require_role(&state.pool, claims.sub, GroupRole::CoHost)
        .await?;

    let attendance = Attendance::set_status(&state.pool, event_id, user_id, status).await?;
    Ok(Json(attendance))
}

#[axum::debug_handler]
pub async fn delete_attendance(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path((event_id, user_id)): Path<(i64, i64)>,
) -> Result<Json<MessageResponse>, ApiError> {
    let event = Event::find_or_404(&state.pool, event_id).await?;
    let group = Group::find_or_404(&state.pool, event.group_id).await?;

    if claims.sub != user_id && group.organizer_id != claims.sub {
        return Err(ApiError::Forbidden(
            "Only the user or organizer may delete an attendance",
        ));
    }

    Attendance::remove(&state.pool, event_id, user_id).await?;
    Ok(Json(MessageResponse {
        message: "Successfully deleted attendance from event",
    }))
}
