use axum::{
    Extension,
    extract::{Json, Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;
use crate::routes::MessageResponse;
use crate::utils::Claims;

use super::model::{
    Group, GroupDetail, GroupImage, GroupImageInput, GroupInput, GroupRole, GroupSummary,
    MemberInfo, Membership, MembershipStatus, role_satisfied,
};
use crate::routes::user::model::User;

#[derive(Debug, Serialize)]
pub struct GroupsResponse {
    pub groups: Vec<GroupSummary>,
}

#[derive(Debug, Serialize)]
pub struct MembersResponse {
    pub members: Vec<MemberInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipUpdateRequest {
    pub member_id: Option<i64>,
    pub status: Option<String>,
}

#[axum::debug_handler]
pub async fn list_groups(State(state): State<AppState>) -> Result<Json<GroupsResponse>, ApiError> {
    let groups = Group::list(&state.pool).await?;
    Ok(Json(GroupsResponse { groups }))
}

#[axum::debug_handler]
pub async fn list_current_user_groups(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
) -> Result<Json<GroupsResponse>, ApiError> {
    let groups = Group::list_for_user(&state.pool, claims.sub).await?;
    Ok(Json(GroupsResponse { groups }))
}

#[axum::debug_handler]
pub async fn get_group(
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
) -> Result<Json<GroupDetail>, ApiError> {
    let detail = Group::detail(&state.pool, group_id).await?;
    Ok(Json(detail))
}

#[axum::debug_handler]
pub async fn create_group(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(req): Json<GroupInput>,
) -> Result<(StatusCode, Json<Group>), ApiError> {
    let input = req.validate()?;
    let group = Group::create(&state.pool, input, claims.sub).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

#[axum::debug_handler]
pub async fn update_group(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
    Json(req): Json<GroupInput>,
) -> Result<Json<Group>, ApiError> {
    let input = req.validate()?;

    let group = Group::find_or_404(&state.pool, group_id).await?;
    group
        .require_role(&state.pool, claims.sub, GroupRole::Organizer)
        .await?;

    let updated = Group::update(&state.pool, group_id, input).await?;
    Ok(Json(updated))
}

#[axum::debug_handler]
pub async fn delete_group(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    let group = Group::find_or_404(&state.pool, group_id).await?;
    group
        .require_role(&state.pool, claims.sub, GroupRole::Organizer)
        .await?;

    Group::delete(&state.pool, group_id).await?;
    Ok(Json(MessageResponse {
        message: "Successfully deleted",
    }))
}

#[axum::debug_handler]
pub async fn add_group_image(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
    Json(req): Json<GroupImageInput>,
) -> Result<(StatusCode, Json<GroupImage>), ApiError> {
    let input = req.validate()?;

    let group = Group::find_or_404(&state.pool, group_id).await?;
    group
        .require_role(&state.pool, claims.sub, GroupRole::Organizer)
        .await?;

    let image = Group::add_image(&state.pool, group_id, input).await?;
    Ok((StatusCode::CREATED, Json(image)))
}

#[axum::debug_handler]
pub async fn list_members(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
) -> Result<Json<MembersResponse>, ApiError> {
    let group = Group::find_or_404(&state.pool, group_id).await?;

    // 副主持以上可见待审核成员
    let status = Membership::status_for(&state.pool, group_id, claims.sub).await?;
    let include_pending = role_satisfied(group.organizer_id == claims.sub, status, GroupRole::CoHost);

    let members = Membership::list_for_group(&state.pool, group_id, include_pending).await?;
    Ok(Json(MembersResponse { members }))
}

#[axum::debug_handler]
pub async fn request_membership(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
) -> Result<Json<Membership>, ApiError> {
    Group::find_or_404(&state.pool, group_id).await?;
    let membership = Membership::request(&state.pool, group_id, claims.sub).await?;
    Ok(Json(membership))
}

#[axum::debug_handler]
pub async fn update_membership(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
    Json(req): Json<MembershipUpdateRequest>,
) -> Result<Json<Membership>, ApiError> {
    let member_id = req
        .member_id
        .ok_or_else(|| ApiError::field("memberId", "Member id is required"))?;
    let status = req
        .status
        .as_deref()
        .and_then(MembershipStatus::parse)
        .ok_or_else(|| ApiError::field("status", "Status must be 'member' or 'co-host'"))?;
    if status == MembershipStatus::Pending {
        return Err(ApiError::field(
            "status",
            "Cannot change a membership status to pending",
        ));
    }

    let group = Group::find_or_404(&state.pool, group_id).await?;
    User::find_by_id(&state.pool, member_id)
        .await?
        .ok_or(ApiError::NotFound("User couldn't be found"))?;

    // 提升为 co-host 仅限组织者，转正成员副主持即可
    let required = match status {
        MembershipStatus::CoHost => GroupRole::Organizer,
        _ => GroupRole::CoHost,
    };
    group.require_role(&state.pool, claims.sub, required).await?;

    let membership = Membership::set_status(&state.pool, group_id, member_id, status).await?;
    Ok(Json(membership))
}

#[axum::debug_handler]
pub async fn delete_membership(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path((group_id, member_id)): Path<(i64, i64)>,
) -> Result<Json<MessageResponse>, ApiError> {
    let group = Group::find_or_404(&state.pool, group_id).await?;

    if claims.sub != member_id && group.organizer_id != claims.sub {
        return Err(ApiError::Forbidden(
            "Only the user or organizer may delete a membership",
        ));
    }

    Membership::remove(&state.pool, group_id, member_id).await?;
    Ok(Json(MessageResponse {
        message: "Membership successfully deleted",
    }))
}
