use axum::{
    Router,
    routing::{delete, get, post, put},
};

use crate::{AppState, middleware::auth_middleware, routes};

fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/users/register", post(routes::user::register))
        .route("/users/login", post(routes::user::login))
        .route("/groups", get(routes::group::list_groups))
        .route("/groups/{group_id}", get(routes::group::get_group))
        .route("/events", get(routes::event::list_events))
        .route("/events/{event_id}", get(routes::event::get_event))
}

fn protected_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/users/current", get(routes::user::current_user))
        // 群组
        .route("/groups", post(routes::group::create_group))
        .route("/groups/current", get(routes::group::list_current_user_groups))
        .route("/groups/{group_id}", put(routes::group::update_group))
        .route("/groups/{group_id}", delete(routes::group::delete_group))
        .route("/groups/{group_id}/images", post(routes::group::add_group_image))
        // 成员
        .route("/groups/{group_id}/members", get(routes::group::list_members))
        .route("/groups/{group_id}/membership", post(routes::group::request_membership))
        .route("/groups/{group_id}/membership", put(routes::group::update_membership))
        .route(
            "/groups/{group_id}/membership/{member_id}",
            delete(routes::group::delete_membership),
        )
        // 场地
        .route("/groups/{group_id}/venues", get(routes::venue::list_group_venues))
        .route("/groups/{group_id}/venues", post(routes::venue::create_venue))
        .route("/venues/{venue_id}", put(routes::venue::update_venue))
        // 事件
        .route("/groups/{group_id}/events", get(routes::event::list_group_events))
        .route("/groups/{group_id}/events", post(routes::event::create_event))
        .route("/events/{event_id}", put(routes::event::update_event))
        .route("/events/{event_id}", delete(routes::event::delete_event))
        .route("/events/{event_id}/images", post(routes::event::add_event_image))
        // 出席
        .route("/events/{event_id}/attendees", get(routes::event::list_attendees))
        .route("/events/{event_id}/attendance", post(routes::event::request_attendance))
        .route("/events/{event_id}/attendance", put(routes::event::update_attendance))
        .route(
            "/events/{event_id}/attendance/{user_id}",
            delete(routes::event::delete_attendance),
        )
        .layer(axum::middleware::from_fn_with_state(state, auth_middleware))
}

/// 公开路由和受保护路由合并后挂在 API 前缀下
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .merge(public_routes())
        .merge(protected_routes(state.clone()));

    Router::new()
        .nest(&state.config.api_base_uri.clone(), api)
        .with_state(state)
}
