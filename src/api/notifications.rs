use axum::extract::{Path, Query, State};
use axum::{Extension, Json};

use crate::error::{ApiError, ApiResult};
use crate::mastodon::Notification;
use crate::oauth::UserContext;
use crate::translate;

use super::{AppState, PageParams};

/// `GET /api/v1/notifications`
pub async fn index(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<Vec<Notification>>> {
    let token = &user.session.access_token;
    let upstream = state
        .atp
        .list_notifications(token, page.limit(15, 30), None)
        .await?;
    let notifications = translate::notifications_from_upstream(
        &state.ids,
        &state.atp,
        Some(token),
        &upstream.notifications,
    )
    .await?;
    Ok(Json(notifications))
}

/// `POST /api/v1/notifications/clear`
pub async fn clear(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
) -> ApiResult<Json<serde_json::Value>> {
    let seen_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
    state
        .atp
        .update_seen(&user.session.access_token, &seen_at)
        .await?;
    Ok(Json(serde_json::json!({})))
}

/// `GET /api/v1/notifications/{id}`
///
/// The upstream has no by-id lookup, so this scans a recent page for the
/// matching snowflake.
pub async fn show(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Notification>> {
    let id: i64 = id
        .parse()
        .map_err(|_| ApiError::validation("id", "must be a numeric id"))?;
    let uri = state
        .ids
        .aturi_for_snowflake(id)
        .await?
        .ok_or_else(|| ApiError::not_found("notification"))?;

    let token = &user.session.access_token;
    let upstream = state.atp.list_notifications(token, 50, None).await?;
    let found = upstream
        .notifications
        .iter()
        .find(|n| n.uri == uri)
        .ok_or_else(|| ApiError::not_found("notification"))?;

    let notification =
        translate::notification_from_upstream(&state.ids, &state.atp, Some(token), found).await?;
    Ok(Json(notification))
}
