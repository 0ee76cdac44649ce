use axum::extract::{Query, State};
use axum::{Extension, Json};

use crate::error::ApiResult;
use crate::mastodon::Status;
use crate::oauth::UserContext;
use crate::translate;

use super::{AppState, PageParams};

/// `GET /api/v1/timelines/home`
pub async fn home(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<Vec<Status>>> {
    let feed = state
        .atp
        .get_timeline(&user.session.access_token, page.limit(20, 40), None)
        .await?;
    let statuses = translate::statuses_from_feed(&state.ids, &feed.feed).await?;
    Ok(Json(statuses))
}
