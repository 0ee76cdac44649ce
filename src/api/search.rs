use axum::extract::{Query, State};
use axum::{Extension, Json};
use futures::future::try_join_all;
use serde::Deserialize;

use crate::error::ApiResult;
use crate::mastodon::SearchResults;
use crate::oauth::UserContext;
use crate::translate;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub limit: Option<u32>,
}

/// `GET /api/v2/search`
///
/// Actor search maps to `app.bsky.actor.searchActors`. Status and hashtag
/// search have no upstream surface here and return empty sets.
pub async fn search(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<SearchResults>> {
    let query = params.q.trim();
    if query.is_empty() {
        return Ok(Json(SearchResults {
            accounts: Vec::new(),
            statuses: Vec::new(),
            hashtags: Vec::new(),
        }));
    }

    let actors = state
        .atp
        .search_actors(
            &user.session.access_token,
            query,
            params.limit.unwrap_or(20).min(40),
        )
        .await?;

    let accounts = try_join_all(
        actors
            .iter()
            .map(|actor| translate::account_from_profile(&state.ids, actor)),
    )
    .await?;

    Ok(Json(SearchResults {
        accounts,
        statuses: Vec::new(),
        hashtags: Vec::new(),
    }))
}
