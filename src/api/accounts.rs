use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use axum_extra::extract::Query as MultiQuery;
use serde::Deserialize;

use crate::atproto::types::ProfileView;
use crate::error::{ApiError, ApiResult};
use crate::ids;
use crate::mastodon::{Account, Relationship, Status};
use crate::oauth::UserContext;
use crate::translate;

use super::{AppState, PageParams};

/// Resolve a path `{id}` to the DID it maps to.
async fn did_for_path(state: &AppState, id: &str) -> ApiResult<(i64, String)> {
    let id: i64 = id
        .parse()
        .map_err(|_| ApiError::validation("id", "must be a numeric id"))?;
    let did = state
        .ids
        .did_for_snowflake(id)
        .await?
        .ok_or_else(|| ApiError::not_found("account"))?;
    Ok((id, did))
}

/// `GET /api/v1/accounts/verify_credentials`
pub async fn verify_credentials(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
) -> ApiResult<Json<Account>> {
    let profile = state
        .atp
        .get_profile(&user.session.access_token, &user.did)
        .await?;
    let account = translate::account_from_profile(&state.ids, &profile).await?;
    Ok(Json(account))
}

#[derive(Debug, Deserialize)]
pub struct LookupParams {
    pub acct: String,
}

/// `GET /api/v1/accounts/lookup?acct=…`
///
/// Accepts a handle or a DID. Handles resolve through the cached handle
/// index first and fall back to an upstream resolution, which then feeds
/// the index.
pub async fn lookup(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Query(params): Query<LookupParams>,
) -> ApiResult<Json<Account>> {
    let acct = params.acct.trim().trim_start_matches('@');
    if acct.is_empty() {
        return Err(ApiError::validation("acct", "must not be empty"));
    }

    let did = if acct.starts_with("did:") {
        acct.to_string()
    } else {
        let cached = state.ids.snowflake_for_handle(acct).await?;
        let known = if cached != ids::UNRESOLVED {
            state.ids.did_for_snowflake(cached).await?
        } else {
            None
        };
        match known {
            Some(did) => did,
            None => {
                let did = state.atp.resolve_handle(acct).await?;
                state.ids.record_handle(acct, &did).await;
                did
            }
        }
    };

    let profile = state
        .atp
        .get_profile(&user.session.access_token, &did)
        .await?;
    let account = translate::account_from_profile(&state.ids, &profile).await?;
    Ok(Json(account))
}

/// `GET /api/v1/accounts/{id}`
pub async fn show(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Account>> {
    let (_, did) = did_for_path(&state, &id).await?;
    let profile = state
        .atp
        .get_profile(&user.session.access_token, &did)
        .await?;
    let account = translate::account_from_profile(&state.ids, &profile).await?;
    Ok(Json(account))
}

/// `GET /api/v1/accounts/{id}/statuses`
pub async fn statuses(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<Vec<Status>>> {
    let (_, did) = did_for_path(&state, &id).await?;
    let feed = state
        .atp
        .get_author_feed(
            &user.session.access_token,
            &did,
            page.limit(20, 40),
            None,
        )
        .await?;
    let statuses = translate::statuses_from_feed(&state.ids, &feed.feed).await?;
    Ok(Json(statuses))
}

/// `POST /api/v1/accounts/{id}/follow`
pub async fn follow(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Relationship>> {
    let (snowflake, did) = did_for_path(&state, &id).await?;
    state
        .atp
        .follow(&user.session.access_token, &user.did, &did)
        .await?;

    let mut relationship = Relationship::unknown(snowflake.to_string());
    relationship.following = true;
    Ok(Json(relationship))
}

/// `POST /api/v1/accounts/{id}/unfollow`
///
/// The viewer state carries the AT URI of our follow record; deleting that
/// record is the unfollow.
pub async fn unfollow(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Relationship>> {
    let (snowflake, did) = did_for_path(&state, &id).await?;
    let token = &user.session.access_token;

    let profile = state.atp.get_profile(token, &did).await?;
    if let Some(follow_uri) = profile.viewer.as_ref().and_then(|v| v.following.as_deref()) {
        if let Some(rkey) = follow_uri.rsplit('/').next() {
            state
                .atp
                .delete_record(token, &user.did, "app.bsky.graph.follow", rkey)
                .await?;
        }
    }

    let mut relationship = relationship_from_profile(snowflake, &profile);
    relationship.following = false;
    Ok(Json(relationship))
}

#[derive(Debug, Deserialize)]
pub struct RelationshipsParams {
    #[serde(default, alias = "id[]")]
    pub id: Vec<String>,
}

/// `GET /api/v1/accounts/relationships?id[]=…`
pub async fn relationships(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    MultiQuery(params): MultiQuery<RelationshipsParams>,
) -> ApiResult<Json<Vec<Relationship>>> {
    let mut out = Vec::with_capacity(params.id.len());
    for id in &params.id {
        let (snowflake, did) = match did_for_path(&state, id).await {
            Ok(found) => found,
            // Unknown ids degrade to a default relationship instead of
            // failing the whole batch.
            Err(_) => {
                out.push(Relationship::unknown(id.clone()));
                continue;
            }
        };
        let profile = state
            .atp
            .get_profile(&user.session.access_token, &did)
            .await?;
        out.push(relationship_from_profile(snowflake, &profile));
    }
    Ok(Json(out))
}

fn relationship_from_profile(snowflake: i64, profile: &ProfileView) -> Relationship {
    let mut relationship = Relationship::unknown(snowflake.to_string());
    if let Some(viewer) = &profile.viewer {
        relationship.following = viewer.following.is_some();
        relationship.followed_by = viewer.followed_by.is_some();
        relationship.muting = viewer.muted;
        relationship.blocked_by = viewer.blocked_by;
    }
    relationship
}
