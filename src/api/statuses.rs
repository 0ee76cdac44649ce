use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;

use crate::atproto::types::{PostView, ReplyRef, StrongRef};
use crate::error::{ApiError, ApiResult};
use crate::mastodon::{Context, Status};
use crate::oauth::UserContext;
use crate::translate;

use super::media::{media_key, PendingMedia};
use super::{AppState, FormOrJson};

const MAX_CHARACTERS: usize = 300;

#[derive(Debug, Deserialize)]
pub struct CreateStatusRequest {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub in_reply_to_id: Option<String>,
    /// Accepted for Mastodon compatibility; Bluesky posts are public.
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub spoiler_text: Option<String>,
    #[serde(default)]
    pub media_ids: Option<Vec<String>>,
    #[serde(default)]
    pub poll: Option<serde_json::Value>,
}

async fn aturi_for_path(state: &AppState, id: &str) -> ApiResult<String> {
    let id: i64 = id
        .parse()
        .map_err(|_| ApiError::validation("id", "must be a numeric id"))?;
    state
        .ids
        .aturi_for_snowflake(id)
        .await?
        .ok_or_else(|| ApiError::not_found("status"))
}

async fn fetch_post(state: &AppState, token: &str, uri: &str) -> ApiResult<PostView> {
    let posts = state.atp.get_posts(token, &[uri.to_string()]).await?;
    posts
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::not_found("status"))
}

/// `POST /api/v1/statuses`
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    FormOrJson(req): FormOrJson<CreateStatusRequest>,
) -> ApiResult<Json<Status>> {
    if req.poll.is_some() {
        return Err(ApiError::Unprocessable("polls are not supported".into()));
    }

    let text = req.status.unwrap_or_default();
    if text.trim().is_empty() {
        return Err(ApiError::validation("status", "must not be empty"));
    }
    if text.chars().count() > MAX_CHARACTERS {
        return Err(ApiError::Unprocessable(format!(
            "status exceeds the {MAX_CHARACTERS} character limit"
        )));
    }

    let token = &user.session.access_token;

    let reply = match &req.in_reply_to_id {
        Some(parent_id) => {
            let parent_uri = aturi_for_path(&state, parent_id).await?;
            let parent = fetch_post(&state, token, &parent_uri).await?;
            let parent_ref = StrongRef {
                uri: parent.uri.clone(),
                cid: parent.cid.clone(),
            };
            let root = parent
                .record
                .reply
                .as_ref()
                .map(|r| r.root.clone())
                .unwrap_or_else(|| parent_ref.clone());
            Some(ReplyRef {
                root,
                parent: parent_ref,
            })
        }
        None => None,
    };

    let embed = match &req.media_ids {
        Some(media_ids) if !media_ids.is_empty() => {
            let mut images = Vec::new();
            for media_id in media_ids.iter().take(4) {
                let pending: PendingMedia = state
                    .cache
                    .get(&media_key(media_id))
                    .await?
                    .ok_or_else(|| ApiError::not_found("media attachment"))?;
                images.push(json!({
                    "image": pending.blob,
                    "alt": pending.alt.unwrap_or_default(),
                }));
            }
            Some(json!({ "$type": "app.bsky.embed.images", "images": images }))
        }
        _ => None,
    };

    let created = state
        .atp
        .create_post(token, &user.did, &text, reply.as_ref(), embed)
        .await?;

    let post = fetch_post(&state, token, &created.uri).await?;
    let status = translate::status_from_post(&state.ids, &post).await?;
    Ok(Json(status))
}

/// `GET /api/v1/statuses/{id}`
pub async fn show(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Status>> {
    let uri = aturi_for_path(&state, &id).await?;
    let post = fetch_post(&state, &user.session.access_token, &uri).await?;
    let status = translate::status_from_post(&state.ids, &post).await?;
    Ok(Json(status))
}

/// `GET /api/v1/statuses/{id}/context`
pub async fn context(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Context>> {
    let uri = aturi_for_path(&state, &id).await?;
    let thread = state
        .atp
        .get_post_thread(&user.session.access_token, &uri, 40, 10)
        .await?;
    let context = translate::context_from_thread(&state.ids, &thread.thread).await?;
    Ok(Json(context))
}

/// `DELETE /api/v1/statuses/{id}`
pub async fn destroy(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Status>> {
    let uri = aturi_for_path(&state, &id).await?;
    let token = &user.session.access_token;

    let post = fetch_post(&state, token, &uri).await?;
    let status = translate::status_from_post(&state.ids, &post).await?;

    let rkey = uri
        .rsplit('/')
        .next()
        .ok_or_else(|| ApiError::not_found("status"))?;
    state.atp.delete_post(token, &user.did, rkey).await?;
    Ok(Json(status))
}

/// `POST /api/v1/statuses/{id}/favourite`
pub async fn favourite(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Status>> {
    let uri = aturi_for_path(&state, &id).await?;
    let token = &user.session.access_token;

    let post = fetch_post(&state, token, &uri).await?;
    state
        .atp
        .like(
            token,
            &user.did,
            &StrongRef {
                uri: post.uri.clone(),
                cid: post.cid.clone(),
            },
        )
        .await?;

    let mut status = translate::status_from_post(&state.ids, &post).await?;
    status.favourited = true;
    status.favourites_count += 1;
    Ok(Json(status))
}

/// `POST /api/v1/statuses/{id}/reblog`
pub async fn reblog(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Status>> {
    let uri = aturi_for_path(&state, &id).await?;
    let token = &user.session.access_token;

    let post = fetch_post(&state, token, &uri).await?;
    state
        .atp
        .repost(
            token,
            &user.did,
            &StrongRef {
                uri: post.uri.clone(),
                cid: post.cid.clone(),
            },
        )
        .await?;

    let mut status = translate::status_from_post(&state.ids, &post).await?;
    status.reblogged = true;
    status.reblogs_count += 1;
    Ok(Json(status))
}
