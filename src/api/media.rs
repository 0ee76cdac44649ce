use axum::extract::{Multipart, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ApiError, ApiResult};
use crate::mastodon::MediaAttachment;
use crate::oauth::UserContext;

use super::AppState;

/// An uploaded blob waiting to be attached to a post. Lives in the cache
/// until the client posts a status referencing it; unattached uploads age
/// out after a day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingMedia {
    pub blob: Value,
    pub alt: Option<String>,
}

const PENDING_TTL_SECS: u64 = 86_400;

pub fn media_key(id: &str) -> String {
    format!("media:{id}")
}

/// Best-effort public URL for an uploaded blob, derived from its CID. The
/// CDN serves blobs before they are referenced by a record.
fn blob_url(did: &str, blob: &Value, variant: &str) -> String {
    let cid = blob["ref"]["$link"].as_str().unwrap_or_default();
    format!("https://cdn.bsky.app/img/{variant}/plain/{did}/{cid}@jpeg")
}

/// `POST /api/v1/media` and `POST /api/v2/media`
///
/// Streams the file up to the user's PDS and parks the blob ref in the
/// cache keyed by a fresh snowflake, which becomes the attachment id.
pub async fn upload(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    mut multipart: Multipart,
) -> ApiResult<Json<MediaAttachment>> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut alt: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation("body", e.body_text()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::validation("file", e.body_text()))?;
                file = Some((content_type, bytes.to_vec()));
            }
            Some("description") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::validation("description", e.body_text()))?;
                if !text.is_empty() {
                    alt = Some(text);
                }
            }
            _ => {}
        }
    }

    let (content_type, bytes) =
        file.ok_or_else(|| ApiError::validation("file", "is required"))?;
    if bytes.is_empty() {
        return Err(ApiError::validation("file", "must not be empty"));
    }

    let uploaded = state
        .atp
        .upload_blob(&user.session.access_token, &content_type, bytes)
        .await?;

    let id = state.snowflakes.generate().await.to_string();
    let pending = PendingMedia {
        blob: uploaded.blob,
        alt: alt.clone(),
    };
    state
        .cache
        .set(&media_key(&id), &pending, Some(PENDING_TTL_SECS))
        .await?;

    Ok(Json(MediaAttachment {
        id,
        kind: "image".to_string(),
        url: blob_url(&user.did, &pending.blob, "feed_fullsize"),
        preview_url: blob_url(&user.did, &pending.blob, "feed_thumbnail"),
        remote_url: None,
        description: alt,
        blurhash: None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blob_urls_point_at_the_cdn() {
        let blob = json!({
            "$type": "blob",
            "ref": { "$link": "bafkreihash" },
            "mimeType": "image/jpeg",
            "size": 1234
        });
        assert_eq!(
            blob_url("did:plc:alice", &blob, "feed_fullsize"),
            "https://cdn.bsky.app/img/feed_fullsize/plain/did:plc:alice/bafkreihash@jpeg"
        );
    }

    #[test]
    fn pending_media_round_trips_through_json() {
        let pending = PendingMedia {
            blob: json!({ "ref": { "$link": "bafk" } }),
            alt: Some("a bird".into()),
        };
        let raw = serde_json::to_string(&pending).unwrap();
        let back: PendingMedia = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.alt.as_deref(), Some("a bird"));
        assert_eq!(back.blob["ref"]["$link"], "bafk");
    }
}
