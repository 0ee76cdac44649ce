use futures::future::try_join_all;

use crate::atproto::types::AtpNotification;
use crate::atproto::AtpClient;
use crate::error::ApiResult;
use crate::ids::IdMapper;
use crate::mastodon::Notification;

use super::{status_from_post, timestamp_or_epoch};

/// Upstream notification reason → Mastodon notification type.
pub fn mastodon_type_for(reason: &str) -> &'static str {
    match reason {
        "like" => "favourite",
        "repost" => "reblog",
        "follow" => "follow",
        "mention" => "mention",
        "reply" => "mention",
        "quote" => "reblog",
        _ => "mention",
    }
}

/// The post a notification is about, when it names one. For mentions,
/// replies, and quotes the notification record itself is the post.
fn subject_uri(notification: &AtpNotification) -> Option<String> {
    match notification.reason.as_str() {
        "mention" | "reply" | "quote" => Some(notification.uri.clone()),
        _ => notification.reason_subject.clone(),
    }
}

/// Translate one upstream notification. When a subject post exists and a
/// session token is available it is fetched and translated; any failure
/// there degrades to `status: None` instead of failing the notification.
pub async fn notification_from_upstream(
    ids: &IdMapper,
    atp: &AtpClient,
    token: Option<&str>,
    notification: &AtpNotification,
) -> ApiResult<Notification> {
    let id = ids.snowflake_for_aturi(&notification.uri).await?;
    let account = super::account_from_profile(ids, &notification.author).await?;

    let status = match (subject_uri(notification), token) {
        (Some(uri), Some(token)) => fetch_subject(ids, atp, token, &uri).await,
        _ => None,
    };

    Ok(Notification {
        id: id.to_string(),
        kind: mastodon_type_for(&notification.reason).to_string(),
        created_at: timestamp_or_epoch(Some(notification.indexed_at.as_str())),
        account,
        status,
    })
}

async fn fetch_subject(
    ids: &IdMapper,
    atp: &AtpClient,
    token: &str,
    uri: &str,
) -> Option<crate::mastodon::Status> {
    let posts = match atp.get_posts(token, &[uri.to_string()]).await {
        Ok(posts) => posts,
        Err(e) => {
            tracing::warn!(uri, error = %e, "failed to fetch notification subject");
            return None;
        }
    };
    let post = posts.first()?;
    match status_from_post(ids, post).await {
        Ok(status) => Some(status),
        Err(e) => {
            tracing::warn!(uri, error = %e, "failed to translate notification subject");
            None
        }
    }
}

/// Translate a notification page, preserving upstream order.
pub async fn notifications_from_upstream(
    ids: &IdMapper,
    atp: &AtpClient,
    token: Option<&str>,
    notifications: &[AtpNotification],
) -> ApiResult<Vec<Notification>> {
    try_join_all(
        notifications
            .iter()
            .map(|n| notification_from_upstream(ids, atp, token, n)),
    )
    .await
}
