pub mod types;

use serde_json::json;

use crate::error::{ApiError, ApiResult};
use types::*;

const USER_AGENT: &str = concat!("archaeopteryx/", env!("CARGO_PKG_VERSION"));

/// Stateless XRPC client for the AT Protocol. Session custody lives in the
/// OAuth layer; every authenticated call takes the access JWT explicitly.
#[derive(Clone)]
pub struct AtpClient {
    http: reqwest::Client,
    service_url: String,
    pds_url: String,
}

impl AtpClient {
    /// `service_url` serves the `app.bsky.*` read surface; `pds_url` hosts
    /// the account's repo and session endpoints.
    pub fn new(service_url: impl Into<String>, pds_url: impl Into<String>) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ApiError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            service_url: service_url.into().trim_end_matches('/').to_string(),
            pds_url: pds_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn service(&self, method: &str) -> String {
        format!("{}/xrpc/{method}", self.service_url)
    }

    fn pds(&self, method: &str) -> String {
        format!("{}/xrpc/{method}", self.pds_url)
    }

    // ── Sessions ──────────────────────────────────────────────

    pub async fn create_session(&self, identifier: &str, password: &str) -> ApiResult<AtpSession> {
        let session = self
            .http
            .post(self.pds("com.atproto.server.createSession"))
            .json(&json!({ "identifier": identifier, "password": password }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(session)
    }

    /// Rotate the session with its refresh JWT. The refresh token goes in
    /// the Authorization header per the lexicon.
    pub async fn refresh_session(&self, refresh_jwt: &str) -> ApiResult<AtpSession> {
        let session = self
            .http
            .post(self.pds("com.atproto.server.refreshSession"))
            .bearer_auth(refresh_jwt)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(session)
    }

    // ── Identity ──────────────────────────────────────────────

    pub async fn resolve_handle(&self, handle: &str) -> ApiResult<String> {
        let resolved: ResolveHandleResponse = self
            .http
            .get(self.service("com.atproto.identity.resolveHandle"))
            .query(&[("handle", handle)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resolved.did)
    }

    // ── Actors ────────────────────────────────────────────────

    pub async fn get_profile(&self, token: &str, actor: &str) -> ApiResult<ProfileView> {
        let profile = self
            .http
            .get(self.service("app.bsky.actor.getProfile"))
            .bearer_auth(token)
            .query(&[("actor", actor)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(profile)
    }

    pub async fn search_actors(
        &self,
        token: &str,
        query: &str,
        limit: u32,
    ) -> ApiResult<Vec<ProfileView>> {
        let actors: ActorsResponse = self
            .http
            .get(self.service("app.bsky.actor.searchActors"))
            .bearer_auth(token)
            .query(&[("q", query), ("limit", &limit.to_string())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(actors.actors)
    }

    // ── Feeds ─────────────────────────────────────────────────

    pub async fn get_timeline(
        &self,
        token: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> ApiResult<FeedResponse> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }
        let feed = self
            .http
            .get(self.service("app.bsky.feed.getTimeline"))
            .bearer_auth(token)
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(feed)
    }

    pub async fn get_author_feed(
        &self,
        token: &str,
        actor: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> ApiResult<FeedResponse> {
        let mut query = vec![("actor", actor.to_string()), ("limit", limit.to_string())];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }
        let feed = self
            .http
            .get(self.service("app.bsky.feed.getAuthorFeed"))
            .bearer_auth(token)
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(feed)
    }

    pub async fn get_posts(&self, token: &str, uris: &[String]) -> ApiResult<Vec<PostView>> {
        if uris.is_empty() {
            return Ok(Vec::new());
        }
        let query: Vec<(&str, &str)> = uris.iter().map(|uri| ("uris", uri.as_str())).collect();
        let posts: PostsResponse = self
            .http
            .get(self.service("app.bsky.feed.getPosts"))
            .bearer_auth(token)
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(posts.posts)
    }

    pub async fn get_post_thread(
        &self,
        token: &str,
        uri: &str,
        parent_height: u32,
        depth: u32,
    ) -> ApiResult<ThreadResponse> {
        let thread = self
            .http
            .get(self.service("app.bsky.feed.getPostThread"))
            .bearer_auth(token)
            .query(&[
                ("uri", uri),
                ("parentHeight", &parent_height.to_string()),
                ("depth", &depth.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(thread)
    }

    // ── Notifications ─────────────────────────────────────────

    pub async fn list_notifications(
        &self,
        token: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> ApiResult<NotificationsResponse> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }
        let notifications = self
            .http
            .get(self.service("app.bsky.notification.listNotifications"))
            .bearer_auth(token)
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(notifications)
    }

    /// Mark everything up to `seen_at` as read.
    pub async fn update_seen(&self, token: &str, seen_at: &str) -> ApiResult<()> {
        self.http
            .post(self.service("app.bsky.notification.updateSeen"))
            .bearer_auth(token)
            .json(&json!({ "seenAt": seen_at }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    // ── Records ───────────────────────────────────────────────

    async fn create_record(
        &self,
        token: &str,
        did: &str,
        collection: &str,
        record: serde_json::Value,
    ) -> ApiResult<CreateRecordResponse> {
        let created = self
            .http
            .post(self.pds("com.atproto.repo.createRecord"))
            .bearer_auth(token)
            .json(&json!({
                "repo": did,
                "collection": collection,
                "record": record,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(created)
    }

    pub async fn create_post(
        &self,
        token: &str,
        did: &str,
        text: &str,
        reply: Option<&ReplyRef>,
        embed: Option<serde_json::Value>,
    ) -> ApiResult<CreateRecordResponse> {
        let mut record = json!({
            "$type": "app.bsky.feed.post",
            "text": text,
            "createdAt": now_iso(),
        });
        if let Some(reply) = reply {
            record["reply"] = serde_json::to_value(reply)?;
        }
        if let Some(embed) = embed {
            record["embed"] = embed;
        }
        self.create_record(token, did, "app.bsky.feed.post", record)
            .await
    }

    /// Upload raw bytes as a blob on the user's PDS. The returned blob ref
    /// goes verbatim into a record embed.
    pub async fn upload_blob(
        &self,
        token: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> ApiResult<UploadBlobResponse> {
        let uploaded = self
            .http
            .post(self.pds("com.atproto.repo.uploadBlob"))
            .bearer_auth(token)
            .header("Content-Type", content_type)
            .body(bytes)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(uploaded)
    }

    pub async fn like(
        &self,
        token: &str,
        did: &str,
        subject: &StrongRef,
    ) -> ApiResult<CreateRecordResponse> {
        let record = json!({
            "$type": "app.bsky.feed.like",
            "subject": subject,
            "createdAt": now_iso(),
        });
        self.create_record(token, did, "app.bsky.feed.like", record)
            .await
    }

    pub async fn repost(
        &self,
        token: &str,
        did: &str,
        subject: &StrongRef,
    ) -> ApiResult<CreateRecordResponse> {
        let record = json!({
            "$type": "app.bsky.feed.repost",
            "subject": subject,
            "createdAt": now_iso(),
        });
        self.create_record(token, did, "app.bsky.feed.repost", record)
            .await
    }

    pub async fn follow(
        &self,
        token: &str,
        did: &str,
        subject_did: &str,
    ) -> ApiResult<CreateRecordResponse> {
        let record = json!({
            "$type": "app.bsky.graph.follow",
            "subject": subject_did,
            "createdAt": now_iso(),
        });
        self.create_record(token, did, "app.bsky.graph.follow", record)
            .await
    }

    pub async fn delete_record(
        &self,
        token: &str,
        did: &str,
        collection: &str,
        rkey: &str,
    ) -> ApiResult<()> {
        self.http
            .post(self.pds("com.atproto.repo.deleteRecord"))
            .bearer_auth(token)
            .json(&json!({
                "repo": did,
                "collection": collection,
                "rkey": rkey,
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn delete_post(&self, token: &str, did: &str, rkey: &str) -> ApiResult<()> {
        self.delete_record(token, did, "app.bsky.feed.post", rkey)
            .await
    }
}

fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
