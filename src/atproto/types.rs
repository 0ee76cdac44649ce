//! AT Protocol wire records. Field names follow the lexicon's camelCase on
//! the wire and snake_case in Rust.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtpSession {
    pub did: String,
    pub handle: String,
    #[serde(default)]
    pub email: Option<String>,
    pub access_jwt: String,
    pub refresh_jwt: String,
}

/// The requesting account's relationship to a profile. `following` and
/// `followed_by` carry the AT URIs of the graph records, which is also how
/// an unfollow finds the record to delete.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerState {
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub blocked_by: bool,
    #[serde(default)]
    pub following: Option<String>,
    #[serde(default)]
    pub followed_by: Option<String>,
}

/// Actor profile. `app.bsky.actor.getProfile` returns the detailed form
/// with counts; post authors and notification authors carry a subset, which
/// deserializes into the same shape with the counts absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub did: String,
    pub handle: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub banner: Option<String>,
    #[serde(default)]
    pub followers_count: Option<i64>,
    #[serde(default)]
    pub follows_count: Option<i64>,
    #[serde(default)]
    pub posts_count: Option<i64>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub viewer: Option<ViewerState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrongRef {
    pub uri: String,
    pub cid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetIndex {
    pub byte_start: usize,
    pub byte_end: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum FacetFeature {
    #[serde(rename = "app.bsky.richtext.facet#link")]
    Link { uri: String },
    #[serde(rename = "app.bsky.richtext.facet#mention")]
    Mention { did: String },
    #[serde(rename = "app.bsky.richtext.facet#tag")]
    Tag { tag: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacetRecord {
    pub index: FacetIndex,
    pub features: Vec<FacetFeature>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRef {
    pub root: StrongRef,
    pub parent: StrongRef,
}

/// An `app.bsky.feed.post` record as stored in the repo.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub facets: Vec<FacetRecord>,
    #[serde(default)]
    pub reply: Option<ReplyRef>,
    #[serde(default)]
    pub langs: Vec<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageView {
    pub thumb: String,
    pub fullsize: String,
    #[serde(default)]
    pub alt: String,
    #[serde(default)]
    pub aspect_ratio: Option<AspectRatio>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalViewInner {
    pub uri: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub thumb: Option<String>,
}

/// Hydrated embed on a post view. Shapes the translators don't render
/// (records, record-with-media) fall through to `Other`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbedView {
    Images { images: Vec<ImageView> },
    External { external: ExternalViewInner },
    Other(Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub uri: String,
    pub cid: String,
    pub author: ProfileView,
    pub record: PostRecord,
    #[serde(default)]
    pub embed: Option<EmbedView>,
    #[serde(default)]
    pub reply_count: Option<i64>,
    #[serde(default)]
    pub repost_count: Option<i64>,
    #[serde(default)]
    pub like_count: Option<i64>,
    pub indexed_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasonRepost {
    pub by: ProfileView,
    pub indexed_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeedReason {
    Repost(ReasonRepost),
    Other(Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedViewPost {
    pub post: PostView,
    #[serde(default)]
    pub reply: Option<Value>,
    #[serde(default)]
    pub reason: Option<FeedReason>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedResponse {
    pub feed: Vec<FeedViewPost>,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostsResponse {
    pub posts: Vec<PostView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtpNotification {
    pub uri: String,
    pub cid: String,
    pub author: ProfileView,
    pub reason: String,
    #[serde(default)]
    pub reason_subject: Option<String>,
    #[serde(default)]
    pub record: Value,
    #[serde(default)]
    pub is_read: bool,
    pub indexed_at: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationsResponse {
    pub notifications: Vec<AtpNotification>,
    #[serde(default)]
    pub cursor: Option<String>,
}

/// One node of `app.bsky.feed.getPostThread`. Blocked or not-found nodes
/// fall through to `Other` and are skipped during translation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadViewPost {
    pub post: PostView,
    #[serde(default)]
    pub parent: Option<Box<ThreadNode>>,
    #[serde(default)]
    pub replies: Vec<ThreadNode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ThreadNode {
    Post(Box<ThreadViewPost>),
    Other(Value),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThreadResponse {
    pub thread: ThreadNode,
}

/// Blob reference returned by `com.atproto.repo.uploadBlob`, kept opaque:
/// it is echoed verbatim into the post record's image embed.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadBlobResponse {
    pub blob: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveHandleResponse {
    pub did: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRecordResponse {
    pub uri: String,
    pub cid: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorsResponse {
    pub actors: Vec<ProfileView>,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_decodes_camel_case() {
        let json = serde_json::json!({
            "did": "did:plc:abc",
            "handle": "alice.bsky.social",
            "email": "alice@example.com",
            "accessJwt": "jwt-a",
            "refreshJwt": "jwt-r"
        });
        let session: AtpSession = serde_json::from_value(json).unwrap();
        assert_eq!(session.access_jwt, "jwt-a");
        assert_eq!(session.refresh_jwt, "jwt-r");
    }

    #[test]
    fn facet_features_decode_by_lexicon_type() {
        let json = serde_json::json!({
            "index": {"byteStart": 0, "byteEnd": 5},
            "features": [
                {"$type": "app.bsky.richtext.facet#mention", "did": "did:plc:x"},
                {"$type": "app.bsky.richtext.facet#tag", "tag": "rust"}
            ]
        });
        let facet: FacetRecord = serde_json::from_value(json).unwrap();
        assert_eq!(facet.index.byte_end, 5);
        assert!(matches!(facet.features[0], FacetFeature::Mention { .. }));
        assert!(matches!(facet.features[1], FacetFeature::Tag { ref tag } if tag == "rust"));
    }

    #[test]
    fn unknown_embed_shapes_fall_through() {
        let json = serde_json::json!({
            "$type": "app.bsky.embed.record#view",
            "record": {"uri": "at://x", "cid": "c"}
        });
        let embed: EmbedView = serde_json::from_value(json).unwrap();
        assert!(matches!(embed, EmbedView::Other(_)));

        let json = serde_json::json!({
            "images": [{"thumb": "t", "fullsize": "f", "alt": "a"}]
        });
        let embed: EmbedView = serde_json::from_value(json).unwrap();
        assert!(matches!(embed, EmbedView::Images { .. }));
    }
}
