//! Mastodon v1/v2 value objects, produced per-request by the translators.
//!
//! Wire rules: snake_case fields, IDs as decimal strings of the underlying
//! snowflake, dates as ISO-8601 with a `Z` suffix, and nullable fields
//! serialized as explicit `null` (several popular clients break on omitted
//! keys).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// ISO-8601 with `Z`; accepts timestamps with or without fractional seconds.
pub mod datetime {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(de)?;
        super::parse_datetime(&raw).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid ISO-8601 timestamp: {raw}"))
        })
    }
}

/// Parse an upstream timestamp. The lexicon emits RFC 3339 both with and
/// without fractional seconds.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountField {
    pub name: String,
    pub value: String,
    pub verified_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomEmoji {
    pub shortcode: String,
    pub url: String,
    pub static_url: String,
    pub visible_in_picker: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: String,
    pub username: String,
    pub acct: String,
    pub display_name: String,
    pub note: String,
    pub url: String,
    pub avatar: String,
    pub avatar_static: String,
    pub header: String,
    pub header_static: String,
    pub locked: bool,
    pub bot: bool,
    #[serde(with = "datetime")]
    pub created_at: DateTime<Utc>,
    pub followers_count: i64,
    pub following_count: i64,
    pub statuses_count: i64,
    pub fields: Option<Vec<AccountField>>,
    pub emojis: Option<Vec<CustomEmoji>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Mention {
    pub id: String,
    pub username: String,
    pub url: String,
    pub acct: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaAttachment {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub preview_url: String,
    pub remote_url: Option<String>,
    pub description: Option<String>,
    pub blurhash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Card {
    pub url: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Application {
    pub name: String,
    pub website: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Status {
    pub id: String,
    pub uri: String,
    #[serde(with = "datetime")]
    pub created_at: DateTime<Utc>,
    pub account: Account,
    pub content: String,
    pub visibility: String,
    pub sensitive: bool,
    pub spoiler_text: String,
    pub media_attachments: Vec<MediaAttachment>,
    pub application: Option<Application>,
    pub mentions: Vec<Mention>,
    pub tags: Vec<Tag>,
    pub emojis: Option<Vec<CustomEmoji>>,
    pub reblogs_count: i64,
    pub favourites_count: i64,
    pub replies_count: i64,
    pub url: Option<String>,
    pub in_reply_to_id: Option<String>,
    pub in_reply_to_account_id: Option<String>,
    /// A boost carries exactly one level of nesting.
    pub reblog: Option<Box<Status>>,
    pub card: Option<Card>,
    pub language: Option<String>,
    pub favourited: bool,
    pub reblogged: bool,
    pub muted: bool,
    pub bookmarked: bool,
    pub pinned: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(with = "datetime")]
    pub created_at: DateTime<Utc>,
    pub account: Account,
    pub status: Option<Status>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relationship {
    pub id: String,
    pub following: bool,
    pub followed_by: bool,
    pub blocking: bool,
    pub blocked_by: bool,
    pub muting: bool,
    pub muting_notifications: bool,
    pub requested: bool,
    pub domain_blocking: bool,
    pub endorsed: bool,
    pub showing_reblogs: bool,
    pub notifying: bool,
    pub note: String,
}

impl Relationship {
    /// Default relationship toward an account the gateway knows nothing
    /// about; follow state is refined by the graph endpoints.
    pub fn unknown(id: String) -> Self {
        Self {
            id,
            following: false,
            followed_by: false,
            blocking: false,
            blocked_by: false,
            muting: false,
            muting_notifications: false,
            requested: false,
            domain_blocking: false,
            endorsed: false,
            showing_reblogs: true,
            notifying: false,
            note: String::new(),
        }
    }
}

/// `/api/v1/statuses/{id}/context`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Context {
    pub ancestors: Vec<Status>,
    pub descendants: Vec<Status>,
}

/// `/api/v1/preferences`. Fixed values: every Bluesky post is public and
/// unfiltered.
#[derive(Debug, Clone, Serialize)]
pub struct Preferences {
    #[serde(rename = "posting:default:visibility")]
    pub posting_default_visibility: String,
    #[serde(rename = "posting:default:sensitive")]
    pub posting_default_sensitive: bool,
    #[serde(rename = "posting:default:language")]
    pub posting_default_language: Option<String>,
    #[serde(rename = "reading:expand:media")]
    pub reading_expand_media: String,
    #[serde(rename = "reading:expand:spoilers")]
    pub reading_expand_spoilers: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            posting_default_visibility: "public".to_string(),
            posting_default_sensitive: false,
            posting_default_language: None,
            reading_expand_media: "default".to_string(),
            reading_expand_spoilers: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct List {
    pub id: String,
    pub title: String,
    pub replies_policy: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResults {
    pub accounts: Vec<Account>,
    pub statuses: Vec<Status>,
    pub hashtags: Vec<Tag>,
}

// ── Instance metadata ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusConfiguration {
    pub max_characters: u32,
    pub max_media_attachments: u32,
    pub characters_reserved_per_url: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaConfiguration {
    pub supported_mime_types: Vec<String>,
    pub image_size_limit: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceConfiguration {
    pub statuses: StatusConfiguration,
    pub media_attachments: MediaConfiguration,
}

impl Default for InstanceConfiguration {
    fn default() -> Self {
        Self {
            statuses: StatusConfiguration {
                max_characters: 300,
                max_media_attachments: 4,
                characters_reserved_per_url: 23,
            },
            media_attachments: MediaConfiguration {
                supported_mime_types: vec![
                    "image/jpeg".into(),
                    "image/png".into(),
                    "image/gif".into(),
                    "image/webp".into(),
                ],
                image_size_limit: 1_000_000,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceStats {
    pub user_count: u64,
    pub status_count: u64,
    pub domain_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceUrls {
    pub streaming_api: Option<String>,
}

/// `/api/v1/instance` shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instance {
    pub uri: String,
    pub title: String,
    pub short_description: String,
    pub description: String,
    pub email: String,
    pub version: String,
    pub urls: InstanceUrls,
    pub stats: InstanceStats,
    pub thumbnail: Option<String>,
    pub languages: Vec<String>,
    pub registrations: bool,
    pub approval_required: bool,
    pub invites_enabled: bool,
    pub configuration: InstanceConfiguration,
}

/// `/api/v2/instance` shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceV2 {
    pub domain: String,
    pub title: String,
    pub version: String,
    pub source_url: String,
    pub description: String,
    pub thumbnail: Option<String>,
    pub languages: Vec<String>,
    pub configuration: InstanceConfiguration,
    pub registrations: InstanceV2Registrations,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceV2Registrations {
    pub enabled: bool,
    pub approval_required: bool,
    pub message: Option<String>,
}

impl Instance {
    pub fn for_domain(domain: &str) -> Self {
        Self {
            uri: domain.to_string(),
            title: "Archaeopteryx".to_string(),
            short_description: "A Mastodon-compatible gateway to Bluesky".to_string(),
            description: "Mastodon-compatible API translating to the AT Protocol".to_string(),
            email: String::new(),
            version: format!("4.2.0 (compatible; archaeopteryx {})", env!("CARGO_PKG_VERSION")),
            urls: InstanceUrls {
                streaming_api: None,
            },
            stats: InstanceStats {
                user_count: 0,
                status_count: 0,
                domain_count: 1,
            },
            thumbnail: None,
            languages: vec!["en".to_string()],
            registrations: false,
            approval_required: false,
            invites_enabled: false,
            configuration: InstanceConfiguration::default(),
        }
    }
}

impl InstanceV2 {
    pub fn for_domain(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            title: "Archaeopteryx".to_string(),
            version: format!("4.2.0 (compatible; archaeopteryx {})", env!("CARGO_PKG_VERSION")),
            source_url: "https://github.com/jaikoo/archaeopteryx-rs".to_string(),
            description: "Mastodon-compatible API translating to the AT Protocol".to_string(),
            thumbnail: None,
            languages: vec!["en".to_string()],
            configuration: InstanceConfiguration::default(),
            registrations: InstanceV2Registrations {
                enabled: false,
                approval_required: false,
                message: None,
            },
        }
    }
}
