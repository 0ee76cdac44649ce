//! Schema conversion between AT Protocol records and Mastodon objects.
//! Translators are pure apart from ID-mapper lookups and, for notification
//! subjects, one upstream fetch.

pub mod account;
pub mod notification;
pub mod status;

pub use account::account_from_profile;
pub use notification::{notification_from_upstream, notifications_from_upstream};
pub use status::{
    context_from_thread, status_from_feed_item, status_from_post, statuses_from_feed,
};

use chrono::{DateTime, TimeZone, Utc};

use crate::atproto::types::{FacetFeature, FacetRecord};
use crate::mastodon::parse_datetime;
use crate::richtext::{ByteSlice, Facet, Feature};

/// `at://did:plc:xyz/app.bsky.feed.post/rkey` → `did:plc:xyz`
pub(crate) fn did_from_aturi(uri: &str) -> Option<&str> {
    uri.strip_prefix("at://")?.split('/').next()
}

/// `at://did:plc:xyz/app.bsky.feed.post/rkey` → `rkey`
pub(crate) fn rkey_from_aturi(uri: &str) -> Option<&str> {
    uri.rsplit('/').next()
}

pub(crate) fn timestamp_or_epoch(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(parse_datetime)
        .unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap())
}

/// Lower a lexicon facet into the renderer's byte-indexed form.
pub(crate) fn lower_facets(facets: &[FacetRecord]) -> Vec<Facet> {
    facets
        .iter()
        .map(|facet| Facet {
            index: ByteSlice {
                start: facet.index.byte_start,
                end: facet.index.byte_end,
            },
            features: facet
                .features
                .iter()
                .map(|feature| match feature {
                    FacetFeature::Link { uri } => Feature::Link { uri: uri.clone() },
                    FacetFeature::Mention { did } => Feature::Mention { did: did.clone() },
                    FacetFeature::Tag { tag } => Feature::Tag { name: tag.clone() },
                })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aturi_components_split_correctly() {
        let uri = "at://did:plc:alice/app.bsky.feed.post/3k44abc";
        assert_eq!(did_from_aturi(uri), Some("did:plc:alice"));
        assert_eq!(rkey_from_aturi(uri), Some("3k44abc"));
        assert_eq!(did_from_aturi("not-a-uri"), None);
    }

    #[test]
    fn epoch_fallback_for_bad_timestamps() {
        assert_eq!(timestamp_or_epoch(None).timestamp(), 0);
        assert_eq!(timestamp_or_epoch(Some("garbage")).timestamp(), 0);
        assert_ne!(
            timestamp_or_epoch(Some("2023-04-01T12:00:00Z")).timestamp(),
            0
        );
    }
}
