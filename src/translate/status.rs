use futures::future::try_join_all;

use crate::atproto::types::{
    EmbedView, FacetFeature, FeedReason, FeedViewPost, PostView, ThreadNode,
};
use crate::error::ApiResult;
use crate::ids::IdMapper;
use crate::mastodon::{Card, Context, MediaAttachment, Mention, Status, Tag};
use crate::richtext;

use super::{did_from_aturi, lower_facets, rkey_from_aturi, timestamp_or_epoch};

/// Translate a hydrated post view into a Mastodon status.
pub async fn status_from_post(ids: &IdMapper, post: &PostView) -> ApiResult<Status> {
    let id = ids.snowflake_for_aturi(&post.uri).await?;
    let account = super::account_from_profile(ids, &post.author).await?;

    let facets = lower_facets(&post.record.facets);
    let content = richtext::render(&post.record.text, &facets);

    let mentions = extract_mentions(ids, post).await?;
    let tags = extract_tags(post);
    let (media_attachments, card) = extract_embeds(ids, post).await?;

    let (in_reply_to_id, in_reply_to_account_id) = match &post.record.reply {
        Some(reply) => {
            let parent_id = ids.snowflake_for_aturi(&reply.parent.uri).await?;
            let parent_account_id = match did_from_aturi(&reply.parent.uri) {
                Some(did) => Some(ids.snowflake_for_did(did).await?.to_string()),
                None => None,
            };
            (Some(parent_id.to_string()), parent_account_id)
        }
        None => (None, None),
    };

    let url = rkey_from_aturi(&post.uri).map(|rkey| {
        format!(
            "https://bsky.app/profile/{}/post/{rkey}",
            post.author.handle
        )
    });

    let created_at = timestamp_or_epoch(
        post.record
            .created_at
            .as_deref()
            .or(Some(post.indexed_at.as_str())),
    );

    Ok(Status {
        id: id.to_string(),
        uri: post.uri.clone(),
        created_at,
        account,
        content,
        visibility: "public".to_string(),
        sensitive: false,
        spoiler_text: String::new(),
        media_attachments,
        application: None,
        mentions,
        tags,
        emojis: None,
        reblogs_count: post.repost_count.unwrap_or(0),
        favourites_count: post.like_count.unwrap_or(0),
        replies_count: post.reply_count.unwrap_or(0),
        url,
        in_reply_to_id,
        in_reply_to_account_id,
        reblog: None,
        card,
        language: post.record.langs.first().cloned(),
        favourited: false,
        reblogged: false,
        muted: false,
        bookmarked: false,
        pinned: false,
    })
}

/// Translate one timeline entry. A repost reason wraps the translated post
/// in a boost shell attributed to the reposter.
pub async fn status_from_feed_item(ids: &IdMapper, item: &FeedViewPost) -> ApiResult<Status> {
    let inner = status_from_post(ids, &item.post).await?;

    let Some(FeedReason::Repost(reason)) = &item.reason else {
        return Ok(inner);
    };

    // Synthetic identity for the boost itself; stable once observed.
    let boost_uri = format!("{}#repost:{}", item.post.uri, reason.by.did);
    let id = ids.snowflake_for_aturi(&boost_uri).await?;
    let account = super::account_from_profile(ids, &reason.by).await?;

    Ok(Status {
        id: id.to_string(),
        uri: boost_uri,
        created_at: timestamp_or_epoch(Some(reason.indexed_at.as_str())),
        account,
        content: String::new(),
        visibility: "public".to_string(),
        sensitive: false,
        spoiler_text: String::new(),
        media_attachments: Vec::new(),
        application: None,
        mentions: Vec::new(),
        tags: Vec::new(),
        emojis: None,
        reblogs_count: 0,
        favourites_count: 0,
        replies_count: 0,
        url: None,
        in_reply_to_id: None,
        in_reply_to_account_id: None,
        reblog: Some(Box::new(inner)),
        card: None,
        language: None,
        favourited: false,
        reblogged: false,
        muted: false,
        bookmarked: false,
        pinned: false,
    })
}

/// Translate a feed slice, preserving upstream order.
pub async fn statuses_from_feed(ids: &IdMapper, feed: &[FeedViewPost]) -> ApiResult<Vec<Status>> {
    try_join_all(feed.iter().map(|item| status_from_feed_item(ids, item))).await
}

/// Flatten a post thread into Mastodon context: the parent chain
/// root-first, then replies in depth-first order. Blocked or missing
/// nodes are skipped.
pub async fn context_from_thread(ids: &IdMapper, thread: &ThreadNode) -> ApiResult<Context> {
    let ThreadNode::Post(root) = thread else {
        return Ok(Context {
            ancestors: Vec::new(),
            descendants: Vec::new(),
        });
    };

    let mut ancestors = Vec::new();
    let mut cursor = root.parent.as_deref();
    while let Some(ThreadNode::Post(node)) = cursor {
        ancestors.push(status_from_post(ids, &node.post).await?);
        cursor = node.parent.as_deref();
    }
    ancestors.reverse();

    let mut descendants = Vec::new();
    let mut stack: Vec<&ThreadNode> = root.replies.iter().rev().collect();
    while let Some(node) = stack.pop() {
        if let ThreadNode::Post(reply) = node {
            descendants.push(status_from_post(ids, &reply.post).await?);
            stack.extend(reply.replies.iter().rev());
        }
    }

    Ok(Context {
        ancestors,
        descendants,
    })
}

async fn extract_mentions(ids: &IdMapper, post: &PostView) -> ApiResult<Vec<Mention>> {
    let mut mentions = Vec::new();
    for facet in &post.record.facets {
        for feature in &facet.features {
            let FacetFeature::Mention { did } = feature else {
                continue;
            };
            let body = post
                .record
                .text
                .get(facet.index.byte_start..facet.index.byte_end)
                .unwrap_or_default();
            let handle = body.strip_prefix('@').unwrap_or(body);
            if handle.is_empty() {
                continue;
            }
            let id = ids.snowflake_for_did(did).await?;
            mentions.push(Mention {
                id: id.to_string(),
                username: handle.split('.').next().unwrap_or(handle).to_string(),
                url: richtext::profile_url(handle),
                acct: handle.to_string(),
            });
        }
    }
    Ok(mentions)
}

fn extract_tags(post: &PostView) -> Vec<Tag> {
    post.record
        .facets
        .iter()
        .flat_map(|facet| &facet.features)
        .filter_map(|feature| match feature {
            FacetFeature::Tag { tag } => Some(Tag {
                name: tag.clone(),
                url: richtext::hashtag_url(tag),
            }),
            _ => None,
        })
        .collect()
}

async fn extract_embeds(
    ids: &IdMapper,
    post: &PostView,
) -> ApiResult<(Vec<MediaAttachment>, Option<Card>)> {
    match &post.embed {
        Some(EmbedView::Images { images }) => {
            let mut attachments = Vec::with_capacity(images.len());
            for image in images {
                let id = ids.snowflake_for_aturi(&image.fullsize).await?;
                attachments.push(MediaAttachment {
                    id: id.to_string(),
                    kind: "image".to_string(),
                    url: image.fullsize.clone(),
                    preview_url: image.thumb.clone(),
                    remote_url: None,
                    description: if image.alt.is_empty() {
                        None
                    } else {
                        Some(image.alt.clone())
                    },
                    blurhash: None,
                });
            }
            Ok((attachments, None))
        }
        Some(EmbedView::External { external }) => Ok((
            Vec::new(),
            Some(Card {
                url: external.uri.clone(),
                title: external.title.clone(),
                description: external.description.clone(),
                kind: "link".to_string(),
                image: external.thumb.clone(),
            }),
        )),
        _ => Ok((Vec::new(), None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atproto::types::{
        ExternalViewInner, FacetIndex, FacetRecord, ImageView, PostRecord, ProfileView,
        ReasonRepost, ReplyRef, StrongRef,
    };
    use crate::cache::Cache;
    use crate::snowflake::SnowflakeGenerator;
    use std::sync::Arc;

    fn mapper() -> IdMapper {
        IdMapper::new(
            Cache::in_memory(),
            Arc::new(SnowflakeGenerator::with_default_epoch()),
        )
    }

    fn author() -> ProfileView {
        ProfileView {
            did: "did:plc:alice".into(),
            handle: "alice.bsky.social".into(),
            display_name: Some("Alice".into()),
            description: None,
            avatar: None,
            banner: None,
            followers_count: None,
            follows_count: None,
            posts_count: None,
            created_at: None,
            viewer: None,
        }
    }

    fn bare_post(text: &str) -> PostView {
        PostView {
            uri: "at://did:plc:alice/app.bsky.feed.post/3k44".into(),
            cid: "bafy123".into(),
            author: author(),
            record: PostRecord {
                text: text.into(),
                facets: vec![],
                reply: None,
                langs: vec!["en".into()],
                created_at: Some("2023-04-02T08:30:00.000Z".into()),
            },
            embed: None,
            reply_count: Some(1),
            repost_count: Some(2),
            like_count: Some(3),
            indexed_at: "2023-04-02T08:30:01Z".into(),
        }
    }

    #[tokio::test]
    async fn maps_ids_counts_and_content() {
        let ids = mapper();
        let post = bare_post("hello world");
        let status = status_from_post(&ids, &post).await.unwrap();

        let expected = ids.snowflake_for_aturi(&post.uri).await.unwrap();
        assert_eq!(status.id, expected.to_string());
        assert_eq!(status.content, "<p>hello world</p>");
        assert_eq!(status.visibility, "public");
        assert!(!status.sensitive);
        assert_eq!(status.spoiler_text, "");
        assert_eq!(status.reblogs_count, 2);
        assert_eq!(status.favourites_count, 3);
        assert_eq!(status.replies_count, 1);
        assert_eq!(status.language.as_deref(), Some("en"));
        assert_eq!(
            status.url.as_deref(),
            Some("https://bsky.app/profile/alice.bsky.social/post/3k44")
        );
    }

    #[tokio::test]
    async fn mention_and_tag_facets_become_entities() {
        let ids = mapper();
        let mut post = bare_post("hi @bob.bsky.social #rust");
        post.record.facets = vec![
            FacetRecord {
                index: FacetIndex {
                    byte_start: 3,
                    byte_end: 19,
                },
                features: vec![FacetFeature::Mention {
                    did: "did:plc:bob".into(),
                }],
            },
            FacetRecord {
                index: FacetIndex {
                    byte_start: 20,
                    byte_end: 25,
                },
                features: vec![FacetFeature::Tag { tag: "rust".into() }],
            },
        ];

        let status = status_from_post(&ids, &post).await.unwrap();
        assert_eq!(status.mentions.len(), 1);
        assert_eq!(status.mentions[0].acct, "bob.bsky.social");
        assert_eq!(status.mentions[0].username, "bob");
        let bob = ids.snowflake_for_did("did:plc:bob").await.unwrap();
        assert_eq!(status.mentions[0].id, bob.to_string());

        assert_eq!(status.tags.len(), 1);
        assert_eq!(status.tags[0].name, "rust");
        assert_eq!(status.tags[0].url, "https://bsky.app/hashtag/rust");
    }

    #[tokio::test]
    async fn image_embed_becomes_media_attachments() {
        let ids = mapper();
        let mut post = bare_post("look");
        post.embed = Some(EmbedView::Images {
            images: vec![ImageView {
                thumb: "https://cdn.example/thumb.jpg".into(),
                fullsize: "https://cdn.example/full.jpg".into(),
                alt: "a bird".into(),
                aspect_ratio: None,
            }],
        });

        let status = status_from_post(&ids, &post).await.unwrap();
        assert_eq!(status.media_attachments.len(), 1);
        let attachment = &status.media_attachments[0];
        assert_eq!(attachment.kind, "image");
        assert_eq!(attachment.url, "https://cdn.example/full.jpg");
        assert_eq!(attachment.preview_url, "https://cdn.example/thumb.jpg");
        assert_eq!(attachment.description.as_deref(), Some("a bird"));
        assert!(status.card.is_none());
    }

    #[tokio::test]
    async fn external_embed_becomes_a_link_card() {
        let ids = mapper();
        let mut post = bare_post("interesting link");
        post.embed = Some(EmbedView::External {
            external: ExternalViewInner {
                uri: "https://example.com/article".into(),
                title: "An article".into(),
                description: "Worth reading".into(),
                thumb: None,
            },
        });

        let status = status_from_post(&ids, &post).await.unwrap();
        let card = status.card.unwrap();
        assert_eq!(card.kind, "link");
        assert_eq!(card.url, "https://example.com/article");
        assert!(status.media_attachments.is_empty());
    }

    #[tokio::test]
    async fn replies_map_both_parent_ids() {
        let ids = mapper();
        let mut post = bare_post("replying");
        post.record.reply = Some(ReplyRef {
            root: StrongRef {
                uri: "at://did:plc:root/app.bsky.feed.post/1".into(),
                cid: "c1".into(),
            },
            parent: StrongRef {
                uri: "at://did:plc:parent/app.bsky.feed.post/2".into(),
                cid: "c2".into(),
            },
        });

        let status = status_from_post(&ids, &post).await.unwrap();
        let parent_id = ids
            .snowflake_for_aturi("at://did:plc:parent/app.bsky.feed.post/2")
            .await
            .unwrap();
        let parent_account = ids.snowflake_for_did("did:plc:parent").await.unwrap();
        assert_eq!(status.in_reply_to_id, Some(parent_id.to_string()));
        assert_eq!(
            status.in_reply_to_account_id,
            Some(parent_account.to_string())
        );
    }

    #[tokio::test]
    async fn repost_reason_wraps_a_boost() {
        let ids = mapper();
        let item = FeedViewPost {
            post: bare_post("original"),
            reply: None,
            reason: Some(FeedReason::Repost(ReasonRepost {
                by: ProfileView {
                    did: "did:plc:carol".into(),
                    handle: "carol.bsky.social".into(),
                    display_name: None,
                    description: None,
                    avatar: None,
                    banner: None,
                    followers_count: None,
                    follows_count: None,
                    posts_count: None,
                    created_at: None,
                    viewer: None,
                },
                indexed_at: "2023-04-03T00:00:00Z".into(),
            })),
        };

        let status = status_from_feed_item(&ids, &item).await.unwrap();
        assert_eq!(status.account.acct, "carol.bsky.social");
        assert_eq!(status.content, "");
        let inner = status.reblog.expect("boost carries the original");
        assert_eq!(inner.content, "<p>original</p>");
        assert!(inner.reblog.is_none(), "only one level of nesting");
        assert_ne!(status.id, inner.id);
    }

    #[tokio::test]
    async fn thread_flattens_into_ancestors_and_descendants() {
        use crate::atproto::types::{ThreadNode, ThreadViewPost};

        let mut grandparent = bare_post("grandparent");
        grandparent.uri = "at://did:plc:alice/app.bsky.feed.post/g".into();
        let mut parent = bare_post("parent");
        parent.uri = "at://did:plc:alice/app.bsky.feed.post/p".into();
        let mut focus = bare_post("focus");
        focus.uri = "at://did:plc:alice/app.bsky.feed.post/f".into();
        let mut reply = bare_post("reply");
        reply.uri = "at://did:plc:alice/app.bsky.feed.post/r".into();
        let mut nested = bare_post("nested");
        nested.uri = "at://did:plc:alice/app.bsky.feed.post/n".into();

        let thread = ThreadNode::Post(Box::new(ThreadViewPost {
            post: focus,
            parent: Some(Box::new(ThreadNode::Post(Box::new(ThreadViewPost {
                post: parent,
                parent: Some(Box::new(ThreadNode::Post(Box::new(ThreadViewPost {
                    post: grandparent,
                    parent: None,
                    replies: vec![],
                })))),
                replies: vec![],
            })))),
            replies: vec![ThreadNode::Post(Box::new(ThreadViewPost {
                post: reply,
                parent: None,
                replies: vec![ThreadNode::Post(Box::new(ThreadViewPost {
                    post: nested,
                    parent: None,
                    replies: vec![],
                }))],
            }))],
        }));

        let ids = mapper();
        let context = context_from_thread(&ids, &thread).await.unwrap();

        let ancestor_texts: Vec<_> = context
            .ancestors
            .iter()
            .map(|s| s.content.clone())
            .collect();
        assert_eq!(ancestor_texts, vec!["<p>grandparent</p>", "<p>parent</p>"]);

        let descendant_texts: Vec<_> = context
            .descendants
            .iter()
            .map(|s| s.content.clone())
            .collect();
        assert_eq!(descendant_texts, vec!["<p>reply</p>", "<p>nested</p>"]);
    }

    #[tokio::test]
    async fn feed_translation_preserves_order() {
        let ids = mapper();
        let mut first = bare_post("first");
        first.uri = "at://did:plc:alice/app.bsky.feed.post/1".into();
        let mut second = bare_post("second");
        second.uri = "at://did:plc:alice/app.bsky.feed.post/2".into();

        let feed = vec![
            FeedViewPost {
                post: first,
                reply: None,
                reason: None,
            },
            FeedViewPost {
                post: second,
                reply: None,
                reason: None,
            },
        ];

        let statuses = statuses_from_feed(&ids, &feed).await.unwrap();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].content, "<p>first</p>");
        assert_eq!(statuses[1].content, "<p>second</p>");
    }
}
