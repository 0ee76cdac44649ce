use std::borrow::Cow;
use std::fmt::Write;

use once_cell::sync::Lazy;
use regex::Regex;

/// Byte range into the UTF-8 text, as AT Protocol facets address it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteSlice {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feature {
    Link { uri: String },
    Mention { did: String },
    Tag { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Facet {
    pub index: ByteSlice,
    pub features: Vec<Feature>,
}

static BARE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(https?://|www\.)[^\s<>"']+"#).expect("bare URL regex"));

pub fn profile_url(handle: &str) -> String {
    format!("https://bsky.app/profile/{handle}")
}

pub fn hashtag_url(name: &str) -> String {
    format!("https://bsky.app/hashtag/{name}")
}

/// Render post text plus byte-indexed facets into one sanitized HTML
/// paragraph.
///
/// Facets render in start order; a facet whose byte range falls outside the
/// text (or does not land on UTF-8 boundaries) is dropped silently.
/// Overlapping facets each render their own body, which can read as nested
/// markup; that mirrors the upstream data and is not considered an error.
pub fn render(text: &str, facets: &[Facet]) -> String {
    let mut out = String::with_capacity(text.len() + 64);
    out.push_str("<p>");

    if facets.is_empty() {
        push_plain(&mut out, text);
    } else {
        let mut ordered: Vec<&Facet> = facets.iter().collect();
        ordered.sort_by_key(|f| f.index.start);

        let mut cursor = 0usize;
        for facet in ordered {
            let Some(body) = text.get(facet.index.start..facet.index.end) else {
                continue;
            };
            if facet.index.start >= cursor {
                if let Some(between) = text.get(cursor..facet.index.start) {
                    push_plain(&mut out, between);
                }
            }
            push_facet(&mut out, body, facet);
            cursor = cursor.max(facet.index.end);
        }
        if let Some(trailing) = text.get(cursor..) {
            push_plain(&mut out, trailing);
        }
    }

    out.push_str("</p>");
    out
}

/// Escape text content: `& < > " '` map to entities.
pub fn escape(text: &str) -> Cow<'_, str> {
    html_escape::encode_quoted_attribute(text)
}

fn escaped_with_breaks(text: &str) -> String {
    escape(text).replace('\n', "<br>")
}

/// Plain text segment: escape, auto-link bare URLs, convert newlines.
fn push_plain(out: &mut String, segment: &str) {
    let mut cursor = 0usize;
    for m in BARE_URL.find_iter(segment) {
        out.push_str(&escaped_with_breaks(&segment[cursor..m.start()]));
        let href: Cow<'_, str> = if m.as_str().starts_with("www.") {
            Cow::Owned(format!("https://{}", m.as_str()))
        } else {
            Cow::Borrowed(m.as_str())
        };
        let _ = write!(
            out,
            r#"<a href="{}" target="_blank" rel="nofollow noopener noreferrer">{}</a>"#,
            escape(&href),
            escape(m.as_str())
        );
        cursor = m.end();
    }
    out.push_str(&escaped_with_breaks(&segment[cursor..]));
}

/// A facet body renders per its first feature; a facet without features
/// degrades to plain text.
fn push_facet(out: &mut String, body: &str, facet: &Facet) {
    match facet.features.first() {
        Some(Feature::Link { uri }) => {
            let _ = write!(
                out,
                r#"<a href="{}" target="_blank" rel="nofollow noopener noreferrer">{}</a>"#,
                escape(uri),
                escape(body)
            );
        }
        Some(Feature::Mention { .. }) => {
            let handle = body.strip_prefix('@').unwrap_or(body);
            let _ = write!(
                out,
                r#"<span class="h-card"><a href="{}" class="u-url mention">@{}</a></span>"#,
                escape(&profile_url(handle)),
                escape(handle)
            );
        }
        Some(Feature::Tag { name }) => {
            let _ = write!(
                out,
                r##"<a href="{}" class="mention hashtag">#{}</a>"##,
                escape(&hashtag_url(name)),
                escape(name)
            );
        }
        None => push_plain(out, body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_empty_paragraph() {
        assert_eq!(render("", &[]), "<p></p>");
    }

    #[test]
    fn plain_text_is_escaped_and_wrapped() {
        assert_eq!(
            render(r#"a < b & c > "d" 'e'"#, &[]),
            "<p>a &lt; b &amp; c &gt; &quot;d&quot; &#x27;e&#x27;</p>"
        );
    }

    #[test]
    fn newlines_become_breaks() {
        assert_eq!(render("one\ntwo", &[]), "<p>one<br>two</p>");
    }

    #[test]
    fn bare_urls_are_auto_linked() {
        let html = render("see https://example.com/x for details", &[]);
        assert_eq!(
            html,
            "<p>see <a href=\"https://example.com/x\" target=\"_blank\" \
             rel=\"nofollow noopener noreferrer\">https://example.com/x</a> for details</p>"
        );
    }

    #[test]
    fn www_urls_get_a_scheme_prepended() {
        let html = render("visit www.example.com today", &[]);
        assert!(html.contains(r#"href="https://www.example.com""#));
        assert!(html.contains(">www.example.com</a>"));
    }

    #[test]
    fn mention_facet_renders_an_h_card() {
        let text = "hello @alice.bsky.social";
        let facets = vec![Facet {
            index: ByteSlice { start: 6, end: 24 },
            features: vec![Feature::Mention {
                did: "did:plc:alice".into(),
            }],
        }];
        assert_eq!(
            render(text, &facets),
            "<p>hello <span class=\"h-card\"><a href=\"https://bsky.app/profile/alice.bsky.social\" \
             class=\"u-url mention\">@alice.bsky.social</a></span></p>"
        );
    }

    #[test]
    fn link_facet_renders_an_anchor() {
        let text = "read this post";
        let facets = vec![Facet {
            index: ByteSlice { start: 5, end: 9 },
            features: vec![Feature::Link {
                uri: "https://example.com/a?b=1&c=2".into(),
            }],
        }];
        let html = render(text, &facets);
        assert_eq!(
            html,
            "<p>read <a href=\"https://example.com/a?b=1&amp;c=2\" target=\"_blank\" \
             rel=\"nofollow noopener noreferrer\">this</a> post</p>"
        );
    }

    #[test]
    fn tag_facet_renders_a_hashtag_link() {
        let text = "loving #rustlang today";
        let facets = vec![Facet {
            index: ByteSlice { start: 7, end: 16 },
            features: vec![Feature::Tag {
                name: "rustlang".into(),
            }],
        }];
        let html = render(text, &facets);
        assert!(html
            .contains(r##"<a href="https://bsky.app/hashtag/rustlang" class="mention hashtag">#rustlang</a>"##));
    }

    #[test]
    fn facets_render_in_start_order() {
        let text = "#a then #b";
        let facets = vec![
            Facet {
                index: ByteSlice { start: 8, end: 10 },
                features: vec![Feature::Tag { name: "b".into() }],
            },
            Facet {
                index: ByteSlice { start: 0, end: 2 },
                features: vec![Feature::Tag { name: "a".into() }],
            },
        ];
        let html = render(text, &facets);
        let a = html.find("#a").unwrap();
        let b = html.find("#b").unwrap();
        assert!(a < b);
    }

    #[test]
    fn out_of_range_facets_are_dropped() {
        let text = "short";
        let facets = vec![Facet {
            index: ByteSlice { start: 2, end: 99 },
            features: vec![Feature::Tag { name: "x".into() }],
        }];
        assert_eq!(render(text, &facets), "<p>short</p>");
    }

    #[test]
    fn facet_indices_are_bytes_not_chars() {
        // "héllo" is six bytes; the facet covers the trailing "llo".
        let text = "héllo";
        let facets = vec![Facet {
            index: ByteSlice { start: 3, end: 6 },
            features: vec![Feature::Link {
                uri: "https://example.com".into(),
            }],
        }];
        let html = render(text, &facets);
        assert!(html.contains(">llo</a>"));

        // A slice through the middle of é is dropped.
        let bad = vec![Facet {
            index: ByteSlice { start: 2, end: 3 },
            features: vec![Feature::Tag { name: "x".into() }],
        }];
        assert_eq!(render(text, &bad), "<p>héllo</p>");
    }

    #[test]
    fn facet_without_features_degrades_to_text() {
        let text = "just words";
        let facets = vec![Facet {
            index: ByteSlice { start: 0, end: 4 },
            features: vec![],
        }];
        assert_eq!(render(text, &facets), "<p>just words</p>");
    }

    #[test]
    fn literal_markup_inside_facet_bodies_is_escaped() {
        let text = "x <b>bold</b>";
        let facets = vec![Facet {
            index: ByteSlice { start: 2, end: 13 },
            features: vec![Feature::Link {
                uri: "https://example.com".into(),
            }],
        }];
        let html = render(text, &facets);
        assert!(html.contains("&lt;b&gt;bold&lt;/b&gt;"));
        assert!(!html.contains("<b>"));
    }
}
