// SPDX-License-Identifier: MPL-2.0
//! HTTP thread fetching and wire-format parsing.
//!
//! [`HttpThreadFetcher`] speaks the common imageboard JSON API: a thread is a
//! single document at `{api}/{board}/thread/{no}.json` whose posts carry HTML
//! comments. Parsing strips the markup down to the plain text the rest of the
//! crate works on, and dead (archive-only) quote links keep their identity as
//! [`PostLink::Archive`] instead of degrading to plain quotes.

use crate::error::Result;
use crate::model::{ImageKind, Loadable, Post, PostImage, PostLink, ThreadSnapshot};
use crate::watch::ThreadFetcher;
use futures_util::future::BoxFuture;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;
use tracing::debug;

const HTTP_TIMEOUT: Duration = Duration::from_secs(20);

/// One thread document on the wire.
#[derive(Debug, Deserialize)]
struct RawThread {
    posts: Vec<RawPost>,
}

/// One post on the wire. Optional flags are absent far more often than they
/// are present.
#[derive(Debug, Deserialize)]
struct RawPost {
    no: u64,
    time: i64,
    #[serde(default)]
    sub: String,
    #[serde(default)]
    com: String,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    ext: Option<String>,
    #[serde(default)]
    tim: Option<u64>,
    #[serde(default)]
    spoiler: u8,
    #[serde(default)]
    archived: u8,
    #[serde(default)]
    closed: u8,
}

/// Posts made by the local user, shared between the fetcher and whatever
/// records replies as they are submitted. Keyed by board and post number.
#[derive(Debug, Default, Clone)]
pub struct SavedReplySet {
    inner: Arc<RwLock<HashSet<(String, u64)>>>,
}

impl SavedReplySet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self, board: impl Into<String>, no: u64) {
        if let Ok(mut set) = self.inner.write() {
            set.insert((board.into(), no));
        }
    }

    #[must_use]
    pub fn contains(&self, board: &str, no: u64) -> bool {
        self.inner
            .read()
            .map(|set| set.contains(&(board.to_string(), no)))
            .unwrap_or(false)
    }
}

/// Fetches threads over HTTP from an imageboard JSON API.
pub struct HttpThreadFetcher {
    client: reqwest::Client,
    api_endpoint: String,
    media_endpoint: String,
    saved_replies: SavedReplySet,
}

impl HttpThreadFetcher {
    /// Creates a fetcher against the given API and media endpoints, without
    /// trailing slashes.
    pub fn new(api_endpoint: impl Into<String>, media_endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_endpoint: api_endpoint.into(),
            media_endpoint: media_endpoint.into(),
            saved_replies: SavedReplySet::new(),
        })
    }

    /// The shared saved-reply set; clones refer to the same set.
    #[must_use]
    pub fn saved_replies(&self) -> SavedReplySet {
        self.saved_replies.clone()
    }

    fn thread_url(&self, loadable: &Loadable) -> String {
        format!(
            "{}/{}/thread/{}.json",
            self.api_endpoint, loadable.board, loadable.thread_no
        )
    }
}

impl ThreadFetcher for HttpThreadFetcher {
    fn fetch(&self, loadable: &Loadable) -> BoxFuture<'static, Result<ThreadSnapshot>> {
        let client = self.client.clone();
        let url = self.thread_url(loadable);
        let board = loadable.board.clone();
        let media_endpoint = self.media_endpoint.clone();
        let saved_replies = self.saved_replies.clone();

        Box::pin(async move {
            debug!(%url, "fetching thread");
            let response = client.get(&url).send().await?;
            let response = response.error_for_status()?;
            let raw: RawThread = response.json().await?;
            Ok(parse_thread(&raw, &board, &media_endpoint, &saved_replies))
        })
    }
}

/// Converts a wire thread into a [`ThreadSnapshot`].
///
/// Archived/closed markers live on the opening post only.
fn parse_thread(
    raw: &RawThread,
    board: &str,
    media_endpoint: &str,
    saved_replies: &SavedReplySet,
) -> ThreadSnapshot {
    let archived = raw.posts.first().is_some_and(|op| op.archived != 0);
    let closed = raw.posts.first().is_some_and(|op| op.closed != 0);

    let posts = raw
        .posts
        .iter()
        .map(|raw_post| parse_post(raw_post, board, media_endpoint, saved_replies))
        .collect();

    ThreadSnapshot {
        posts,
        archived,
        closed,
    }
}

fn parse_post(
    raw: &RawPost,
    board: &str,
    media_endpoint: &str,
    saved_replies: &SavedReplySet,
) -> Post {
    let dead_quotes = dead_quote_numbers(&raw.com);
    let comment = strip_html(&raw.com);
    let subject = strip_html(&raw.sub);

    let mut post = Post::new(raw.no, subject, comment, raw.time);
    post.is_saved_reply = saved_replies.contains(board, raw.no);
    post.image = parse_image(raw, board, media_endpoint);

    // A quote to a pruned post only resolves on an external archive. The
    // markup carried that distinction; restore it on the parsed links.
    if !dead_quotes.is_empty() {
        for link in &mut post.links {
            if let PostLink::Quote(no) = *link {
                if dead_quotes.contains(&no) {
                    *link = PostLink::Archive {
                        board: board.to_string(),
                        no,
                    };
                }
            }
        }
    }

    post
}

fn parse_image(raw: &RawPost, board: &str, media_endpoint: &str) -> Option<PostImage> {
    let tim = raw.tim?;
    let ext = raw.ext.as_deref()?;
    let filename = raw.filename.as_deref().unwrap_or("file");
    let ext_no_dot = ext.trim_start_matches('.');

    Some(PostImage {
        url: format!("{media_endpoint}/{board}/{tim}{ext}"),
        thumbnail_url: format!("{media_endpoint}/{board}/{tim}s.jpg"),
        filename: format!("{filename}{ext}"),
        kind: ImageKind::from_extension(ext_no_dot),
        spoiler: raw.spoiler != 0,
    })
}

/// Quote numbers wrapped in a deadlink span.
fn dead_quote_numbers(html: &str) -> Vec<u64> {
    static DEADLINK: OnceLock<Regex> = OnceLock::new();
    let deadlink = DEADLINK.get_or_init(|| {
        Regex::new(r#"<span class="deadlink">&gt;&gt;(\d+)</span>"#).expect("deadlink pattern")
    });

    deadlink
        .captures_iter(html)
        .filter_map(|caps| caps[1].parse().ok())
        .collect()
}

/// Reduces comment HTML to plain text.
///
/// Line breaks become newlines, all other tags are dropped, and the handful
/// of entities the API emits are decoded. Entity decoding runs after tag
/// stripping so a decoded `&lt;` cannot open a tag.
#[must_use]
pub fn strip_html(html: &str) -> String {
    static LINE_BREAK: OnceLock<Regex> = OnceLock::new();
    static TAG: OnceLock<Regex> = OnceLock::new();

    let line_break =
        LINE_BREAK.get_or_init(|| Regex::new(r"<br\s*/?>").expect("line break pattern"));
    let tag = TAG.get_or_init(|| Regex::new(r"<[^>]*>").expect("tag pattern"));

    let text = line_break.replace_all(html, "\n");
    let text = tag.replace_all(&text, "");

    text.replace("&gt;", ">")
        .replace("&lt;", "<")
        .replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_post(no: u64, com: &str) -> RawPost {
        RawPost {
            no,
            time: no as i64,
            sub: String::new(),
            com: com.to_string(),
            filename: None,
            ext: None,
            tim: None,
            spoiler: 0,
            archived: 0,
            closed: 0,
        }
    }

    #[test]
    fn strip_html_decodes_entities_and_breaks() {
        let html = "<span class=\"quote\">&gt;implying</span><br>it&#039;s &quot;fine&quot; &amp; done";
        assert_eq!(strip_html(html), ">implying\nit's \"fine\" & done");
    }

    #[test]
    fn strip_html_handles_self_closing_breaks() {
        assert_eq!(strip_html("a<br/>b<br />c"), "a\nb\nc");
    }

    #[test]
    fn entity_decoding_cannot_reopen_a_tag() {
        // &lt;b&gt; must survive as literal text, not be stripped as a tag.
        assert_eq!(strip_html("&lt;b&gt;bold&lt;/b&gt;"), "<b>bold</b>");
    }

    #[test]
    fn quote_markup_parses_into_quote_links() {
        let raw = raw_post(5, "<a href=\"#p3\" class=\"quotelink\">&gt;&gt;3</a><br>agreed");
        let post = parse_post(&raw, "g", "https://media.example", &SavedReplySet::new());
        assert_eq!(post.comment, ">>3\nagreed");
        assert_eq!(post.links, vec![PostLink::Quote(3)]);
    }

    #[test]
    fn dead_quote_becomes_archive_link() {
        let raw = raw_post(5, "<span class=\"deadlink\">&gt;&gt;42</span> rip");
        let post = parse_post(&raw, "g", "https://media.example", &SavedReplySet::new());
        assert_eq!(
            post.links,
            vec![PostLink::Archive {
                board: "g".to_string(),
                no: 42
            }]
        );
    }

    #[test]
    fn live_and_dead_quotes_keep_their_identities() {
        let raw = raw_post(
            9,
            "<a href=\"#p3\">&gt;&gt;3</a> <span class=\"deadlink\">&gt;&gt;7</span>",
        );
        let post = parse_post(&raw, "g", "https://media.example", &SavedReplySet::new());
        assert_eq!(
            post.links,
            vec![
                PostLink::Quote(3),
                PostLink::Archive {
                    board: "g".to_string(),
                    no: 7
                }
            ]
        );
    }

    #[test]
    fn image_urls_are_built_from_tim_and_ext() {
        let mut raw = raw_post(1, "");
        raw.filename = Some("cat".to_string());
        raw.ext = Some(".webm".to_string());
        raw.tim = Some(1700000000123);
        raw.spoiler = 1;

        let image = parse_image(&raw, "wsg", "https://media.example").unwrap();
        assert_eq!(image.url, "https://media.example/wsg/1700000000123.webm");
        assert_eq!(
            image.thumbnail_url,
            "https://media.example/wsg/1700000000123s.jpg"
        );
        assert_eq!(image.filename, "cat.webm");
        assert_eq!(image.kind, ImageKind::Movie);
        assert!(image.spoiler);
    }

    #[test]
    fn post_without_tim_has_no_image() {
        let raw = raw_post(1, "text only");
        assert!(parse_image(&raw, "g", "https://media.example").is_none());
    }

    #[test]
    fn archived_and_closed_flags_come_from_the_op() {
        let mut op = raw_post(1, "op");
        op.archived = 1;
        let reply = raw_post(2, "reply");
        let raw = RawThread {
            posts: vec![op, reply],
        };

        let snapshot = parse_thread(&raw, "g", "https://media.example", &SavedReplySet::new());
        assert!(snapshot.archived);
        assert!(!snapshot.closed);
        assert_eq!(snapshot.posts.len(), 2);
    }

    #[test]
    fn saved_replies_mark_matching_posts() {
        let saved = SavedReplySet::new();
        saved.mark("g", 2);

        let raw = RawThread {
            posts: vec![raw_post(1, "op"), raw_post(2, "mine"), raw_post(3, "other")],
        };
        let snapshot = parse_thread(&raw, "g", "https://media.example", &saved);
        let flags: Vec<bool> = snapshot.posts.iter().map(|p| p.is_saved_reply).collect();
        assert_eq!(flags, vec![false, true, false]);
    }

    #[test]
    fn saved_replies_are_scoped_by_board() {
        let saved = SavedReplySet::new();
        saved.mark("a", 2);
        assert!(!saved.contains("g", 2));
        assert!(saved.contains("a", 2));
    }

    #[test]
    fn thread_document_deserializes() {
        let json = r##"{
            "posts": [
                {"no": 100, "time": 1700000000, "sub": "Daily thread", "com": "op post",
                 "filename": "img", "ext": ".jpg", "tim": 1700000000001},
                {"no": 101, "time": 1700000060, "com": "<a href=\"#p100\">&gt;&gt;100</a> hi",
                 "closed": 0}
            ]
        }"##;

        let raw: RawThread = serde_json::from_str(json).unwrap();
        let snapshot = parse_thread(&raw, "g", "https://media.example", &SavedReplySet::new());
        assert_eq!(snapshot.posts.len(), 2);
        assert_eq!(snapshot.op().unwrap().subject, "Daily thread");
        assert!(snapshot.posts[1].image.is_none());
        assert_eq!(snapshot.posts[1].links, vec![PostLink::Quote(100)]);
    }
}
