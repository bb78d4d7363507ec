// SPDX-License-Identifier: MPL-2.0
//! Core domain types shared by the watcher, aggregator, and viewer.
//!
//! A [`Loadable`] identifies one thread on one site. Its identity covers the
//! site, board, and thread number; the title is display state refreshed from
//! the thread OP on every successful poll.

use regex::Regex;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

/// Identifier for a site + board + thread.
#[derive(Debug, Clone)]
pub struct Loadable {
    pub site: String,
    pub board: String,
    pub thread_no: u64,
    /// Display title. Not part of the identity; updated whenever the thread OP
    /// is fetched so freshly created threads pick up a proper subject.
    pub title: String,
    /// True when the thread content has been saved to local storage. Local
    /// media never needs a network policy check.
    pub local: bool,
}

impl Loadable {
    pub fn new(
        site: impl Into<String>,
        board: impl Into<String>,
        thread_no: u64,
        title: impl Into<String>,
    ) -> Self {
        Self {
            site: site.into(),
            board: board.into(),
            thread_no,
            title: title.into(),
            local: false,
        }
    }
}

impl PartialEq for Loadable {
    fn eq(&self, other: &Self) -> bool {
        self.site == other.site && self.board == other.board && self.thread_no == other.thread_no
    }
}

impl Eq for Loadable {}

impl Hash for Loadable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.site.hash(state);
        self.board.hash(state);
        self.thread_no.hash(state);
    }
}

impl fmt::Display for Loadable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}//{}/{}", self.site, self.board, self.thread_no)
    }
}

/// Kind of media attached to a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Static,
    Gif,
    Movie,
    Iframe,
}

impl ImageKind {
    /// Infers the kind from a file extension.
    #[must_use]
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "gif" => ImageKind::Gif,
            "webm" | "mp4" | "mov" => ImageKind::Movie,
            "swf" => ImageKind::Iframe,
            _ => ImageKind::Static,
        }
    }
}

/// Metadata for one media attachment of a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostImage {
    pub url: String,
    pub thumbnail_url: String,
    pub filename: String,
    pub kind: ImageKind,
    pub spoiler: bool,
}

/// A reference from a comment to somewhere else.
///
/// Closed set of link kinds; callers match exhaustively rather than probing
/// with downcasts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostLink {
    /// `>>123` reply reference within the same thread.
    Quote(u64),
    /// `>>>/b/123` cross-board thread reference.
    Thread { board: String, no: u64 },
    /// `>>>/b/` board reference.
    Board(String),
    /// Catalog search link.
    Search { board: String, query: String },
    /// Reference to a post that only survives on an external archive.
    Archive { board: String, no: u64 },
    /// Embedded external media url.
    Embed(String),
}

impl PostLink {
    /// Parses every link of the quote/board/thread forms out of comment text.
    ///
    /// Search, archive, and embed links require markup context the plain text
    /// no longer carries; the fetch layer constructs those directly.
    pub fn parse_all(text: &str) -> Vec<PostLink> {
        static CROSSBOARD: OnceLock<Regex> = OnceLock::new();
        static QUOTE: OnceLock<Regex> = OnceLock::new();

        let crossboard = CROSSBOARD
            .get_or_init(|| Regex::new(r">>>/([a-z0-9]+)/(\d*)").expect("crossboard pattern"));
        let quote = QUOTE.get_or_init(|| Regex::new(r">>(\d+)").expect("quote pattern"));

        let mut links = Vec::new();

        for caps in crossboard.captures_iter(text) {
            let board = caps[1].to_string();
            match caps[2].parse::<u64>() {
                Ok(no) => links.push(PostLink::Thread { board, no }),
                Err(_) => links.push(PostLink::Board(board)),
            }
        }

        // Strip cross-board links first so `>>>/b/123` does not also match as
        // a same-thread quote of post 123.
        let without_crossboard = crossboard.replace_all(text, "");
        for caps in quote.captures_iter(&without_crossboard) {
            if let Ok(no) = caps[1].parse::<u64>() {
                links.push(PostLink::Quote(no));
            }
        }

        links
    }
}

/// One post of a thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    /// Post number, unique and increasing within a thread.
    pub no: u64,
    /// Subject line, may be empty.
    pub subject: String,
    /// Plain-text comment (markup already stripped by the fetch layer).
    pub comment: String,
    /// Unix timestamp in seconds.
    pub time: i64,
    /// True when this post was made by the local user.
    pub is_saved_reply: bool,
    pub image: Option<PostImage>,
    /// Links parsed out of the comment.
    pub links: Vec<PostLink>,
}

impl Post {
    /// Creates a post with links derived from the comment text.
    pub fn new(no: u64, subject: impl Into<String>, comment: impl Into<String>, time: i64) -> Self {
        let comment = comment.into();
        let links = PostLink::parse_all(&comment);
        Self {
            no,
            subject: subject.into(),
            comment,
            time,
            is_saved_reply: false,
            image: None,
            links,
        }
    }

    /// Post numbers this post replies to, derived from its quote links.
    pub fn replies_to(&self) -> impl Iterator<Item = u64> + '_ {
        self.links.iter().filter_map(|link| match link {
            PostLink::Quote(no) => Some(*no),
            _ => None,
        })
    }
}

/// One fetched snapshot of a thread, ordered by ascending post number.
#[derive(Debug, Clone, Default)]
pub struct ThreadSnapshot {
    pub posts: Vec<Post>,
    pub archived: bool,
    pub closed: bool,
}

impl ThreadSnapshot {
    /// The opening post, when present.
    #[must_use]
    pub fn op(&self) -> Option<&Post> {
        self.posts.first()
    }
}
