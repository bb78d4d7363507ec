// SPDX-License-Identifier: MPL-2.0
//! Bookmark state for one watched thread.

use crate::model::Loadable;
use std::fmt;

/// Unique identifier of a pin within one [`PinManager`](super::PinManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PinId(pub u64);

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pin#{}", self.0)
    }
}

/// What a pin tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchFlags {
    /// Poll the thread and report new posts.
    pub watch_new_posts: bool,
    /// Save new posts and media to local storage.
    pub download_thread: bool,
}

impl Default for WatchFlags {
    fn default() -> Self {
        Self {
            watch_new_posts: true,
            download_thread: false,
        }
    }
}

/// A user bookmark of a thread.
///
/// Post/quote counts use a last/new marker pair: `*_last_count` is the size
/// when the user last viewed the thread, `*_new_count` the size after the most
/// recent poll. `None` means no poll has completed yet, which keeps the first
/// load from counting the whole backlog as new.
#[derive(Debug, Clone, PartialEq)]
pub struct Pin {
    pub id: PinId,
    pub loadable: Loadable,
    pub flags: WatchFlags,
    pub watching: bool,
    pub is_error: bool,
    pub archived: bool,
    /// Display position; contiguous and unique within the pin list.
    pub order: usize,
    pub watch_last_count: Option<usize>,
    pub watch_new_count: Option<usize>,
    pub quote_last_count: Option<usize>,
    pub quote_new_count: Option<usize>,
    /// Highest post number seen by the thread presenter.
    pub last_loaded: u64,
    /// Thumbnail of the opening post, filled on the first successful poll.
    pub thumbnail_url: Option<String>,
}

impl Pin {
    pub fn new(id: PinId, loadable: Loadable, flags: WatchFlags) -> Self {
        Self {
            id,
            loadable,
            flags,
            watching: true,
            is_error: false,
            archived: false,
            order: 0,
            watch_last_count: None,
            watch_new_count: None,
            quote_last_count: None,
            quote_new_count: None,
            last_loaded: 0,
            thumbnail_url: None,
        }
    }

    /// Posts arrived since the user last viewed the thread. Zero until the
    /// first poll completes.
    #[must_use]
    pub fn new_post_count(&self) -> usize {
        match (self.watch_new_count, self.watch_last_count) {
            (Some(new), Some(last)) => new.saturating_sub(last),
            _ => 0,
        }
    }

    /// Quotes of the user's posts arrived since the thread was last viewed.
    #[must_use]
    pub fn new_quote_count(&self) -> usize {
        match (self.quote_new_count, self.quote_last_count) {
            (Some(new), Some(last)) => new.saturating_sub(last),
            _ => 0,
        }
    }
}
