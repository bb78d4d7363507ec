// SPDX-License-Identifier: MPL-2.0
//! Live polling state for one watched thread.
//!
//! A [`PinWatcher`] holds the post sequence from the most recent poll and
//! classifies it against the pin's view markers: which posts are unviewed,
//! which unviewed posts quote one of the user's own replies, and whether
//! anything new arrived since the previous poll. The watcher never performs
//! network work itself; the coordinator feeds it fetched snapshots or
//! classified failures.

use crate::error::Error;
use crate::model::{Post, ThreadSnapshot};
use crate::watch::pin::Pin;
use tracing::debug;

/// Outcome of applying one successful poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThreadDelta {
    /// Posts that appeared after the previously loaded tail post.
    pub new_posts: usize,
}

/// Polling state for one pin.
#[derive(Debug, Default)]
pub struct PinWatcher {
    posts: Vec<Post>,
    quotes: Vec<Post>,
    were_new_posts: bool,
    were_new_quotes: bool,
    /// In-flight guard; at most one outstanding poll per pin.
    polling: bool,
}

impl PinWatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a poll for this pin is currently in flight.
    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.polling
    }

    /// Marks a poll as started. Returns `false` when one is already in flight,
    /// in which case the caller must not issue another.
    pub fn begin_poll(&mut self) -> bool {
        if self.polling {
            return false;
        }
        self.polling = true;
        true
    }

    /// Applies a successful poll, updating the pin's markers and this
    /// watcher's classification state.
    pub fn apply_thread(&mut self, pin: &mut Pin, snapshot: &ThreadSnapshot) -> ThreadDelta {
        self.polling = false;
        pin.is_error = false;

        if let Some(op) = snapshot.op() {
            // Freshly created threads are often pinned before the site lists a
            // subject; refresh the title on every load so it catches up.
            if !op.subject.is_empty() {
                pin.loadable.title = op.subject.clone();
            }
            if pin.thumbnail_url.is_none() {
                if let Some(image) = &op.image {
                    pin.thumbnail_url = Some(image.thumbnail_url.clone());
                }
            }
        }

        self.posts.clear();
        self.posts.extend(snapshot.posts.iter().cloned());

        self.quotes.clear();
        let saved_replies: Vec<u64> = snapshot
            .posts
            .iter()
            .filter(|p| p.is_saved_reply)
            .map(|p| p.no)
            .collect();
        for post in &snapshot.posts {
            // The user's own posts never count as quoting the user.
            if !post.is_saved_reply && post.replies_to().any(|no| saved_replies.contains(&no)) {
                self.quotes.push(post.clone());
            }
        }

        let delta = ThreadDelta {
            new_posts: self.advance_last_loaded(pin),
        };

        let is_first_load = pin.watch_new_count.is_none() || pin.quote_new_count.is_none();
        let last_watch_new = pin.watch_new_count;
        let last_quote_new = pin.quote_new_count;

        // The user's own replies are not news to the user.
        let post_count = self.posts.len() - saved_replies.len();

        if is_first_load {
            pin.watch_last_count = Some(post_count);
            pin.quote_last_count = Some(self.quotes.len());
        }

        pin.watch_new_count = Some(post_count);
        pin.quote_new_count = Some(self.quotes.len());

        if !is_first_load {
            if pin.watch_new_count > last_watch_new {
                self.were_new_posts = true;
            }
            if pin.quote_new_count > last_quote_new {
                self.were_new_quotes = true;
            }
        }

        debug!(
            pin = %pin.id,
            postlast = ?pin.watch_last_count,
            postnew = ?pin.watch_new_count,
            werenewposts = self.were_new_posts,
            quotelast = ?pin.quote_last_count,
            quotenew = ?pin.quote_new_count,
            werenewquotes = self.were_new_quotes,
            "watcher updated"
        );

        if snapshot.archived || snapshot.closed {
            pin.archived = true;
            pin.watching = false;
        }

        delta
    }

    /// Applies a failed poll. Only a terminal error flags the pin; transient
    /// failures leave all watcher state untouched so the next scheduled poll
    /// proceeds normally.
    pub fn apply_error(&mut self, pin: &mut Pin, error: &Error) {
        self.polling = false;
        if error.is_terminal() {
            pin.is_error = true;
            pin.watching = false;
        }
    }

    /// The user opened the thread: view markers catch up and the transient
    /// flags clear.
    pub fn on_viewed(&mut self, pin: &mut Pin) {
        if pin.watch_new_count.is_some() {
            pin.watch_last_count = pin.watch_new_count;
        }
        self.were_new_posts = false;

        if pin.quote_new_count.is_some() {
            pin.quote_last_count = pin.quote_new_count;
        }
        self.were_new_quotes = false;
    }

    /// Posts newer than the pin's last-viewed marker, oldest first.
    #[must_use]
    pub fn unviewed_posts(&self, pin: &Pin) -> &[Post] {
        let start = self.posts.len().saturating_sub(pin.new_post_count());
        &self.posts[start..]
    }

    /// Unviewed posts that quote one of the user's own replies, oldest first.
    #[must_use]
    pub fn unviewed_quotes(&self, pin: &Pin) -> &[Post] {
        let start = self.quotes.len().saturating_sub(pin.new_quote_count());
        &self.quotes[start..]
    }

    /// Reads and clears the new-posts flag set by the latest poll.
    pub fn take_were_new_posts(&mut self) -> bool {
        std::mem::take(&mut self.were_new_posts)
    }

    /// Reads and clears the new-quotes flag set by the latest poll.
    pub fn take_were_new_quotes(&mut self) -> bool {
        std::mem::take(&mut self.were_new_quotes)
    }

    /// Advances `pin.last_loaded` to the newest post and returns how many
    /// posts sit after the previous marker in the fetched sequence.
    fn advance_last_loaded(&self, pin: &mut Pin) -> usize {
        let mut more = 0;
        if pin.last_loaded > 0 {
            if let Some(i) = self.posts.iter().position(|p| p.no == pin.last_loaded) {
                more = self.posts.len() - i - 1;
            }
        }
        if let Some(last) = self.posts.last() {
            pin.last_loaded = last.no;
        }
        more
    }
}
