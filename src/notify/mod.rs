// SPDX-License-Identifier: MPL-2.0
//! Collapses the state of every active watcher into one notification payload.
//!
//! The payload is derived state: recomputed on every aggregation pass, never
//! stored. The host hands it to whatever notification surface it has; this
//! module only decides the text and the alert flags.

use crate::config::Settings;
use crate::model::Post;
use crate::watch::{PinId, PinManager};
use regex::Regex;
use std::sync::OnceLock;

/// Prefix length taken from a post's subject for an expanded line.
const SUBJECT_LENGTH: usize = 6;

/// Expanded lines are capped to the most recent posts.
const MAX_EXPANDED_LINES: usize = 10;

/// One notification, summarizing every watched thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    /// At most [`MAX_EXPANDED_LINES`] lines for the expanded presentation.
    pub expanded_lines: Vec<String>,
    /// Visual indicator (LED / badge accent).
    pub light: bool,
    pub sound: bool,
    /// Heads-up presentation.
    pub peek: bool,
    /// Use the alert icon and high priority.
    pub alert: bool,
    /// Tap target when exactly one pin has new content; `None` opens the
    /// neutral pinned view.
    pub target: Option<PinId>,
}

impl NotificationPayload {
    fn idle(watching: usize) -> Self {
        Self {
            title: format!("Watching {}", count_noun(watching, "thread")),
            body: "No new posts".to_string(),
            expanded_lines: Vec::new(),
            light: false,
            sound: false,
            peek: false,
            alert: false,
            target: None,
        }
    }
}

/// Produces the current notification payload from all active watchers.
///
/// Reads and clears each watcher's transient new-post/new-quote flags, so one
/// burst of new posts alerts once and later passes fall back to a silent
/// refresh of the same content.
pub fn aggregate(
    manager: &mut PinManager,
    settings: &Settings,
    foreground: bool,
) -> NotificationPayload {
    let watching = if settings.watch_enabled {
        manager.watching_pin_ids()
    } else {
        Vec::new()
    };

    let mut unviewed_posts: Vec<(PinId, Post)> = Vec::new();
    let mut list_quoting: Vec<(PinId, Post)> = Vec::new();
    let mut subject_pins: Vec<PinId> = Vec::new();

    let mut light = false;
    let mut sound = false;
    let mut peek = false;

    for id in &watching {
        let Some((pin, watcher)) = manager.pin_and_watcher_mut(*id) else {
            continue;
        };
        if pin.is_error {
            continue;
        }

        let thread_title = pin.loadable.title.clone();
        let label = move |post: &Post| {
            let mut post = post.clone();
            if post.subject.is_empty() {
                post.subject = thread_title.clone();
            }
            post
        };

        if settings.notify_quotes_only {
            for post in watcher.unviewed_quotes(pin) {
                unviewed_posts.push((*id, label(post)));
                list_quoting.push((*id, label(post)));
            }
            if watcher.take_were_new_quotes() {
                light = true;
                sound = true;
                peek = true;
            }
            if pin.new_quote_count() > 0 {
                subject_pins.push(*id);
            }
        } else {
            for post in watcher.unviewed_posts(pin) {
                unviewed_posts.push((*id, label(post)));
            }
            for post in watcher.unviewed_quotes(pin) {
                list_quoting.push((*id, label(post)));
            }
            if watcher.take_were_new_posts() {
                light = true;
                if !settings.sound_quotes_only {
                    sound = true;
                    peek = true;
                }
            }
            if watcher.take_were_new_quotes() {
                sound = true;
                peek = true;
            }
            if pin.new_post_count() > 0 {
                subject_pins.push(*id);
            }
        }
    }

    // The user is already looking at the app.
    if foreground {
        light = false;
        sound = false;
    }

    if !settings.watch_peek {
        peek = false;
    }

    if unviewed_posts.is_empty() {
        return NotificationPayload::idle(watching.len());
    }

    let title = if settings.notify_quotes_only {
        format!("{} quoting you", count_noun(list_quoting.len(), "post"))
    } else if !list_quoting.is_empty() {
        format!(
            "{}, {} quoting you",
            count_noun(unviewed_posts.len(), "new post"),
            list_quoting.len()
        )
    } else {
        count_noun(unviewed_posts.len(), "new post")
    };

    let mut for_lines: Vec<Post> = if settings.notify_quotes_only {
        list_quoting.iter().map(|(_, p)| p.clone()).collect()
    } else {
        unviewed_posts.iter().map(|(_, p)| p.clone()).collect()
    };

    // Most recent first.
    for_lines.sort_by(|a, b| b.time.cmp(&a.time));
    for_lines.truncate(MAX_EXPANDED_LINES);

    let expanded_lines: Vec<String> = for_lines.iter().map(expanded_line).collect();
    let body = expanded_lines.join(", ");

    let target = if subject_pins.len() == 1 {
        Some(subject_pins[0])
    } else {
        None
    };

    NotificationPayload {
        title,
        body,
        expanded_lines,
        light,
        sound,
        peek,
        alert: true,
        target,
    }
}

/// Builds one expanded line: subject prefix, image marker, shortened comment.
fn expanded_line(post: &Post) -> String {
    let prefix: String = post.subject.chars().take(SUBJECT_LENGTH).collect();

    let mut comment = String::new();
    if post.image.is_some() {
        comment.push_str("(img) ");
    }
    comment.push_str(&post.comment);

    format!("{}: {}", prefix, shorten_quote_links(&comment))
}

/// Shortens `>>123456789` to `>789` so lines fit the collapsed presentation.
///
/// Only references of four or more digits shorten; the transform is idempotent
/// because its output no longer contains a `>>` prefix.
pub fn shorten_quote_links(text: &str) -> String {
    static SHORTEN: OnceLock<Regex> = OnceLock::new();
    let shorten = SHORTEN.get_or_init(|| Regex::new(r">>\d+(\d{3})").expect("shorten pattern"));
    shorten.replace_all(text, ">$1").into_owned()
}

fn count_noun(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("1 {}", noun)
    } else {
        format!("{} {}s", count, noun)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::model::{ImageKind, Loadable, PostImage, ThreadSnapshot};
    use crate::watch::{PinId, PinManager, WatchFlags};

    fn settings() -> Settings {
        Settings::default()
    }

    fn manager_with_thread(posts: Vec<Post>) -> (PinManager, PinId) {
        let mut manager = PinManager::new();
        let id = manager.create_pin(
            Loadable::new("4chan", "g", posts.first().map_or(1, |p| p.no), "general"),
            WatchFlags::default(),
        );
        apply(&mut manager, id, posts);
        (manager, id)
    }

    fn apply(manager: &mut PinManager, id: PinId, posts: Vec<Post>) {
        let snapshot = ThreadSnapshot {
            posts,
            archived: false,
            closed: false,
        };
        let (pin, watcher) = manager.pin_and_watcher_mut(id).expect("pin with watcher");
        watcher.apply_thread(pin, &snapshot);
    }

    fn posts(nos: std::ops::RangeInclusive<u64>) -> Vec<Post> {
        nos.map(|no| Post::new(no, "", format!("reply {no}"), no as i64))
            .collect()
    }

    #[test]
    fn all_viewed_pins_produce_idle_payload() {
        let (mut manager, _) = manager_with_thread(posts(1..=5));

        let payload = aggregate(&mut manager, &settings(), false);

        assert_eq!(payload.title, "Watching 1 thread");
        assert_eq!(payload.body, "No new posts");
        assert!(payload.expanded_lines.is_empty());
        assert!(!payload.light && !payload.sound && !payload.peek && !payload.alert);
        assert_eq!(payload.target, None);
    }

    #[test]
    fn watch_disabled_is_idle_with_zero_threads() {
        let (mut manager, _) = manager_with_thread(posts(1..=5));
        let mut settings = settings();
        settings.watch_enabled = false;

        let payload = aggregate(&mut manager, &settings, false);
        assert_eq!(payload.title, "Watching 0 threads");
    }

    #[test]
    fn new_posts_in_background_alert_fully() {
        let (mut manager, id) = manager_with_thread(posts(1..=5));
        apply(&mut manager, id, posts(1..=8));

        let payload = aggregate(&mut manager, &settings(), false);

        assert_eq!(payload.title, "3 new posts");
        assert_eq!(payload.expanded_lines.len(), 3);
        assert!(payload.light && payload.sound && payload.peek && payload.alert);
        assert_eq!(payload.target, Some(id));
    }

    #[test]
    fn foreground_suppresses_light_and_sound_but_not_content() {
        let (mut manager, id) = manager_with_thread(posts(1..=5));
        apply(&mut manager, id, posts(1..=8));

        let payload = aggregate(&mut manager, &settings(), true);

        assert!(!payload.light);
        assert!(!payload.sound);
        assert!(payload.alert);
        assert_eq!(payload.expanded_lines.len(), 3);
    }

    #[test]
    fn peek_setting_suppresses_peek() {
        let (mut manager, id) = manager_with_thread(posts(1..=5));
        apply(&mut manager, id, posts(1..=8));
        let mut settings = settings();
        settings.watch_peek = false;

        let payload = aggregate(&mut manager, &settings, false);
        assert!(!payload.peek);
        assert!(payload.sound);
    }

    #[test]
    fn errored_pin_is_skipped_entirely() {
        let (mut manager, id) = manager_with_thread(posts(1..=5));
        apply(&mut manager, id, posts(1..=8));
        {
            let (pin, _) = manager.pin_and_watcher_mut(id).unwrap();
            pin.is_error = true;
        }

        let payload = aggregate(&mut manager, &settings(), false);
        assert!(!payload.alert);
    }

    fn quote_thread(extra_quotes: u64) -> Vec<Post> {
        let mut thread = vec![Post::new(1, "op", "op", 1)];
        let mut own = Post::new(2, "", "mine", 2);
        own.is_saved_reply = true;
        thread.push(own);
        for i in 0..extra_quotes {
            thread.push(Post::new(10 + i, "", ">>2 hello", (10 + i) as i64));
        }
        thread
    }

    #[test]
    fn quotes_only_mode_counts_quotes_and_alerts() {
        let mut manager = PinManager::new();
        let id = manager.create_pin(Loadable::new("4chan", "g", 1, "general"), WatchFlags::default());
        apply(&mut manager, id, quote_thread(0));
        apply(&mut manager, id, quote_thread(2));

        let mut settings = settings();
        settings.notify_quotes_only = true;

        let payload = aggregate(&mut manager, &settings, false);

        assert_eq!(payload.title, "2 posts quoting you");
        assert!(payload.light && payload.sound && payload.peek);
        assert_eq!(payload.expanded_lines.len(), 2);
        assert_eq!(payload.target, Some(id));
    }

    #[test]
    fn sound_quotes_only_keeps_light_for_plain_posts() {
        let (mut manager, id) = manager_with_thread(posts(1..=5));
        apply(&mut manager, id, posts(1..=8));
        let mut settings = settings();
        settings.sound_quotes_only = true;

        let payload = aggregate(&mut manager, &settings, false);

        assert!(payload.light);
        assert!(!payload.sound);
        assert!(!payload.peek);
    }

    #[test]
    fn combined_title_mentions_quoting_count() {
        let mut manager = PinManager::new();
        let id = manager.create_pin(Loadable::new("4chan", "g", 1, "general"), WatchFlags::default());
        apply(&mut manager, id, quote_thread(0));
        apply(&mut manager, id, quote_thread(1));

        let payload = aggregate(&mut manager, &settings(), false);
        assert_eq!(payload.title, "1 new post, 1 quoting you");
    }

    #[test]
    fn no_target_when_two_pins_have_new_posts() {
        let mut manager = PinManager::new();
        let a = manager.create_pin(Loadable::new("4chan", "g", 1, "a"), WatchFlags::default());
        let b = manager.create_pin(Loadable::new("4chan", "v", 1, "b"), WatchFlags::default());
        apply(&mut manager, a, posts(1..=2));
        apply(&mut manager, a, posts(1..=3));
        apply(&mut manager, b, posts(1..=2));
        apply(&mut manager, b, posts(1..=3));

        let payload = aggregate(&mut manager, &settings(), false);
        assert_eq!(payload.target, None);
    }

    #[test]
    fn expanded_lines_are_capped_at_ten_most_recent() {
        let (mut manager, id) = manager_with_thread(posts(1..=5));
        apply(&mut manager, id, posts(1..=35));

        let payload = aggregate(&mut manager, &settings(), false);

        assert_eq!(payload.expanded_lines.len(), MAX_EXPANDED_LINES);
        // Most recent first: the newest post leads.
        assert!(payload.expanded_lines[0].contains("reply 35"));
        assert!(payload.expanded_lines[9].contains("reply 26"));
    }

    #[test]
    fn lines_sort_by_descending_timestamp() {
        let (mut manager, id) = manager_with_thread(vec![Post::new(1, "", "op", 100)]);
        apply(
            &mut manager,
            id,
            vec![
                Post::new(1, "", "op", 100),
                Post::new(2, "", "older", 50),
                Post::new(3, "", "newer", 200),
            ],
        );

        let payload = aggregate(&mut manager, &settings(), false);
        assert!(payload.expanded_lines[0].contains("newer"));
        assert!(payload.expanded_lines[1].contains("older"));
    }

    #[test]
    fn line_prefix_is_first_six_subject_chars() {
        let post = Post::new(7, "Technology General", "hello", 1);
        assert_eq!(expanded_line(&post), "Techno: hello");
    }

    #[test]
    fn line_marks_posts_with_images() {
        let mut post = Post::new(7, "thread", "nice", 1);
        post.image = Some(PostImage {
            url: "u".into(),
            thumbnail_url: "t".into(),
            filename: "f.jpg".into(),
            kind: ImageKind::Static,
            spoiler: false,
        });
        assert_eq!(expanded_line(&post), "thread: (img) nice");
    }

    #[test]
    fn shorten_keeps_last_three_digits() {
        assert_eq!(shorten_quote_links(">>123456789 check"), ">789 check");
        assert_eq!(shorten_quote_links("a >>1234 b >>5678901 c"), "a >234 b >901 c");
    }

    #[test]
    fn shorten_leaves_short_references_alone() {
        assert_eq!(shorten_quote_links(">>123"), ">>123");
        assert_eq!(shorten_quote_links(">>1"), ">>1");
    }

    #[test]
    fn shorten_is_idempotent() {
        let inputs = [">>123456789", ">>1234", "no refs here", ">>12345 and >>678"];
        for input in inputs {
            let once = shorten_quote_links(input);
            let twice = shorten_quote_links(&once);
            assert_eq!(once, twice, "not idempotent for {input:?}");
        }
    }
}
