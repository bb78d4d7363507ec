// SPDX-License-Identifier: MPL-2.0
//! `threadwatch` keeps bookmarked imageboard threads under watch.
//!
//! Pinned threads are polled over the board's JSON API, unseen replies and
//! quotes of the user's own posts are tracked per pin, and everything unseen
//! rolls up into a single notification payload. A gallery session state
//! machine drives the image viewer side: paging, low-res to full upgrades,
//! and one-ahead prefetching under a configurable auto-load policy.

#![doc(html_root_url = "https://docs.rs/threadwatch/0.3.0")]

pub mod config;
pub mod error;
pub mod fetch;
pub mod model;
pub mod notify;
pub mod viewer;
pub mod watch;
