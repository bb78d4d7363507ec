// SPDX-License-Identifier: MPL-2.0
//! Gallery viewer: the paging state machine and its media cache.

pub mod cache;
pub mod session;

pub use cache::{CacheConfig, CacheStats, MediaCache};
pub use session::{
    ImageCache, PrefetchHandle, Prefetcher, ViewMode, ViewerHost, ViewerSession,
};
