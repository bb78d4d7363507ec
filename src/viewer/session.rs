// SPDX-License-Identifier: MPL-2.0
//! Image viewer paging state machine.
//!
//! A [`ViewerSession`] tracks which image of a gallery is centered, drives the
//! enter/exit transitions, upgrades images from their low-resolution preview
//! according to the auto-load policy, and prefetches the next image. The host
//! renders; the session only decides what to request and when visibility may
//! swap.
//!
//! The host must not treat the session as closed until
//! [`ViewerSession::on_out_transition_end`] fires: the same backing surface is
//! shared between the thumbnail and the full image during the exit transition.

use crate::config::{NetworkKind, Settings};
use crate::model::{ImageKind, PostImage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::trace;

/// How far ahead of the centered image to prefetch.
const PRELOAD_DISTANCE: usize = 1;

/// Display mode of one gallery slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    /// Thumbnail-quality preview. Every image starts here.
    LowRes,
    BigImage,
    Gif,
    Video,
    /// Anything the pager renders in an embedded frame.
    Other,
}

/// Rendering surface the session drives.
pub trait ViewerHost {
    /// Requests an image be (re)loaded in the given mode. `center` is true for
    /// the selected slot.
    fn set_image_mode(&mut self, image: &PostImage, mode: ViewMode, center: bool);
    fn set_title(&mut self, image: &PostImage, index: usize, count: usize, spoiler: bool);
    fn scroll_to_image(&mut self, image: &PostImage);
    fn start_preview_in(&mut self, image: &PostImage);
    fn start_preview_out(&mut self, image: &PostImage);
    fn set_preview_visible(&mut self, visible: bool);
    fn set_pager_visible(&mut self, visible: bool);
    fn show_progress(&mut self, visible: bool);
    fn on_load_progress(&mut self, progress: f32);
    /// Volume and download indicators reset on every page change.
    fn reset_page_indicators(&mut self);
    fn on_session_closed(&mut self);
}

/// On-device cache lookup for already-fetched media.
pub trait ImageCache {
    fn exists(&self, url: &str) -> bool;
}

/// Starts background downloads for images about to be viewed.
pub trait Prefetcher {
    /// Begins fetching, or returns `None` when there is nothing to do (for
    /// example the bytes are already cached).
    fn prefetch(&mut self, image: &PostImage) -> Option<PrefetchHandle>;
}

/// Cancellable handle for one in-flight prefetch.
///
/// Cancellation is cooperative: the flag is shared with the download task,
/// which checks it before delivering bytes. A late result for a cancelled
/// prefetch must be dropped, not applied.
#[derive(Debug, Clone)]
pub struct PrefetchHandle {
    url: String,
    cancelled: Arc<AtomicBool>,
}

impl PrefetchHandle {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Shared flag for the download task to poll.
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// State machine for one gallery viewing session.
pub struct ViewerSession {
    host: Box<dyn ViewerHost>,
    cache: Box<dyn ImageCache>,
    prefetcher: Box<dyn Prefetcher>,
    settings: Settings,
    network: NetworkKind,
    /// All media of the session's thread is stored locally.
    local: bool,

    images: Vec<PostImage>,
    selected: usize,
    /// Load progress per image; `-1.0` means not loading.
    progress: Vec<f32>,
    /// Last mode the host reported loaded, per image.
    modes: Vec<Option<ViewMode>>,
    preloads: Vec<PrefetchHandle>,

    entering: bool,
    exiting: bool,
    closed: bool,
    pager_visible: bool,
    /// The first low-res finished before the enter transition did; swap
    /// visibility when the transition ends instead.
    swap_on_in_transition_end: bool,
}

impl ViewerSession {
    pub fn new(
        host: Box<dyn ViewerHost>,
        cache: Box<dyn ImageCache>,
        prefetcher: Box<dyn Prefetcher>,
        settings: Settings,
        network: NetworkKind,
        local: bool,
    ) -> Self {
        Self {
            host,
            cache,
            prefetcher,
            settings,
            network,
            local,
            images: Vec::new(),
            selected: 0,
            progress: Vec::new(),
            modes: Vec::new(),
            preloads: Vec::new(),
            entering: true,
            exiting: false,
            closed: false,
            pager_visible: false,
            swap_on_in_transition_end: false,
        }
    }

    /// Opens the gallery on `images`, centering on `start` clamped into range.
    ///
    /// The starting image is requested at low resolution immediately, before
    /// any transition runs, so the side pages are not loaded twice.
    pub fn show_images(&mut self, images: Vec<PostImage>, start: isize) {
        if images.is_empty() {
            self.closed = true;
            self.host.on_session_closed();
            return;
        }

        self.selected = start.clamp(0, images.len() as isize - 1) as usize;
        self.progress = vec![-1.0; images.len()];
        self.modes = vec![None; images.len()];
        self.images = images;

        let center = self.images[self.selected].clone();
        self.host.set_image_mode(&center, ViewMode::LowRes, true);
    }

    /// The pager is measured but still invisible; start the preview-in
    /// transition. Ignored once the session closed, which an empty gallery
    /// does before any view exists.
    pub fn on_view_measured(&mut self) {
        if self.closed {
            return;
        }
        let image = self.images[self.selected].clone();
        self.host.start_preview_in(&image);
        self.set_title();
    }

    /// The enter transition finished.
    pub fn on_in_transition_end(&mut self) {
        self.entering = false;
        if self.swap_on_in_transition_end {
            self.swap_on_in_transition_end = false;
            self.host.set_preview_visible(false);
            self.host.set_pager_visible(true);
        }
    }

    /// The host finished loading `url` in `mode`.
    pub fn on_mode_loaded(&mut self, url: &str, mode: ViewMode) {
        if self.exiting || self.closed {
            return;
        }
        let Some(index) = self.index_of(url) else {
            return;
        };
        self.modes[index] = Some(mode);
        self.progress[index] = -1.0;

        if mode == ViewMode::LowRes {
            if !self.pager_visible {
                self.pager_visible = true;
                if self.entering {
                    // Swap at most once, never before the transition ends.
                    self.swap_on_in_transition_end = true;
                } else {
                    self.host.set_preview_visible(false);
                    self.host.set_pager_visible(true);
                }
                self.request_neighbor_lowres();
                self.on_low_res_in_center();
            } else if index == self.selected {
                self.on_low_res_in_center();
            }
        } else if index == self.selected {
            self.set_title();
        }
    }

    /// The user swiped to page `position`.
    pub fn on_page_selected(&mut self, position: usize) {
        if !self.pager_visible || self.exiting || self.closed {
            return;
        }
        let position = position.min(self.images.len() - 1);
        if position == self.selected {
            return;
        }
        self.selected = position;
        trace!(position, "page selected");

        self.host.reset_page_indicators();
        self.set_title();
        let image = self.images[self.selected].clone();
        self.host.scroll_to_image(&image);
        self.request_neighbor_lowres();
        self.cancel_stale_preloads();

        if self.modes[self.selected] == Some(ViewMode::LowRes) {
            self.on_low_res_in_center();
        }
    }

    /// Progress report for a loading image. Only the centered image surfaces
    /// progress to the host.
    pub fn on_load_progress(&mut self, url: &str, progress: f32) {
        let Some(index) = self.index_of(url) else {
            return;
        };
        self.progress[index] = progress;
        if index == self.selected && !self.exiting {
            self.host.show_progress(true);
            self.host.on_load_progress(progress);
        }
    }

    /// A load failed. Never fatal: the slot keeps its low-res placeholder and
    /// its progress indicator clears.
    pub fn on_load_failure(&mut self, url: &str) {
        let Some(index) = self.index_of(url) else {
            return;
        };
        self.progress[index] = -1.0;
        if index == self.selected && !self.exiting {
            self.host.show_progress(false);
        }
    }

    /// A prefetch completed; its handle leaves the in-flight set.
    pub fn on_prefetch_done(&mut self, url: &str) {
        self.preloads.retain(|handle| handle.url() != url);
    }

    /// Begins the exit transition. Ignored while entering or already exiting.
    pub fn on_exit(&mut self) {
        if self.entering || self.exiting || self.closed {
            return;
        }
        self.exiting = true;

        let image = self.images[self.selected].clone();
        if image.kind == ImageKind::Movie {
            // Drop the player back to the thumbnail before transitioning out.
            self.host.set_image_mode(&image, ViewMode::LowRes, true);
        }

        self.host.reset_page_indicators();
        self.host.set_pager_visible(false);
        self.host.set_preview_visible(true);
        self.host.start_preview_out(&image);
        self.host.show_progress(false);

        for handle in self.preloads.drain(..) {
            handle.cancel();
        }
    }

    /// The exit transition finished; only now is the session closed.
    pub fn on_out_transition_end(&mut self) {
        if !self.exiting || self.closed {
            return;
        }
        self.closed = true;
        self.host.on_session_closed();
    }

    #[must_use]
    pub fn selected_position(&self) -> usize {
        self.selected
    }

    #[must_use]
    pub fn current_image(&self) -> Option<&PostImage> {
        self.images.get(self.selected)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Urls of in-flight prefetches.
    #[must_use]
    pub fn preload_urls(&self) -> Vec<&str> {
        self.preloads.iter().map(PrefetchHandle::url).collect()
    }

    /// A low-res image reached the center: evaluate the upgrade policy, then
    /// prefetch the next image.
    fn on_low_res_in_center(&mut self) {
        let image = self.images[self.selected].clone();

        let spoiler_blocked = image.spoiler && !self.settings.reveal_image_spoilers;
        if self.image_auto_load(&image) && !spoiler_blocked {
            match image.kind {
                ImageKind::Static => self.host.set_image_mode(&image, ViewMode::BigImage, true),
                ImageKind::Gif => self.host.set_image_mode(&image, ViewMode::Gif, true),
                ImageKind::Movie => {
                    if self.video_auto_load(&image) {
                        self.host.set_image_mode(&image, ViewMode::Video, true);
                    }
                }
                ImageKind::Iframe => self.host.set_image_mode(&image, ViewMode::Other, true),
            }
        }

        self.preload_next();
    }

    /// Prefetches the image one position ahead, policy permitting. The
    /// in-flight set doubles as a dedup guard.
    fn preload_next(&mut self) {
        let index = self.selected + PRELOAD_DISTANCE;
        let Some(image) = self.images.get(index).cloned() else {
            return;
        };

        let allowed = match image.kind {
            ImageKind::Movie => self.video_auto_load(&image),
            _ => self.image_auto_load(&image),
        };
        if !allowed {
            return;
        }
        if self.preloads.iter().any(|h| h.url() == image.url) {
            return;
        }

        if let Some(handle) = self.prefetcher.prefetch(&image) {
            self.preloads.push(handle);
        }
    }

    /// Cancels every in-flight prefetch whose target is not the image one
    /// ahead of the new selection.
    fn cancel_stale_preloads(&mut self) {
        let keep_url = self
            .images
            .get(self.selected + PRELOAD_DISTANCE)
            .map(|image| image.url.clone());

        self.preloads.retain(|handle| {
            if Some(handle.url()) == keep_url.as_deref() {
                true
            } else {
                trace!(url = handle.url(), "prefetch cancelled");
                handle.cancel();
                false
            }
        });
    }

    fn request_neighbor_lowres(&mut self) {
        for index in [
            self.selected.checked_sub(1),
            self.selected.checked_add(1),
        ]
        .into_iter()
        .flatten()
        {
            if let Some(image) = self.images.get(index).cloned() {
                self.host.set_image_mode(&image, ViewMode::LowRes, false);
            }
        }
    }

    fn set_title(&mut self) {
        let image = self.images[self.selected].clone();
        self.host
            .set_title(&image, self.selected, self.images.len(), image.spoiler);
    }

    fn index_of(&self, url: &str) -> Option<usize> {
        self.images.iter().position(|image| image.url == url)
    }

    fn image_auto_load(&self, image: &PostImage) -> bool {
        // Local media needs no network policy; cached media is free to show.
        self.local
            || self.cache.exists(&image.url)
            || self.settings.image_auto_load.allows(self.network)
    }

    fn video_auto_load(&self, image: &PostImage) -> bool {
        self.local
            || self.cache.exists(&image.url)
            || self.settings.video_auto_load.allows(self.network)
    }
}

impl std::fmt::Debug for ViewerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewerSession")
            .field("images", &self.images.len())
            .field("selected", &self.selected)
            .field("entering", &self.entering)
            .field("exiting", &self.exiting)
            .field("closed", &self.closed)
            .field("pager_visible", &self.pager_visible)
            .field("preloads", &self.preloads.len())
            .finish()
    }
}
