// SPDX-License-Identifier: MPL-2.0
//! Thread watching: pins, per-pin pollers, and the coordinator that drives them.

mod manager;
mod pin;
mod poller;
mod watcher;

pub use manager::{PinEvent, PinManager, SubscriptionId};
pub use pin::{Pin, PinId, WatchFlags};
pub use poller::{PollOutcome, ThreadFetcher, WatchCoordinator};
pub use watcher::{PinWatcher, ThreadDelta};
