// SPDX-License-Identifier: MPL-2.0
//! Pin list management.
//!
//! The `PinManager` owns every [`Pin`] and its [`PinWatcher`], and is the only
//! place pin state is mutated. Consumers observe mutations through an explicit
//! subscriber registry; delivery is synchronous on the mutating call, in
//! registration order.

use crate::model::Loadable;
use crate::watch::pin::{Pin, PinId, WatchFlags};
use crate::watch::watcher::PinWatcher;
use std::collections::HashMap;
use tracing::debug;

/// A pin list mutation, delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinEvent {
    Added(PinId),
    Removed(PinId),
    Changed(PinId),
    /// Several pins changed at once (bulk delete, reorder, pause).
    BulkChanged,
}

/// Handle for removing a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn FnMut(&PinEvent) + Send>;

/// Owns the pin list, the per-pin watchers, and the event subscribers.
#[derive(Default)]
pub struct PinManager {
    pins: Vec<Pin>,
    watchers: HashMap<PinId, PinWatcher>,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_pin_id: u64,
    next_subscription_id: u64,
}

impl PinManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber for pin events.
    pub fn subscribe(&mut self, f: impl FnMut(&PinEvent) + Send + 'static) -> SubscriptionId {
        self.next_subscription_id += 1;
        let id = SubscriptionId(self.next_subscription_id);
        self.subscribers.push((id, Box::new(f)));
        id
    }

    /// Removes a subscriber. Returns `true` if it was registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    fn emit(&mut self, event: PinEvent) {
        for (_, subscriber) in &mut self.subscribers {
            subscriber(&event);
        }
    }

    /// Creates a pin for a thread, or returns the existing pin when the thread
    /// is already pinned.
    pub fn create_pin(&mut self, loadable: Loadable, flags: WatchFlags) -> PinId {
        if let Some(existing) = self.pins.iter().find(|p| p.loadable == loadable) {
            return existing.id;
        }

        self.next_pin_id += 1;
        let id = PinId(self.next_pin_id);
        let mut pin = Pin::new(id, loadable, flags);
        debug!(pin = %id, loadable = %pin.loadable, "pin created");

        // New pins go to the top; everything else moves down one.
        pin.order = 0;
        for p in &mut self.pins {
            p.order += 1;
        }
        self.pins.push(pin);
        self.normalize_orders();
        self.sync_watchers();

        self.emit(PinEvent::Added(id));
        id
    }

    /// Deletes a pin; the removed value supports a single-item undo.
    pub fn delete_pin(&mut self, id: PinId) -> Option<Pin> {
        let index = self.pins.iter().position(|p| p.id == id)?;
        let pin = self.pins.remove(index);
        self.watchers.remove(&id);
        self.normalize_orders();
        debug!(pin = %id, "pin deleted");

        self.emit(PinEvent::Removed(id));
        Some(pin)
    }

    /// Deletes several pins; the removed list supports one combined undo.
    pub fn delete_pins(&mut self, ids: &[PinId]) -> Vec<Pin> {
        let mut removed = Vec::new();
        self.pins.retain(|p| {
            if ids.contains(&p.id) {
                removed.push(p.clone());
                false
            } else {
                true
            }
        });
        for pin in &removed {
            self.watchers.remove(&pin.id);
        }
        if !removed.is_empty() {
            self.normalize_orders();
            self.emit(PinEvent::BulkChanged);
        }
        removed
    }

    /// Restores previously deleted pins (undo). Pins whose thread was pinned
    /// again in the meantime are skipped.
    pub fn restore_pins(&mut self, pins: Vec<Pin>) {
        let mut restored_any = false;
        for pin in pins {
            if self.pins.iter().any(|p| p.loadable == pin.loadable) {
                continue;
            }
            self.pins.push(pin);
            restored_any = true;
        }
        if restored_any {
            self.pins.sort_by_key(|p| p.order);
            self.normalize_orders();
            self.sync_watchers();
            self.emit(PinEvent::BulkChanged);
        }
    }

    /// Removes bulk-clear candidates and returns them for one combined undo.
    ///
    /// With `all` false, only pins that are no longer useful are candidates:
    /// not watching, archived, or errored.
    pub fn clear_pins(&mut self, all: bool) -> Vec<Pin> {
        let ids: Vec<PinId> = self
            .pins
            .iter()
            .filter(|p| all || !p.watching || p.archived || p.is_error)
            .map(|p| p.id)
            .collect();
        self.delete_pins(&ids)
    }

    /// Stops watching on every pin.
    pub fn pause_all(&mut self) {
        for pin in &mut self.pins {
            pin.watching = false;
        }
        self.sync_watchers();
        self.emit(PinEvent::BulkChanged);
    }

    /// Resumes watching on every non-errored, non-archived pin.
    pub fn resume_all(&mut self) {
        for pin in &mut self.pins {
            if !pin.is_error && !pin.archived {
                pin.watching = true;
            }
        }
        self.sync_watchers();
        self.emit(PinEvent::BulkChanged);
    }

    /// Starts or stops watching one pin.
    pub fn set_watching(&mut self, id: PinId, watching: bool) {
        let Some(pin) = self.pins.iter_mut().find(|p| p.id == id) else {
            return;
        };
        if pin.watching == watching {
            return;
        }
        pin.watching = watching;
        self.sync_watchers();
        self.emit(PinEvent::Changed(id));
    }

    /// Applies an explicit display order. Ids not in the list keep their
    /// relative order after the listed ones; orders come out contiguous.
    pub fn set_order(&mut self, ordered_ids: &[PinId]) {
        let rank = |id: PinId| {
            ordered_ids
                .iter()
                .position(|i| *i == id)
                .unwrap_or(ordered_ids.len())
        };
        self.pins.sort_by_key(|p| (rank(p.id), p.order));
        // Renumber in place; normalize_orders would re-sort by the stale
        // order fields and undo the explicit ranking.
        for (i, pin) in self.pins.iter_mut().enumerate() {
            pin.order = i;
        }
        self.emit(PinEvent::BulkChanged);
    }

    /// Marks a thread as viewed by the user: view markers catch up, unviewed
    /// lists empty.
    pub fn on_viewed(&mut self, id: PinId) {
        let Some(index) = self.pins.iter().position(|p| p.id == id) else {
            return;
        };
        if let Some(watcher) = self.watchers.get_mut(&id) {
            watcher.on_viewed(&mut self.pins[index]);
        } else {
            let pin = &mut self.pins[index];
            if pin.watch_new_count.is_some() {
                pin.watch_last_count = pin.watch_new_count;
            }
            if pin.quote_new_count.is_some() {
                pin.quote_last_count = pin.quote_new_count;
            }
        }
        self.emit(PinEvent::Changed(id));
    }

    /// All pins in display order.
    #[must_use]
    pub fn pins(&self) -> &[Pin] {
        &self.pins
    }

    #[must_use]
    pub fn pin(&self, id: PinId) -> Option<&Pin> {
        self.pins.iter().find(|p| p.id == id)
    }

    #[must_use]
    pub fn find_by_loadable(&self, loadable: &Loadable) -> Option<&Pin> {
        self.pins.iter().find(|p| &p.loadable == loadable)
    }

    /// Ids of pins that are actively watching.
    #[must_use]
    pub fn watching_pin_ids(&self) -> Vec<PinId> {
        self.pins
            .iter()
            .filter(|p| p.watching)
            .map(|p| p.id)
            .collect()
    }

    #[must_use]
    pub fn watcher(&self, id: PinId) -> Option<&PinWatcher> {
        self.watchers.get(&id)
    }

    /// Mutable access for the coordinator and the aggregator, which read and
    /// clear the transient flags.
    pub(crate) fn pin_and_watcher_mut(
        &mut self,
        id: PinId,
    ) -> Option<(&mut Pin, &mut PinWatcher)> {
        let pin = self.pins.iter_mut().find(|p| p.id == id)?;
        let watcher = self.watchers.get_mut(&id)?;
        Some((pin, watcher))
    }

    /// Notifies subscribers that a pin changed outside of a CRUD call (for
    /// example after a poll was applied).
    pub(crate) fn notify_changed(&mut self, id: PinId) {
        self.emit(PinEvent::Changed(id));
    }

    /// Creates watchers for pins that should be watched and drops the rest.
    fn sync_watchers(&mut self) {
        for pin in &self.pins {
            let wants_watcher = pin.watching && pin.flags.watch_new_posts;
            if wants_watcher && !self.watchers.contains_key(&pin.id) {
                debug!(pin = %pin.id, "watcher created");
                self.watchers.insert(pin.id, PinWatcher::new());
            } else if !wants_watcher && self.watchers.contains_key(&pin.id) {
                debug!(pin = %pin.id, "watcher destroyed");
                self.watchers.remove(&pin.id);
            }
        }
    }

    fn normalize_orders(&mut self) {
        self.pins.sort_by_key(|p| p.order);
        for (i, pin) in self.pins.iter_mut().enumerate() {
            pin.order = i;
        }
    }
}

impl std::fmt::Debug for PinManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinManager")
            .field("pins", &self.pins.len())
            .field("watchers", &self.watchers.len())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
