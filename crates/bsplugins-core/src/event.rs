//! Change notifications for the plugin list.
//!
//! Mutating operations emit [`PluginEvent`]s into per-kind buffers while they
//! run. The list calls [`EventBus::deliver`] once the operation has finished,
//! so listeners only ever observe a consistent list.
//!
//! # Suppression
//!
//! Kinds can be suppressed via [`EventBus::suppress`]; suppressed events are
//! never buffered.

use crate::id::FileName;
use crate::plugin::PluginState;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginEvent {
    /// A plugin's priority changed.
    Moved {
        name: FileName,
        old_priority: usize,
        new_priority: usize,
    },
    /// Enabled state changed for one or more plugins.
    StateChanged {
        states: BTreeMap<FileName, PluginState>,
    },
    /// The list was rebuilt by a scan or cleared.
    Refreshed,
}

/// Discriminant tag for event types, used for suppression and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Moved,
    StateChanged,
    Refreshed,
}

const EVENT_KIND_COUNT: usize = 3;

impl PluginEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            PluginEvent::Moved { .. } => EventKind::Moved,
            PluginEvent::StateChanged { .. } => EventKind::StateChanged,
            PluginEvent::Refreshed => EventKind::Refreshed,
        }
    }
}

impl EventKind {
    fn index(self) -> usize {
        self as usize
    }
}

// ---------------------------------------------------------------------------
// Subscribers
// ---------------------------------------------------------------------------

/// A passive listener receives events read-only.
pub type PassiveListener = Box<dyn FnMut(&PluginEvent) + Send + Sync>;

/// Optional predicate that filters events for a subscriber.
pub type EventFilter = Box<dyn Fn(&PluginEvent) -> bool + Send + Sync>;

/// Priority level for event subscribers. Lower priorities run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SubscriberPriority {
    Pre = 0,
    Normal = 1,
    Post = 2,
}

struct SubscriberEntry {
    listener: PassiveListener,
    priority: SubscriberPriority,
    filter: Option<EventFilter>,
    insertion_order: u64,
}

impl std::fmt::Debug for SubscriberEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberEntry")
            .field("priority", &self.priority)
            .field(
                "filter",
                &if self.filter.is_some() {
                    "Some(<fn>)"
                } else {
                    "None"
                },
            )
            .field("insertion_order", &self.insertion_order)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Buffers events per kind until delivery.
#[derive(Debug, Default)]
pub struct EventBus {
    buffers: [Vec<PluginEvent>; EVENT_KIND_COUNT],
    suppressed: [bool; EVENT_KIND_COUNT],
    subscribers: [Vec<SubscriberEntry>; EVENT_KIND_COUNT],
    next_insertion_order: u64,
    total_emitted: [u64; EVENT_KIND_COUNT],
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppress an event kind, dropping anything already buffered for it.
    pub fn suppress(&mut self, kind: EventKind) {
        self.suppressed[kind.index()] = true;
        self.buffers[kind.index()].clear();
    }

    pub fn unsuppress(&mut self, kind: EventKind) {
        self.suppressed[kind.index()] = false;
    }

    pub fn is_suppressed(&self, kind: EventKind) -> bool {
        self.suppressed[kind.index()]
    }

    /// Buffer an event. No-op if its kind is suppressed.
    pub fn emit(&mut self, event: PluginEvent) {
        let idx = event.kind().index();
        if self.suppressed[idx] {
            return;
        }
        self.total_emitted[idx] += 1;
        self.buffers[idx].push(event);
    }

    /// Register a listener with Normal priority and no filter.
    pub fn on_passive(&mut self, kind: EventKind, listener: PassiveListener) {
        self.on_passive_filtered(kind, SubscriberPriority::Normal, None, listener);
    }

    pub fn on_passive_filtered(
        &mut self,
        kind: EventKind,
        priority: SubscriberPriority,
        filter: Option<EventFilter>,
        listener: PassiveListener,
    ) {
        let order = self.next_insertion_order;
        self.next_insertion_order += 1;
        let subscribers = &mut self.subscribers[kind.index()];
        subscribers.push(SubscriberEntry {
            listener,
            priority,
            filter,
            insertion_order: order,
        });
        subscribers.sort_by_key(|entry| (entry.priority, entry.insertion_order));
    }

    /// Deliver all buffered events, kind by kind, oldest first within a kind.
    pub fn deliver(&mut self) {
        for idx in 0..EVENT_KIND_COUNT {
            if self.buffers[idx].is_empty() {
                continue;
            }
            let events = std::mem::take(&mut self.buffers[idx]);
            for entry in &mut self.subscribers[idx] {
                for event in &events {
                    if let Some(filter) = &entry.filter
                        && !filter(event)
                    {
                        continue;
                    }
                    (entry.listener)(event);
                }
            }
        }
    }

    pub fn buffered_count(&self, kind: EventKind) -> usize {
        self.buffers[kind.index()].len()
    }

    /// Events emitted for a kind since creation, delivered or not.
    pub fn total_emitted(&self, kind: EventKind) -> u64 {
        self.total_emitted[kind.index()]
    }

    /// Drop buffered events. Subscribers and suppression are kept.
    pub fn clear_all(&mut self) {
        for buffer in &mut self.buffers {
            buffer.clear();
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn moved(name: &str, old: usize, new: usize) -> PluginEvent {
        PluginEvent::Moved {
            name: name.into(),
            old_priority: old,
            new_priority: new,
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> PassiveListener) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let make = move |tag: &str| -> PassiveListener {
            let sink = sink.clone();
            let tag = tag.to_string();
            Box::new(move |event: &PluginEvent| {
                sink.lock().unwrap().push(format!("{tag}:{:?}", event.kind()));
            })
        };
        (log, make)
    }

    #[test]
    fn delivers_in_emission_order() {
        let mut bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.on_passive(
            EventKind::Moved,
            Box::new(move |e: &PluginEvent| {
                if let PluginEvent::Moved { name, .. } = e {
                    sink.lock().unwrap().push(name.to_string());
                }
            }),
        );
        bus.emit(moved("B.esp", 2, 1));
        bus.emit(moved("A.esp", 1, 2));
        assert_eq!(bus.buffered_count(EventKind::Moved), 2);
        bus.deliver();
        assert_eq!(*seen.lock().unwrap(), ["B.esp", "A.esp"]);
        assert_eq!(bus.buffered_count(EventKind::Moved), 0);
    }

    #[test]
    fn suppressed_kinds_are_not_buffered() {
        let mut bus = EventBus::new();
        bus.emit(PluginEvent::Refreshed);
        bus.suppress(EventKind::Refreshed);
        assert_eq!(bus.buffered_count(EventKind::Refreshed), 0);
        bus.emit(PluginEvent::Refreshed);
        assert_eq!(bus.buffered_count(EventKind::Refreshed), 0);
        assert_eq!(bus.total_emitted(EventKind::Refreshed), 1);

        bus.unsuppress(EventKind::Refreshed);
        bus.emit(PluginEvent::Refreshed);
        assert_eq!(bus.buffered_count(EventKind::Refreshed), 1);
    }

    #[test]
    fn priorities_then_registration_order() {
        let (log, make) = recorder();
        let mut bus = EventBus::new();
        bus.on_passive_filtered(EventKind::Refreshed, SubscriberPriority::Post, None, make("post"));
        bus.on_passive(EventKind::Refreshed, make("normal-1"));
        bus.on_passive_filtered(EventKind::Refreshed, SubscriberPriority::Pre, None, make("pre"));
        bus.on_passive(EventKind::Refreshed, make("normal-2"));
        bus.emit(PluginEvent::Refreshed);
        bus.deliver();
        assert_eq!(
            *log.lock().unwrap(),
            [
                "pre:Refreshed",
                "normal-1:Refreshed",
                "normal-2:Refreshed",
                "post:Refreshed"
            ]
        );
    }

    #[test]
    fn filters_skip_events() {
        let count = Arc::new(Mutex::new(0));
        let sink = count.clone();
        let mut bus = EventBus::new();
        bus.on_passive_filtered(
            EventKind::Moved,
            SubscriberPriority::Normal,
            Some(Box::new(|e: &PluginEvent| {
                matches!(e, PluginEvent::Moved { new_priority, .. } if *new_priority > 1)
            })),
            Box::new(move |_: &PluginEvent| *sink.lock().unwrap() += 1),
        );
        bus.emit(moved("A.esp", 0, 1));
        bus.emit(moved("B.esp", 1, 2));
        bus.deliver();
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn clear_all_keeps_subscribers() {
        let (log, make) = recorder();
        let mut bus = EventBus::new();
        bus.on_passive(EventKind::StateChanged, make("s"));
        bus.emit(PluginEvent::StateChanged {
            states: BTreeMap::new(),
        });
        bus.clear_all();
        bus.deliver();
        assert!(log.lock().unwrap().is_empty());

        bus.emit(PluginEvent::StateChanged {
            states: BTreeMap::new(),
        });
        bus.deliver();
        assert_eq!(log.lock().unwrap().len(), 1);
    }
}
