//! Notification hub for named events.
//!
//! An [`EventEmitter`] keeps, per event name, an ordered list of listeners plus
//! one "legacy" handler slot (the `onload` / `onreadystatechange` style
//! property). Listeners registered under `"*"` receive every event.
//!
//! Dispatch order for an event is:
//!
//! 1. the legacy handler of that name, if set
//! 2. the listeners of that name, in insertion order
//! 3. the wildcard listeners
//!
//! Listeners are identified by their `Arc` pointer: adding the same listener
//! twice is a no-op and removal needs the same `Arc`. The listener lists are
//! copied before dispatch, so a listener may add or remove listeners (or
//! dispatch other events) while it runs.
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Event name that matches every dispatched event.
pub const WILDCARD: &str = "*";

pub const LOAD_START: &str = "loadstart";
pub const PROGRESS: &str = "progress";
pub const ABORT: &str = "abort";
pub const ERROR: &str = "error";
pub const TIMEOUT: &str = "timeout";
pub const LOAD: &str = "load";
pub const LOAD_END: &str = "loadend";
pub const READY_STATE_CHANGE: &str = "readystatechange";

/// Events that mark a call as failed.
pub const ERROR_EVENTS: [&str; 3] = [ABORT, ERROR, TIMEOUT];

/// A callback attached to an [`EventEmitter`].
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Builds a [`Listener`] from a closure.
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&Event) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A dispatched event. Progress events carry byte counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    /// Event name (e.g. `"load"`)
    pub kind: String,
    pub length_computable: bool,
    pub loaded: u64,
    pub total: u64,
}

impl Event {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            length_computable: false,
            loaded: 0,
            total: 0,
        }
    }

    pub fn progress(kind: impl Into<String>, loaded: u64, total: Option<u64>) -> Self {
        Self {
            kind: kind.into(),
            length_computable: total.is_some(),
            loaded,
            total: total.unwrap_or(0),
        }
    }
}

#[derive(Default)]
struct EmitterState {
    listeners: HashMap<String, Vec<Listener>>,
    handlers: HashMap<String, Listener>,
}

/// Ordered, named-event subscriber lists. Cloning yields a handle to the same lists.
#[derive(Clone, Default)]
pub struct EventEmitter {
    state: Arc<Mutex<EmitterState>>,
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        let mut names: Vec<&String> = state.listeners.keys().collect();
        names.sort();
        f.debug_struct("EventEmitter")
            .field("events", &names)
            .field("handlers", &state.handlers.len())
            .finish()
    }
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, EmitterState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds a listener at `position` (default: end). A listener that is already
    /// registered for `event` is not added again.
    pub fn add_event_listener(&self, event: &str, listener: Listener, position: Option<usize>) {
        let mut state = self.lock();
        let list = state.listeners.entry(event.to_string()).or_default();
        if list.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            return;
        }
        let at = position.unwrap_or(list.len()).min(list.len());
        list.insert(at, listener);
    }

    /// Short for `add_event_listener(event, listener, None)`.
    pub fn on(&self, event: &str, listener: Listener) {
        self.add_event_listener(event, listener, None);
    }

    /// Removes one listener of `event`. Returns true when something was removed.
    pub fn remove_event_listener(&self, event: &str, listener: &Listener) -> bool {
        let mut state = self.lock();
        let Some(list) = state.listeners.get_mut(event) else {
            return false;
        };
        match list.iter().position(|l| Arc::ptr_eq(l, listener)) {
            Some(i) => {
                list.remove(i);
                true
            }
            None => false,
        }
    }

    /// Removes every listener of `event`.
    pub fn remove_all_listeners(&self, event: &str) {
        self.lock().listeners.remove(event);
    }

    /// Removes all listeners and legacy handlers.
    pub fn destroy(&self) {
        let mut state = self.lock();
        state.listeners.clear();
        state.handlers.clear();
    }

    /// Adds a listener that removes itself after its first call.
    pub fn once(&self, event: &str, listener: Listener) -> Listener {
        let slot: Arc<Mutex<Option<Weak<dyn Fn(&Event) + Send + Sync>>>> =
            Arc::new(Mutex::new(None));
        let state = Arc::downgrade(&self.state);
        let name = event.to_string();

        let wrapper_slot = slot.clone();
        let wrapper: Listener = Arc::new(move |ev: &Event| {
            let me = wrapper_slot
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take()
                .and_then(|w| w.upgrade());
            let Some(me) = me else {
                return;
            };
            if let Some(state) = state.upgrade() {
                EventEmitter { state }.remove_event_listener(&name, &me);
            }
            listener(ev);
        });

        *slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) =
            Some(Arc::downgrade(&wrapper));
        self.on(event, wrapper.clone());
        wrapper
    }

    /// Copy of the listeners registered for `event`.
    pub fn listeners(&self, event: &str) -> Vec<Listener> {
        self.lock()
            .listeners
            .get(event)
            .cloned()
            .unwrap_or_default()
    }

    /// True when `event` has a listener or a legacy handler.
    pub fn has(&self, event: &str) -> bool {
        let state = self.lock();
        state.handlers.contains_key(event)
            || state.listeners.get(event).is_some_and(|l| !l.is_empty())
    }

    /// Sets or clears the legacy handler slot of `event`.
    pub fn set_handler(&self, event: &str, handler: Option<Listener>) {
        let mut state = self.lock();
        match handler {
            Some(h) => {
                state.handlers.insert(event.to_string(), h);
            }
            None => {
                state.handlers.remove(event);
            }
        }
    }

    pub fn handler(&self, event: &str) -> Option<Listener> {
        self.lock().handlers.get(event).cloned()
    }

    /// Calls the legacy handler, the listeners and the wildcard listeners for `event`.
    pub fn dispatch_event(&self, event: &Event) {
        let (handler, targets) = {
            let state = self.lock();
            let handler = state.handlers.get(&event.kind).cloned();
            let mut targets = state.listeners.get(&event.kind).cloned().unwrap_or_default();
            if event.kind != WILDCARD {
                if let Some(any) = state.listeners.get(WILDCARD) {
                    targets.extend(any.iter().cloned());
                }
            }
            (handler, targets)
        };

        if let Some(handler) = handler {
            handler(event);
        }
        for listener in targets {
            listener(event);
        }
    }

    /// Dispatches an event without progress data.
    pub fn fire(&self, kind: &str) {
        self.dispatch_event(&Event::new(kind));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Listener) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log2 = log.clone();
        let make = move |tag: &str| {
            let log = log2.clone();
            let tag = tag.to_string();
            listener(move |ev: &Event| log.lock().unwrap().push(format!("{}:{}", tag, ev.kind)))
        };
        (log, make)
    }

    #[test]
    fn dispatch_order_handler_listeners_wildcard() {
        let emitter = EventEmitter::new();
        let (log, make) = recorder();

        emitter.on(WILDCARD, make("any"));
        emitter.on(LOAD, make("first"));
        emitter.on(LOAD, make("second"));
        emitter.set_handler(LOAD, Some(make("onload")));

        emitter.fire(LOAD);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["onload:load", "first:load", "second:load", "any:load"]
        );
    }

    #[test]
    fn duplicate_listener_is_ignored_and_position_is_honoured() {
        let emitter = EventEmitter::new();
        let (log, make) = recorder();
        let a = make("a");
        let b = make("b");

        emitter.on("x", a.clone());
        emitter.on("x", a.clone());
        emitter.add_event_listener("x", b, Some(0));
        assert_eq!(emitter.listeners("x").len(), 2);

        emitter.fire("x");
        assert_eq!(*log.lock().unwrap(), vec!["b:x", "a:x"]);
    }

    #[test]
    fn remove_and_destroy() {
        let emitter = EventEmitter::new();
        let (log, make) = recorder();
        let a = make("a");

        emitter.on("x", a.clone());
        assert!(emitter.has("x"));
        assert!(emitter.remove_event_listener("x", &a));
        assert!(!emitter.remove_event_listener("x", &a));
        assert!(!emitter.has("x"));

        emitter.on("x", make("b"));
        emitter.set_handler("y", Some(make("h")));
        emitter.destroy();
        emitter.fire("x");
        emitter.fire("y");
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn once_fires_a_single_time() {
        let emitter = EventEmitter::new();
        let (log, make) = recorder();

        emitter.once("x", make("once"));
        emitter.fire("x");
        emitter.fire("x");
        assert_eq!(*log.lock().unwrap(), vec!["once:x"]);
        assert!(emitter.listeners("x").is_empty());
    }

    #[test]
    fn listener_may_mutate_emitter_during_dispatch() {
        let emitter = EventEmitter::new();
        let (log, make) = recorder();
        let inner = emitter.clone();
        let late = make("late");
        emitter.on(
            "x",
            listener(move |_| {
                inner.on("x", late.clone());
            }),
        );

        emitter.fire("x");
        assert!(log.lock().unwrap().is_empty());
        emitter.fire("x");
        assert_eq!(*log.lock().unwrap(), vec!["late:x"]);
    }

    #[test]
    fn progress_event_fields() {
        let ev = Event::progress(PROGRESS, 10, Some(100));
        assert!(ev.length_computable);
        assert_eq!(ev.total, 100);

        let ev = Event::progress(PROGRESS, 10, None);
        assert!(!ev.length_computable);
    }
}
