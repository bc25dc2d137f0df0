//! Keyed publish/subscribe registry
//!
//! The client fires its lifecycle events (`connect`, `auth`, `ready`,
//! `close`) and every host pushed event through an [`EventChannel`]. Keys are
//! plain strings and matched exactly; a listener that wants everything must
//! be registered under each key it cares about.
//!
//! Listeners receive the channel owner (the client) and the event arguments.
//! `emit` works on a snapshot of the listener list, so a listener may
//! subscribe or unsubscribe (itself included) without disturbing the emit in
//! progress. A failing listener is reported and the remaining listeners still
//! run.
//!
//! # Examples
//!
//! ```rust
//! use bellite_core::EventChannel;
//! use serde_json::json;
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let channel: EventChannel<&str> = EventChannel::new();
//! let hits = Rc::new(Cell::new(0));
//!
//! let counter = Rc::clone(&hits);
//! channel.subscribe("ping", move |_owner, args| {
//!     counter.set(counter.get() + args.len());
//!     Ok(())
//! });
//!
//! assert_eq!(channel.emit(&"owner", "ping", &[json!({"x": 1})]), 1);
//! assert_eq!(channel.emit(&"owner", "other", &[]), 0);
//! assert_eq!(hits.get(), 1);
//! ```

use crate::error::Result;
use crate::report::ErrorReporter;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// A registered callback
///
/// Keep the handle returned by [`EventChannel::subscribe`] to remove the
/// listener later; handles are compared by identity.
pub type Listener<O> = Rc<dyn Fn(&O, &[Value]) -> Result<()>>;

/// Event key to ordered listeners
pub struct EventChannel<O> {
    listeners: RefCell<HashMap<String, Vec<Listener<O>>>>,
    reporter: ErrorReporter,
}

impl<O> EventChannel<O> {
    pub fn new() -> Self {
        Self::with_reporter(ErrorReporter::default())
    }

    /// Channel whose listener failures go to `reporter`
    pub fn with_reporter(reporter: ErrorReporter) -> Self {
        Self {
            listeners: RefCell::new(HashMap::new()),
            reporter,
        }
    }

    /// Append a listener for `key` and return its handle
    pub fn subscribe<F>(&self, key: impl Into<String>, listener: F) -> Listener<O>
    where
        F: Fn(&O, &[Value]) -> Result<()> + 'static,
    {
        self.subscribe_listener(key, Rc::new(listener))
    }

    /// Append an existing listener handle for `key`
    ///
    /// The same handle may be registered under several keys.
    pub fn subscribe_listener(&self, key: impl Into<String>, listener: Listener<O>) -> Listener<O> {
        self.listeners
            .borrow_mut()
            .entry(key.into())
            .or_default()
            .push(Rc::clone(&listener));
        listener
    }

    /// Remove the first registration of `listener` under `key`
    pub fn unsubscribe(&self, key: &str, listener: &Listener<O>) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let Some(list) = listeners.get_mut(key) else {
            return false;
        };
        let Some(index) = list.iter().position(|l| Rc::ptr_eq(l, listener)) else {
            return false;
        };
        list.remove(index);
        if list.is_empty() {
            listeners.remove(key);
        }
        true
    }

    /// Invoke every listener of `key` with `owner` and `args`
    ///
    /// Returns how many listeners ran.
    pub fn emit(&self, owner: &O, key: &str, args: &[Value]) -> usize {
        let snapshot: Vec<Listener<O>> = match self.listeners.borrow().get(key) {
            Some(list) => list.clone(),
            None => return 0,
        };

        for listener in &snapshot {
            if let Err(error) = listener(owner, args) {
                self.reporter.report(key, &error);
            }
        }
        snapshot.len()
    }

    pub fn listener_count(&self, key: &str) -> usize {
        self.listeners.borrow().get(key).map_or(0, Vec::len)
    }

    /// Keys with at least one listener
    pub fn keys(&self) -> Vec<String> {
        self.listeners.borrow().keys().cloned().collect()
    }

    /// Remove every listener of `key`
    pub fn clear(&self, key: &str) -> usize {
        self.listeners
            .borrow_mut()
            .remove(key)
            .map_or(0, |list| list.len())
    }
}

impl<O> Default for EventChannel<O> {
    fn default() -> Self {
        Self::new()
    }
}
