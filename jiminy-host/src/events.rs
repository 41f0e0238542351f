//! Event bus with weakly held callbacks
//!
//! The bus never owns a callback. Whoever registers one keeps the `Arc`;
//! once the last `Arc` is dropped the callback silently stops firing and
//! its entry is pruned on the next [`EventBus::emit`].
//!
//! ```
//! use jiminy_host::events::{callback, EventBus};
//!
//! let bus = EventBus::new();
//! let on_save = callback(|args| {
//!     args.deny();
//!     Ok(())
//! });
//!
//! bus.before("save", &on_save);
//! assert!(!bus.emit("before_save", Vec::new()).is_allowed());
//!
//! drop(on_save);
//! assert!(bus.emit("before_save", Vec::new()).is_allowed());
//! ```

use crate::guard::isolate;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Signature of an event callback
pub type Callback = dyn Fn(&mut EventArgs) -> anyhow::Result<()> + Send + Sync;

/// Wrap a closure as a callback
pub fn callback<F>(f: F) -> Arc<Callback>
where
    F: Fn(&mut EventArgs) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Arguments handed to every callback of one emit
#[derive(Debug, Clone, PartialEq)]
pub struct EventArgs {
    pub args: Vec<Value>,
    allow: bool,
}

impl EventArgs {
    pub fn new(args: Vec<Value>) -> Self {
        Self { args, allow: true }
    }

    /// Veto the operation; only cancelable events look at this
    pub fn deny(&mut self) {
        self.allow = false;
    }

    pub fn allow(&mut self) {
        self.allow = true;
    }

    pub fn is_allowed(&self) -> bool {
        self.allow
    }
}

/// Token returned by [`EventBus::on`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    event: String,
    id: u64,
}

impl Subscription {
    pub fn event(&self) -> &str {
        &self.event
    }
}

struct Handler {
    id: u64,
    callback: Weak<Callback>,
}

#[derive(Default)]
struct BusInner {
    handlers: HashMap<String, Vec<Handler>>,
    next_id: u64,
}

/// Maps event names to weakly held callbacks
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<RwLock<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `callback` on `event`
    ///
    /// Registering the same callback twice for an event returns the
    /// existing subscription.
    pub fn on(&self, event: &str, callback: &Arc<Callback>) -> Subscription {
        let mut inner = self.inner.write();
        let id = inner.next_id;
        let handlers = inner.handlers.entry(event.to_string()).or_default();

        let weak = Arc::downgrade(callback);
        if let Some(existing) = handlers.iter().find(|h| Weak::ptr_eq(&h.callback, &weak)) {
            return Subscription {
                event: event.to_string(),
                id: existing.id,
            };
        }

        handlers.push(Handler { id, callback: weak });
        inner.next_id += 1;

        Subscription {
            event: event.to_string(),
            id,
        }
    }

    /// Register for `before_<event>`
    pub fn before(&self, event: &str, callback: &Arc<Callback>) -> Subscription {
        self.on(&format!("before_{event}"), callback)
    }

    /// Register for `after_<event>`
    pub fn after(&self, event: &str, callback: &Arc<Callback>) -> Subscription {
        self.on(&format!("after_{event}"), callback)
    }

    /// Remove a subscription; returns false if it was already gone
    pub fn off(&self, subscription: &Subscription) -> bool {
        let mut inner = self.inner.write();
        let Some(handlers) = inner.handlers.get_mut(&subscription.event) else {
            return false;
        };

        let before = handlers.len();
        handlers.retain(|h| h.id != subscription.id);
        handlers.len() != before
    }

    /// Trigger `event`
    ///
    /// Every live callback runs, in registration order, outside the lock so
    /// callbacks may register or emit themselves. A callback that fails or
    /// panics is logged and the rest still run.
    pub fn emit(&self, event: &str, args: Vec<Value>) -> EventArgs {
        let callbacks: Vec<Arc<Callback>> = {
            let mut inner = self.inner.write();
            match inner.handlers.get_mut(event) {
                Some(handlers) => {
                    handlers.retain(|h| h.callback.strong_count() > 0);
                    handlers.iter().filter_map(|h| h.callback.upgrade()).collect()
                }
                None => Vec::new(),
            }
        };

        tracing::trace!(event, callbacks = callbacks.len(), "Emitting event");

        let mut args = EventArgs::new(args);
        for callback in callbacks {
            if let Err(e) = isolate(event, || callback(&mut args)) {
                tracing::warn!(event, error = %format!("{e:#}"), "Event callback failed");
            }
        }

        args
    }

    /// Number of live callbacks for `event`
    pub fn listener_count(&self, event: &str) -> usize {
        self.inner
            .read()
            .handlers
            .get(event)
            .map(|handlers| {
                handlers
                    .iter()
                    .filter(|h| h.callback.strong_count() > 0)
                    .count()
            })
            .unwrap_or(0)
    }
}
