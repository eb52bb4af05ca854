//! In-process property watchers.
//!
//! Scope:
//! - PropertyStore publishes an event after each successful non-silent
//!   write (`skip_notify == false`); silent writes publish nothing and
//!   watchers catch up on their own refresh cycle.
//! - Subscribe by name prefix ("" matches everything).
//! - Drop of WatchHandle unsubscribes.
//!
//! Notes:
//! - Callbacks run synchronously in the writing thread, outside the registry lock.
//!   Keep them fast; spawn a thread for heavy work.
//! - Cross-process consumers use `LiveStore::notify` instead (e.g. the area serial).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// A single change:
/// - value: Some(v) for set; None for delete/blank
/// - serial: per-registry monotonic counter
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropEvent {
    pub name: String,
    pub value: Option<String>,
    pub serial: u64,
}

pub type Callback = Arc<dyn Fn(&PropEvent) + Send + Sync + 'static>;

#[derive(Default)]
struct WatchInner {
    next_id: u64,
    subs: HashMap<u64, (String, Callback)>, // id -> (prefix, cb)
}

#[derive(Default)]
pub struct WatchRegistry {
    inner: Mutex<WatchInner>,
    serial: AtomicU64,
}

impl WatchRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Watch names starting with `prefix`. Dropping the handle unsubscribes.
    pub fn subscribe(self: &Arc<Self>, prefix: &str, cb: Callback) -> WatchHandle {
        let mut g = match self.inner.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        let id = g.next_id;
        g.next_id = g.next_id.wrapping_add(1);
        g.subs.insert(id, (prefix.to_string(), cb));
        drop(g);
        WatchHandle {
            id,
            reg: Arc::downgrade(self),
        }
    }

    /// Publish a change; returns the number of callbacks invoked.
    pub fn publish(&self, name: &str, value: Option<&str>) -> usize {
        let ev = PropEvent {
            name: name.to_string(),
            value: value.map(str::to_string),
            serial: self.serial.fetch_add(1, Ordering::Relaxed) + 1,
        };
        let callbacks: Vec<Callback> = {
            let g = match self.inner.lock() {
                Ok(g) => g,
                Err(p) => p.into_inner(),
            };
            g.subs
                .values()
                .filter(|(pref, _)| ev.name.starts_with(pref.as_str()))
                .map(|(_, cb)| cb.clone())
                .collect()
        };
        // Execute outside the lock
        for cb in &callbacks {
            cb(&ev);
        }
        callbacks.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|g| g.subs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn unsubscribe(&self, id: u64) {
        if let Ok(mut g) = self.inner.lock() {
            g.subs.remove(&id);
        }
    }
}

/// RAII handle: unsubscribes on drop.
pub struct WatchHandle {
    id: u64,
    reg: Weak<WatchRegistry>,
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        if let Some(reg) = self.reg.upgrade() {
            reg.unsubscribe(self.id);
        }
    }
}

/// Public helper for building callbacks.
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&PropEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}
