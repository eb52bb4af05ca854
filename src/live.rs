//! live — seam to the live property database.
//!
//! The live store is an external, process-shared structure; the crate only
//! consumes it through `LiveStore`. Two backends ship with the crate:
//! - `MemoryStore` (in-process, this module);
//! - `PropArea` (file-backed shared mapping, see `area`).
//!
//! Обход (`raw_override`) пишет значение мимо обычного пути записи,
//! в том числе в уже заданные `ro.*`. Он требует `OverrideToken`, который
//! создаётся только внутри крейта (PropertyStore), поэтому наружу это не
//! "универсальная запись без ограничений".

use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::collect::PropCollector;
use crate::consts::{PROP_NAME_MAX, PROP_VALUE_MAX, RO_PREFIX};

/// Capability for the bypass write path. Only the crate can mint one;
/// it is consumed by the call it is passed to.
#[derive(Debug)]
pub struct OverrideToken {
    _private: (),
}

impl OverrideToken {
    pub(crate) fn new() -> Self {
        Self { _private: () }
    }
}

/// Refusals of the ordinary write path that the override path may lift.
/// `raw_set` reports them inside its `anyhow::Error`; any other error is final.
#[derive(Debug, thiserror::Error)]
pub enum Refusal {
    #[error("{0} is read-only once set")]
    ReadOnly(String),

    #[error("no free slot for {0}")]
    NoSlot(String),
}

impl Refusal {
    /// Is `err` a refusal the override path is allowed to retry?
    pub fn is_liftable(err: &anyhow::Error) -> bool {
        err.downcast_ref::<Refusal>().is_some()
    }
}

pub trait LiveStore: Send + Sync {
    fn raw_get(&self, name: &str) -> Option<String>;

    /// Ordinary write path. May refuse an already set `ro.` name or a name
    /// with no slot left (`Refusal`), or reject invalid input.
    fn raw_set(&self, name: &str, value: &str) -> Result<()>;

    fn raw_enumerate(&self, collector: &mut dyn PropCollector);

    /// Low-level write that skips the `ro.` rule. Name and value limits
    /// still apply.
    fn raw_override(&self, name: &str, value: &str, token: OverrideToken) -> Result<()>;

    /// Wake consumers after a non-silent write.
    fn notify(&self, _name: &str) {}
}

/// Name check shared by the backends.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(anyhow!("empty property name"));
    }
    if name.len() >= PROP_NAME_MAX {
        return Err(anyhow!(
            "property name too long ({} >= {})",
            name.len(),
            PROP_NAME_MAX
        ));
    }
    if name.starts_with('.') || name.ends_with('.') || name.contains("..") {
        return Err(anyhow!("malformed property name {:?}", name));
    }
    if name
        .bytes()
        .any(|b| b == b'/' || b == b'=' || b.is_ascii_control() || b == b' ')
    {
        return Err(anyhow!("illegal character in property name {:?}", name));
    }
    Ok(())
}

/// Value length check; `ro.` values are exempt (long ro properties).
pub fn validate_value(name: &str, value: &str) -> Result<()> {
    if !name.starts_with(RO_PREFIX) && value.len() >= PROP_VALUE_MAX {
        return Err(anyhow!(
            "value of {} too long ({} >= {})",
            name,
            value.len(),
            PROP_VALUE_MAX
        ));
    }
    Ok(())
}

/// In-process live store. Same write policy as the mapped area.
#[derive(Default)]
pub struct MemoryStore {
    props: RwLock<BTreeMap<String, String>>,
    notifications: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from pairs through the ordinary write path (boot-time init).
    pub fn with_props<'a, I>(props: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let s = Self::new();
        for (n, v) in props {
            s.raw_set(n, v)?;
        }
        Ok(s)
    }

    /// Number of notify() calls observed so far.
    pub fn notifications(&self) -> u64 {
        self.notifications.load(Ordering::Relaxed)
    }
}

impl LiveStore for MemoryStore {
    fn raw_get(&self, name: &str) -> Option<String> {
        let g = self.props.read().ok()?;
        g.get(name).cloned()
    }

    fn raw_set(&self, name: &str, value: &str) -> Result<()> {
        validate_name(name)?;
        validate_value(name, value)?;
        let mut g = self
            .props
            .write()
            .map_err(|_| anyhow!("memory store poisoned"))?;
        if name.starts_with(RO_PREFIX) && g.contains_key(name) {
            return Err(Refusal::ReadOnly(name.to_string()).into());
        }
        g.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn raw_enumerate(&self, collector: &mut dyn PropCollector) {
        // Снимок под read-lock, вызовы коллектора — вне блокировки.
        let snapshot: Vec<(String, String)> = match self.props.read() {
            Ok(g) => g.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            Err(_) => return,
        };
        for (n, v) in &snapshot {
            collector.record(n, v);
        }
    }

    fn raw_override(&self, name: &str, value: &str, _token: OverrideToken) -> Result<()> {
        validate_name(name)?;
        validate_value(name, value)?;
        let mut g = self
            .props
            .write()
            .map_err(|_| anyhow!("memory store poisoned"))?;
        g.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn notify(&self, _name: &str) {
        self.notifications.fetch_add(1, Ordering::Relaxed);
    }
}
