//! store — PropertyStore: reads, writes, deletes and persistence against the
//! live store and the persisted-override directory.
//!
//! Порядок перечисления (get_all с prefer_persisted=true): сначала persisted
//! overrides, затем live store. Коллектор "первый выигрывает", поэтому
//! persisted-значение затеняет live-значение в объединённом списке.
//!
//! Пустое live-значение считается удалённым (live store умеет только
//! "обнулять", а не удалять), поэтому get()/get_all() его не возвращают.
//! Persisted-файл с пустым содержимым — это значение "".
//!
//! Блокировок здесь нет: атомарность даёт live store (одно свойство) и
//! rename (persist_set).

use log::{debug, info, warn};
use std::path::Path;
use std::sync::Arc;

use crate::collect::{PropCollector, PropList, PropListCollector};
use crate::config::PropConfig;
use crate::error::{PropError, Result};
use crate::live::{LiveStore, OverrideToken, Refusal};
use crate::metrics;
use crate::persist::PersistDir;
use crate::propfile::parse_prop_path;
use crate::subs::{Callback, WatchHandle, WatchRegistry};

/// Prefix of names that belong to the persisted-property subsystem.
pub const PERSIST_PREFIX: &str = "persist.";

pub struct PropertyStore {
    cfg: PropConfig,
    live: Arc<dyn LiveStore>,
    persist: PersistDir,
    watchers: Arc<WatchRegistry>,
}

impl PropertyStore {
    pub fn new(cfg: PropConfig, live: Arc<dyn LiveStore>) -> Self {
        let persist = PersistDir::new(cfg.persist_dir.clone(), cfg.fsync_persist);
        Self {
            cfg,
            live,
            persist,
            watchers: WatchRegistry::new(),
        }
    }

    pub fn config(&self) -> &PropConfig {
        &self.cfg
    }

    pub fn live(&self) -> &Arc<dyn LiveStore> {
        &self.live
    }

    pub fn persist_dir(&self) -> &PersistDir {
        &self.persist
    }

    // ---------- reads ----------

    /// Value of `name`: the persisted override first when `prefer_persisted`,
    /// otherwise (or if there is none) the live value.
    pub fn get(&self, name: &str, prefer_persisted: bool) -> Option<String> {
        if prefer_persisted {
            match self.persist.read(name) {
                Ok(Some(v)) => return Some(v),
                Ok(None) => {}
                Err(e) => debug!("get {}: persisted lookup failed: {}", name, e),
            }
        }
        metrics::record_live_get();
        self.live.raw_get(name).filter(|v| !v.is_empty())
    }

    /// Merged snapshot; persisted overrides shadow live values when requested.
    pub fn get_all(&self, prefer_persisted: bool) -> Result<PropList> {
        let mut list = PropList::new();
        {
            let mut c = PropListCollector::new(&mut list);
            if prefer_persisted {
                self.persist.get_all(&mut c)?;
            }
            let mut live_only = |n: &str, v: &str| {
                if !v.is_empty() {
                    c.record(n, v);
                }
            };
            self.live.raw_enumerate(&mut live_only);
        }
        Ok(list)
    }

    // ---------- writes ----------

    /// Write through the live store, falling back to the override path only
    /// when the ordinary path refuses a `ro.` name or has no slot for it.
    /// Invalid names and over-long values fail without the fallback.
    /// `skip_notify` suppresses notifications.
    pub fn set(&self, name: &str, value: &str, skip_notify: bool) -> Result<()> {
        match self.live.raw_set(name, value) {
            Ok(()) => metrics::record_live_set(),
            Err(live_err) if !Refusal::is_liftable(&live_err) => {
                metrics::record_write_failure();
                return Err(PropError::WriteThrough {
                    name: name.to_string(),
                    live: format!("{:#}", live_err),
                    bypass: "not attempted".to_string(),
                });
            }
            Err(live_err) => {
                debug!("set {}: live store refused ({:#}), trying override", name, live_err);
                if let Err(bypass_err) = self.live.raw_override(name, value, OverrideToken::new()) {
                    metrics::record_write_failure();
                    return Err(PropError::WriteThrough {
                        name: name.to_string(),
                        live: format!("{:#}", live_err),
                        bypass: format!("{:#}", bypass_err),
                    });
                }
                metrics::record_override_write();
            }
        }
        if !skip_notify {
            self.notify(name, Some(value));
        }
        Ok(())
    }

    /// `set`, then also persist `persist.*` names so they survive a restart
    /// of the live store.
    pub fn set_and_persist(&self, name: &str, value: &str, skip_notify: bool) -> Result<()> {
        self.set(name, value, skip_notify)?;
        if name.starts_with(PERSIST_PREFIX) {
            self.persist_set(name, value)?;
        }
        Ok(())
    }

    /// Remove the persisted override; unless `persist_only`, also blank the
    /// live entry. Returns whether anything was removed or blanked.
    pub fn delete(&self, name: &str, persist_only: bool) -> Result<bool> {
        let mut removed = self.persist_delete(name)?;
        if !persist_only {
            let present = self
                .live
                .raw_get(name)
                .map(|v| !v.is_empty())
                .unwrap_or(false);
            if present {
                self.live
                    .raw_override(name, "", OverrideToken::new())
                    .map_err(|e| PropError::WriteThrough {
                        name: name.to_string(),
                        live: "blank via override".to_string(),
                        bypass: format!("{:#}", e),
                    })?;
                metrics::record_override_write();
                self.notify(name, None);
                removed = true;
            }
        }
        Ok(removed)
    }

    /// Apply `name=value` lines of a property file in order (last one wins).
    /// Returns the number of entries written.
    pub fn load_prop_file<P: AsRef<Path>>(&self, path: P, skip_notify: bool) -> Result<usize> {
        let path = path.as_ref();
        let mut applied = 0usize;
        parse_prop_path(path, |name, value| {
            match self.set(name, value, skip_notify) {
                Ok(()) => applied += 1,
                Err(e) => warn!("load_prop_file {}: skip {}: {}", path.display(), name, e),
            }
            true
        })?;
        info!("loaded {} prop(s) from {}", applied, path.display());
        Ok(applied)
    }

    // ---------- persisted overrides ----------

    pub fn persist_get(&self, name: &str, collector: &mut dyn PropCollector) -> Result<bool> {
        self.persist.get(name, collector)
    }

    pub fn persist_get_all(&self, collector: &mut dyn PropCollector) -> Result<usize> {
        self.persist.get_all(collector)
    }

    /// Snapshot of the persisted overrides only.
    pub fn persist_list(&self) -> Result<PropList> {
        let mut list = PropList::new();
        self.persist.get_all(&mut PropListCollector::new(&mut list))?;
        Ok(list)
    }

    pub fn persist_set(&self, name: &str, value: &str) -> Result<()> {
        self.persist.set(name, value)
    }

    pub fn persist_delete(&self, name: &str) -> Result<bool> {
        self.persist.delete(name)
    }

    // ---------- notification ----------

    /// Watch names starting with `prefix` (in-process).
    pub fn watch(&self, prefix: &str, cb: Callback) -> WatchHandle {
        self.watchers.subscribe(prefix, cb)
    }

    fn notify(&self, name: &str, value: Option<&str>) {
        self.live.notify(name);
        self.watchers.publish(name, value);
        metrics::record_notification();
    }
}
