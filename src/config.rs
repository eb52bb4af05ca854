//! Centralized configuration and builder for propforge.
//!
//! Goals:
//! - Single place to collect tunables instead of scattering env lookups.
//! - PropConfig::from_env() reads PROPS_* variables on top of the defaults.
//! - StoreBuilder produces a PropConfig and opens a PropertyStore from it.
//!
//! Defaults:
//! - persist_dir = /data/property
//! - area_path = None (caller supplies a LiveStore, or sets a path for PropArea)
//! - area_slots = 1024 (only used when the area file is created)
//! - fsync_persist = true (sync the temp file and the directory around rename)

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::area::PropArea;
use crate::consts::{AREA_DEFAULT_SLOTS, PERSIST_PROP_DIR};
use crate::live::LiveStore;
use crate::store::PropertyStore;

#[derive(Clone, Debug)]
pub struct PropConfig {
    /// Directory of persisted overrides.
    /// Env: PROPS_PERSIST_DIR (default /data/property)
    pub persist_dir: PathBuf,

    /// File-backed live area; None when the caller supplies its own LiveStore.
    /// Env: PROPS_AREA_PATH
    pub area_path: Option<PathBuf>,

    /// Slot count for a newly created area.
    /// Env: PROPS_AREA_SLOTS (default 1024)
    pub area_slots: u32,

    /// fsync temp file + directory on persist_set.
    /// Env: PROPS_FSYNC (default true; "0|false|off|no" => false)
    pub fsync_persist: bool,
}

impl Default for PropConfig {
    fn default() -> Self {
        Self {
            persist_dir: PathBuf::from(PERSIST_PROP_DIR),
            area_path: None,
            area_slots: AREA_DEFAULT_SLOTS,
            fsync_persist: true,
        }
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

impl PropConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("PROPS_PERSIST_DIR") {
            let s = v.trim();
            if !s.is_empty() {
                cfg.persist_dir = PathBuf::from(s);
            }
        }

        if let Ok(v) = std::env::var("PROPS_AREA_PATH") {
            let s = v.trim();
            if !s.is_empty() {
                cfg.area_path = Some(PathBuf::from(s));
            }
        }

        if let Ok(v) = std::env::var("PROPS_AREA_SLOTS") {
            if let Ok(n) = v.trim().parse::<u32>() {
                if n > 0 {
                    cfg.area_slots = n;
                }
            }
        }

        if let Ok(v) = std::env::var("PROPS_FSYNC") {
            if let Some(b) = parse_bool(&v) {
                cfg.fsync_persist = b;
            }
        }

        cfg
    }

    pub fn with_persist_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.persist_dir = dir.into();
        self
    }

    pub fn with_area_path<P: Into<PathBuf>>(mut self, path: Option<P>) -> Self {
        self.area_path = path.map(Into::into);
        self
    }

    pub fn with_area_slots(mut self, slots: u32) -> Self {
        self.area_slots = slots;
        self
    }

    pub fn with_fsync_persist(mut self, on: bool) -> Self {
        self.fsync_persist = on;
        self
    }
}

impl fmt::Display for PropConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PropConfig {{ persist_dir: {}, area_path: {}, area_slots: {}, fsync_persist: {} }}",
            self.persist_dir.display(),
            self.area_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "none(external live store)".to_string()),
            self.area_slots,
            self.fsync_persist,
        )
    }
}

/// Builder for a PropertyStore.
#[derive(Clone, Debug)]
pub struct StoreBuilder {
    cfg: PropConfig,
}

impl Default for StoreBuilder {
    fn default() -> Self {
        // Start from env, then allow overrides.
        Self {
            cfg: PropConfig::from_env(),
        }
    }
}

impl StoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a clean default (without reading env).
    pub fn from_default() -> Self {
        Self {
            cfg: PropConfig::default(),
        }
    }

    pub fn persist_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.cfg.persist_dir = dir.into();
        self
    }

    pub fn area_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cfg.area_path = Some(path.into());
        self
    }

    pub fn area_slots(mut self, slots: u32) -> Self {
        self.cfg.area_slots = slots;
        self
    }

    pub fn fsync_persist(mut self, on: bool) -> Self {
        self.cfg.fsync_persist = on;
        self
    }

    pub fn build(self) -> PropConfig {
        self.cfg
    }

    /// Open over the configured PropArea (created if missing).
    pub fn open(self) -> Result<PropertyStore> {
        let path = self
            .cfg
            .area_path
            .clone()
            .ok_or_else(|| anyhow!("area_path not configured"))?;
        let area = PropArea::open_or_create(&path, Some(self.cfg.area_slots))?;
        Ok(PropertyStore::new(self.cfg, Arc::new(area)))
    }

    /// Open over a caller-supplied live store.
    pub fn open_with(self, live: Arc<dyn LiveStore>) -> PropertyStore {
        PropertyStore::new(self.cfg, live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_variants() {
        assert_eq!(parse_bool(" ON "), Some(true));
        assert_eq!(parse_bool("no"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn builder_overrides_defaults() {
        let cfg = StoreBuilder::from_default()
            .persist_dir("/tmp/p")
            .area_slots(16)
            .fsync_persist(false)
            .build();
        assert_eq!(cfg.persist_dir, PathBuf::from("/tmp/p"));
        assert_eq!(cfg.area_slots, 16);
        assert!(!cfg.fsync_persist);
        assert!(cfg.area_path.is_none());
        assert!(cfg.to_string().contains("external live store"));
    }

    #[test]
    fn open_without_area_path_fails() {
        assert!(StoreBuilder::from_default().open().is_err());
    }
}
