//! persist — persisted-override directory.
//!
//! Раскладка: <dir>/<name>, содержимое файла — значение как есть
//! (без завершающего перевода строки и без экранирования).
//!
//! Политика записи:
//! - значение пишется во временный файл `.prop-XXXXXX` в том же каталоге;
//! - если <name> уже существует — его атрибуты (mode/owner/label)
//!   клонируются на временный файл (best-effort);
//! - затем атомарный rename поверх <name>: читатель видит либо старый файл
//!   целиком, либо новый целиком. Никаких блокировок.
//! - Файлы, начинающиеся с '.', — временные, при перечислении пропускаются.

use log::debug;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::attr::clone_attr;
use crate::collect::PropCollector;
use crate::consts::PERSIST_TMP_PREFIX;
use crate::error::{PropError, Result};
use crate::metrics;

#[cfg(unix)]
pub(crate) fn fsync_parent_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            let dir = fs::File::open(parent)?;
            dir.sync_all()?;
        }
    }
    Ok(())
}
#[cfg(not(unix))]
pub(crate) fn fsync_parent_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PersistDir {
    dir: PathBuf,
    fsync: bool,
}

impl PersistDir {
    pub fn new<P: Into<PathBuf>>(dir: P, fsync: bool) -> Self {
        Self {
            dir: dir.into(),
            fsync,
        }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Path for `name`, after rejecting anything that could escape the directory.
    fn prop_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.starts_with('.')
            || name.contains('/')
            || name.contains('\0')
        {
            return Err(PropError::InvalidName(name.to_string()));
        }
        Ok(self.dir.join(name))
    }

    /// Value of the override for `name`, if a regular file holds one.
    pub fn read(&self, name: &str) -> Result<Option<String>> {
        let path = self.prop_path(name)?;
        match fs::symlink_metadata(&path) {
            Ok(md) if md.is_file() => {}
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PropError::persistence(name, e)),
        }
        match fs::read(&path) {
            Ok(bytes) => {
                metrics::record_persist_read();
                Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
            }
            // удалён между stat и read
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PropError::persistence(name, e)),
        }
    }

    /// Record the override for `name` (if any). Returns whether one was found.
    pub fn get(&self, name: &str, collector: &mut dyn PropCollector) -> Result<bool> {
        match self.read(name)? {
            Some(v) => {
                collector.record(name, &v);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Record every override. A missing directory simply has none.
    pub fn get_all(&self, collector: &mut dyn PropCollector) -> Result<usize> {
        let rd = match fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(PropError::persistence("*", e)),
        };
        let mut names: Vec<String> = Vec::new();
        for entry in rd {
            let entry = entry.map_err(|e| PropError::persistence("*", e))?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            names.push(name);
        }
        names.sort();

        let mut n = 0usize;
        for name in names {
            if let Some(v) = self.read(&name)? {
                collector.record(&name, &v);
                n += 1;
            }
        }
        Ok(n)
    }

    /// Atomically replace the override for `name`.
    pub fn set(&self, name: &str, value: &str) -> Result<()> {
        let target = self.prop_path(name)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(PERSIST_TMP_PREFIX)
            .tempfile_in(&self.dir)
            .map_err(|e| PropError::persistence(name, e))?;
        tmp.write_all(value.as_bytes())
            .map_err(|e| PropError::persistence(name, e))?;
        if self.fsync {
            tmp.as_file()
                .sync_all()
                .map_err(|e| PropError::persistence(name, e))?;
        }

        if fs::symlink_metadata(&target).is_ok() {
            // атрибуты — рекомендательные: ошибка клонирования не мешает записи
            // (без метки mode/uid/gid всё равно переносятся)
            if let Err(e) = clone_attr(&target, tmp.path()) {
                debug!("persist: clone attrs {}: {}", target.display(), e);
            }
        }

        tmp.persist(&target)
            .map_err(|e| PropError::persistence(name, e.error))?;
        if self.fsync {
            let _ = fsync_parent_dir(&target);
        }
        metrics::record_persist_write();
        debug!("persist: {} <- {} B", target.display(), value.len());
        Ok(())
    }

    /// Remove the override. True iff it existed; absent afterwards either way.
    pub fn delete(&self, name: &str) -> Result<bool> {
        let path = self.prop_path(name)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                metrics::record_persist_delete();
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(PropError::persistence(name, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::{PropList, PropListCollector};
    use std::os::unix::fs::{MetadataExt, PermissionsExt};

    #[test]
    fn set_read_delete() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let p = PersistDir::new(dir.path(), true);

        assert_eq!(p.read("persist.sys.usb.config")?, None);
        p.set("persist.sys.usb.config", "mtp,adb")?;
        assert_eq!(p.read("persist.sys.usb.config")?.as_deref(), Some("mtp,adb"));
        // raw content: no newline appended
        assert_eq!(fs::read(dir.path().join("persist.sys.usb.config"))?, b"mtp,adb");

        assert!(p.delete("persist.sys.usb.config")?);
        assert!(!p.delete("persist.sys.usb.config")?);
        assert!(!dir.path().join("persist.sys.usb.config").exists());
        Ok(())
    }

    #[test]
    fn get_all_skips_temporaries_and_dirs() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let p = PersistDir::new(dir.path(), false);
        p.set("persist.a", "1")?;
        p.set("persist.b", "")?;
        fs::write(dir.path().join(".prop-leftover"), "junk")?;
        fs::create_dir(dir.path().join("subdir"))?;

        let mut list = PropList::new();
        let n = p.get_all(&mut PropListCollector::new(&mut list))?;
        assert_eq!(n, 2);
        assert_eq!(list["persist.a"], "1");
        assert_eq!(list["persist.b"], "");
        Ok(())
    }

    #[test]
    fn missing_dir_has_no_overrides() -> anyhow::Result<()> {
        let p = PersistDir::new("/nonexistent/propforge/persist", false);
        let mut list = PropList::new();
        assert_eq!(p.get_all(&mut PropListCollector::new(&mut list))?, 0);
        assert!(p.set("persist.x", "1").is_err());
        Ok(())
    }

    #[test]
    fn invalid_names_never_form_paths() {
        let p = PersistDir::new("/tmp", false);
        for bad in ["", ".", "..", "../etc/passwd", "a/b", ".hidden"] {
            match p.set(bad, "x") {
                Err(PropError::InvalidName(_)) => {}
                other => panic!("{bad:?}: expected InvalidName, got {:?}", other),
            }
        }
    }

    #[test]
    fn replace_keeps_mode_and_owner() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let p = PersistDir::new(dir.path(), false);
        p.set("persist.mode", "old")?;
        let target = dir.path().join("persist.mode");
        fs::set_permissions(&target, fs::Permissions::from_mode(0o644))?;
        let before = fs::metadata(&target)?;

        // и с метками, и без них: замена не меняет mode/uid/gid
        p.set("persist.mode", "new")?;
        assert_eq!(fs::read_to_string(&target)?, "new");
        let after = fs::metadata(&target)?;
        assert_eq!(after.permissions().mode() & 0o777, 0o644);
        assert_eq!(after.uid(), before.uid());
        assert_eq!(after.gid(), before.gid());
        Ok(())
    }
}
