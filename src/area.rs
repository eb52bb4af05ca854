//! area — file-backed live property area (PropArea) over a shared MappedFile.
//!
//! Формат файла (LE):
//! Header (32 B):
//!   [magic8="PROPAREA"][version u32=1][slots u32][serial u32][reserved 12]
//! Slots (slots × 256 B):
//!   [serial u32][name_len u16][value_len u16][name 128][value 92][pad 28]
//!
//! Видимость между процессами:
//! - отображение MAP_SHARED, поэтому запись одного процесса сразу видна другим;
//! - у каждого слота seqlock: писатель делает serial нечётным, пишет, затем
//!   serial += 1 (чётный). Читатель копирует слот и повторяет копию, пока serial
//!   нечётный или изменился за время копии;
//! - писатели внутри процесса сериализуются write_lock; между процессами —
//!   дисциплина "один писатель" (как у сервиса свойств). Читатели без блокировок.
//! - header.serial растёт на каждый notify() (сигнал "что-то изменилось").

use anyhow::{anyhow, Context, Result};
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, info};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{fence, AtomicU32, Ordering};
use std::sync::Mutex;

use crate::collect::PropCollector;
use crate::consts::{
    AREA_DEFAULT_SLOTS, AREA_HDR_SIZE, AREA_MAGIC, AREA_OFF_MAGIC, AREA_OFF_SERIAL,
    AREA_OFF_SLOTS, AREA_OFF_VERSION, AREA_VERSION, PROP_NAME_MAX, PROP_VALUE_MAX, RO_PREFIX,
    SLOT_OFF_NAME, SLOT_OFF_NAME_LEN, SLOT_OFF_SERIAL, SLOT_OFF_VALUE, SLOT_OFF_VALUE_LEN,
    SLOT_SIZE,
};
use crate::live::{validate_name, validate_value, LiveStore, OverrideToken, Refusal};
use crate::mmap::MappedFile;

// Сколько раз читатель перекопирует слот, прежде чем сдаться (писатель умер посреди записи).
const SEQLOCK_SPINS: u32 = 1 << 16;

pub struct PropArea {
    path: PathBuf,
    // Держит отображение живым; base/len указывают внутрь него.
    _map: MappedFile,
    base: *mut u8,
    len: usize,
    slots: u32,
    write_lock: Mutex<()>,
}

// Safety: the mapping is owned by `_map` and never remapped; all shared
// accesses go through atomics (serials) or seqlock-validated copies, and
// in-process writers hold `write_lock`.
unsafe impl Send for PropArea {}
unsafe impl Sync for PropArea {}

/// Decoded slot content.
struct Slot {
    name: String,
    value: String,
}

impl PropArea {
    /// Create a new, empty area file. Error if it already exists.
    pub fn create(path: &Path, slots: u32) -> Result<Self> {
        if slots == 0 {
            return Err(anyhow!("slots must be > 0"));
        }
        if path.exists() {
            return Err(anyhow!("prop area already exists at {}", path.display()));
        }
        let total = AREA_HDR_SIZE + slots as usize * SLOT_SIZE;
        let mut buf = vec![0u8; total];
        buf[AREA_OFF_MAGIC..AREA_OFF_MAGIC + 8].copy_from_slice(AREA_MAGIC);
        LittleEndian::write_u32(&mut buf[AREA_OFF_VERSION..AREA_OFF_VERSION + 4], AREA_VERSION);
        LittleEndian::write_u32(&mut buf[AREA_OFF_SLOTS..AREA_OFF_SLOTS + 4], slots);

        // tmp+rename: другой процесс не увидит наполовину созданную область
        let tmp = path.with_extension("tmp");
        let _ = fs::remove_file(&tmp);
        let mut f = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)
            .with_context(|| format!("open prop area tmp {}", tmp.display()))?;
        f.write_all(&buf)?;
        f.sync_all()?;
        fs::rename(&tmp, path)
            .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
        let _ = crate::persist::fsync_parent_dir(path);

        info!("prop area created at {} ({} slots)", path.display(), slots);
        Self::open(path)
    }

    /// Map an existing area (read/write, shared).
    pub fn open(path: &Path) -> Result<Self> {
        let mut map = MappedFile::open(path, true);
        if map.is_null() {
            return Err(anyhow!("map prop area {} failed", path.display()));
        }
        let hdr = map.as_slice();
        if hdr.len() < AREA_HDR_SIZE {
            return Err(anyhow!("prop area {} too small (< header)", path.display()));
        }
        if &hdr[AREA_OFF_MAGIC..AREA_OFF_MAGIC + 8] != AREA_MAGIC {
            return Err(anyhow!("bad prop area magic at {}", path.display()));
        }
        let version = LittleEndian::read_u32(&hdr[AREA_OFF_VERSION..AREA_OFF_VERSION + 4]);
        if version != AREA_VERSION {
            return Err(anyhow!(
                "unsupported prop area version {} at {}",
                version,
                path.display()
            ));
        }
        let slots = LittleEndian::read_u32(&hdr[AREA_OFF_SLOTS..AREA_OFF_SLOTS + 4]);
        let need = AREA_HDR_SIZE + slots as usize * SLOT_SIZE;
        if hdr.len() < need {
            return Err(anyhow!(
                "prop area {} truncated: {} < {} bytes",
                path.display(),
                hdr.len(),
                need
            ));
        }
        let len = map.len();
        let base = map.as_mut_ptr();
        debug!("prop area opened: {} slots={} len={}", path.display(), slots, len);
        Ok(Self {
            path: path.to_path_buf(),
            _map: map,
            base,
            len,
            slots,
            write_lock: Mutex::new(()),
        })
    }

    /// Open if present, otherwise create with `slots`.
    pub fn open_or_create(path: &Path, slots: Option<u32>) -> Result<Self> {
        if path.exists() {
            Self::open(path)
        } else {
            Self::create(path, slots.unwrap_or(AREA_DEFAULT_SLOTS))
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn slots(&self) -> u32 {
        self.slots
    }

    /// Area-wide change counter, bumped by notify().
    pub fn serial(&self) -> u32 {
        self.atomic_at(AREA_OFF_SERIAL).load(Ordering::Acquire)
    }

    // ---------- low-level access ----------

    fn atomic_at(&self, off: usize) -> &AtomicU32 {
        debug_assert!(off % 4 == 0 && off + 4 <= self.len);
        // Safety: `off` is 4-aligned inside the page-aligned mapping that
        // lives as long as `self`.
        unsafe { &*(self.base.add(off) as *const AtomicU32) }
    }

    #[inline]
    fn slot_off(idx: u32) -> usize {
        AREA_HDR_SIZE + idx as usize * SLOT_SIZE
    }

    /// Seqlock-validated copy of a slot; None if empty (or writer stuck).
    fn read_slot(&self, idx: u32) -> Option<Slot> {
        let off = Self::slot_off(idx);
        let serial = self.atomic_at(off + SLOT_OFF_SERIAL);
        let mut copy = [0u8; SLOT_SIZE];
        let body = SLOT_OFF_NAME_LEN..SLOT_SIZE;

        let mut spins = 0u32;
        loop {
            let s1 = serial.load(Ordering::Acquire);
            if s1 & 1 == 0 {
                // Safety: body range lies inside the slot and the mapping.
                unsafe {
                    std::ptr::copy_nonoverlapping(
                        self.base.add(off + body.start),
                        copy[body.clone()].as_mut_ptr(),
                        body.len(),
                    );
                }
                fence(Ordering::Acquire);
                if serial.load(Ordering::Relaxed) == s1 {
                    break;
                }
            }
            spins += 1;
            if spins >= SEQLOCK_SPINS {
                debug!("prop area: slot {} stuck mid-write, skipped", idx);
                return None;
            }
            std::hint::spin_loop();
        }

        let name_len = LittleEndian::read_u16(&copy[SLOT_OFF_NAME_LEN..SLOT_OFF_NAME_LEN + 2]) as usize;
        if name_len == 0 || name_len >= PROP_NAME_MAX {
            return None;
        }
        let value_len = (LittleEndian::read_u16(&copy[SLOT_OFF_VALUE_LEN..SLOT_OFF_VALUE_LEN + 2])
            as usize)
            .min(PROP_VALUE_MAX - 1);
        let name = String::from_utf8_lossy(&copy[SLOT_OFF_NAME..SLOT_OFF_NAME + name_len]).into_owned();
        let value =
            String::from_utf8_lossy(&copy[SLOT_OFF_VALUE..SLOT_OFF_VALUE + value_len]).into_owned();
        Some(Slot { name, value })
    }

    /// Write name (if `new`) and value into a slot. Caller holds write_lock.
    fn write_slot(&self, idx: u32, name: &str, value: &str, new: bool) {
        let off = Self::slot_off(idx);
        let serial = self.atomic_at(off + SLOT_OFF_SERIAL);
        let s = serial.load(Ordering::Relaxed);
        serial.store(s.wrapping_add(1) | 1, Ordering::Relaxed);
        fence(Ordering::Release);

        let mut body = [0u8; SLOT_SIZE - SLOT_OFF_NAME_LEN];
        let rel = |abs: usize| abs - SLOT_OFF_NAME_LEN;
        if new {
            LittleEndian::write_u16(
                &mut body[rel(SLOT_OFF_NAME_LEN)..rel(SLOT_OFF_NAME_LEN) + 2],
                name.len() as u16,
            );
            body[rel(SLOT_OFF_NAME)..rel(SLOT_OFF_NAME) + name.len()].copy_from_slice(name.as_bytes());
        } else {
            // имя уже лежит в слоте; копируем его в body без изменений
            // Safety: range inside the slot.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    self.base.add(off + SLOT_OFF_NAME_LEN),
                    body.as_mut_ptr(),
                    SLOT_OFF_VALUE - SLOT_OFF_NAME_LEN,
                );
            }
        }
        LittleEndian::write_u16(
            &mut body[rel(SLOT_OFF_VALUE_LEN)..rel(SLOT_OFF_VALUE_LEN) + 2],
            value.len() as u16,
        );
        body[rel(SLOT_OFF_VALUE)..rel(SLOT_OFF_VALUE) + value.len()].copy_from_slice(value.as_bytes());

        // Safety: body covers exactly [off+4, off+SLOT_SIZE) inside the mapping.
        unsafe {
            std::ptr::copy_nonoverlapping(
                body.as_ptr(),
                self.base.add(off + SLOT_OFF_NAME_LEN),
                body.len(),
            );
        }
        serial.store(s.wrapping_add(2) & !1, Ordering::Release);
    }

    /// (slot index of `name`, first free slot).
    fn lookup(&self, name: &str) -> (Option<u32>, Option<u32>) {
        let mut free = None;
        for idx in 0..self.slots {
            match self.read_slot(idx) {
                Some(slot) if slot.name == name => return (Some(idx), free),
                Some(_) => {}
                None => {
                    if free.is_none() && self.slot_is_free(idx) {
                        free = Some(idx);
                    }
                }
            }
        }
        (None, free)
    }

    fn slot_is_free(&self, idx: u32) -> bool {
        let off = Self::slot_off(idx);
        // Safety: two bytes inside the slot.
        let mut b = [0u8; 2];
        unsafe {
            std::ptr::copy_nonoverlapping(self.base.add(off + SLOT_OFF_NAME_LEN), b.as_mut_ptr(), 2);
        }
        LittleEndian::read_u16(&b) == 0
    }

    fn store(&self, name: &str, value: &str, respect_ro: bool) -> Result<()> {
        validate_name(name)?;
        validate_value(name, value)?;
        if value.len() >= PROP_VALUE_MAX {
            return Err(anyhow!(
                "value of {} does not fit an area slot ({} >= {})",
                name,
                value.len(),
                PROP_VALUE_MAX
            ));
        }
        let _g = self
            .write_lock
            .lock()
            .map_err(|_| anyhow!("prop area write lock poisoned"))?;
        match self.lookup(name) {
            (Some(idx), _) => {
                if respect_ro && name.starts_with(RO_PREFIX) {
                    return Err(Refusal::ReadOnly(name.to_string()).into());
                }
                self.write_slot(idx, name, value, false);
            }
            (None, Some(free)) => self.write_slot(free, name, value, true),
            (None, None) => {
                debug!(
                    "prop area {} full ({} slots)",
                    self.path.display(),
                    self.slots
                );
                return Err(Refusal::NoSlot(name.to_string()).into());
            }
        }
        Ok(())
    }
}

impl LiveStore for PropArea {
    fn raw_get(&self, name: &str) -> Option<String> {
        (0..self.slots)
            .filter_map(|idx| self.read_slot(idx))
            .find(|slot| slot.name == name)
            .map(|slot| slot.value)
    }

    fn raw_set(&self, name: &str, value: &str) -> Result<()> {
        self.store(name, value, true)
    }

    fn raw_enumerate(&self, collector: &mut dyn PropCollector) {
        for idx in 0..self.slots {
            if let Some(slot) = self.read_slot(idx) {
                collector.record(&slot.name, &slot.value);
            }
        }
    }

    fn raw_override(&self, name: &str, value: &str, _token: OverrideToken) -> Result<()> {
        debug!("prop area: override write {}", name);
        self.store(name, value, false)
    }

    fn notify(&self, _name: &str) {
        self.atomic_at(AREA_OFF_SERIAL).fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::{PropList, PropListCollector};

    #[test]
    fn create_set_get_reopen() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let p = dir.path().join("area");
        {
            let area = PropArea::create(&p, 8)?;
            area.raw_set("sys.boot_completed", "1")?;
            area.raw_set("ro.serialno", "ABC123")?;
            assert_eq!(area.raw_get("sys.boot_completed").as_deref(), Some("1"));
        }
        let area = PropArea::open(&p)?;
        assert_eq!(area.slots(), 8);
        assert_eq!(area.raw_get("ro.serialno").as_deref(), Some("ABC123"));
        assert!(area.raw_get("missing").is_none());
        Ok(())
    }

    #[test]
    fn create_refuses_existing() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let p = dir.path().join("area");
        PropArea::create(&p, 2)?;
        assert!(PropArea::create(&p, 2).is_err());
        Ok(())
    }

    #[test]
    fn ro_and_bypass() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let area = PropArea::create(&dir.path().join("area"), 4)?;
        area.raw_set("ro.secure", "1")?;
        assert!(area.raw_set("ro.secure", "0").is_err());
        area.raw_override("ro.secure", "0", OverrideToken::new())?;
        assert_eq!(area.raw_get("ro.secure").as_deref(), Some("0"));
        Ok(())
    }

    #[test]
    fn full_area_rejects_new_names() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let area = PropArea::create(&dir.path().join("area"), 2)?;
        area.raw_set("a.one", "1")?;
        area.raw_set("a.two", "2")?;
        assert!(area.raw_set("a.three", "3").is_err());
        // обновление существующего имени в полной области работает
        area.raw_set("a.two", "22")?;
        assert_eq!(area.raw_get("a.two").as_deref(), Some("22"));
        Ok(())
    }

    #[test]
    fn two_mappings_see_each_other() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let p = dir.path().join("area");
        let writer = PropArea::create(&p, 4)?;
        let reader = PropArea::open(&p)?;

        writer.raw_set("persist.sys.timezone", "UTC")?;
        assert_eq!(reader.raw_get("persist.sys.timezone").as_deref(), Some("UTC"));

        let before = reader.serial();
        writer.notify("persist.sys.timezone");
        assert_eq!(reader.serial(), before + 1);

        let mut list = PropList::new();
        reader.raw_enumerate(&mut PropListCollector::new(&mut list));
        assert_eq!(list.len(), 1);
        Ok(())
    }

    #[test]
    fn bad_magic_is_rejected() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let p = dir.path().join("junk");
        fs::write(&p, vec![0xAAu8; 4096])?;
        assert!(PropArea::open(&p).is_err());
        Ok(())
    }
}
