//! mmap — MappedFile: единоличное владение одним отображением файла
//! или блочного устройства.
//!
//! Политика:
//! - writable=true  -> MAP_SHARED (изменения видны файлу и другим процессам);
//! - writable=false -> MAP_PRIVATE (copy-on-write, файл не меняется).
//! - Размер: для блочного устройства — ioctl(BLKGETSIZE64), иначе st_size.
//! - Конструкторы не возвращают ошибок: при любой неудаче буфер пустой (null)
//!   и len()==0. Вызывающий обязан проверить is_null().
//! - Drop делает munmap ровно один раз (через memmap2::MmapMut).

use log::debug;
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileTypeExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use crate::bytes::ByteData;
use crate::consts::BLKGETSIZE64;

/// Owner of one memory mapping. Move-only: there is no `Clone`.
#[derive(Debug, Default)]
pub struct MappedFile {
    map: Option<MmapMut>,
    sz: usize,
}

impl MappedFile {
    /// Open `path` and map it whole. Never fails loudly; see `is_null()`.
    pub fn open<P: AsRef<Path>>(path: P, writable: bool) -> Self {
        let path = path.as_ref();
        // std открывает с O_CLOEXEC
        let file = match OpenOptions::new().read(true).write(writable).open(path) {
            Ok(f) => f,
            Err(e) => {
                debug!("mmap: open {} failed: {}", path.display(), e);
                return Self::default();
            }
        };
        let md = match file.metadata() {
            Ok(m) => m,
            Err(e) => {
                debug!("mmap: stat {} failed: {}", path.display(), e);
                return Self::default();
            }
        };
        let sz = if md.file_type().is_block_device() {
            match blkdev_size(&file) {
                Ok(n) => n,
                Err(e) => {
                    debug!("mmap: BLKGETSIZE64 {} failed: {}", path.display(), e);
                    return Self::default();
                }
            }
        } else {
            md.len()
        };
        let sz = match usize::try_from(sz) {
            Ok(n) => n,
            Err(_) => {
                debug!("mmap: {} too large to map ({} B)", path.display(), sz);
                return Self::default();
            }
        };
        Self::from_file(&file, sz, writable)
        // file закрывается здесь; отображение остаётся валидным
    }

    /// Map `sz` bytes of an already open descriptor. `sz == 0` maps nothing.
    pub fn from_file(file: &File, sz: usize, writable: bool) -> Self {
        if sz == 0 {
            return Self::default();
        }
        let mut opts = MmapOptions::new();
        opts.len(sz);
        // Safety: the mapping is owned by this value and unmapped on Drop;
        // concurrent external modification is inherent to MAP_SHARED and
        // is handled by callers that read through the area seqlock.
        let res = unsafe {
            if writable {
                opts.map_mut(file)
            } else {
                opts.map_copy(file)
            }
        };
        match res {
            Ok(map) => Self { map: Some(map), sz },
            Err(e) => {
                debug!("mmap: map fd={} len={} failed: {}", file.as_raw_fd(), sz, e);
                Self::default()
            }
        }
    }

    /// Move the mapping out, leaving `self` null/zero.
    pub fn take(&mut self) -> MappedFile {
        std::mem::take(self)
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.map.is_none()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sz
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sz == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        match &self.map {
            Some(m) => &m[..],
            None => &[],
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match &mut self.map {
            Some(m) => &mut m[..],
            None => &mut [],
        }
    }

    pub fn as_byte_data(&mut self) -> ByteData<'_> {
        ByteData::new(self.as_mut_slice())
    }

    /// Base pointer of the mapping (null when unmapped).
    pub(crate) fn as_mut_ptr(&mut self) -> *mut u8 {
        match &mut self.map {
            Some(m) => m.as_mut_ptr(),
            None => std::ptr::null_mut(),
        }
    }

    /// msync для MAP_SHARED (best-effort; для private-отображения no-op по сути).
    pub fn flush(&self) -> std::io::Result<()> {
        match &self.map {
            Some(m) => m.flush(),
            None => Ok(()),
        }
    }
}

fn blkdev_size(file: &File) -> std::io::Result<u64> {
    let mut size: u64 = 0;
    // Safety: BLKGETSIZE64 writes exactly one u64 into `size`.
    let rc = unsafe { libc::ioctl(file.as_raw_fd(), BLKGETSIZE64 as _, &mut size as *mut u64) };
    if rc < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn zero_length_file_is_null_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("empty");
        File::create(&p).unwrap();

        let m = MappedFile::open(&p, false);
        assert!(m.is_null());
        assert_eq!(m.len(), 0);
        assert!(m.as_slice().is_empty());
    }

    #[test]
    fn missing_file_is_null() {
        let m = MappedFile::open("/nonexistent/propforge/mmap", false);
        assert!(m.is_null());
        assert_eq!(m.len(), 0);
    }

    #[test]
    fn private_map_does_not_touch_file() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("cow");
        std::fs::write(&p, b"hello").unwrap();

        let mut m = MappedFile::open(&p, false);
        assert!(!m.is_null());
        assert_eq!(m.len(), 5);
        m.as_mut_slice()[0] = b'J';
        assert_eq!(m.as_slice(), b"Jello");
        drop(m);
        assert_eq!(std::fs::read(&p).unwrap(), b"hello");
    }

    #[test]
    fn shared_map_writes_through() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("shared");
        std::fs::write(&p, b"hello").unwrap();

        let mut m = MappedFile::open(&p, true);
        assert_eq!(m.len(), 5);
        {
            let mut data = m.as_byte_data();
            data[4] = b'!';
        }
        m.flush().unwrap();
        drop(m);
        assert_eq!(std::fs::read(&p).unwrap(), b"hell!");
    }

    #[test]
    fn take_leaves_source_null() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("moved");
        let mut f = File::create(&p).unwrap();
        f.write_all(&[7u8; 64]).unwrap();
        drop(f);

        let mut a = MappedFile::open(&p, false);
        let b = a.take();
        assert!(a.is_null());
        assert_eq!(a.len(), 0);
        assert_eq!(b.len(), 64);
        assert_eq!(b.as_slice()[63], 7);
    }

    #[test]
    fn from_file_zero_size_skips_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("fd");
        std::fs::write(&p, b"data").unwrap();
        let f = File::open(&p).unwrap();
        assert!(MappedFile::from_file(&f, 0, false).is_null());
        let m = MappedFile::from_file(&f, 4, false);
        assert_eq!(m.as_slice(), b"data");
    }

    #[test]
    fn blkgetsize_on_regular_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("plain");
        std::fs::write(&p, b"not a device").unwrap();
        let f = File::open(&p).unwrap();
        // ioctl не для блочного устройства: ENOTTY/EINVAL, а не "размер 0"
        assert!(blkdev_size(&f).is_err());
    }

    // Блочное устройство: размер берётся из BLKGETSIZE64, а не из st_size (=0).
    #[test]
    #[ignore = "needs a readable block device; run as root with --ignored"]
    fn block_device_size_comes_from_ioctl() {
        for name in ["/dev/loop0", "/dev/ram0", "/dev/sda", "/dev/vda", "/dev/nvme0n1"] {
            let Ok(md) = std::fs::metadata(name) else { continue };
            if !md.file_type().is_block_device() {
                continue;
            }
            let Ok(f) = File::open(name) else { continue };
            let expected = blkdev_size(&f).unwrap();
            let m = MappedFile::open(name, false);
            if expected > 0 {
                assert!(!m.is_null(), "{name}: non-empty device must map");
            }
            assert_eq!(m.len() as u64, expected);
            return;
        }
        panic!("no readable block device found");
    }
}
