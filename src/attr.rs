//! attr — capture/restore of file security metadata:
//! permission bits, owner, group and the SELinux label.
//!
//! get():   lstat (без перехода по symlink) + lgetxattr("security.selinux").
//!          Нет читаемой метки => ошибка Label, а не "успех без метки".
//! set():   chmod(mode & 0777) -> chown(uid, gid) -> lsetxattr(label, если не пустая).
//!          Порядок фиксирован, отката нет (best-effort, не транзакция).
//! clone_attr(): get(src) + set(dest); результат можно игнорировать.
//!          Если lstat(src) прошёл, а метка не читается, mode/uid/gid всё равно
//!          переносятся на dest (без метки), и возвращается ошибка Label.

use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;

use crate::bytes::ByteView;
use crate::consts::{LABEL_BUF_SIZE, XATTR_NAME_SELINUX};
use crate::error::{PropError, Result};

/// Snapshot of a path's mode, ownership and security label.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FileAttr {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    con: [u8; LABEL_BUF_SIZE],
}

impl FileAttr {
    /// Build from parts; the label is cut at its first NUL and at 127 bytes.
    pub fn new(mode: u32, uid: u32, gid: u32, label: &[u8]) -> Self {
        let mut con = [0u8; LABEL_BUF_SIZE];
        let visible = label.iter().position(|&b| b == 0).unwrap_or(label.len());
        let n = visible.min(LABEL_BUF_SIZE - 1);
        con[..n].copy_from_slice(&label[..n]);
        Self { mode, uid, gid, con }
    }

    pub fn get<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let md = lstat(path)?;
        let raw = xattr::get(path, XATTR_NAME_SELINUX)
            .map_err(|e| PropError::Label {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
            .ok_or_else(|| PropError::Label {
                path: path.to_path_buf(),
                reason: "no label".to_string(),
            })?;
        Ok(Self::new(md.mode(), md.uid(), md.gid(), &raw))
    }

    pub fn set<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        fs::set_permissions(path, fs::Permissions::from_mode(self.mode & 0o777))?;
        std::os::unix::fs::chown(path, Some(self.uid), Some(self.gid))?;
        if !self.label().is_empty() {
            // как lsetfilecon: значение вместе с завершающим NUL
            xattr::set(path, XATTR_NAME_SELINUX, self.label_view().buf()).map_err(|e| {
                PropError::Label {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                }
            })?;
        }
        Ok(())
    }

    /// Visible label bytes (no terminator).
    pub fn label(&self) -> &[u8] {
        let n = self.con.iter().position(|&b| b == 0).unwrap_or(LABEL_BUF_SIZE - 1);
        &self.con[..n]
    }

    /// Label including its NUL terminator.
    pub fn label_view(&self) -> ByteView<'_> {
        let n = self.label().len();
        ByteView::new(&self.con[..n + 1])
    }
}

impl std::fmt::Debug for FileAttr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileAttr")
            .field("mode", &format_args!("{:o}", self.mode))
            .field("uid", &self.uid)
            .field("gid", &self.gid)
            .field("label", &String::from_utf8_lossy(self.label()))
            .finish()
    }
}

fn lstat(path: &Path) -> Result<fs::Metadata> {
    fs::symlink_metadata(path).map_err(|source| PropError::Stat {
        path: path.to_path_buf(),
        source,
    })
}

/// Copy attributes of `src` onto `dest`. Advisory: callers may drop the result.
///
/// An unreadable label does not stop mode and ownership from being copied;
/// the label error is still returned afterwards.
pub fn clone_attr<P: AsRef<Path>, Q: AsRef<Path>>(src: P, dest: Q) -> Result<()> {
    let (src, dest) = (src.as_ref(), dest.as_ref());
    match FileAttr::get(src) {
        Ok(a) => a.set(dest),
        Err(label_err @ PropError::Label { .. }) => {
            let md = lstat(src)?;
            FileAttr::new(md.mode(), md.uid(), md.gid(), b"").set(dest)?;
            Err(label_err)
        }
        Err(e) => Err(e),
    }
}
