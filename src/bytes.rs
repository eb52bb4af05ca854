//! bytes — non-owning spans over contiguous bytes (ByteView / ByteData).
//!
//! Ни один конструктор не копирует байты: копируется только пара (ptr, len),
//! а время жизни привязано к владельцу через `'a`.
//!
//! Правило NUL:
//! - `&str` не гарантирует завершающий NUL, поэтому `with_nul` для него
//!   никогда не расширяет длину;
//! - `&CStr` и NUL-буферы расширяются ровно на один байт.

use std::ffi::CStr;
use std::ops::{Deref, DerefMut};

/// Read-only span. `Copy`: duplicating it duplicates only the span.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteView<'a> {
    buf: &'a [u8],
}

impl<'a> ByteView<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Text without guaranteed terminator: `with_nul` leaves the length as is.
    pub fn from_text(s: &'a str, with_nul: bool) -> Self {
        let _ = with_nul;
        Self { buf: s.as_bytes() }
    }

    /// Terminator-bearing text: `with_nul` includes the NUL byte.
    pub fn from_cstr(s: &'a CStr, with_nul: bool) -> Self {
        let buf = if with_nul {
            s.to_bytes_with_nul()
        } else {
            s.to_bytes()
        };
        Self { buf }
    }

    #[inline]
    pub fn buf(&self) -> &'a [u8] {
        self.buf
    }

    #[inline]
    pub fn sz(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl<'a> From<&'a [u8]> for ByteView<'a> {
    fn from(buf: &'a [u8]) -> Self {
        Self::new(buf)
    }
}

impl<'a> From<&'a Vec<u8>> for ByteView<'a> {
    fn from(v: &'a Vec<u8>) -> Self {
        Self::new(v.as_slice())
    }
}

impl<'a> From<&'a CStr> for ByteView<'a> {
    fn from(s: &'a CStr) -> Self {
        Self::from_cstr(s, true)
    }
}

impl Deref for ByteView<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf
    }
}

/// Mutable span. Constructible only from sources known to be mutable.
#[derive(Debug, Default)]
pub struct ByteData<'a> {
    buf: &'a mut [u8],
}

impl<'a> ByteData<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf }
    }

    /// Owned text buffer whose content ends at the first NUL.
    /// `with_nul` includes the terminator only if the buffer really has one.
    pub fn from_nul_buf(buf: &'a mut [u8], with_nul: bool) -> Self {
        let len = match buf.iter().position(|&b| b == 0) {
            Some(pos) if with_nul => pos + 1,
            Some(pos) => pos,
            None => buf.len(),
        };
        Self {
            buf: &mut buf[..len],
        }
    }

    /// Swap spans with another instance (move support for owning wrappers).
    pub fn swap(&mut self, other: &mut ByteData<'a>) {
        std::mem::swap(&mut self.buf, &mut other.buf);
    }

    pub fn as_view(&self) -> ByteView<'_> {
        ByteView::new(self.buf)
    }

    #[inline]
    pub fn buf(&mut self) -> &mut [u8] {
        self.buf
    }

    #[inline]
    pub fn sz(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl<'a> From<&'a mut [u8]> for ByteData<'a> {
    fn from(buf: &'a mut [u8]) -> Self {
        Self::new(buf)
    }
}

impl<'a> From<&'a mut Vec<u8>> for ByteData<'a> {
    fn from(v: &'a mut Vec<u8>) -> Self {
        Self::new(v.as_mut_slice())
    }
}

impl Deref for ByteData<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf
    }
}

impl DerefMut for ByteData<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn str_never_grows_with_nul() {
        let s = "ro.build.type";
        assert_eq!(ByteView::from_text(s, true).sz(), s.len());
        assert_eq!(ByteView::from_text(s, false).sz(), s.len());
    }

    #[test]
    fn cstr_grows_by_exactly_one() {
        let c = CString::new("persist.sys.usb").unwrap();
        let with = ByteView::from_cstr(&c, true);
        let without = ByteView::from_cstr(&c, false);
        assert_eq!(without.sz(), 15);
        assert_eq!(with.sz(), 16);
        assert_eq!(with.buf()[15], 0);
        // default conversion keeps the terminator
        assert_eq!(ByteView::from(c.as_c_str()).sz(), 16);
    }

    #[test]
    fn vec_and_slice_views_share_memory() {
        let v = vec![1u8, 2, 3, 4];
        let a = ByteView::from(&v);
        let b = a;
        assert_eq!(a.sz(), 4);
        assert_eq!(a.buf().as_ptr(), v.as_ptr());
        assert_eq!(b.buf().as_ptr(), v.as_ptr());
    }

    #[test]
    fn nul_buf_rules() {
        let mut buf = *b"abc\0\0\0";
        assert_eq!(ByteData::from_nul_buf(&mut buf, true).sz(), 4);
        assert_eq!(ByteData::from_nul_buf(&mut buf, false).sz(), 3);

        // no terminator: nothing to include
        let mut raw = *b"abc";
        assert_eq!(ByteData::from_nul_buf(&mut raw, true).sz(), 3);
    }

    #[test]
    fn swap_exchanges_spans() {
        let mut x = vec![0u8; 2];
        let mut y = vec![0u8; 5];
        let mut a = ByteData::from(&mut x);
        let mut b = ByteData::from(&mut y);
        a.swap(&mut b);
        assert_eq!(a.sz(), 5);
        assert_eq!(b.sz(), 2);
        a[0] = 7;
        drop(a);
        drop(b);
        assert_eq!(y[0], 7);
    }
}
