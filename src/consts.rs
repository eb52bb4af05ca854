//! Общие константы (property limits, persist dir, prop area, ioctl).

// -------- Property limits --------
// PROP_VALUE_MAX включает завершающий NUL (как в bionic).
pub const PROP_VALUE_MAX: usize = 92;
pub const PROP_NAME_MAX: usize = 128;

/// Reserved prefix: once set, the live store refuses ordinary writes.
pub const RO_PREFIX: &str = "ro.";

// -------- Persisted overrides --------
pub const PERSIST_PROP_DIR: &str = "/data/property";
// Временные файлы начинаются с '.', поэтому никогда не совпадают с именем свойства.
pub const PERSIST_TMP_PREFIX: &str = ".prop-";

// -------- Security label --------
pub const XATTR_NAME_SELINUX: &str = "security.selinux";
// 127 видимых символов + NUL.
pub const LABEL_BUF_SIZE: usize = 128;

// -------- Prop area --------
// Header (32 байта):
// [magic8="PROPAREA"][version u32=1][slots u32][serial u32][reserved 12]
pub const AREA_MAGIC: &[u8; 8] = b"PROPAREA";
pub const AREA_VERSION: u32 = 1;
pub const AREA_HDR_SIZE: usize = 32;
pub const AREA_OFF_MAGIC: usize = 0;
pub const AREA_OFF_VERSION: usize = 8;
pub const AREA_OFF_SLOTS: usize = 12;
pub const AREA_OFF_SERIAL: usize = 16;
pub const AREA_DEFAULT_SLOTS: u32 = 1024;

// Slot (256 байт):
// [serial u32][name_len u16][value_len u16][name 128][value 92][pad 28]
pub const SLOT_SIZE: usize = 256;
pub const SLOT_OFF_SERIAL: usize = 0;
pub const SLOT_OFF_NAME_LEN: usize = 4;
pub const SLOT_OFF_VALUE_LEN: usize = 6;
pub const SLOT_OFF_NAME: usize = 8;
pub const SLOT_OFF_VALUE: usize = SLOT_OFF_NAME + PROP_NAME_MAX;

// -------- Block devices --------
#[cfg(target_pointer_width = "64")]
pub const BLKGETSIZE64: u64 = 0x8008_1272;
#[cfg(target_pointer_width = "32")]
pub const BLKGETSIZE64: u64 = 0x8004_1272;
