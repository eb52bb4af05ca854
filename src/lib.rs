// Базовые примитивы
pub mod consts;
pub mod error;
pub mod bytes;  // ByteView / ByteData
pub mod mmap;   // MappedFile
pub mod attr;   // FileAttr, clone_attr

// Свойства
pub mod collect;  // PropCollector, PropList
pub mod live;     // LiveStore seam + MemoryStore
pub mod area;     // PropArea (file-backed live store)
pub mod persist;  // persisted-override directory
pub mod propfile; // name=value parsing
pub mod subs;     // in-process watchers
pub mod store;    // PropertyStore

// Конфигурация и метрики
pub mod config;
pub mod metrics;

// Удобные реэкспорты
pub use area::PropArea;
pub use attr::{clone_attr, FileAttr};
pub use bytes::{ByteData, ByteView};
pub use collect::{PropCollector, PropList, PropListCollector};
pub use config::{PropConfig, StoreBuilder};
pub use error::{PropError, Result};
pub use live::{LiveStore, MemoryStore, OverrideToken, Refusal};
pub use mmap::MappedFile;
pub use persist::PersistDir;
pub use store::PropertyStore;
