//! Lightweight global metrics for propforge.
//!
//! Потокобезопасные атомарные счётчики для подсистем:
//! - live store (get/set/override)
//! - persisted overrides
//! - notifications

use std::sync::atomic::{AtomicU64, Ordering};

// ----- Live store -----
static LIVE_GETS: AtomicU64 = AtomicU64::new(0);
static LIVE_SETS: AtomicU64 = AtomicU64::new(0);
static OVERRIDE_WRITES: AtomicU64 = AtomicU64::new(0);
static WRITE_FAILURES: AtomicU64 = AtomicU64::new(0);

// ----- Persisted overrides -----
static PERSIST_READS: AtomicU64 = AtomicU64::new(0);
static PERSIST_WRITES: AtomicU64 = AtomicU64::new(0);
static PERSIST_DELETES: AtomicU64 = AtomicU64::new(0);

// ----- Notifications -----
static NOTIFICATIONS: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    // Live store
    pub live_gets: u64,
    pub live_sets: u64,
    pub override_writes: u64,
    pub write_failures: u64,

    // Persisted overrides
    pub persist_reads: u64,
    pub persist_writes: u64,
    pub persist_deletes: u64,

    // Notifications
    pub notifications: u64,
}

impl MetricsSnapshot {
    /// Share of successful writes that needed the override path.
    pub fn override_ratio(&self) -> f64 {
        let total = self.live_sets + self.override_writes;
        if total == 0 {
            0.0
        } else {
            self.override_writes as f64 / total as f64
        }
    }
}

// ----- Recorders (live) -----
pub fn record_live_get() {
    LIVE_GETS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_live_set() {
    LIVE_SETS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_override_write() {
    OVERRIDE_WRITES.fetch_add(1, Ordering::Relaxed);
}

pub fn record_write_failure() {
    WRITE_FAILURES.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (persist) -----
pub fn record_persist_read() {
    PERSIST_READS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_persist_write() {
    PERSIST_WRITES.fetch_add(1, Ordering::Relaxed);
}

pub fn record_persist_delete() {
    PERSIST_DELETES.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (notify) -----
pub fn record_notification() {
    NOTIFICATIONS.fetch_add(1, Ordering::Relaxed);
}

pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        live_gets: LIVE_GETS.load(Ordering::Relaxed),
        live_sets: LIVE_SETS.load(Ordering::Relaxed),
        override_writes: OVERRIDE_WRITES.load(Ordering::Relaxed),
        write_failures: WRITE_FAILURES.load(Ordering::Relaxed),
        persist_reads: PERSIST_READS.load(Ordering::Relaxed),
        persist_writes: PERSIST_WRITES.load(Ordering::Relaxed),
        persist_deletes: PERSIST_DELETES.load(Ordering::Relaxed),
        notifications: NOTIFICATIONS.load(Ordering::Relaxed),
    }
}

/// Сбросить все счётчики (для тестов/бенчей).
pub fn reset() {
    for c in [
        &LIVE_GETS,
        &LIVE_SETS,
        &OVERRIDE_WRITES,
        &WRITE_FAILURES,
        &PERSIST_READS,
        &PERSIST_WRITES,
        &PERSIST_DELETES,
        &NOTIFICATIONS,
    ] {
        c.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_move_forward() {
        let before = snapshot();
        record_live_set();
        record_override_write();
        let after = snapshot();
        // другие тесты могут писать параллельно — проверяем только рост
        assert!(after.live_sets > before.live_sets);
        assert!(after.override_writes > before.override_writes);
        let r = after.override_ratio();
        assert!((0.0..=1.0).contains(&r));
    }
}
