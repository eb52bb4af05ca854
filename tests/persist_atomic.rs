use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;

use propforge::{LiveStore, PersistDir, PropArea};

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    std::env::temp_dir().join(format!("propforge-{prefix}-{pid}-{t}"))
}

/// Value whose first 4 chars encode the length of the rest, so a truncated
/// or mixed read is detectable.
fn make_value(len: usize, fill: char) -> String {
    let mut s = format!("{:04}", len);
    s.extend(std::iter::repeat(fill).take(len));
    s
}

fn check_value(v: &str) {
    assert!(v.len() >= 4, "truncated header: {:?}", v);
    let want: usize = v[..4].parse().expect("length header");
    let body = &v[4..];
    assert_eq!(body.len(), want, "partial value observed");
    let first = body.chars().next();
    assert!(body.chars().all(|c| Some(c) == first), "mixed value observed");
}

#[test]
fn persist_set_is_atomic_for_concurrent_readers() -> Result<()> {
    let root = unique_root("atomic");
    fs::create_dir_all(&root)?;
    let dir = PersistDir::new(&root, false);
    dir.set("persist.atomic", &make_value(16, 'a'))?;

    let done = AtomicBool::new(false);
    std::thread::scope(|s| {
        let reader = s.spawn(|| {
            let mut reads = 0u64;
            while !done.load(Ordering::Acquire) {
                let v = dir
                    .read("persist.atomic")
                    .expect("read")
                    .expect("value must always exist during replace");
                check_value(&v);
                reads += 1;
            }
            reads
        });

        let mut rng = oorandom::Rand32::new(0x5eed);
        let fills = ['a', 'b', 'c', 'd'];
        for i in 0..400 {
            let len = rng.rand_range(0..64 * 1024) as usize;
            let v = make_value(len, fills[i % fills.len()]);
            dir.set("persist.atomic", &v).expect("persist_set");
        }
        done.store(true, Ordering::Release);
        let _reads = reader.join().expect("reader thread");
    });

    // временные файлы не остаются
    let leftovers: Vec<_> = fs::read_dir(&root)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
        .collect();
    assert!(leftovers.is_empty());
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn area_slot_reads_are_never_torn() -> Result<()> {
    let root = unique_root("area-torn");
    fs::create_dir_all(&root)?;
    let path = root.join("area");
    let writer = Arc::new(PropArea::create(&path, 4)?);
    // второе отображение того же файла — как у другого процесса
    let reader = PropArea::open(&path)?;
    writer.raw_set("sys.torn", &make_value(10, 'a'))?;

    let done = AtomicBool::new(false);
    std::thread::scope(|s| {
        let r = s.spawn(|| {
            while !done.load(Ordering::Acquire) {
                if let Some(v) = reader.raw_get("sys.torn") {
                    check_value(&v);
                }
            }
        });

        let mut rng = oorandom::Rand32::new(42);
        for i in 0..5000 {
            let len = rng.rand_range(0..80) as usize;
            let fill = if i % 2 == 0 { 'x' } else { 'y' };
            writer
                .raw_set("sys.torn", &make_value(len, fill))
                .expect("raw_set");
        }
        done.store(true, Ordering::Release);
        r.join().expect("reader thread");
    });
    let _ = fs::remove_dir_all(&root);
    Ok(())
}
