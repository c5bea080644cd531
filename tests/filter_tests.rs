// Scalable Filter Tests for bloomstore
// These tests verify filter behavior without the manager

use bloomstore::backend::file::page_filename;
use bloomstore::{AddOutcome, Backend, FileBackend, FilterConfig, FilterState, ScalableFilter};
use std::sync::Arc;
use tempfile::TempDir;

fn backend(dir: &TempDir) -> Arc<dyn Backend> {
    env_logger::try_init().ok();
    Arc::new(FileBackend::open(dir.path()).unwrap())
}

#[test]
fn test_proxied_filter_reports_target_capacity() {
    let dir = TempDir::new().unwrap();
    let filter = ScalableFilter::proxied("proxy", FilterConfig::new(100_000, 0.0001), Some(backend(&dir)));

    assert_eq!(filter.state(), FilterState::Proxied);
    assert_eq!(filter.capacity(), 100_000);
    assert_eq!(filter.size(), 0);
    assert_eq!(filter.byte_size(), 0);
    assert_eq!(filter.num_pages(), 0);

    // Nothing was touched on disk
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_proxied_first_access_allocates() {
    let dir = TempDir::new().unwrap();
    let mut filter = ScalableFilter::proxied("proxy", FilterConfig::new(1000, 0.001), Some(backend(&dir)));

    assert!(filter.add(b"first").unwrap().is_added());
    assert_eq!(filter.state(), FilterState::Active);
    assert_eq!(filter.num_pages(), 1);
    assert!(dir.path().join("bloomstore.proxy").join(page_filename(0)).exists());
}

#[test]
fn test_idempotent_add() {
    let mut filter = ScalableFilter::create("idem", FilterConfig::new(1000, 0.01), None).unwrap();

    assert_eq!(filter.add(b"key").unwrap(), AddOutcome::Added);
    assert_eq!(filter.add(b"key").unwrap(), AddOutcome::AlreadyPresent);
    assert_eq!(filter.size(), 1);
}

#[test]
fn test_counters_after_many_keys() {
    let dir = TempDir::new().unwrap();
    let mut filter = ScalableFilter::create("counted", FilterConfig::new(100_000, 0.0001), Some(backend(&dir))).unwrap();

    for i in 0..10_000 {
        assert!(filter.add(format!("foobar{}", i).as_bytes()).unwrap().is_added());
    }
    let counters = filter.counters().snapshot();
    assert_eq!(counters.set_hits, 10_000);
    assert_eq!(counters.set_misses, 0);
    assert_eq!(filter.size(), 10_000);

    for i in 0..10_000 {
        assert!(filter.contains(format!("foobar{}", i).as_bytes()).unwrap());
    }
    let counters = filter.counters().snapshot();
    assert_eq!(counters.check_hits, 10_000);
    assert_eq!(counters.check_misses, 0);
}

#[test]
fn test_unmap_remap_transparency() {
    let dir = TempDir::new().unwrap();
    let mut filter = ScalableFilter::create("remap", FilterConfig::new(1000, 0.01), Some(backend(&dir))).unwrap();

    let keys: Vec<String> = (0..500).map(|i| format!("key{}", i)).collect();
    for key in &keys {
        filter.add(key.as_bytes()).unwrap();
    }
    let probes: Vec<bool> = (0..2000).map(|i| filter.contains(format!("probe{}", i).as_bytes()).unwrap()).collect();

    filter.flush().unwrap();
    filter.unmap().unwrap();
    assert_eq!(filter.state(), FilterState::Unmapped);

    for key in &keys {
        assert!(filter.contains(key.as_bytes()).unwrap());
    }
    assert_eq!(filter.state(), FilterState::Active);
    assert!(filter.counters().snapshot().page_ins >= 1);

    // Identical answers for keys never added
    let after: Vec<bool> = (0..2000).map(|i| filter.contains(format!("probe{}", i).as_bytes()).unwrap()).collect();
    assert_eq!(probes, after);
}

#[test]
fn test_scale_up() {
    let dir = TempDir::new().unwrap();
    let config = FilterConfig::new(1000, 0.001);
    let mut filter = ScalableFilter::create("scale", config, Some(backend(&dir))).unwrap();

    let mut added = 0;
    for i in 0..10_000 {
        if filter.add(format!("foobar{}", i).as_bytes()).unwrap().is_added() {
            added += 1;
        }
    }

    // 1000 + 4000 + 16000
    assert_eq!(filter.num_pages(), 3);
    assert_eq!(filter.capacity(), 21_000);
    assert_eq!(filter.size(), added);
    assert!(added >= 9_990);

    for i in 0..10_000 {
        assert!(filter.contains(format!("foobar{}", i).as_bytes()).unwrap());
    }

    let filter_dir = dir.path().join("bloomstore.scale");
    for index in 0..3 {
        assert!(filter_dir.join(page_filename(index)).exists());
    }
}

#[test]
fn test_false_positive_rate_stays_bounded() {
    let config = FilterConfig::new(1000, 0.01);
    let mut filter = ScalableFilter::create("fp", config, None).unwrap();

    for i in 0..20_000 {
        filter.add(format!("member{}", i).as_bytes()).unwrap();
    }
    assert!(filter.num_pages() > 1);

    let false_positives = (0..20_000)
        .filter(|i| filter.contains(format!("stranger{}", i).as_bytes()).unwrap())
        .count();
    let rate = false_positives as f64 / 20_000.0;
    assert!(rate < 0.01, "False positive rate too high: {:.4}", rate);
}

#[test]
fn test_restart_discovery() {
    let dir = TempDir::new().unwrap();
    let config = FilterConfig::new(1000, 0.001);
    {
        let mut filter = ScalableFilter::create("restart", config, Some(backend(&dir))).unwrap();
        for i in 0..3000 {
            filter.add(format!("key{}", i).as_bytes()).unwrap();
        }
        filter.flush().unwrap();
    }

    let backend = backend(&dir);
    assert_eq!(backend.discover().unwrap(), vec!["restart".to_string()]);
    assert_eq!(backend.read_existing("restart").unwrap(), Some(vec![0, 1]));

    let mut filter = ScalableFilter::discover("restart", backend, FilterConfig::default()).unwrap();
    assert_eq!(filter.state(), FilterState::Proxied);
    assert_eq!(filter.config(), &config);
    assert_eq!(filter.num_pages(), 2);
    assert_eq!(filter.capacity(), 5000);

    for i in 0..3000 {
        assert!(filter.contains(format!("key{}", i).as_bytes()).unwrap());
    }
    assert_eq!(filter.counters().snapshot().page_ins, 2);
}

#[test]
fn test_discover_persists_record_and_page() {
    let dir = TempDir::new().unwrap();
    let mut filter = ScalableFilter::proxied("files", FilterConfig::new(100, 0.01), Some(backend(&dir)));
    filter.contains(b"x").unwrap();
    filter.flush().unwrap();

    let filter_dir = dir.path().join("bloomstore.files");
    let mut files: Vec<String> = std::fs::read_dir(&filter_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    files.sort();
    assert_eq!(files, vec!["filter.meta".to_string(), page_filename(0)]);
}

#[test]
fn test_flush_unmapped_is_noop() {
    let dir = TempDir::new().unwrap();
    let mut filter = ScalableFilter::create("noop", FilterConfig::new(100, 0.01), Some(backend(&dir))).unwrap();
    filter.unmap().unwrap();
    filter.flush().unwrap();
    filter.unmap().unwrap();
    assert_eq!(filter.state(), FilterState::Unmapped);
}

#[test]
fn test_delete_removes_storage() {
    let dir = TempDir::new().unwrap();
    let mut filter = ScalableFilter::create("del", FilterConfig::new(100, 0.01), Some(backend(&dir))).unwrap();
    filter.add(b"k").unwrap();
    filter.unmap().unwrap();

    filter.delete().unwrap();
    assert_eq!(filter.state(), FilterState::Deleted);
    assert!(!dir.path().join("bloomstore.del").exists());
    assert!(filter.contains(b"k").is_err());
}

#[test]
fn test_in_memory_delete() {
    let mut filter = ScalableFilter::create("mem", FilterConfig::new(100, 0.01).in_memory(true), None).unwrap();
    filter.add(b"k").unwrap();
    filter.flush().unwrap();
    filter.delete().unwrap();
    assert_eq!(filter.size(), 0);
    assert_eq!(filter.byte_size(), 0);
}
