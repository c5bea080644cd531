// Filter Manager Tests for bloomstore
// These tests exercise the manager's public surface end to end

use bloomstore::{Config, Error, FilterConfig, FilterManager, FilterState};
use bytes::Bytes;
use tempfile::TempDir;

const KEYS: [&str; 3] = ["hey", "there", "person"];

fn open(dir: &TempDir) -> FilterManager {
    env_logger::try_init().ok();
    let config = Config::default().data_dir(dir.path()).initial_capacity(10_000);
    FilterManager::open(config).unwrap()
}

#[test]
fn test_init_destroy() {
    let dir = TempDir::new().unwrap();
    let manager = open(&dir);
    assert!(manager.is_empty());
    drop(manager);
}

#[test]
fn test_create_drop() {
    let dir = TempDir::new().unwrap();
    let manager = open(&dir);

    manager.create_filter("foo1", None).unwrap();
    assert!(dir.path().join("bloomstore.foo1").is_dir());

    manager.drop_filter("foo1").unwrap();
    assert!(!dir.path().join("bloomstore.foo1").exists());
    assert!(manager.is_empty());
}

#[test]
fn test_create_double_drop() {
    let dir = TempDir::new().unwrap();
    let manager = open(&dir);

    manager.create_filter("dub1", None).unwrap();
    manager.drop_filter("dub1").unwrap();
    assert!(manager.drop_filter("dub1").unwrap_err().is_not_found());
}

#[test]
fn test_drop_then_create_is_empty() {
    let dir = TempDir::new().unwrap();
    let manager = open(&dir);

    manager.create_filter("again", None).unwrap();
    manager.set_keys("again", &KEYS).unwrap();
    manager.drop_filter("again").unwrap();

    manager.create_filter("again", None).unwrap();
    assert_eq!(manager.filter_info("again").unwrap().size, 0);
    assert_eq!(manager.check_keys("again", &KEYS).unwrap(), vec![false, false, false]);
}

#[test]
fn test_create_existing() {
    let dir = TempDir::new().unwrap();
    let manager = open(&dir);

    manager.create_filter("dup", None).unwrap();
    let err = manager.create_filter("dup", None).unwrap_err();
    assert!(matches!(err, Error::AlreadyExists(_)));
}

#[test]
fn test_list() {
    let dir = TempDir::new().unwrap();
    let manager = open(&dir);

    manager.create_filter("bar1", None).unwrap();
    manager.create_filter("bar2", None).unwrap();

    let filters = manager.list_filters();
    assert_eq!(filters.len(), 2);
    let names: Vec<&str> = filters.iter().map(|f| f.name.as_str()).collect();
    assert!(names.contains(&"bar1"));
    assert!(names.contains(&"bar2"));

    manager.drop_filter("bar1").unwrap();
    manager.drop_filter("bar2").unwrap();
    assert!(manager.list_filters().is_empty());
}

#[test]
fn test_list_no_filters() {
    let dir = TempDir::new().unwrap();
    let manager = open(&dir);
    assert!(manager.list_filters().is_empty());
}

#[test]
fn test_add_check_keys() {
    let dir = TempDir::new().unwrap();
    let manager = open(&dir);

    manager.create_filter("zab1", None).unwrap();
    assert_eq!(manager.set_keys("zab1", &KEYS).unwrap(), vec![true, true, true]);
    assert_eq!(manager.check_keys("zab1", &KEYS).unwrap(), vec![true, true, true]);

    // Already present
    assert_eq!(manager.set_keys("zab1", &KEYS).unwrap(), vec![false, false, false]);
    assert_eq!(manager.filter_info("zab1").unwrap().size, 3);
}

#[test]
fn test_add_check_bytes_keys() {
    let dir = TempDir::new().unwrap();
    let manager = open(&dir);

    manager.create_filter("raw", None).unwrap();
    let keys = vec![Bytes::from_static(b"\x00\x01"), Bytes::from(vec![0xff; 64])];
    assert_eq!(manager.set_keys("raw", &keys).unwrap(), vec![true, true]);
    assert_eq!(manager.check_keys("raw", &keys).unwrap(), vec![true, true]);
}

#[test]
fn test_check_no_keys() {
    let dir = TempDir::new().unwrap();
    let manager = open(&dir);

    manager.create_filter("zab2", None).unwrap();
    assert_eq!(manager.check_keys("zab2", &KEYS).unwrap(), vec![false, false, false]);
}

#[test]
fn test_add_check_no_filter() {
    let dir = TempDir::new().unwrap();
    let manager = open(&dir);

    assert!(manager.set_keys("noop1", &KEYS).unwrap_err().is_not_found());
    assert!(manager.check_keys("noop1", &KEYS).unwrap_err().is_not_found());
    assert!(manager.is_empty());
    assert!(!dir.path().join("bloomstore.noop1").exists());
}

#[test]
fn test_flush_no_filter() {
    let dir = TempDir::new().unwrap();
    let manager = open(&dir);
    assert!(manager.flush_filter("noop1").unwrap_err().is_not_found());
}

#[test]
fn test_flush() {
    let dir = TempDir::new().unwrap();
    let manager = open(&dir);

    manager.create_filter("zab3", None).unwrap();
    manager.set_keys("zab3", &KEYS).unwrap();
    manager.flush_filter("zab3").unwrap();
    manager.flush_all().unwrap();
}

#[test]
fn test_unmap_no_filter() {
    let dir = TempDir::new().unwrap();
    let manager = open(&dir);
    assert!(manager.unmap_filter("noop2").unwrap_err().is_not_found());
}

#[test]
fn test_unmap() {
    let dir = TempDir::new().unwrap();
    let manager = open(&dir);

    manager.create_filter("zab4", None).unwrap();
    manager.unmap_filter("zab4").unwrap();
    assert_eq!(manager.filter_info("zab4").unwrap().state, FilterState::Unmapped);

    // Unmapping twice is fine
    manager.unmap_filter("zab4").unwrap();
    manager.drop_filter("zab4").unwrap();
}

#[test]
fn test_unmap_add_keys() {
    let dir = TempDir::new().unwrap();
    let manager = open(&dir);

    manager.create_filter("zab5", None).unwrap();
    manager.unmap_filter("zab5").unwrap();

    assert_eq!(manager.set_keys("zab5", &KEYS).unwrap(), vec![true, true, true]);
    let info = manager.filter_info("zab5").unwrap();
    assert_eq!(info.state, FilterState::Active);
    assert!(info.counters.page_ins >= 1);
}

#[test]
fn test_unmap_check_keys() {
    let dir = TempDir::new().unwrap();
    let manager = open(&dir);

    manager.create_filter("zab8", None).unwrap();
    manager.set_keys("zab8", &KEYS).unwrap();
    manager.flush_filter("zab8").unwrap();
    manager.unmap_filter("zab8").unwrap();

    assert_eq!(manager.check_keys("zab8", &KEYS).unwrap(), vec![true, true, true]);
    let info = manager.filter_info("zab8").unwrap();
    assert_eq!(info.state, FilterState::Active);
    assert_eq!(info.counters.page_outs, 1);
    assert_eq!(info.counters.page_ins, 1);
}

#[test]
fn test_list_cold_no_filters() {
    let dir = TempDir::new().unwrap();
    let manager = open(&dir);
    assert!(manager.list_cold_filters().is_empty());
}

#[test]
fn test_list_cold() {
    let dir = TempDir::new().unwrap();
    let manager = open(&dir);

    manager.create_filter("zab6", None).unwrap();
    manager.create_filter("zab7", None).unwrap();

    // Never accessed: both cold
    assert_eq!(manager.list_cold_filters().len(), 2);

    // Touch one so that it is hot
    assert_eq!(manager.set_keys("zab6", &KEYS).unwrap(), vec![true, true, true]);

    let cold = manager.list_cold_filters();
    assert_eq!(cold.len(), 1);
    assert_eq!(cold[0].name, "zab7");

    // The sweep leaves recently used filters alone
    assert_eq!(manager.sweep_cold(), 0);
    assert_eq!(manager.list_cold_filters().len(), 1);
}

#[test]
fn test_cold_after_idle_interval() {
    let dir = TempDir::new().unwrap();
    let config = Config::default().data_dir(dir.path()).initial_capacity(1000).cold_interval_secs(0);
    let manager = FilterManager::open(config).unwrap();

    manager.create_filter("idle", None).unwrap();
    manager.check_keys("idle", &KEYS).unwrap();
    assert!(manager.list_cold_filters().is_empty());

    assert_eq!(manager.sweep_cold(), 1);
    assert_eq!(manager.list_cold_filters()[0].name, "idle");

    // Access makes it hot again
    manager.check_keys("idle", &KEYS).unwrap();
    assert!(manager.list_cold_filters().is_empty());
}

#[test]
fn test_unmap_in_memory() {
    let dir = TempDir::new().unwrap();
    let config = Config::default().data_dir(dir.path()).initial_capacity(10_000).in_memory(true);
    let manager = FilterManager::open(config).unwrap();

    manager.create_filter("mem1", None).unwrap();
    assert!(!dir.path().join("bloomstore.mem1").exists());

    assert_eq!(manager.set_keys("mem1", &KEYS).unwrap(), vec![true, true, true]);
    manager.unmap_filter("mem1").unwrap();
    assert_eq!(manager.check_keys("mem1", &KEYS).unwrap(), vec![true, true, true]);

    let info = manager.filter_info("mem1").unwrap();
    assert!(info.in_memory);
    assert_eq!(info.state, FilterState::Active);

    manager.drop_filter("mem1").unwrap();
}

#[test]
fn test_create_custom_config() {
    let dir = TempDir::new().unwrap();
    let manager = open(&dir);

    let custom = FilterConfig::new(500, 0.001).in_memory(true);
    manager.create_filter("custom1", Some(custom)).unwrap();

    let info = manager.filter_info("custom1").unwrap();
    assert_eq!(info.capacity, 500);
    assert_eq!(info.probability, 0.001);
    assert!(info.in_memory);

    manager.drop_filter("custom1").unwrap();
}

#[test]
fn test_create_invalid_config() {
    let dir = TempDir::new().unwrap();
    let manager = open(&dir);

    for custom in [FilterConfig::new(0, 0.01), FilterConfig::new(100, 0.0), FilterConfig::new(100, 1.0)] {
        let err = manager.create_filter("bad", Some(custom)).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
    assert!(manager.is_empty());
    assert!(!dir.path().join("bloomstore.bad").exists());
}

#[test]
fn test_filter_info_counters() {
    let dir = TempDir::new().unwrap();
    let manager = open(&dir);

    manager.create_filter("info", None).unwrap();
    manager.set_keys("info", &KEYS).unwrap();
    manager.set_keys("info", &["hey"]).unwrap();
    manager.check_keys("info", &["hey", "nobody"]).unwrap();

    let info = manager.filter_info("info").unwrap();
    assert_eq!(info.size, 3);
    assert_eq!(info.capacity, 10_000);
    assert_eq!(info.pages, 1);
    assert!(info.byte_size > 0);
    assert_eq!(info.counters.set_hits, 3);
    assert_eq!(info.counters.set_misses, 1);
    assert_eq!(info.counters.check_hits, 1);
    assert_eq!(info.counters.check_misses, 1);

    let json = serde_json::to_value(&info).unwrap();
    assert_eq!(json["state"], "active");
    assert_eq!(json["counters"]["set_hits"], 3);
}

#[test]
fn test_close_and_restore() {
    let dir = TempDir::new().unwrap();
    {
        let manager = open(&dir);
        manager.create_filter("restore", None).unwrap();
        manager.set_keys("restore", &KEYS).unwrap();
        manager.create_filter("empty", None).unwrap();
        // Dropping the manager flushes everything
    }

    let manager = open(&dir);
    assert_eq!(manager.len(), 2);

    let info = manager.filter_info("restore").unwrap();
    assert_eq!(info.state, FilterState::Proxied);
    assert_eq!(info.size, 3);

    assert!(manager.create_filter("restore", None).unwrap_err().is_already_exists());
    assert_eq!(manager.check_keys("restore", &KEYS).unwrap(), vec![true, true, true]);
    assert_eq!(manager.filter_info("restore").unwrap().state, FilterState::Active);
}

#[test]
fn test_restore_keeps_stored_config() {
    let dir = TempDir::new().unwrap();
    {
        let manager = open(&dir);
        manager.create_filter("shaped", Some(FilterConfig::new(777, 0.02))).unwrap();
    }

    let manager = open(&dir);
    let info = manager.filter_info("shaped").unwrap();
    assert_eq!(info.capacity, 777);
    assert_eq!(info.probability, 0.02);
}

#[test]
fn test_clear_filter() {
    let dir = TempDir::new().unwrap();
    let manager = open(&dir);

    manager.create_filter("clr", None).unwrap();
    manager.set_keys("clr", &KEYS).unwrap();
    assert!(matches!(manager.clear_filter("clr"), Err(Error::InvalidState(_))));
    assert!(manager.clear_filter("missing").unwrap_err().is_not_found());

    manager.unmap_filter("clr").unwrap();
    manager.clear_filter("clr").unwrap();
    assert!(manager.filter_info("clr").unwrap_err().is_not_found());
    assert!(dir.path().join("bloomstore.clr").is_dir());

    // Re-creating attaches the persisted data
    manager.create_filter("clr", None).unwrap();
    assert_eq!(manager.check_keys("clr", &KEYS).unwrap(), vec![true, true, true]);
    assert_eq!(manager.filter_info("clr").unwrap().size, 3);

    // Only the first create after a clear re-attaches
    manager.drop_filter("clr").unwrap();
    manager.create_filter("clr", None).unwrap();
    assert_eq!(manager.filter_info("clr").unwrap().size, 0);
}

#[test]
fn test_cleared_filter_after_restart() {
    let dir = TempDir::new().unwrap();
    {
        let manager = open(&dir);
        manager.create_filter("stale", Some(FilterConfig::new(500, 0.01))).unwrap();
        manager.set_keys("stale", &KEYS).unwrap();
        manager.unmap_filter("stale").unwrap();
        manager.clear_filter("stale").unwrap();
    }

    // A restart rediscovers cleared data under its name
    let manager = open(&dir);
    assert_eq!(manager.filter_info("stale").unwrap().size, 3);
    manager.clear_filter("stale").unwrap();
    manager.create_filter("stale", None).unwrap();

    let info = manager.filter_info("stale").unwrap();
    assert_eq!(info.capacity, 500);
    assert_eq!(info.size, 3);
}

#[test]
fn test_config_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bloomstore.json");
    let data_dir = dir.path().join("data");
    let json = serde_json::json!({
        "data_dir": data_dir,
        "initial_capacity": 2000,
        "default_probability": 0.001,
    });
    std::fs::write(&path, json.to_string()).unwrap();

    let manager = FilterManager::open(Config::from_file(&path).unwrap()).unwrap();
    manager.create_filter("from_file", None).unwrap();
    assert_eq!(manager.filter_info("from_file").unwrap().capacity, 2000);
    assert!(data_dir.join("bloomstore.from_file").is_dir());
}
