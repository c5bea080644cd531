//! Basic usage example for bloomstore
//!
//! This example demonstrates the fundamental operations:
//! - Opening a store and discovering existing filters
//! - Creating filters with default and custom configurations
//! - Setting and checking keys
//! - Unmapping a filter and paging it back in
//! - Running the background maintenance worker

use anyhow::Context;
use bloomstore::{Config, FilterConfig, FilterManager, MaintenanceWorker};
use bytes::Bytes;
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init();

    // Configure the store
    let config = Config::default()
        .data_dir("./example_data")
        .initial_capacity(10_000)
        .flush_interval_secs(5);

    // Open the store (previously persisted filters are discovered)
    let manager = Arc::new(FilterManager::open(config).context("failed to open store")?);
    let _worker = MaintenanceWorker::spawn(&manager)?;

    println!("Store opened with {} filters", manager.len());

    if !manager.contains_filter("visitors") {
        manager.create_filter("visitors", None)?;
    }
    if !manager.contains_filter("scratch") {
        manager.create_filter("scratch", Some(FilterConfig::new(1000, 0.01).in_memory(true)))?;
    }

    // Set some keys
    let keys = vec![Bytes::from("alice"), Bytes::from("bob"), Bytes::from("carol")];
    let added = manager.set_keys("visitors", &keys)?;
    println!("Newly added: {:?}", added);

    // Check keys
    let present = manager.check_keys("visitors", &["alice", "mallory"])?;
    println!("alice: {}, mallory: {}", present[0], present[1]);

    // Release memory and page back in
    manager.unmap_filter("visitors")?;
    let present = manager.check_keys("visitors", &keys)?;
    println!("After remap: {:?}", present);

    for info in manager.list_filters() {
        println!("{}", serde_json::to_string(&info)?);
    }

    manager.flush_all()?;
    manager.drop_filter("scratch")?;
    println!("Done");

    Ok(())
}
