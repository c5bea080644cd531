//! # bloomstore - Named Scalable Bloom Filters
//!
//! bloomstore keeps a directory of named set-membership filters. Each filter
//! grows without bound by appending ever larger bloom pages, pages can be
//! released from memory and transparently paged back in, and every filter is
//! persisted in its own directory so it survives restarts.
//!
//! ## Architecture
//!
//! - **BitPage**: One fixed-size bloom bit array, mapped or unmapped
//! - **ScalableFilter**: A growable sequence of pages with a lifecycle
//! - **FilterManager**: Concurrent name-addressed directory of filters
//! - **Backend**: Persistence of page images and filter records
//! - **MaintenanceWorker**: Background flushes and cold sweeps
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use bloomstore::{Config, FilterManager};
//!
//! # fn main() -> Result<(), bloomstore::Error> {
//! // Open the store, discovering previously persisted filters
//! let config = Config::default().data_dir("./data");
//! let manager = FilterManager::open(config)?;
//!
//! manager.create_filter("visitors", None)?;
//! manager.set_keys("visitors", &["alice", "bob"])?;
//!
//! let present = manager.check_keys("visitors", &["alice", "mallory"])?;
//! assert_eq!(present, vec![true, false]);
//!
//! // Release memory; the next access pages the filter back in
//! manager.unmap_filter("visitors")?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod backend;
pub mod config;
pub mod error;
pub mod filter;
pub mod manager;
pub mod page;

// Re-exports
pub use backend::{Backend, FileBackend, FilterRecord};
pub use config::{Config, FilterConfig};
pub use error::{Error, Result};
pub use filter::{AddOutcome, CounterSnapshot, FilterInfo, FilterState, ScalableFilter};
pub use manager::{FilterManager, MaintenanceWorker};
pub use page::BitPage;
