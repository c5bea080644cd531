//! Configuration for the filter manager and for individual filters.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Manager-wide configuration.
///
/// The filter-shaping fields (`initial_capacity`, `default_probability`,
/// `scale_size`, `probability_reduction`, `in_memory`) are the defaults used
/// by [`crate::FilterManager::create_filter`] when no custom
/// [`FilterConfig`] is supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding one sub-directory per persisted filter.
    /// Default: /tmp/bloomstore
    pub data_dir: PathBuf,

    /// Number of keys the first page of a new filter is sized for.
    /// Default: 100000
    pub initial_capacity: u64,

    /// Target false positive probability of a new filter.
    /// Default: 0.0001
    pub default_probability: f64,

    /// Growth multiplier applied to the key capacity of each new page.
    /// Default: 4
    pub scale_size: u32,

    /// Tightening factor applied to the false positive target of each new page.
    /// Default: 0.9
    pub probability_reduction: f64,

    /// Seconds between background flushes of every filter. 0 disables them.
    /// Default: 60
    pub flush_interval_secs: u64,

    /// Seconds a filter may stay idle before the cold sweep marks it cold.
    /// Default: 3600
    pub cold_interval_secs: u64,

    /// Keep new filters purely in memory, never touching `data_dir`.
    /// Default: false
    pub in_memory: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/tmp/bloomstore"),
            initial_capacity: 100_000,
            default_probability: 0.0001,
            scale_size: 4,
            probability_reduction: 0.9,
            flush_interval_secs: 60,
            cold_interval_secs: 3600,
            in_memory: false,
        }
    }
}

impl Config {
    /// Creates a new Config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a configuration from a JSON file.
    ///
    /// Every field is optional; missing fields keep their default value.
    ///
    /// ```rust,no_run
    /// use bloomstore::Config;
    ///
    /// # fn main() -> Result<(), bloomstore::Error> {
    /// let config = Config::from_file("/etc/bloomstore.json")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the data directory.
    pub fn data_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.data_dir = path.into();
        self
    }

    /// Sets the initial key capacity of new filters.
    pub fn initial_capacity(mut self, capacity: u64) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Sets the target false positive probability of new filters.
    pub fn default_probability(mut self, probability: f64) -> Self {
        self.default_probability = probability;
        self
    }

    /// Sets the page growth multiplier.
    pub fn scale_size(mut self, scale: u32) -> Self {
        self.scale_size = scale;
        self
    }

    /// Sets the per-page probability tightening factor.
    pub fn probability_reduction(mut self, reduction: f64) -> Self {
        self.probability_reduction = reduction;
        self
    }

    /// Sets the background flush interval in seconds.
    pub fn flush_interval_secs(mut self, secs: u64) -> Self {
        self.flush_interval_secs = secs;
        self
    }

    /// Sets the idle time after which a filter becomes cold.
    pub fn cold_interval_secs(mut self, secs: u64) -> Self {
        self.cold_interval_secs = secs;
        self
    }

    /// Sets whether new filters are kept purely in memory.
    pub fn in_memory(mut self, value: bool) -> Self {
        self.in_memory = value;
        self
    }

    /// The idle window used by the cold sweep.
    pub fn cold_interval(&self) -> Duration {
        Duration::from_secs(self.cold_interval_secs)
    }

    /// The background flush period, if enabled.
    pub fn flush_interval(&self) -> Option<Duration> {
        (self.flush_interval_secs > 0).then(|| Duration::from_secs(self.flush_interval_secs))
    }

    /// The per-filter configuration derived from these defaults.
    pub fn filter_config(&self) -> FilterConfig {
        FilterConfig {
            capacity: self.initial_capacity,
            probability: self.default_probability,
            scale_size: self.scale_size,
            probability_reduction: self.probability_reduction,
            in_memory: self.in_memory,
        }
    }

    /// Validates the configuration and returns an error if any field is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(Error::invalid_config("data_dir must not be empty"));
        }
        self.filter_config().validate()
    }
}

/// Configuration of a single filter.
///
/// Persisted alongside the filter's pages and restored on discovery, so a
/// filter keeps the shape it was created with even if the manager defaults
/// change later.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Number of keys the first page is sized for.
    pub capacity: u64,
    /// Target false positive probability of the whole filter.
    pub probability: f64,
    /// Growth multiplier for the key capacity of each new page.
    pub scale_size: u32,
    /// Tightening factor for the false positive target of each new page.
    pub probability_reduction: f64,
    /// Pages never have a backing file.
    pub in_memory: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Config::default().filter_config()
    }
}

impl FilterConfig {
    /// Creates a filter configuration for `capacity` keys at `probability`,
    /// using the default growth parameters.
    pub fn new(capacity: u64, probability: f64) -> Self {
        Self { capacity, probability, ..Self::default() }
    }

    /// Sets the page growth multiplier.
    pub fn scale_size(mut self, scale: u32) -> Self {
        self.scale_size = scale;
        self
    }

    /// Sets the per-page probability tightening factor.
    pub fn probability_reduction(mut self, reduction: f64) -> Self {
        self.probability_reduction = reduction;
        self
    }

    /// Sets whether the filter is kept purely in memory.
    pub fn in_memory(mut self, value: bool) -> Self {
        self.in_memory = value;
        self
    }

    /// Key capacity of page `index`: `capacity * scale_size^index`.
    pub fn page_capacity(&self, index: u32) -> u64 {
        (self.scale_size as u64).saturating_pow(index).saturating_mul(self.capacity)
    }

    /// False positive target of page `index`.
    ///
    /// The first page gets `probability * (1 - reduction)` and every later page
    /// is tightened by `reduction`, so the compounded rate over all pages
    /// stays below `probability`.
    pub fn page_probability(&self, index: u32) -> f64 {
        let first = self.probability * (1.0 - self.probability_reduction);
        first * self.probability_reduction.powi(index as i32)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::invalid_config("capacity must be > 0"));
        }
        if !(self.probability > 0.0 && self.probability < 1.0) {
            return Err(Error::invalid_config("probability must be between 0 and 1"));
        }
        if self.scale_size == 0 {
            return Err(Error::invalid_config("scale_size must be > 0"));
        }
        if !(self.probability_reduction > 0.0 && self.probability_reduction < 1.0) {
            return Err(Error::invalid_config("probability_reduction must be between 0 and 1"));
        }
        Ok(())
    }
}

/// Checks that `name` can be used as a filter name.
///
/// Names become part of an on-disk path, so path separators, whitespace,
/// control characters and the special names `.`/`..` are rejected.
pub fn validate_filter_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_argument("filter name must not be empty"));
    }
    if name == "." || name == ".." {
        return Err(Error::invalid_argument(format!("reserved filter name: {}", name)));
    }
    if name.chars().any(|c| c == '/' || c == '\\' || c.is_whitespace() || c.is_control()) {
        return Err(Error::invalid_argument(format!("invalid filter name: {:?}", name)));
    }
    Ok(())
}
