//! Background maintenance: periodic flushes and cold sweeps.

use super::FilterManager;
use crate::error::Result;
use crossbeam::channel::{self, select, Receiver, Sender};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Sweeps per cold interval, bounding how late an idle filter turns cold.
const SWEEPS_PER_COLD_INTERVAL: u32 = 4;

/// Shortest period between two cold sweeps.
const MIN_SWEEP_PERIOD: Duration = Duration::from_millis(100);

/// Handle to the maintenance thread of a [`FilterManager`].
///
/// The thread flushes every filter each `flush_interval_secs` (if non-zero)
/// and runs [`FilterManager::sweep_cold`] four times per `cold_interval_secs`,
/// so an idle filter turns cold at most a quarter interval late. It only
/// holds a weak reference and exits once the manager is gone. Dropping the
/// handle stops the thread and waits for it.
///
/// ```rust,no_run
/// use bloomstore::{Config, FilterManager, MaintenanceWorker};
/// use std::sync::Arc;
///
/// # fn main() -> Result<(), bloomstore::Error> {
/// let manager = Arc::new(FilterManager::open(Config::default())?);
/// let _worker = MaintenanceWorker::spawn(&manager)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MaintenanceWorker {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MaintenanceWorker {
    /// Starts the maintenance thread for `manager`.
    pub fn spawn(manager: &Arc<FilterManager>) -> Result<Self> {
        let flush_period = manager.config().flush_interval();
        let sweep_period = sweep_period(manager.config().cold_interval());
        let weak = Arc::downgrade(manager);
        let (shutdown_tx, shutdown_rx) = channel::bounded(0);

        let handle = thread::Builder::new()
            .name("bloomstore-maintenance".to_string())
            .spawn(move || run(weak, shutdown_rx, flush_period, sweep_period))?;

        log::info!(
            "Maintenance worker started (flush: {:?}, sweep: {:?})",
            flush_period,
            sweep_period
        );
        Ok(Self { shutdown: Some(shutdown_tx), handle: Some(handle) })
    }

    /// Stops the thread and waits for it to exit.
    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        // Disconnecting the channel wakes the thread up.
        self.shutdown.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Maintenance worker panicked");
            }
        }
    }
}

impl Drop for MaintenanceWorker {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}

fn sweep_period(cold_interval: Duration) -> Duration {
    (cold_interval / SWEEPS_PER_COLD_INTERVAL).max(MIN_SWEEP_PERIOD)
}

fn run(manager: Weak<FilterManager>, shutdown: Receiver<()>, flush_period: Option<Duration>, sweep_period: Duration) {
    let flush_ticks = match flush_period {
        Some(period) => channel::tick(period),
        None => channel::never::<Instant>(),
    };
    let sweep_ticks = channel::tick(sweep_period);

    loop {
        let running = select! {
            recv(shutdown) -> _ => false,
            recv(flush_ticks) -> _ => flush(&manager),
            recv(sweep_ticks) -> _ => sweep(&manager),
        };
        if !running {
            break;
        }
    }

    log::info!("Maintenance worker stopped");
}

/// Returns false once the manager is gone.
fn flush(manager: &Weak<FilterManager>) -> bool {
    let Some(manager) = manager.upgrade() else {
        return false;
    };
    if let Err(e) = manager.flush_all() {
        log::warn!("Background flush failed: {}", e);
    }
    true
}

fn sweep(manager: &Weak<FilterManager>) -> bool {
    let Some(manager) = manager.upgrade() else {
        return false;
    };
    let cooled = manager.sweep_cold();
    if cooled > 0 {
        log::debug!("Cold sweep marked {} filters cold", cooled);
    }
    true
}
