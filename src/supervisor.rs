//! The pre-listening sequence and the supervised event loop.
//!
//! Spawns a task per listening socket plus a signal bridge under a
//! `JoinSet`, coordinates shutdown through a `CancellationToken`, and
//! aborts stragglers once a grace period elapses. A sliding-window
//! fault counter escalates repeated internal errors into a shutdown.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tokio::time::{Instant as TokioInstant, timeout};
use tokio_util::sync::CancellationToken;

use crate::config::{ServerConfig, UnresolvedConfig};
use crate::duid::select_duid;
use crate::error::Result;
use crate::handler::Handler;
use crate::iface::{discover_interfaces, resolve_interfaces};
use crate::listener::{run_listener, run_signal_bridge};
use crate::logging;
use crate::privilege::drop_privileges;
use crate::socket::build_sockets;
use crate::worker::{JobTracker, WorkerPool};

const GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Tracks recent internal faults in a sliding time window and reports
/// when the configured threshold has been exceeded.
#[derive(Clone)]
pub(crate) struct FaultTracker {
    history: Arc<Mutex<VecDeque<Instant>>>,
    tripped: Arc<Mutex<Option<usize>>>,
    window: Duration,
    max: usize,
}

impl FaultTracker {
    fn new(window_s: f64, max: usize) -> Self {
        FaultTracker {
            history: Arc::new(Mutex::new(VecDeque::new())),
            tripped: Arc::new(Mutex::new(None)),
            window: Duration::from_secs_f64(window_s.max(0.0)),
            max,
        }
    }

    /// Records a fault and returns `true` once the window holds more
    /// than `max` entries. Remembers the tripping count so the caller can
    /// tell an exception-storm shutdown apart from a clean one.
    pub(crate) fn record_fault(&self) -> bool {
        let now = Instant::now();
        let mut history = self.history.lock().expect("fault tracker mutex poisoned");
        history.push_back(now);
        while let Some(&front) = history.front() {
            if now.duration_since(front) > self.window {
                history.pop_front();
            } else {
                break;
            }
        }
        if history.len() > self.max {
            tracing::error!(
                count = history.len(),
                window_s = self.window.as_secs_f64(),
                "too many internal faults, shutting down"
            );
            *self.tripped.lock().expect("fault tracker mutex poisoned") = Some(history.len());
            true
        } else {
            false
        }
    }

    /// The fault count that tripped the threshold, if it ever did.
    pub(crate) fn tripped_count(&self) -> Option<usize> {
        *self.tripped.lock().expect("fault tracker mutex poisoned")
    }

    fn window_secs(&self) -> f64 {
        self.window.as_secs_f64()
    }
}

/// Turns a `FaultTracker`'s trip state into the `run()` return value: an
/// exception storm must propagate as an error so the caller can select
/// exit code 1, while an orderly SIGINT/SIGTERM shutdown returns `Ok`.
fn shutdown_outcome(faults: &FaultTracker) -> Result<()> {
    match faults.tripped_count() {
        Some(count) => Err(crate::error::Error::ExceptionStorm { count, window_s: faults.window_secs() }),
        None => Ok(()),
    }
}

fn prepare(config_path: impl AsRef<Path>, verbosity: u8) -> Result<ServerConfig> {
    let unresolved = UnresolvedConfig::load(config_path)?;
    logging::init(unresolved.logging_facility, verbosity);

    let os_interfaces = discover_interfaces()?;
    let interfaces = resolve_interfaces(&unresolved, &os_interfaces)?;
    let duid = select_duid(&unresolved, &os_interfaces)?;

    Ok(unresolved.finish(duid, interfaces))
}

/// Loads and resolves the configuration, initializing logging as a side
/// effect, and renders it for `--show-config` without binding any
/// sockets or dropping privileges.
pub fn render_config(config_path: impl AsRef<Path>, verbosity: u8) -> Result<String> {
    Ok(prepare(config_path, verbosity)?.render())
}

/// Runs the full pre-listening sequence and then serves requests until a
/// termination signal or an exception storm ends the process.
pub async fn serve(config_path: impl AsRef<Path>, handler: Arc<dyn Handler>, verbosity: u8) -> Result<()> {
    let config = prepare(config_path, verbosity)?;
    run(config, handler).await
}

async fn run(config: ServerConfig, handler: Arc<dyn Handler>) -> Result<()> {
    let sockets = build_sockets(&config)?;
    drop_privileges(&config.user, &config.group)?;

    tracing::info!(
        interfaces = config.interfaces.len(),
        sockets = sockets.len(),
        duid = %config.duid,
        "server is ready to handle requests"
    );

    let faults = FaultTracker::new(config.exception_window_s, config.max_exceptions);
    let pool = WorkerPool::new(config.workers);
    let jobs = JobTracker::new();
    let shutdown = CancellationToken::new();

    let mut tasks = JoinSet::new();
    tasks.spawn(run_signal_bridge(Arc::clone(&handler), shutdown.clone()));
    for listening in sockets {
        let listening = Arc::new(listening);
        tasks.spawn(run_listener(
            listening,
            Arc::clone(&handler),
            pool.clone(),
            jobs.clone(),
            faults.clone(),
            shutdown.clone(),
        ));
    }

    shutdown.cancelled().await;

    let drain = async {
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "listener task panicked");
            }
        }
        jobs.drain().await;
    };

    let start = TokioInstant::now();
    if timeout(GRACE_PERIOD, drain).await.is_err() {
        tracing::warn!(elapsed = ?start.elapsed(), "grace period expired, aborting remaining tasks");
        tasks.abort_all();
        jobs.abort_all().await;
    }

    tracing::info!("server shut down");
    shutdown_outcome(&faults)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_tracker_trips_after_threshold() {
        let tracker = FaultTracker::new(60.0, 2);
        assert!(!tracker.record_fault());
        assert!(!tracker.record_fault());
        assert!(tracker.record_fault());
    }

    #[test]
    fn fault_tracker_evicts_outside_window() {
        let tracker = FaultTracker::new(0.0, 1);
        assert!(!tracker.record_fault());
        std::thread::sleep(Duration::from_millis(5));
        assert!(!tracker.record_fault());
    }

    #[test]
    fn exception_storm_trip_produces_exit_triggering_error() {
        let tracker = FaultTracker::new(60.0, 1);
        assert!(!tracker.record_fault());
        assert!(tracker.record_fault());

        let outcome = shutdown_outcome(&tracker);
        assert!(matches!(outcome, Err(crate::error::Error::ExceptionStorm { count: 2, .. })));
    }

    #[test]
    fn clean_shutdown_without_trip_returns_ok() {
        let tracker = FaultTracker::new(60.0, 5);
        assert!(!tracker.record_fault());

        assert!(shutdown_outcome(&tracker).is_ok());
    }
}
