//! Central logging relay.
//!
//! Participants forward their log records to the control plane, which fans
//! them out to registered [`EventMonitor`]s after a minimum-severity
//! filter. Monitor registration is race-safe against concurrent log calls.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::{Stream, StreamExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use fleet_net::messages::LogRelayRecord;
pub use fleet_net::messages::Severity;

/// Receives relayed log events. Implementations must tolerate concurrent
/// calls from multiple relay tasks.
pub trait EventMonitor: Send + Sync {
    /// One relayed log record. `timestamp` is the log time as a duration
    /// since the Unix epoch.
    fn on_log(
        &self,
        timestamp: Duration,
        severity: Severity,
        participant_name: &str,
        logger_name: &str,
        message: &str,
    );
}

/// The central log sink of one system.
///
/// Holds zero or more monitors and a minimum severity level. Every record
/// below the level is dropped; the rest are mirrored to `tracing` and
/// handed to each monitor in registration order.
pub struct SystemLogger {
    system_name: String,
    /// Identity participants register as their relay target.
    sink_url: String,
    monitors: Mutex<Vec<Arc<dyn EventMonitor>>>,
    level: Mutex<Severity>,
}

impl SystemLogger {
    /// Create a logger for one system, with a fresh sink identity and an
    /// `Info` threshold.
    #[must_use]
    pub fn new(system_name: &str) -> Self {
        Self {
            system_name: system_name.to_string(),
            sink_url: format!("fleet:log-sink:{}", Uuid::new_v4()),
            monitors: Mutex::new(Vec::new()),
            level: Mutex::new(Severity::Info),
        }
    }

    /// The system this logger belongs to.
    #[must_use]
    pub fn system_name(&self) -> &str {
        &self.system_name
    }

    /// The sink identity participants relay to.
    #[must_use]
    pub fn sink_url(&self) -> &str {
        &self.sink_url
    }

    /// Set the minimum severity; records below it are dropped.
    pub fn set_severity_level(&self, level: Severity) {
        *lock_unpoisoned(&self.level) = level;
    }

    /// The current minimum severity.
    #[must_use]
    pub fn severity_level(&self) -> Severity {
        *lock_unpoisoned(&self.level)
    }

    /// Register a monitor. Monitors receive records in registration order.
    pub fn register_monitor(&self, monitor: Arc<dyn EventMonitor>) {
        lock_unpoisoned(&self.monitors).push(monitor);
    }

    /// Remove every registered monitor.
    pub fn release_monitors(&self) {
        lock_unpoisoned(&self.monitors).clear();
    }

    /// Fan a record out to the monitors, applying the severity filter.
    pub fn log(
        &self,
        timestamp: Duration,
        severity: Severity,
        participant_name: &str,
        logger_name: &str,
        message: &str,
    ) {
        if !severity.passes(self.severity_level()) {
            return;
        }
        match severity {
            Severity::Debug => {
                debug!(system = self.system_name, participant_name, logger_name, message);
            }
            Severity::Info => {
                info!(system = self.system_name, participant_name, logger_name, message);
            }
            Severity::Warning => {
                warn!(system = self.system_name, participant_name, logger_name, message);
            }
            Severity::Error | Severity::Fatal => {
                error!(system = self.system_name, participant_name, logger_name, message);
            }
            Severity::Off => return,
        }
        let monitors = lock_unpoisoned(&self.monitors).clone();
        for monitor in monitors {
            monitor.on_log(timestamp, severity, participant_name, logger_name, message);
        }
    }

    /// Fan a record out with the current wall-clock time.
    pub fn log_now(
        &self,
        severity: Severity,
        participant_name: &str,
        logger_name: &str,
        message: &str,
    ) {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        self.log(timestamp, severity, participant_name, logger_name, message);
    }

    /// Fan out one relayed wire record.
    pub fn relay(&self, record: &LogRelayRecord) {
        self.log(
            Duration::from_millis(record.timestamp_ms),
            record.severity,
            &record.participant_name,
            &record.logger_name,
            &record.message,
        );
    }
}

impl std::fmt::Debug for SystemLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemLogger")
            .field("system_name", &self.system_name)
            .field("sink_url", &self.sink_url)
            .field("level", &self.severity_level())
            .finish_non_exhaustive()
    }
}

/// Drive a relay stream into a logger until the stream ends.
///
/// The stream usually comes from
/// [`NatsSystemAccess::log_records`](fleet_net::NatsSystemAccess::log_records).
pub fn spawn_relay<S>(logger: Arc<SystemLogger>, mut records: S) -> tokio::task::JoinHandle<()>
where
    S: Stream<Item = LogRelayRecord> + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        while let Some(record) = records.next().await {
            logger.relay(&record);
        }
    })
}

/// Lock a mutex, recovering the data from a poisoned lock. Monitors may
/// panic; that must not wedge logging for every other thread.
fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
