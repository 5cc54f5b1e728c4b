// Session metrics
//
// Lightweight counters for logins, uploads and tool runs

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters recorded by a [`SessionController`](crate::session::SessionController).
///
/// Uses atomic operations so the controller can record from any thread without
/// locks. The binary logs [`Metrics::summary`] on shutdown.
#[derive(Debug)]
pub struct Metrics {
    pub logins_attempted: AtomicU64,
    pub logins_succeeded: AtomicU64,
    pub logins_failed: AtomicU64,

    pub uploads_attempted: AtomicU64,
    pub uploads_succeeded: AtomicU64,
    pub uploads_failed: AtomicU64,

    /// Subprocesses that were actually launched
    pub tool_runs: AtomicU64,

    /// Total time spent waiting for the tool, in milliseconds
    pub total_run_time_ms: AtomicU64,

    /// Output lines captured across all runs
    pub lines_captured: AtomicU64,

    /// Log and status notifications handed to the dispatcher
    pub notifications_dispatched: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            logins_attempted: AtomicU64::new(0),
            logins_succeeded: AtomicU64::new(0),
            logins_failed: AtomicU64::new(0),
            uploads_attempted: AtomicU64::new(0),
            uploads_succeeded: AtomicU64::new(0),
            uploads_failed: AtomicU64::new(0),
            tool_runs: AtomicU64::new(0),
            total_run_time_ms: AtomicU64::new(0),
            lines_captured: AtomicU64::new(0),
            notifications_dispatched: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_login_attempt(&self) {
        self.logins_attempted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the classified result of a login attempt
    pub fn record_login_result(&self, success: bool) {
        if success {
            self.logins_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.logins_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_upload_attempt(&self) {
        self.uploads_attempted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the classified result of an upload
    pub fn record_upload_result(&self, success: bool) {
        if success {
            self.uploads_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.uploads_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a finished tool run
    pub fn record_tool_run(&self, duration: Duration) {
        self.tool_runs.fetch_add(1, Ordering::Relaxed);
        self.total_run_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_line_captured(&self) {
        self.lines_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_notification(&self) {
        self.notifications_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average tool run time in milliseconds
    pub fn avg_run_time_ms(&self) -> f64 {
        let total = self.total_run_time_ms.load(Ordering::Relaxed);
        let count = self.tool_runs.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    /// One-line summary of every counter
    pub fn summary(&self) -> String {
        format!(
            "logins {}/{} ok ({} failed), uploads {}/{} ok ({} failed), {} tool runs (avg {:.0}ms), {} lines, {} notifications, uptime {:.1}s",
            self.logins_succeeded.load(Ordering::Relaxed),
            self.logins_attempted.load(Ordering::Relaxed),
            self.logins_failed.load(Ordering::Relaxed),
            self.uploads_succeeded.load(Ordering::Relaxed),
            self.uploads_attempted.load(Ordering::Relaxed),
            self.uploads_failed.load(Ordering::Relaxed),
            self.tool_runs.load(Ordering::Relaxed),
            self.avg_run_time_ms(),
            self.lines_captured.load(Ordering::Relaxed),
            self.notifications_dispatched.load(Ordering::Relaxed),
            self.uptime().as_secs_f64()
        )
    }

    pub fn log_summary(&self) {
        tracing::info!("Metrics: {}", self.summary());
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
