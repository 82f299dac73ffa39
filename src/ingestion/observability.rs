//! Load outcome reporting.
//!
//! Observers receive one callback per loaded source: `on_success` with row/record-type counts,
//! or `on_failure` (plus `on_alert` at or above the configured threshold). Non-fatal problems
//! (unknown record types, skipped sources, invalid record types) go to `on_warning`.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Local;

use crate::error::{IngestError, Severity};

use super::unified::SourceFormat;

/// Context about one load attempt.
#[derive(Debug, Clone)]
pub struct LoadContext {
    /// Logical source name (`"unified"` or a manifest source name).
    pub source: String,
    /// Physical file, when one was resolved.
    pub path: Option<PathBuf>,
    /// Format used for reading, when known.
    pub format: Option<SourceFormat>,
}

impl LoadContext {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            path: None,
            format: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_format(mut self, format: SourceFormat) -> Self {
        self.format = Some(format);
        self
    }

    fn path_display(&self) -> String {
        self.path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string())
    }
}

/// Stats reported on a successful load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadStats {
    /// Rows read from the physical source.
    pub rows: usize,
    /// Record types published.
    pub record_types: usize,
    /// Record types that failed validation.
    pub invalid_record_types: usize,
    /// Warnings collected during the load.
    pub warnings: usize,
}

/// Observer interface for load outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait LoadObserver: Send + Sync {
    /// Called when a source loads.
    fn on_success(&self, _ctx: &LoadContext, _stats: LoadStats) {}

    /// Called when a source fails to load.
    fn on_failure(&self, _ctx: &LoadContext, _severity: Severity, _error: &IngestError) {}

    /// Called when a failure meets the alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &LoadContext, severity: Severity, error: &IngestError) {
        self.on_failure(ctx, severity, error)
    }

    /// Called for each non-fatal warning.
    fn on_warning(&self, _ctx: &LoadContext, _message: &str) {}
}

/// Report a failure to `observer`, alerting when `severity >= alert_at_or_above`.
pub(crate) fn report_failure(
    observer: Option<&Arc<dyn LoadObserver>>,
    ctx: &LoadContext,
    error: &IngestError,
    alert_at_or_above: Severity,
) {
    let severity = error.severity();
    tracing::warn!(source = %ctx.source, severity = ?severity, error = %error, "load failed");
    if let Some(obs) = observer {
        obs.on_failure(ctx, severity, error);
        if severity >= alert_at_or_above {
            obs.on_alert(ctx, severity, error);
        }
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn LoadObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn LoadObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl LoadObserver for CompositeObserver {
    fn on_success(&self, ctx: &LoadContext, stats: LoadStats) {
        for o in &self.observers {
            o.on_success(ctx, stats);
        }
    }

    fn on_failure(&self, ctx: &LoadContext, severity: Severity, error: &IngestError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &LoadContext, severity: Severity, error: &IngestError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }

    fn on_warning(&self, ctx: &LoadContext, message: &str) {
        for o in &self.observers {
            o.on_warning(ctx, message);
        }
    }
}

/// Logs load events to stderr.
#[derive(Debug, Default)]
pub struct StdErrObserver;

impl LoadObserver for StdErrObserver {
    fn on_success(&self, ctx: &LoadContext, stats: LoadStats) {
        eprintln!(
            "[load][ok] source={} path={} rows={} record_types={} invalid={}",
            ctx.source,
            ctx.path_display(),
            stats.rows,
            stats.record_types,
            stats.invalid_record_types
        );
    }

    fn on_failure(&self, ctx: &LoadContext, severity: Severity, error: &IngestError) {
        eprintln!(
            "[load][{:?}] source={} path={} err={}",
            severity,
            ctx.source,
            ctx.path_display(),
            error
        );
    }

    fn on_alert(&self, ctx: &LoadContext, severity: Severity, error: &IngestError) {
        eprintln!(
            "[ALERT][load][{:?}] source={} path={} err={}",
            severity,
            ctx.source,
            ctx.path_display(),
            error
        );
    }

    fn on_warning(&self, ctx: &LoadContext, message: &str) {
        eprintln!("[load][warn] source={} {}", ctx.source, message);
    }
}

/// Appends load events to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{} {line}", Local::now().format("%Y-%m-%dT%H:%M:%S%:z"));
        }
    }
}

impl LoadObserver for FileObserver {
    fn on_success(&self, ctx: &LoadContext, stats: LoadStats) {
        self.append_line(&format!(
            "ok source={} path={} rows={} record_types={} invalid={} warnings={}",
            ctx.source,
            ctx.path_display(),
            stats.rows,
            stats.record_types,
            stats.invalid_record_types,
            stats.warnings
        ));
    }

    fn on_failure(&self, ctx: &LoadContext, severity: Severity, error: &IngestError) {
        self.append_line(&format!(
            "fail severity={:?} source={} path={} err={}",
            severity,
            ctx.source,
            ctx.path_display(),
            error
        ));
    }

    fn on_alert(&self, ctx: &LoadContext, severity: Severity, error: &IngestError) {
        self.append_line(&format!(
            "ALERT severity={:?} source={} path={} err={}",
            severity,
            ctx.source,
            ctx.path_display(),
            error
        ));
    }

    fn on_warning(&self, ctx: &LoadContext, message: &str) {
        self.append_line(&format!("warn source={} {}", ctx.source, message));
    }
}
