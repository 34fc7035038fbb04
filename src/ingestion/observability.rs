use std::fmt;
use std::sync::Arc;

use crate::error::ReportError;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineSeverity {
    /// Informational event.
    Info,
    /// The report was produced but carries line errors or validation flags.
    Warning,
    /// The report was rejected (schema mismatch, strict validation, currency conflict, ...).
    Error,
    /// Infrastructure failure (I/O, storage, workbook encoding).
    Critical,
}

impl PipelineSeverity {
    /// Severity of a failed operation.
    pub fn of(error: &ReportError) -> Self {
        match error {
            ReportError::Io(_) | ReportError::Sqlite(_) | ReportError::Xlsx(_) => Self::Critical,
            ReportError::Csv(e) if matches!(e.kind(), ::csv::ErrorKind::Io(_)) => Self::Critical,
            #[cfg(feature = "excel")]
            ReportError::Excel(_) => Self::Critical,
            ReportError::Cancelled => Self::Info,
            _ => Self::Error,
        }
    }
}

/// Pipeline stage an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Parse,
    Aggregate,
    Export,
}

/// Context about a pipeline operation.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    /// Caller-supplied label for the input (file name, upload id, ...).
    pub source: String,
    pub stage: PipelineStage,
}

impl PipelineContext {
    pub fn new(source: impl Into<String>, stage: PipelineStage) -> Self {
        Self {
            source: source.into(),
            stage,
        }
    }
}

/// Counts reported on success.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Reports produced (or written).
    pub reports: usize,
    /// Line items across those reports.
    pub items: usize,
    pub parse_errors: usize,
    pub flags: usize,
}

/// Observer interface for pipeline outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait PipelineObserver: Send + Sync {
    /// Called when an operation succeeds.
    fn on_success(&self, _ctx: &PipelineContext, _stats: PipelineStats) {}

    /// Called when an operation fails.
    fn on_failure(
        &self,
        _ctx: &PipelineContext,
        _severity: PipelineSeverity,
        _error: &ReportError,
    ) {
    }

    /// Called when a failure meets the alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &PipelineContext, severity: PipelineSeverity, error: &ReportError) {
        self.on_failure(ctx, severity, error)
    }
}

/// Report `result` to `observer`, alerting when the failure severity reaches `alert_at_or_above`.
pub(crate) fn notify<T>(
    observer: Option<&Arc<dyn PipelineObserver>>,
    ctx: &PipelineContext,
    alert_at_or_above: PipelineSeverity,
    result: &Result<T, ReportError>,
    stats: impl FnOnce(&T) -> PipelineStats,
) {
    let Some(observer) = observer else {
        return;
    };
    match result {
        Ok(value) => observer.on_success(ctx, stats(value)),
        Err(e) => {
            let severity = PipelineSeverity::of(e);
            observer.on_failure(ctx, severity, e);
            if severity >= alert_at_or_above {
                observer.on_alert(ctx, severity, e);
            }
        }
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn PipelineObserver>>,
}

impl CompositeObserver {
    /// Create a new composite observer from a list of observers.
    pub fn new(observers: Vec<Arc<dyn PipelineObserver>>) -> Self {
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

impl PipelineObserver for CompositeObserver {
    fn on_success(&self, ctx: &PipelineContext, stats: PipelineStats) {
        for o in &self.observers {
            o.on_success(ctx, stats);
        }
    }

    fn on_failure(&self, ctx: &PipelineContext, severity: PipelineSeverity, error: &ReportError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &PipelineContext, severity: PipelineSeverity, error: &ReportError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }
}

/// Emits pipeline events as `tracing` events.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_success(&self, ctx: &PipelineContext, stats: PipelineStats) {
        if stats.parse_errors > 0 || stats.flags > 0 {
            tracing::warn!(
                source = %ctx.source,
                stage = ?ctx.stage,
                reports = stats.reports,
                items = stats.items,
                parse_errors = stats.parse_errors,
                flags = stats.flags,
                "completed with issues"
            );
        } else {
            tracing::info!(
                source = %ctx.source,
                stage = ?ctx.stage,
                reports = stats.reports,
                items = stats.items,
                "completed"
            );
        }
    }

    fn on_failure(&self, ctx: &PipelineContext, severity: PipelineSeverity, error: &ReportError) {
        tracing::error!(source = %ctx.source, stage = ?ctx.stage, ?severity, %error, "failed");
    }

    fn on_alert(&self, ctx: &PipelineContext, severity: PipelineSeverity, error: &ReportError) {
        tracing::error!(
            source = %ctx.source,
            stage = ?ctx.stage,
            ?severity,
            %error,
            alert = true,
            "ALERT"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl PipelineObserver for Recorder {
        fn on_success(&self, _ctx: &PipelineContext, stats: PipelineStats) {
            self.events.lock().unwrap().push(format!("ok:{}", stats.items));
        }
        fn on_failure(&self, _ctx: &PipelineContext, severity: PipelineSeverity, _e: &ReportError) {
            self.events.lock().unwrap().push(format!("fail:{severity:?}"));
        }
        fn on_alert(&self, _ctx: &PipelineContext, severity: PipelineSeverity, _e: &ReportError) {
            self.events.lock().unwrap().push(format!("alert:{severity:?}"));
        }
    }

    #[test]
    fn io_errors_are_critical_and_cancellation_is_info() {
        let io = ReportError::Io(std::io::Error::other("disk"));
        assert_eq!(PipelineSeverity::of(&io), PipelineSeverity::Critical);
        assert_eq!(PipelineSeverity::of(&ReportError::Cancelled), PipelineSeverity::Info);
        assert!(PipelineSeverity::Warning < PipelineSeverity::Error);
    }

    #[test]
    fn notify_alerts_only_at_threshold() {
        let rec = Arc::new(Recorder::default());
        let observer: Arc<dyn PipelineObserver> = rec.clone();
        let ctx = PipelineContext::new("upload-1", PipelineStage::Parse);

        let failed: Result<(), ReportError> = Err(ReportError::InvalidConfig {
            message: "x".to_string(),
        });
        let none = |_: &()| PipelineStats::default();
        notify(Some(&observer), &ctx, PipelineSeverity::Critical, &failed, none);
        notify(Some(&observer), &ctx, PipelineSeverity::Error, &failed, none);

        let ok: Result<usize, ReportError> = Ok(3);
        notify(Some(&observer), &ctx, PipelineSeverity::Error, &ok, |n| PipelineStats {
            items: *n,
            ..PipelineStats::default()
        });

        assert_eq!(
            *rec.events.lock().unwrap(),
            vec!["fail:Error", "fail:Error", "alert:Error", "ok:3"]
        );
    }

    #[test]
    fn composite_fans_out() {
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        let composite = CompositeObserver::new(vec![a.clone(), b.clone()]);
        let ctx = PipelineContext::new("x", PipelineStage::Export);
        composite.on_success(&ctx, PipelineStats::default());
        assert_eq!(a.events.lock().unwrap().len(), 1);
        assert_eq!(b.events.lock().unwrap().len(), 1);
    }
}
