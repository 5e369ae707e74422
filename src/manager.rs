use crate::config::TelemetryConfig;
use crate::context::RequestMetadata;
use crate::dsn::parse_dsn;
use crate::enrich::{enrich, FINGERPRINT_BASE};
use crate::entry::LogEntry;
use crate::error::ConfigError;
use crate::event::{Breadcrumb, TelemetryEvent};
use crate::logger::{Logger, LoggerIdentity};
use crate::noop_sink::NoopSink;
use crate::scope::{BaseConfig, SubmissionContext};
use crate::severity::Severity;
use crate::sink::TelemetrySink;
use futures_util::FutureExt;
use std::any::Any;
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::time::{sleep, Instant};

const DISPATCH_TARGET: &str = "telemetry_bridge::dispatch";

/// Message of the fallback event sent when the pipeline itself panics.
pub const PIPELINE_PANIC_MESSAGE: &str = "recovered panic within telemetry pipeline";

/// Something that issues loggers.
pub trait LoggerMaker {
    fn new_logger(&self, name: &str) -> Logger;
}

/// Counters describing the dispatch pipeline.
#[derive(Debug, Default)]
pub struct DispatchStats {
    /// Entries handed to a dispatch task.
    pub fired: AtomicU64,
    /// Events accepted by the sink.
    pub submitted: AtomicU64,
    /// Events the sink rejected.
    pub failed: AtomicU64,
    /// Panics caught inside dispatch tasks.
    pub recovered_panics: AtomicU64,
    /// Dispatch tasks not finished yet.
    pub pending: AtomicU64,
}

/// Owns the telemetry transport and turns qualifying log entries into
/// events, off the calling path.
///
/// Cheap to clone; every clone feeds the same sink and counters.
#[derive(Clone)]
pub struct DispatchManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    base: Arc<BaseConfig>,
    sink: Arc<dyn TelemetrySink>,
    dispatch_levels: Vec<Severity>,
    log_level: Severity,
    stats: Arc<DispatchStats>,
}

impl DispatchManager {
    /// Create a manager submitting through `sink`.
    ///
    /// Fails without side effects if a severity name, the DSN, or any other
    /// setting is invalid.
    pub fn new(config: &TelemetryConfig, sink: Arc<dyn TelemetrySink>) -> Result<Self, ConfigError> {
        let dispatch_levels = config.dispatch_levels()?;
        let log_level = config.min_level()?;

        let dsn = if config.dsn.trim().is_empty() {
            None
        } else {
            Some(parse_dsn(&config.dsn)?)
        };

        let base = BaseConfig {
            dsn,
            environment: non_empty(&config.environment),
            release: non_empty(&config.release),
            tags: BTreeMap::new(),
            breadcrumb_limit: config.breadcrumb_limit,
        };

        Ok(Self {
            inner: Arc::new(ManagerInner {
                base: Arc::new(base),
                sink,
                dispatch_levels,
                log_level,
                stats: Arc::new(DispatchStats::default()),
            }),
        })
    }

    /// Create a manager whose transport is derived from the DSN: HTTP when
    /// one is configured, a [`NoopSink`] otherwise.
    pub fn from_config(config: &TelemetryConfig) -> Result<Self, ConfigError> {
        if config.dsn.trim().is_empty() {
            return Self::new(config, Arc::new(NoopSink));
        }

        #[cfg(feature = "http")]
        {
            use crate::http::{HttpSink, HttpSinkConfig};

            let dsn = parse_dsn(&config.dsn)?;
            let sink = HttpSink::new(HttpSinkConfig::new(dsn));
            Self::new(config, Arc::new(sink))
        }

        #[cfg(not(feature = "http"))]
        {
            Err(ConfigError::HttpFeatureDisabled)
        }
    }

    /// Severities forwarded to the remote service.
    pub fn levels(&self) -> &[Severity] {
        &self.inner.dispatch_levels
    }

    /// Minimum severity loggers issued by this manager emit.
    pub fn log_level(&self) -> Severity {
        self.inner.log_level
    }

    pub fn qualifies(&self, level: Severity) -> bool {
        self.inner.dispatch_levels.contains(&level)
    }

    pub fn base(&self) -> &BaseConfig {
        &self.inner.base
    }

    pub fn stats(&self) -> Arc<DispatchStats> {
        Arc::clone(&self.inner.stats)
    }

    /// Hook entry point, called synchronously by loggers for every entry
    /// they emit. Returns immediately; submission happens on a detached
    /// task.
    pub fn fire(&self, entry: &LogEntry) {
        if !self.qualifies(entry.level) {
            return;
        }

        let scope = self.resolve_context(entry);
        let sink = Arc::clone(&self.inner.sink);
        let stats = Arc::clone(&self.inner.stats);
        let entry = entry.clone();

        stats.fired.fetch_add(1, Ordering::Relaxed);
        // Created before spawning so a future dropped unpolled still settles
        // the pending count.
        let pending = PendingGuard::new(Arc::clone(&stats));
        spawn_detached(async move {
            let _pending = pending;
            dispatch(&*sink, &entry, &scope, &stats).await;
        });
    }

    /// Pick the submission context for `entry`: the one bound explicitly,
    /// else the one stored for its request, else a fresh one.
    pub fn resolve_context(&self, entry: &LogEntry) -> SubmissionContext {
        if let Some(scope) = entry.context.submission() {
            return scope.clone();
        }
        if let Some(scope) = entry.context.request().and_then(|r| r.submission()) {
            return scope.clone();
        }
        SubmissionContext::new(Arc::clone(&self.inner.base))
    }

    /// Fresh submission context for a request that is about to be handled.
    pub fn new_request_context(&self, request: &RequestMetadata) -> SubmissionContext {
        let mut tags = BTreeMap::new();
        tags.insert("http.method".to_string(), request.method.clone());
        tags.insert("http.route".to_string(), request.route.clone());
        SubmissionContext::with_parts(
            Arc::clone(&self.inner.base),
            tags,
            Some(Arc::new(request.clone())),
        )
    }

    /// Wait until every dispatch task started so far has finished.
    ///
    /// Returns `false` if some were still running after `timeout`.
    pub async fn flush(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.inner.stats.pending.load(Ordering::Acquire) == 0 {
                let _ = self.inner.sink.flush().await;
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(Duration::from_millis(5)).await;
        }
    }
}

impl LoggerMaker for DispatchManager {
    fn new_logger(&self, name: &str) -> Logger {
        Logger::with_manager(LoggerIdentity::new(name), self.log_level(), self.clone())
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

struct PendingGuard(Arc<DispatchStats>);

impl PendingGuard {
    fn new(stats: Arc<DispatchStats>) -> Self {
        stats.pending.fetch_add(1, Ordering::AcqRel);
        Self(stats)
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.pending.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Run `fut` without tying it to the caller: on the current tokio runtime
/// when there is one, otherwise on the shared fallback runtime.
fn spawn_detached<F>(fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(fut);
        }
        Err(_) => match fallback_runtime() {
            Some(rt) => {
                rt.spawn(fut);
            }
            None => {
                tracing::debug!(target: DISPATCH_TARGET, "no dispatch runtime, event dropped");
            }
        },
    }
}

/// Runtime serving log calls made outside of any tokio runtime. Started on
/// first use and kept for the life of the process.
fn fallback_runtime() -> Option<&'static Runtime> {
    static RUNTIME: OnceLock<Option<Runtime>> = OnceLock::new();
    RUNTIME
        .get_or_init(|| {
            match tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .thread_name("telemetry-dispatch")
                .enable_all()
                .build()
            {
                Ok(rt) => Some(rt),
                Err(e) => {
                    tracing::debug!(target: DISPATCH_TARGET, error = %e, "cannot start dispatch runtime");
                    None
                }
            }
        })
        .as_ref()
}

/// Body of a dispatch task. Panics from enrichment or from the sink stop
/// here and are reported as a fallback event.
async fn dispatch(
    sink: &dyn TelemetrySink,
    entry: &LogEntry,
    scope: &SubmissionContext,
    stats: &DispatchStats,
) {
    let event = match panic::catch_unwind(AssertUnwindSafe(|| enrich(entry, scope))) {
        Ok(event) => event,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            report_panic(sink, scope, stats, &message).await;
            return;
        }
    };

    match AssertUnwindSafe(sink.send(&event)).catch_unwind().await {
        Ok(Ok(())) => {
            stats.submitted.fetch_add(1, Ordering::Relaxed);
        }
        Ok(Err(e)) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(target: DISPATCH_TARGET, error = %e, "event submission failed");
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            report_panic(sink, scope, stats, &message).await;
        }
    }
}

async fn report_panic(
    sink: &dyn TelemetrySink,
    scope: &SubmissionContext,
    stats: &DispatchStats,
    message: &str,
) {
    stats.recovered_panics.fetch_add(1, Ordering::Relaxed);
    let event = fallback_event(scope, message);

    // Best effort: a sink that panics twice gets nothing more.
    match AssertUnwindSafe(sink.send(&event)).catch_unwind().await {
        Ok(Ok(())) => {
            stats.submitted.fetch_add(1, Ordering::Relaxed);
        }
        Ok(Err(_)) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
        }
        Err(_) => {
            stats.recovered_panics.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Event describing a panic inside the pipeline.
pub fn fallback_event(scope: &SubmissionContext, panic_message: &str) -> TelemetryEvent {
    scope.add_breadcrumb(Breadcrumb::new(
        "error",
        "telemetry.panic",
        panic_message,
        Severity::Fatal,
    ));

    let mut event = TelemetryEvent::new(Severity::Error, PIPELINE_PANIC_MESSAGE, chrono::Utc::now());
    event.fingerprint = vec![FINGERPRINT_BASE.to_string(), "pipeline_panic".to_string()];
    event.environment = scope.base().environment.clone();
    event.release = scope.base().release.clone();
    event.tags = scope.base().tags.clone();
    event
        .tags
        .extend(scope.tags().iter().map(|(k, v)| (k.clone(), v.clone())));
    event.request = scope.request().cloned();
    event.breadcrumbs = scope.breadcrumbs();
    event
}

/// Text carried by a panic payload, if it has any.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(e) = payload.downcast_ref::<std::io::Error>() {
        e.to_string()
    } else {
        "unknown panic payload".to_string()
    }
}
