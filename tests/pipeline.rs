//! End-to-end tests of the dispatch pipeline
//!
//! These tests verify:
//! - Fingerprints and user identity on submitted events
//! - Breadcrumb sharing within a request and isolation across requests
//! - Panic and transport-failure isolation from the logging call site
//! - Dispatch from threads without a tokio runtime

use async_trait::async_trait;
use std::error::Error;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use telemetry_bridge::manager::PIPELINE_PANIC_MESSAGE;
use telemetry_bridge::memory_sink::MemorySink;
use telemetry_bridge::prelude::*;

const FLUSH: Duration = Duration::from_secs(2);

fn manager_with(sink: Arc<dyn TelemetrySink>) -> DispatchManager {
    let config = TelemetryConfig {
        environment: "test".to_string(),
        release: "0.1.0".to_string(),
        ..TelemetryConfig::default()
    };
    DispatchManager::new(&config, sink).expect("valid config")
}

fn setup() -> (DispatchManager, MemorySink) {
    let sink = MemorySink::new();
    (manager_with(Arc::new(sink.clone())), sink)
}

fn request(manager: &DispatchManager, method: &str, route: &str) -> RequestHandle {
    let metadata = RequestMetadata::new(method, route);
    let scope = manager.new_request_context(&metadata);
    RequestHandle::new(metadata).with_submission(scope)
}

#[derive(thiserror::Error, Debug)]
#[error("row not found")]
struct RowNotFound;

impl DescribesQuery for RowNotFound {
    fn query_body(&self) -> String {
        "SELECT 1".to_string()
    }

    fn query_arguments(&self) -> Vec<serde_json::Value> {
        Vec::new()
    }
}

#[derive(thiserror::Error, Debug)]
#[error("poisoned")]
struct PoisonedQuery;

impl DescribesQuery for PoisonedQuery {
    fn query_body(&self) -> String {
        panic!("query body exploded")
    }

    fn query_arguments(&self) -> Vec<serde_json::Value> {
        Vec::new()
    }
}

struct FailingSink;

#[async_trait]
impl TelemetrySink for FailingSink {
    async fn send(&self, _event: &TelemetryEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        Err("service unavailable".into())
    }
}

struct PanickingSink;

#[async_trait]
impl TelemetrySink for PanickingSink {
    async fn send(&self, _event: &TelemetryEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        panic!("transport exploded")
    }
}

#[tokio::test]
async fn test_user_without_request_groups_by_logger_name() {
    let (manager, sink) = setup();
    let logger = manager.new_logger("api").extend("billing");

    logger.with_user("u1").error("payment declined");

    assert!(manager.flush(FLUSH).await);
    let events = sink.events();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.user.as_ref().map(|u| u.id.as_str()), Some("u1"));
    assert_eq!(event.fingerprint, vec!["api", "api.billing", "payment declined"]);
    assert_eq!(event.logger.as_deref(), Some("api.billing"));
    assert_eq!(event.level, Severity::Error);
    assert_eq!(event.environment.as_deref(), Some("test"));
    assert_eq!(event.release.as_deref(), Some("0.1.0"));
}

#[tokio::test]
async fn test_request_groups_by_route() {
    let (manager, sink) = setup();
    let logger = manager.new_logger("api").extend("orders");
    let request = request(&manager, "GET", "/orders/:id");

    logger.with_request(&request).with_field("order_id", 17).error("not found");

    assert!(manager.flush(FLUSH).await);
    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].fingerprint, vec!["api", "GET", "/orders/:id", "not found"]);
    assert_eq!(events[0].extra.get("order_id"), Some(&serde_json::json!(17)));
    assert_eq!(events[0].tags.get("http.route").map(String::as_str), Some("/orders/:id"));
}

#[tokio::test]
async fn test_only_dispatch_levels_are_submitted() {
    let (manager, sink) = setup();
    let logger = manager.new_logger("api");

    logger.debug("below local threshold");
    logger.info("local only");
    logger.warn("local only too");
    logger.log(Severity::Fatal, "forwarded");

    assert!(manager.flush(FLUSH).await);
    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].message, "forwarded");
    assert_eq!(events[0].level, Severity::Fatal);
    assert_eq!(manager.stats().fired.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_query_error_adds_query_breadcrumb() {
    let (manager, sink) = setup();
    let logger = manager.new_logger("api").extend("db");

    logger
        .with_error(ErrorValue::with_query(RowNotFound))
        .error("lookup failed");

    assert!(manager.flush(FLUSH).await);
    let events = sink.events();
    let crumbs = &events[0].breadcrumbs;
    assert_eq!(crumbs.len(), 2);
    assert_eq!(crumbs[0].kind, "query");
    let data = crumbs[0].data.as_ref().expect("query data");
    assert_eq!(data.get("query"), Some(&serde_json::json!("SELECT 1")));
    assert_eq!(data.get("args"), Some(&serde_json::json!([])));
    assert_eq!(crumbs[1].kind, "error");
    assert_eq!(crumbs[1].category, "api.db");
    assert_eq!(crumbs[1].message, "row not found");
}

#[tokio::test]
async fn test_request_shares_breadcrumbs_between_log_calls() {
    let (manager, sink) = setup();
    let logger = manager.new_logger("api");
    let request = request(&manager, "POST", "/checkout");
    let bound = logger.with_request(&request);

    bound.with_error(ErrorValue::msg("card expired")).error("charge failed");
    assert!(manager.flush(FLUSH).await);
    bound.with_error(ErrorValue::msg("stock gone")).error("reserve failed");
    assert!(manager.flush(FLUSH).await);

    let events = sink.events();
    assert_eq!(events.len(), 2);
    let messages: Vec<_> = events[1].breadcrumbs.iter().map(|b| b.message.as_str()).collect();
    assert_eq!(messages, vec!["card expired", "stock gone"]);
}

#[tokio::test]
async fn test_requests_do_not_share_breadcrumbs() {
    let (manager, sink) = setup();
    let logger = manager.new_logger("api");
    let first = request(&manager, "GET", "/a");
    let second = request(&manager, "GET", "/b");

    logger.with_request(&first).with_error(ErrorValue::msg("first")).error("a failed");
    logger.with_request(&second).with_error(ErrorValue::msg("second")).error("b failed");

    assert!(manager.flush(FLUSH).await);
    for event in sink.events() {
        assert_eq!(event.breadcrumbs.len(), 1);
    }
}

#[tokio::test]
async fn test_breadcrumb_capacity_is_bounded() {
    let sink = MemorySink::new();
    let config = TelemetryConfig {
        breadcrumb_limit: 2,
        ..TelemetryConfig::default()
    };
    let manager = DispatchManager::new(&config, Arc::new(sink.clone())).unwrap();
    let bound = manager.new_logger("api").with_request(&request(&manager, "GET", "/x"));

    for n in 0..3 {
        bound.with_error(ErrorValue::msg(format!("e{}", n))).error("failed");
        assert!(manager.flush(FLUSH).await);
    }

    let events = sink.events();
    let last: Vec<_> = events[2].breadcrumbs.iter().map(|b| b.message.as_str()).collect();
    assert_eq!(last, vec!["e1", "e2"]);
}

#[tokio::test]
async fn test_enrichment_panic_does_not_reach_caller() {
    let (manager, sink) = setup();
    let logger = manager.new_logger("api");

    logger
        .with_error(ErrorValue::with_query(PoisonedQuery))
        .error("should not crash");

    assert!(manager.flush(FLUSH).await);
    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].message, PIPELINE_PANIC_MESSAGE);
    assert_eq!(events[0].fingerprint, vec!["api", "pipeline_panic"]);
    let crumb = events[0].breadcrumbs.last().expect("panic breadcrumb");
    assert_eq!(crumb.category, "telemetry.panic");
    assert_eq!(crumb.message, "query body exploded");
    assert_eq!(manager.stats().recovered_panics.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_pipeline_panic_keeps_request_context() {
    let (manager, sink) = setup();
    let request = request(&manager, "PUT", "/orders/{id}");

    manager
        .new_logger("api")
        .with_request(&request)
        .with_error(ErrorValue::with_query(PoisonedQuery))
        .error("should not crash");

    assert!(manager.flush(FLUSH).await);
    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].message, PIPELINE_PANIC_MESSAGE);
    assert_eq!(events[0].tags.get("http.route").map(String::as_str), Some("/orders/{id}"));
    assert_eq!(events[0].request.as_ref().map(|r| r.method.as_str()), Some("PUT"));
}

#[test]
fn test_flush_recovers_after_runtime_shutdown() {
    let (manager, sink) = setup();
    let stale = tokio::runtime::Runtime::new().expect("runtime");
    let handle = stale.handle().clone();
    drop(stale);

    {
        let _entered = handle.enter();
        manager.new_logger("api").error("lost with the runtime");
    }

    let rt = tokio::runtime::Runtime::new().expect("runtime");
    let flushed = rt.block_on(manager.flush(Duration::from_millis(300)));

    assert!(flushed);
    assert_eq!(manager.stats().pending.load(Ordering::Relaxed), 0);
    assert_eq!(sink.len(), 0);
}

#[tokio::test]
async fn test_transport_failure_is_counted_not_raised() {
    let manager = manager_with(Arc::new(FailingSink));

    manager.new_logger("api").error("lost");

    assert!(manager.flush(FLUSH).await);
    let stats = manager.stats();
    assert_eq!(stats.failed.load(Ordering::Relaxed), 1);
    assert_eq!(stats.submitted.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn test_transport_panic_is_recovered() {
    let manager = manager_with(Arc::new(PanickingSink));

    manager.new_logger("api").error("explodes in transport");

    assert!(manager.flush(FLUSH).await);
    assert!(manager.stats().recovered_panics.load(Ordering::Relaxed) >= 1);
    assert_eq!(manager.stats().pending.load(Ordering::Relaxed), 0);
}

#[test]
fn test_dispatch_without_runtime() {
    let (manager, sink) = setup();

    manager.new_logger("worker").error("outside tokio");

    let deadline = Instant::now() + FLUSH;
    while sink.is_empty() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].fingerprint, vec!["api", "worker", "outside tokio"]);
}

#[tokio::test]
async fn test_plain_logger_never_dispatches() {
    let logger = Logger::plain("api", Severity::Info);
    assert!(logger.manager().is_none());
    logger.error("local only");
    Logger::nop().error("discarded");
}
