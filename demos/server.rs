use axum::routing::get;
use axum::{middleware, Extension, Router};
use telemetry_bridge::entry::ErrorValue;
use telemetry_bridge::init::init_tracing;
use telemetry_bridge::prelude::*;
use telemetry_bridge::recovery::recover_panics;

/// Serves a few routes on 127.0.0.1:3000.
///
/// Set `TELEMETRY_DSN` to submit events; without it they are dropped and
/// only printed locally.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = TelemetryConfig::from_env()?;
    let manager = DispatchManager::from_config(&config)?;
    init_tracing(&manager)?;

    let logger = manager.new_logger("demo");
    let orders = logger.extend("orders");

    let app = Router::new()
        .route("/", get(|| async { "ok" }))
        .route(
            "/orders/{id}",
            get(move |Extension(request): Extension<RequestHandle>| {
                let logger = orders.with_request(&request).with_user("u1");
                async move {
                    logger
                        .with_error(ErrorValue::msg("no such order"))
                        .error("not found");
                    "logged"
                }
            }),
        )
        .route("/panic", get(crash))
        .route_layer(middleware::from_fn_with_state(logger.clone(), recover_panics));

    logger.info("listening on 127.0.0.1:3000");
    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn crash() -> &'static str {
    panic!("handler bug")
}
