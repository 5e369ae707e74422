use crate::error::InitError;
use crate::layer::TelemetryLayer;
use crate::manager::DispatchManager;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::Registry;

/// How the global subscriber is assembled.
///
/// **Fields**
/// - `enable_stdout`: print events through a `fmt` layer filtered at the
///   manager's minimum severity.
/// - `capture_tracing_events`: also forward plain `tracing` events (not
///   only those logged through a [`Logger`](crate::logger::Logger)) via a
///   [`TelemetryLayer`].
#[derive(Clone, Debug)]
pub struct InitConfig {
    pub enable_stdout: bool,
    pub capture_tracing_events: bool,
}

impl Default for InitConfig {
    fn default() -> Self {
        Self {
            enable_stdout: true,
            capture_tracing_events: true,
        }
    }
}

/// Install the global `tracing` subscriber for `manager`.
///
/// **Effects**
///
/// Installs a [`Registry`] combined with the layers selected by `config`
/// as the global default subscriber. Fails if one is already installed.
pub fn init_tracing_with_config(manager: &DispatchManager, config: InitConfig) -> Result<(), InitError> {
    let capture = config
        .capture_tracing_events
        .then(|| TelemetryLayer::new(manager.clone()));

    let stdout = config.enable_stdout.then(|| {
        tracing_subscriber::fmt::layer()
            .with_filter(LevelFilter::from_level(manager.log_level().as_tracing()))
    });

    let subscriber = Registry::default().with(capture).with(stdout);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Initialize tracing with sensible defaults.
///
/// Equivalent to calling [`init_tracing_with_config`] with
/// [`InitConfig::default`]. This is the recommended entrypoint for
/// typical services.
pub fn init_tracing(manager: &DispatchManager) -> Result<(), InitError> {
    init_tracing_with_config(manager, InitConfig::default())
}
