use crate::dsn::DsnError;
use crate::severity::ParseSeverityError;

/// Error returned when a [`DispatchManager`](crate::manager::DispatchManager)
/// cannot be built from its configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("set dispatch levels: {0}")]
    DispatchLevel(#[source] ParseSeverityError),

    #[error("set log level: {0}")]
    LogLevel(#[source] ParseSeverityError),

    #[error("invalid dsn: {0}")]
    Dsn(#[from] DsnError),

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },

    #[error("a dsn is configured but the http feature is not enabled")]
    HttpFeatureDisabled,
}

/// Error returned when installing the global subscriber.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("a global subscriber is already installed: {0}")]
    AlreadyInstalled(#[from] tracing::subscriber::SetGlobalDefaultError),
}
