use timecast_bus::BusError;

/// Errors returned by the streaming endpoints.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// An out-of-range configuration knob.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("ring capacity must be at least 2 samples, got {0}")]
    CapacityTooSmall(usize),

    #[error("{name} must be a finite, non-negative number of seconds, got {value}")]
    InvalidDuration { name: &'static str, value: f64 },

    #[error("sync poll interval must not be zero")]
    ZeroPollInterval,
}
