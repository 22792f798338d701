use thiserror::Error;

/// Error a scan consumer may hand back from a callback. The engine only logs it.
pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Rejected configuration values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("min_length must be at least 1")]
    ZeroMinLength,

    #[error("min_length ({min}) is greater than max_length ({max})")]
    LengthRange { min: usize, max: usize },

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("fast gap threshold ({fast}ms) must be below the moderate gap threshold ({moderate}ms)")]
    GapThresholds { fast: u64, moderate: u64 },

    #[error("max_events_per_second must be greater than zero")]
    ZeroEventCeiling,

    #[error("the abort key {0} is also configured as a terminator")]
    AbortIsTerminator(String),
}

/// Failures while writing the scan history out.
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
