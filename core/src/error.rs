use thiserror::Error;

/// Collaborator failures: storage, ingestion, settings.
///
/// Detection itself never produces one of these; malformed records
/// surface as [`crate::record::Rejection`]s instead.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Case '{name}' already exists")]
    CaseExists { name: String },

    #[error("Case '{name}' not found")]
    CaseNotFound { name: String },

    #[error("Unsupported input format: {path}")]
    UnsupportedFormat { path: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type WatchResult<T> = Result<T, WatchError>;

/// A detection parameter violates its invariant.
/// Fatal at engine construction; evaluation never runs with these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("large_amount_threshold must be > 0, got {value}")]
    NonPositiveThreshold { value: String },

    #[error("transfer_days_window must be >= 1, got {value}")]
    EmptyWindow { value: i64 },

    #[error("transfer_amount_tolerance must be >= 0, got {value}")]
    NegativeTolerance { value: String },

    #[error("structuring min_records must be >= 2, got {value}")]
    MinRecordsTooSmall { value: usize },

    #[error("Setting {key} has unparseable value '{value}'")]
    InvalidSetting { key: String, value: String },
}
