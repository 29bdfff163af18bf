//! Transfer Watch: surveillance of transfer records for large transfers
//! and structuring patterns.
//!
//! The detection path (`record` → `detector`s → `alert::aggregate`) is
//! pure and stateless, reached through `engine::WatchEngine`. The
//! `ingest`, `store` and `synthetic` modules are collaborators that feed
//! it and keep its results; the engine never calls them.

pub mod alert;
pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod large_transfer;
pub mod record;
pub mod rng;
pub mod store;
pub mod structuring;
pub mod summary;
pub mod synthetic;
pub mod types;

pub use alert::{Alert, AlertKind};
pub use config::DetectionConfig;
pub use engine::{evaluate, Evaluation, WatchEngine};
pub use error::{ConfigError, WatchError, WatchResult};
pub use record::{RawRecord, Rejection, TransferRecord, ValidationError};
