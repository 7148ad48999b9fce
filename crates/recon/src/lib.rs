//! `fiscal-recon`: fiscal document reconciliation engine.
//!
//! Pure engine crate: receives pre-loaded rows from a canonical XML set and
//! any number of secondary sources, returns alerts and metrics.
//! No CLI or file IO dependencies.

pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod matcher;
pub mod metrics;
pub mod model;
pub mod normalize;
pub mod report;

pub use config::{AmountScale, ColumnOverrides, ReconConfig, SourceConfig};
pub use engine::{reconcile, run, SecondarySource};
pub use error::ReconError;
pub use metrics::aggregate;
pub use model::{
    AlertEntry, AlertReason, MatchKey, MatchStatus, Metrics, RawRow, RawValue, ReconInput,
    ReconResult,
};
pub use report::reasons_by_key;
