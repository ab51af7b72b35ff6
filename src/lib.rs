//! GC Balance Checker
//!
//! Checks that gas chromatography component readings add up to the
//! reported total gas, and normalizes rows that do not.

pub mod calculator;
pub mod collection;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod ingest;
pub mod models;

pub use calculator::{evaluate, normalize, to_units, NormalizeOutcome};
pub use collection::{
    classify_append, AppendDecision, AppendPlan, AppendPolicy, AppendReport, RowCollection, TotalGasRange,
};
pub use config::Settings;
pub use error::CollectionError;
pub use models::{Component, DepthUnit, Field, Row, RowId, RowInput, RowRecord, RowResult, Snapshot};
