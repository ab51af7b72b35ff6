//! Conditions the row collection reports back to callers

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectionError {
    /// A batch row had no Depth; the whole batch was left out.
    #[error("Depth must be set for all rows (row {row} of the batch is missing it)")]
    MissingDepth { row: usize },
}
