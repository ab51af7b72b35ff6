//! The ordered row collection and its mutation operations
//!
//! The collection is plain in-memory state owned by the caller. Every
//! mutation recomputes the affected row's results before returning, so a
//! row's results always describe its current input.

use std::cmp::Ordering;

use tracing::{debug, info, warn};

use crate::calculator::{self, NormalizeOutcome};
use crate::config::Settings;
use crate::error::CollectionError;
use crate::models::{Field, Row, RowId, RowInput, RowRecord, Snapshot};

/// Min and max of TotalGas across the collection (blank reads as zero).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TotalGasRange {
    pub min: f64,
    pub max: f64,
}

/// Incoming rows split by the "only deeper than what is logged" policy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppendPlan {
    /// Rows deeper than every depth already present
    pub auto_append: Vec<RowInput>,
    /// Rows at or above the deepest logged depth, or with a non-numeric depth
    pub needs_confirmation: Vec<RowInput>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendDecision {
    /// Nothing was filtered; append without asking.
    Clean { total: usize },
    /// Would append `fresh` of `total` rows; caller should confirm.
    Partial { fresh: usize, total: usize },
    /// Every incoming depth is already covered.
    AllStale { total: usize },
}

impl AppendPlan {
    pub fn total(&self) -> usize {
        self.auto_append.len() + self.needs_confirmation.len()
    }

    pub fn decision(&self) -> AppendDecision {
        let total = self.total();
        match (self.auto_append.len(), self.needs_confirmation.len()) {
            (_, 0) => AppendDecision::Clean { total },
            (0, _) => AppendDecision::AllStale { total },
            (fresh, _) => AppendDecision::Partial { fresh, total },
        }
    }
}

/// How an incoming batch is appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendPolicy {
    /// Append every row once the Depth check passes.
    All,
    /// Only rows deeper than the deepest logged depth. When some rows are
    /// filtered out, nothing is appended until `confirmed` is set.
    OnlyDeeper { confirmed: bool },
}

/// Outcome of [`RowCollection::append_batch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendReport {
    Added { added: usize, total: usize },
    AllStale { total: usize },
    /// Would append `fresh` of `total`; nothing was appended.
    AwaitingConfirmation { fresh: usize, total: usize },
}

impl AppendReport {
    /// Whether the collection was modified.
    pub fn changed(&self) -> bool {
        matches!(self, AppendReport::Added { added, .. } if *added > 0)
    }
}

/// Split `incoming` against the deepest numeric depth in `existing`.
pub fn classify_append(existing: &[Row], incoming: Vec<RowInput>) -> AppendPlan {
    let Some(deepest) = max_depth(existing) else {
        return AppendPlan {
            auto_append: incoming,
            needs_confirmation: Vec::new(),
        };
    };

    let (auto_append, needs_confirmation): (Vec<RowInput>, Vec<RowInput>) = incoming
        .into_iter()
        .partition(|input| input.depth_value().is_some_and(|d| d > deepest));

    AppendPlan {
        auto_append,
        needs_confirmation,
    }
}

fn max_depth(rows: &[Row]) -> Option<f64> {
    rows.iter()
        .filter_map(|r| r.input.depth_value())
        .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |m| m.max(d))))
}

fn validate_depths(batch: &[RowInput]) -> Result<(), CollectionError> {
    match batch.iter().position(|input| !input.has_depth()) {
        Some(idx) => Err(CollectionError::MissingDepth { row: idx + 1 }),
        None => Ok(()),
    }
}

#[derive(Debug, Clone)]
pub struct RowCollection {
    rows: Vec<Row>,
    next_id: RowId,
    settings: Settings,
}

impl RowCollection {
    pub fn new(settings: Settings) -> Self {
        Self {
            rows: Vec::new(),
            next_id: 1,
            settings,
        }
    }

    /// Rebuild a collection from a persisted snapshot, recomputing every
    /// result under the current settings.
    pub fn from_snapshot(settings: Settings, snapshot: Snapshot) -> Self {
        let Snapshot { records, next_id } = snapshot;
        let past_stored = records.iter().map(|r| r.id).max().map_or(1, |id| id + 1);
        let next_id = next_id.max(past_stored);
        let rows = records
            .into_iter()
            .map(|record| {
                let results = calculator::evaluate(&record.input, &settings);
                Row {
                    id: record.id,
                    input: record.input,
                    results,
                    normalized: record.normalized,
                }
            })
            .collect();

        Self {
            rows,
            next_id,
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, id: RowId) -> Option<&Row> {
        self.rows.iter().find(|r| r.id == id)
    }

    pub fn records(&self) -> Vec<RowRecord> {
        self.rows.iter().map(RowRecord::from).collect()
    }

    /// Full snapshot in persisted shape.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            records: self.records(),
            next_id: self.next_id,
        }
    }

    fn push_input(&mut self, input: RowInput) -> RowId {
        let id = self.next_id;
        self.next_id += 1;
        let results = calculator::evaluate(&input, &self.settings);
        self.rows.push(Row {
            id,
            input,
            results,
            normalized: false,
        });
        id
    }

    /// Append a whole batch, or nothing if any row lacks a Depth.
    pub fn add_rows(&mut self, batch: Vec<RowInput>) -> Result<usize, CollectionError> {
        if let Err(e) = validate_depths(&batch) {
            warn!("Rejected batch of {} rows: {}", batch.len(), e);
            return Err(e);
        }

        let count = batch.len();
        for input in batch {
            self.push_input(input);
        }
        info!("Added {} rows ({} total)", count, self.rows.len());
        Ok(count)
    }

    /// Validate a batch and classify it against the depths already logged.
    /// Nothing is appended until [`RowCollection::commit_append`].
    pub fn plan_append(&self, batch: Vec<RowInput>) -> Result<AppendPlan, CollectionError> {
        if let Err(e) = validate_depths(&batch) {
            warn!("Rejected batch of {} rows: {}", batch.len(), e);
            return Err(e);
        }

        let plan = classify_append(&self.rows, batch);
        debug!(
            fresh = plan.auto_append.len(),
            stale = plan.needs_confirmation.len(),
            "Classified incoming batch"
        );
        Ok(plan)
    }

    /// Append the fresh rows of a plan. Returns how many were added.
    pub fn commit_append(&mut self, plan: AppendPlan) -> usize {
        let count = plan.auto_append.len();
        for input in plan.auto_append {
            self.push_input(input);
        }
        if !plan.needs_confirmation.is_empty() {
            info!("Skipped {} rows at already-logged depths", plan.needs_confirmation.len());
        }
        count
    }

    /// Validate, classify and append a batch under `policy`.
    pub fn append_batch(&mut self, batch: Vec<RowInput>, policy: AppendPolicy) -> Result<AppendReport, CollectionError> {
        let confirmed = match policy {
            AppendPolicy::All => {
                let total = batch.len();
                let added = self.add_rows(batch)?;
                return Ok(AppendReport::Added { added, total });
            }
            AppendPolicy::OnlyDeeper { confirmed } => confirmed,
        };

        let plan = self.plan_append(batch)?;
        match plan.decision() {
            AppendDecision::Clean { total } => Ok(AppendReport::Added {
                added: self.commit_append(plan),
                total,
            }),
            AppendDecision::AllStale { total } => Ok(AppendReport::AllStale { total }),
            AppendDecision::Partial { total, .. } if confirmed => Ok(AppendReport::Added {
                added: self.commit_append(plan),
                total,
            }),
            AppendDecision::Partial { fresh, total } => Ok(AppendReport::AwaitingConfirmation { fresh, total }),
        }
    }

    /// Set one field from raw text and recompute the row.
    /// Returns false if no row has this id.
    pub fn update_field(&mut self, id: RowId, field: Field, raw: &str) -> bool {
        let settings = &self.settings;
        let Some(row) = self.rows.iter_mut().find(|r| r.id == id) else {
            return false;
        };

        row.input.set_raw(field, raw);
        row.results = calculator::evaluate(&row.input, settings);
        debug!(row = id, %field, "Field updated");
        true
    }

    pub fn remove_row(&mut self, id: RowId) -> bool {
        let before = self.rows.len();
        self.rows.retain(|r| r.id != id);
        self.rows.len() != before
    }

    pub fn add_empty_row(&mut self) -> &Row {
        self.push_input(RowInput::default());
        &self.rows[self.rows.len() - 1]
    }

    pub fn normalize_row(&mut self, id: RowId) -> Option<NormalizeOutcome> {
        let settings = &self.settings;
        let row = self.rows.iter_mut().find(|r| r.id == id)?;
        Some(calculator::normalize(row, settings))
    }

    /// Normalize every inconsistent row that has something to rescale.
    pub fn normalize_inconsistent(&mut self) -> usize {
        let settings = &self.settings;
        let mut changed = 0;
        for row in self.rows.iter_mut().filter(|r| !r.results.is_consistent) {
            if let NormalizeOutcome::Normalized { .. } = calculator::normalize(row, settings) {
                changed += 1;
            }
        }
        info!("Normalized {} inconsistent rows", changed);
        changed
    }

    /// Remove every row. The id counter keeps counting.
    pub fn clear(&mut self) {
        self.rows.clear();
    }

    pub fn total_gas_range(&self) -> Option<TotalGasRange> {
        let mut values = self.rows.iter().map(|r| r.input.total_gas_or_zero());
        let first = values.next()?;
        let (min, max) = values.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
        Some(TotalGasRange { min, max })
    }

    /// Every row whose TotalGas equals the collection maximum.
    pub fn rows_at_max(&self) -> Vec<&Row> {
        let Some(range) = self.total_gas_range() else {
            return Vec::new();
        };
        self.rows
            .iter()
            .filter(|r| r.input.total_gas_or_zero() == range.max)
            .collect()
    }

    /// First row at the maximum TotalGas.
    pub fn max_gas_row(&self) -> Option<&Row> {
        self.rows_at_max().into_iter().next()
    }

    pub fn exceeds_threshold(&self, threshold: f64) -> bool {
        self.rows.iter().any(|r| r.input.total_gas_or_zero() > threshold)
    }

    /// Alert flag against the configured threshold.
    pub fn over_threshold(&self) -> bool {
        self.exceeds_threshold(self.settings.alert_threshold)
    }

    /// Rows ordered by numeric depth; non-numeric depths keep their relative
    /// order at the end.
    pub fn sorted_by_depth(&self) -> Vec<&Row> {
        let mut sorted: Vec<&Row> = self.rows.iter().collect();
        sorted.sort_by(|a, b| match (a.input.depth_value(), b.input.depth_value()) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
        sorted
    }
}
