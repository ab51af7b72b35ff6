//! Unit conversion, consistency evaluation and normalization
//!
//! Every function here is pure over one row and never fails: blank or
//! malformed readings contribute zero.

use tracing::debug;

use crate::collection::RowCollection;
use crate::config::Settings;
use crate::models::{Component, DepthUnit, Row, RowInput, RowResult};

/// Ratio used to restate the reported total as a percentage.
const PPM_PER_PERCENT: f64 = 10_000.0;

/// Convert a component ppm reading to gas units.
pub fn to_units(ppm: Option<f64>, settings: &Settings) -> f64 {
    match ppm {
        Some(v) if v.is_finite() => v / settings.ppm_per_unit,
        _ => 0.0,
    }
}

/// Compute the derived results for one row.
pub fn evaluate(input: &RowInput, settings: &Settings) -> RowResult {
    let mut component_units = [0.0; 7];
    let mut sum_units = 0.0;

    for (slot, component) in component_units.iter_mut().zip(Component::ALL) {
        let units = to_units(input.component(component), settings);
        *slot = units;
        sum_units += units;
    }

    let reported = input.total_gas_or_zero();
    // A zero report only balances an all-zero row.
    let is_consistent = (sum_units - reported).abs() <= reported.abs() * settings.tolerance_fraction;
    let percent = reported * settings.ppm_per_unit / PPM_PER_PERCENT;

    RowResult {
        component_units,
        sum_units,
        is_consistent,
        percent,
    }
}

/// What [`normalize`] did to a row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NormalizeOutcome {
    /// Components were rescaled by `factor`.
    Normalized { factor: f64 },
    /// Component sum was zero; nothing to rescale.
    Unchanged,
}

/// Rescale a row's components so their unit sum matches its TotalGas.
pub fn normalize(row: &mut Row, settings: &Settings) -> NormalizeOutcome {
    let sum_units = row.results.sum_units;
    if sum_units == 0.0 {
        debug!(row = row.id, "normalize skipped: zero component sum");
        return NormalizeOutcome::Unchanged;
    }

    let factor = row.input.total_gas_or_zero() / sum_units;
    for component in Component::ALL {
        let old_ppm = row.input.component(component).filter(|v| v.is_finite()).unwrap_or(0.0);
        let scaled = round_to(old_ppm * factor, settings.normalize_decimals);
        row.input.set_component(component, Some(scaled));
    }

    row.results = evaluate(&row.input, settings);
    row.normalized = true;
    debug!(row = row.id, factor, sum_units = row.results.sum_units, "row normalized");
    NormalizeOutcome::Normalized { factor }
}

/// Round half away from zero to a fixed number of decimals.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    let rounded = (value * scale).round() / scale;
    // Avoid handing back -0.0 for tiny negatives.
    if rounded == 0.0 { 0.0 } else { rounded }
}

/// Summary of a row collection
#[derive(Debug)]
pub struct CollectionSummary {
    pub rows: usize,
    pub consistent: usize,
    pub inconsistent: usize,
    pub normalized: usize,
    pub min_total_gas: Option<f64>,
    pub max_total_gas: Option<f64>,
    pub max_depth: Option<String>,
    pub max_breakdown: Vec<(Component, f64)>,
    pub alert_threshold: f64,
    pub over_threshold: bool,
    pub depth_unit: DepthUnit,
}

/// Generate a summary of the collection
pub fn summarize_collection(collection: &RowCollection) -> CollectionSummary {
    let settings = collection.settings();
    let rows = collection.rows();
    let consistent = rows.iter().filter(|r| r.results.is_consistent).count();
    let normalized = rows.iter().filter(|r| r.normalized).count();
    let range = collection.total_gas_range();
    let max_row = collection.max_gas_row();

    CollectionSummary {
        rows: rows.len(),
        consistent,
        inconsistent: rows.len() - consistent,
        normalized,
        min_total_gas: range.map(|r| r.min),
        max_total_gas: range.map(|r| r.max),
        max_depth: max_row.map(|r| settings.depth_unit.format_depth(&r.input.depth)),
        max_breakdown: max_row
            .map(|r| {
                Component::ALL
                    .iter()
                    .map(|&c| (c, r.input.component(c).unwrap_or(0.0)))
                    .collect()
            })
            .unwrap_or_default(),
        alert_threshold: settings.alert_threshold,
        over_threshold: collection.over_threshold(),
        depth_unit: settings.depth_unit,
    }
}

impl std::fmt::Display for CollectionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== GC Balance Summary ===")?;
        writeln!(
            f,
            "Rows: {} ({} GOOD, {} BAD, {} normalized)",
            self.rows, self.consistent, self.inconsistent, self.normalized
        )?;

        if let (Some(min), Some(max)) = (self.min_total_gas, self.max_total_gas) {
            writeln!(f, "Min TotalGas: {} | Max TotalGas: {}", min, max)?;
        }

        if let (Some(max), Some(depth)) = (self.max_total_gas, &self.max_depth) {
            writeln!(f)?;
            writeln!(f, "Max Gas = {:.2} u", max)?;
            writeln!(f, "Depth = {} {}", depth, self.depth_unit.suffix())?;
            let breakdown: Vec<String> = self
                .max_breakdown
                .iter()
                .map(|(c, ppm)| format!("{} = {:.2}", c, ppm))
                .collect();
            writeln!(f, "Breakdown: {}", breakdown.join(", "))?;
        }

        if self.over_threshold {
            writeln!(f)?;
            writeln!(f, "ALERT: TotalGas > {}", self.alert_threshold)?;
        }

        Ok(())
    }
}
