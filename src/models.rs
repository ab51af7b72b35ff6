//! Data models for GC well-log rows

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the seven hydrocarbon components reported by the chromatograph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Component {
    C1,
    C2,
    C3,
    #[serde(rename = "iC4")]
    IC4,
    #[serde(rename = "nC4")]
    NC4,
    #[serde(rename = "iC5")]
    IC5,
    #[serde(rename = "nC5")]
    NC5,
}

impl Component {
    /// Display and export order.
    pub const ALL: [Component; 7] = [
        Component::C1,
        Component::C2,
        Component::C3,
        Component::IC4,
        Component::NC4,
        Component::IC5,
        Component::NC5,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Component::C1 => "C1",
            Component::C2 => "C2",
            Component::C3 => "C3",
            Component::IC4 => "iC4",
            Component::NC4 => "nC4",
            Component::IC5 => "iC5",
            Component::NC5 => "nC5",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A column of a row: the depth key, the reported total, or a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Depth,
    TotalGas,
    Component(Component),
}

impl Field {
    /// Column order used by ingestion and export.
    pub const HEADERS: [Field; 9] = [
        Field::Depth,
        Field::TotalGas,
        Field::Component(Component::C1),
        Field::Component(Component::C2),
        Field::Component(Component::C3),
        Field::Component(Component::IC4),
        Field::Component(Component::NC4),
        Field::Component(Component::IC5),
        Field::Component(Component::NC5),
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Field::Depth => "Depth",
            Field::TotalGas => "TotalGas",
            Field::Component(c) => c.as_str(),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Field::HEADERS
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown field '{}' (expected one of Depth, TotalGas, C1..nC5)", wanted))
    }
}

/// Coerce a raw cell into a numeric reading.
///
/// Blank stays blank (`None`); anything that does not parse as a finite
/// number reads as zero.
pub fn coerce_numeric(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => Some(0.0),
    }
}

/// Measured fields of one depth sample, as entered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowInput {
    pub depth: String,
    pub total_gas: Option<f64>,
    /// ppm readings in [`Component::ALL`] order
    pub components: [Option<f64>; 7],
}

impl RowInput {
    pub fn new(depth: impl Into<String>, total_gas: Option<f64>) -> Self {
        Self {
            depth: depth.into().trim().to_string(),
            total_gas,
            components: [None; 7],
        }
    }

    /// Builder-style component setter, mostly for tests and sample data.
    pub fn with(mut self, component: Component, ppm: f64) -> Self {
        self.set_component(component, Some(ppm));
        self
    }

    pub fn component(&self, component: Component) -> Option<f64> {
        self.components[component.index()]
    }

    pub fn set_component(&mut self, component: Component, ppm: Option<f64>) {
        self.components[component.index()] = ppm;
    }

    pub fn total_gas_or_zero(&self) -> f64 {
        self.total_gas.filter(|v| v.is_finite()).unwrap_or(0.0)
    }

    pub fn has_depth(&self) -> bool {
        !self.depth.trim().is_empty()
    }

    /// Depth as a number, when it is one.
    pub fn depth_value(&self) -> Option<f64> {
        self.depth.trim().parse::<f64>().ok().filter(|v| v.is_finite())
    }

    /// Set a field from raw text, coercing numeric columns.
    pub fn set_raw(&mut self, field: Field, raw: &str) {
        match field {
            Field::Depth => self.depth = raw.trim().to_string(),
            Field::TotalGas => self.total_gas = coerce_numeric(raw),
            Field::Component(c) => self.set_component(c, coerce_numeric(raw)),
        }
    }
}

/// Derived values, always recomputed from the current [`RowInput`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowResult {
    /// units per component in [`Component::ALL`] order
    pub component_units: [f64; 7],
    pub sum_units: f64,
    pub is_consistent: bool,
    pub percent: f64,
}

impl RowResult {
    pub fn units(&self, component: Component) -> f64 {
        self.component_units[component.index()]
    }
}

pub type RowId = u64;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub id: RowId,
    pub input: RowInput,
    pub results: RowResult,
    pub normalized: bool,
}

/// Flat persisted shape of a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowRecord {
    pub id: RowId,
    pub input: RowInput,
    pub results: RowResult,
    pub normalized: bool,
}

impl From<&Row> for RowRecord {
    fn from(row: &Row) -> Self {
        Self {
            id: row.id,
            input: row.input.clone(),
            results: row.results.clone(),
            normalized: row.normalized,
        }
    }
}

/// Everything persisted for a collection: its rows and the id counter.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub records: Vec<RowRecord>,
    /// Next id to hand out; ids are never reused, even after removal.
    pub next_id: RowId,
}

/// Display-only depth unit. Depths are stored as entered (meters).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DepthUnit {
    #[default]
    #[serde(rename = "m")]
    Meters,
    #[serde(rename = "ft")]
    Feet,
}

pub const FEET_PER_METER: f64 = 3.28084;

impl DepthUnit {
    pub fn suffix(self) -> &'static str {
        match self {
            DepthUnit::Meters => "m",
            DepthUnit::Feet => "ft",
        }
    }

    /// Render a stored depth. Meters keep the entered text; feet convert
    /// and fall back to `0.00` for non-numeric depths.
    pub fn format_depth(self, depth: &str) -> String {
        match self {
            DepthUnit::Meters => depth.to_string(),
            DepthUnit::Feet => {
                let meters = depth.trim().parse::<f64>().ok().filter(|v| v.is_finite());
                format!("{:.2}", meters.unwrap_or(0.0) * FEET_PER_METER)
            }
        }
    }
}

impl FromStr for DepthUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "m" | "meters" | "metres" => Ok(DepthUnit::Meters),
            "ft" | "feet" => Ok(DepthUnit::Feet),
            other => Err(format!("unknown depth unit '{}' (expected m or ft)", other)),
        }
    }
}
