//! CSV and spreadsheet export of checked rows

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Format, Workbook};
use tracing::info;

use crate::calculator::round_to;
use crate::collection::{RowCollection, TotalGasRange};
use crate::models::{Component, DepthUnit, Row};

#[derive(Debug, Clone, Copy, Default)]
pub struct ExportOptions {
    pub depth_unit: DepthUnit,
    pub sort_by_depth: bool,
    /// Append the max-gas breakdown after the table.
    pub include_max_summary: bool,
}

fn header() -> Vec<String> {
    let mut cols = vec!["Depth".to_string(), "TotalGas".to_string()];
    cols.extend(Component::ALL.iter().map(|c| c.to_string()));
    cols.extend(["SumUnits", "TotalGas(%)", "Status", "Flag"].map(String::from));
    cols
}

fn quote(cell: &str) -> String {
    if cell.contains(',') || cell.contains('"') || cell.contains('\n') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

fn write_line<W: Write>(out: &mut W, cells: &[String]) -> Result<()> {
    let line: Vec<String> = cells.iter().map(|c| quote(c)).collect();
    writeln!(out, "{}", line.join(","))?;
    Ok(())
}

fn blank_or(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// MIN wins over MAX when every row has the same TotalGas.
fn flag(total_gas: f64, range: Option<TotalGasRange>) -> &'static str {
    match range {
        Some(r) if total_gas == r.min => "MIN",
        Some(r) if total_gas == r.max => "MAX",
        _ => "",
    }
}

fn row_cells(row: &Row, range: Option<TotalGasRange>, depth_unit: DepthUnit) -> Vec<String> {
    let mut cells = vec![
        depth_unit.format_depth(&row.input.depth),
        blank_or(row.input.total_gas),
    ];
    cells.extend(Component::ALL.iter().map(|&c| blank_or(row.input.component(c))));
    cells.push(format!("{:.6}", row.results.sum_units));
    cells.push(format!("{:.6}", row.results.percent));
    cells.push(if row.results.is_consistent { "GOOD" } else { "BAD" }.to_string());
    cells.push(flag(row.input.total_gas_or_zero(), range).to_string());
    cells
}

/// Write the collection as CSV.
pub fn write_csv<W: Write>(out: &mut W, collection: &RowCollection, options: &ExportOptions) -> Result<()> {
    let range = collection.total_gas_range();
    let rows: Vec<&Row> = if options.sort_by_depth {
        collection.sorted_by_depth()
    } else {
        collection.rows().iter().collect()
    };

    write_line(out, &header())?;
    for row in rows {
        write_line(out, &row_cells(row, range, options.depth_unit))?;
    }

    if options.include_max_summary {
        for line in max_summary_lines(collection, options.depth_unit) {
            write_line(out, &[line])?;
        }
    }

    Ok(())
}

/// `Max Gas = ...`, one line per component, then the depth with its unit.
fn max_summary_lines(collection: &RowCollection, depth_unit: DepthUnit) -> Vec<String> {
    let Some(max_row) = collection.max_gas_row() else {
        return Vec::new();
    };
    let mut lines = vec![format!("Max Gas = {:.2}", max_row.input.total_gas_or_zero())];
    for c in Component::ALL {
        lines.push(format!("{} = {:.2}", c, max_row.input.component(c).unwrap_or(0.0)));
    }
    lines.push(format!(
        "Depth = {} {}",
        depth_unit.format_depth(&max_row.input.depth),
        depth_unit.suffix()
    ));
    lines
}

const XLSX_SHEET: &str = "Data";

fn xlsx_header() -> Vec<String> {
    let mut cols = vec!["Depth".to_string(), "TotalGas (%)".to_string(), "TotalGas (u)".to_string()];
    cols.extend(Component::ALL.iter().map(|c| c.to_string()));
    cols
}

fn is_xlsx(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xlsx"))
}

/// Write the collection as a one-sheet workbook.
///
/// Rows are always ordered by depth and followed by the max-gas summary.
/// Readings are rounded to two decimals; blanks are written as zero.
pub fn write_xlsx(path: &Path, collection: &RowCollection, depth_unit: DepthUnit) -> Result<()> {
    let two_decimals = Format::new().set_num_format("0.00");
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(XLSX_SHEET)?;

    for (col, name) in xlsx_header().iter().enumerate() {
        sheet.write_string(0, col as u16, name)?;
    }

    let mut row_num: u32 = 1;
    for row in collection.sorted_by_depth() {
        let depth = depth_unit.format_depth(&row.input.depth);
        match depth.parse::<f64>() {
            Ok(v) => sheet.write_number_with_format(row_num, 0, round_to(v, 2), &two_decimals)?,
            Err(_) => sheet.write_string(row_num, 0, &depth)?,
        };

        let mut values = vec![row.results.percent, row.input.total_gas_or_zero()];
        values.extend(Component::ALL.iter().map(|&c| row.input.component(c).unwrap_or(0.0)));
        for (offset, value) in values.into_iter().enumerate() {
            sheet.write_number_with_format(row_num, 1 + offset as u16, round_to(value, 2), &two_decimals)?;
        }
        row_num += 1;
    }

    for line in max_summary_lines(collection, depth_unit) {
        sheet.write_string(row_num, 0, &line)?;
        row_num += 1;
    }

    workbook
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Export to a file, returning how many rows were written.
///
/// An `.xlsx` path gets a workbook; `sort_by_depth` and
/// `include_max_summary` only apply to CSV.
pub fn export_to_file(path: &Path, collection: &RowCollection, options: &ExportOptions) -> Result<usize> {
    if is_xlsx(path) {
        write_xlsx(path, collection, options.depth_unit)?;
        info!("Exported {} rows to workbook {}", collection.len(), path.display());
        return Ok(collection.len());
    }

    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    write_csv(&mut out, collection, options)?;
    out.flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!("Exported {} rows to {}", collection.len(), path.display());
    Ok(collection.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::models::RowInput;

    fn sample() -> RowCollection {
        let mut c = RowCollection::new(Settings::default());
        c.add_rows(vec![
            RowInput::new("120", Some(20.0)).with(Component::C1, 4000.0),
            RowInput::new("100", Some(5.0)).with(Component::C1, 2000.0),
            RowInput::new("110", Some(80.0)),
        ])
        .unwrap();
        c
    }

    fn render(c: &RowCollection, options: ExportOptions) -> Vec<String> {
        let mut buf = Vec::new();
        write_csv(&mut buf, c, &options).unwrap();
        String::from_utf8(buf).unwrap().lines().map(String::from).collect()
    }

    #[test]
    fn test_header_and_rows() {
        let lines = render(&sample(), ExportOptions::default());
        assert_eq!(
            lines[0],
            "Depth,TotalGas,C1,C2,C3,iC4,nC4,iC5,nC5,SumUnits,TotalGas(%),Status,Flag"
        );
        assert_eq!(lines[1], "120,20,4000,,,,,,,20.000000,0.400000,GOOD,");
        assert_eq!(lines[2], "100,5,2000,,,,,,,10.000000,0.100000,BAD,MIN");
        assert_eq!(lines[3], "110,80,,,,,,,,0.000000,1.600000,BAD,MAX");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_sorted_feet_with_summary() {
        let options = ExportOptions {
            depth_unit: DepthUnit::Feet,
            sort_by_depth: true,
            include_max_summary: true,
        };
        let lines = render(&sample(), options);
        assert!(lines[1].starts_with("328.08,5,"));
        assert!(lines[2].starts_with("360.89,80,"));
        assert!(lines[3].starts_with("393.70,20,"));
        assert_eq!(lines[4], "Max Gas = 80.00");
        assert_eq!(lines[5], "C1 = 0.00");
        assert_eq!(lines.last().unwrap(), "Depth = 360.89 ft");
    }

    #[test]
    fn test_single_row_flagged_min() {
        let mut c = RowCollection::new(Settings::default());
        c.add_rows(vec![RowInput::new("1", Some(3.0))]).unwrap();
        let lines = render(&c, ExportOptions::default());
        assert!(lines[1].ends_with(",MIN"));
    }

    #[test]
    fn test_quotes_cells_with_commas() {
        assert_eq!(quote("a,b"), "\"a,b\"");
        assert_eq!(quote("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(quote("plain"), "plain");
    }

    #[test]
    fn test_xlsx_layout_sorted_with_summary() {
        use calamine::{open_workbook_auto, Data, Reader};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gc_data.xlsx");
        let written = export_to_file(&path, &sample(), &ExportOptions::default()).unwrap();
        assert_eq!(written, 3);

        let mut workbook = open_workbook_auto(&path).unwrap();
        assert_eq!(workbook.sheet_names(), vec!["Data".to_string()]);
        let range = workbook.worksheet_range_at(0).unwrap().unwrap();
        let rows: Vec<&[Data]> = range.rows().collect();

        let header: Vec<String> = rows[0].iter().map(|c| c.to_string()).collect();
        assert_eq!(
            header,
            vec!["Depth", "TotalGas (%)", "TotalGas (u)", "C1", "C2", "C3", "iC4", "nC4", "iC5", "nC5"]
        );

        // Sorted by depth: 100, 110, 120.
        assert_eq!(rows[1][0], Data::Float(100.0));
        assert_eq!(rows[1][1], Data::Float(0.1));
        assert_eq!(rows[1][2], Data::Float(5.0));
        assert_eq!(rows[1][3], Data::Float(2000.0));
        assert_eq!(rows[1][4], Data::Float(0.0));
        assert_eq!(rows[2][0], Data::Float(110.0));
        assert_eq!(rows[2][1], Data::Float(1.6));
        assert_eq!(rows[3][0], Data::Float(120.0));

        assert_eq!(rows[4][0], Data::String("Max Gas = 80.00".to_string()));
        assert_eq!(rows[5][0], Data::String("C1 = 0.00".to_string()));
        assert_eq!(rows[12][0], Data::String("Depth = 110 m".to_string()));
        assert_eq!(rows.len(), 13);
    }

    #[test]
    fn test_xlsx_feet_depths_rounded() {
        use calamine::{open_workbook_auto, Data, Reader};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feet.xlsx");
        write_xlsx(&path, &sample(), DepthUnit::Feet).unwrap();

        let mut workbook = open_workbook_auto(&path).unwrap();
        let range = workbook.worksheet_range_at(0).unwrap().unwrap();
        assert_eq!(range.get_value((1, 0)), Some(&Data::Float(328.08)));
        assert_eq!(range.get_value((12, 0)), Some(&Data::String("Depth = 360.89 ft".to_string())));
    }

    #[test]
    fn test_export_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let written = export_to_file(&path, &sample(), &ExportOptions::default()).unwrap();
        assert_eq!(written, 3);
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 4);
    }
}
