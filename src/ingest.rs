//! Text, file and spreadsheet ingestion of GC readings
//!
//! Turns pasted text, delimited log files or the first sheet of a workbook
//! into [`RowInput`] batches. Numeric cells are coerced here so the
//! calculator only ever sees well-typed readings.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Reader};
use regex::Regex;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::models::{Field, RowInput};

const SPREADSHEET_EXTENSIONS: [&str; 2] = ["xlsx", "xls"];
const LOG_EXTENSIONS: [&str; 5] = ["csv", "tsv", "txt", "xlsx", "xls"];

/// `Max Gas = 80.00`, `iC4 = 0.00`, `Depth = 100 m`: the summary lines an
/// export appends after the table.
const TRAILER_PATTERN: &str = r"^[A-Za-z][A-Za-z0-9 ]* = \S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delimiter {
    Tab,
    Comma,
    Whitespace,
}

impl Delimiter {
    /// Chosen from the first line only.
    fn detect(first_line: &str) -> Self {
        if first_line.contains('\t') {
            Delimiter::Tab
        } else if first_line.contains(',') {
            Delimiter::Comma
        } else {
            Delimiter::Whitespace
        }
    }
}

/// Split on commas outside double quotes. `""` inside quotes is a literal quote.
fn split_quoted_commas(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                cell.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => cells.push(std::mem::take(&mut cell)),
            _ => cell.push(ch),
        }
    }
    cells.push(cell);
    cells
}

/// Split and clean the cells of one line.
fn split_cells(line: &str, delimiter: Delimiter, whitespace: &Regex, quotes: &Regex) -> Vec<String> {
    let raw: Vec<&str> = match delimiter {
        Delimiter::Tab => line.split('\t').collect(),
        Delimiter::Whitespace => whitespace.split(line).collect(),
        Delimiter::Comma => {
            return split_quoted_commas(line)
                .into_iter()
                .map(|cell| cell.trim().trim_matches('\'').to_string())
                .collect();
        }
    };
    raw.into_iter()
        .map(|cell| quotes.replace_all(cell, "").trim().to_string())
        .collect()
}

/// A blank cell counts as numeric so a leading empty cell is not taken for a header.
fn is_numeric_cell(cell: &str) -> bool {
    let trimmed = cell.trim();
    trimmed.is_empty() || trimmed.parse::<f64>().is_ok()
}

/// Header names compare case-insensitively and ignore spaces. `TotalGas (u)`
/// from the spreadsheet export also names the TotalGas column.
fn header_names(cell: &str, field: Field) -> bool {
    let squashed: String = cell.chars().filter(|c| !c.is_whitespace()).collect();
    squashed.eq_ignore_ascii_case(field.as_str())
        || (field == Field::TotalGas && squashed.eq_ignore_ascii_case("TotalGas(u)"))
}

fn build_input(cells: &[String], columns: &[Option<usize>; 9]) -> RowInput {
    let mut input = RowInput::default();
    for (field, column) in Field::HEADERS.into_iter().zip(columns) {
        let cell = column
            .and_then(|idx| cells.get(idx))
            .map(String::as_str)
            .unwrap_or("");
        input.set_raw(field, cell);
    }
    input
}

/// Map split rows to inputs, detecting an optional header in the first row.
///
/// Header names are matched case-insensitively; fields the header does not
/// name fall back to their position.
fn rows_from_cells(cells: &[Vec<String>]) -> Vec<RowInput> {
    let Some(first) = cells.first() else {
        return Vec::new();
    };

    let has_header = first.first().is_some_and(|c| !is_numeric_cell(c));
    let mut columns: [Option<usize>; 9] = std::array::from_fn(Some);

    let body = if has_header {
        for (slot, field) in columns.iter_mut().zip(Field::HEADERS) {
            if let Some(idx) = first.iter().position(|h| !h.is_empty() && header_names(h, field)) {
                *slot = Some(idx);
            }
        }
        &cells[1..]
    } else {
        cells
    };

    debug!(has_header, rows = body.len(), "Mapped cells to rows");
    body.iter().map(|row| build_input(row, &columns)).collect()
}

/// Parse pasted text into row inputs.
///
/// Accepts tab, comma or whitespace separated columns with an optional
/// header line. Export summary lines (`Max Gas = ...`) are skipped.
pub fn parse_text(text: &str) -> Result<Vec<RowInput>> {
    let whitespace = Regex::new(r"\s+")?;
    let quotes = Regex::new(r#"^["']|["']$"#)?;
    let trailer = Regex::new(TRAILER_PATTERN)?;

    let lines: Vec<&str> = text
        .trim()
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !trailer.is_match(l))
        .collect();
    let Some(first) = lines.first() else {
        return Ok(Vec::new());
    };

    let delimiter = Delimiter::detect(first);
    debug!(?delimiter, lines = lines.len(), "Parsing text block");
    let cells: Vec<Vec<String>> = lines
        .iter()
        .map(|l| split_cells(l, delimiter, &whitespace, &quotes))
        .collect();

    Ok(rows_from_cells(&cells))
}

/// Read the first sheet of an `.xlsx`/`.xls` workbook.
pub fn read_spreadsheet(path: &Path) -> Result<Vec<RowInput>> {
    let trailer = Regex::new(TRAILER_PATTERN)?;
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open workbook {}", path.display()))?;
    let range = workbook
        .worksheet_range_at(0)
        .with_context(|| format!("{} has no sheets", path.display()))?
        .with_context(|| format!("Failed to read first sheet of {}", path.display()))?;

    let cells: Vec<Vec<String>> = range
        .rows()
        .map(|row| row.iter().map(|cell| cell.to_string().trim().to_string()).collect::<Vec<_>>())
        .filter(|row| !row.iter().all(String::is_empty))
        .filter(|row| !(trailer.is_match(&row[0]) && row[1..].iter().all(String::is_empty)))
        .collect();

    Ok(rows_from_cells(&cells))
}

fn has_extension(path: &Path, known: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| known.iter().any(|k| k.eq_ignore_ascii_case(ext)))
}

/// Read one log file: a workbook by extension, otherwise delimited text.
pub fn read_file(path: &Path) -> Result<Vec<RowInput>> {
    let rows = if has_extension(path, &SPREADSHEET_EXTENSIONS) {
        read_spreadsheet(path)?
    } else {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        parse_text(&content).with_context(|| format!("Failed to parse {}", path.display()))?
    };
    info!("Read {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// Find every log file under a directory, sorted by path.
pub fn find_log_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.with_context(|| format!("Failed to scan {}", dir.display()))?;
        if entry.file_type().is_file() && has_extension(entry.path(), &LOG_EXTENSIONS) {
            files.push(entry.into_path());
        }
    }

    files.sort();
    Ok(files)
}

/// Read a single file, or every log file under a directory as one batch.
pub fn read_path(path: &Path) -> Result<Vec<RowInput>> {
    if !path.is_dir() {
        return read_file(path);
    }

    let files = find_log_files(path)?;
    info!("Found {} log files under {}", files.len(), path.display());

    let mut batch = Vec::new();
    for file in &files {
        batch.extend(read_file(file)?);
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Component;

    #[test]
    fn test_positional_tab_separated() {
        let rows = parse_text("100\t10\t1000\t500\t500\t0\t0\t0\t0\n101\t12\t2400").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].depth, "100");
        assert_eq!(rows[0].total_gas, Some(10.0));
        assert_eq!(rows[0].component(Component::C3), Some(500.0));
        assert_eq!(rows[0].component(Component::NC5), Some(0.0));
        assert_eq!(rows[1].component(Component::C1), Some(2400.0));
        assert_eq!(rows[1].component(Component::C2), None);
    }

    #[test]
    fn test_header_matched_case_insensitively() {
        let text = "depth,c1,TOTALGAS,nc5\n\"250\",400,2,'20'\n";
        let rows = parse_text(text).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].depth, "250");
        assert_eq!(rows[0].total_gas, Some(2.0));
        assert_eq!(rows[0].component(Component::C1), Some(400.0));
        assert_eq!(rows[0].component(Component::NC5), Some(20.0));
    }

    #[test]
    fn test_unnamed_header_columns_fall_back_to_position() {
        let rows = parse_text("Depth TotalGas X Y\n100 10 200 300").unwrap();
        // C1 and C2 are not in the header, so they read columns 2 and 3.
        assert_eq!(rows[0].component(Component::C1), Some(200.0));
        assert_eq!(rows[0].component(Component::C2), Some(300.0));
    }

    #[test]
    fn test_whitespace_and_blank_lines() {
        let rows = parse_text("\n\n  100   10  2000 \r\n\r\n 101 5 abc\n").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].component(Component::C1), Some(2000.0));
        assert_eq!(rows[1].component(Component::C1), Some(0.0));
    }

    #[test]
    fn test_leading_blank_cell_is_not_header() {
        let rows = parse_text(",10,2000").unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].has_depth());
    }

    #[test]
    fn test_empty_text() {
        assert!(parse_text("   \n  ").unwrap().is_empty());
    }

    #[test]
    fn test_read_path_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.csv"), "Depth,TotalGas,C1\n200,1,200\n").unwrap();
        fs::write(dir.path().join("a.txt"), "100 2 400\n").unwrap();
        fs::write(dir.path().join("notes.md"), "not a log").unwrap();

        let files = find_log_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);

        let rows = read_path(dir.path()).unwrap();
        let depths: Vec<&str> = rows.iter().map(|r| r.depth.as_str()).collect();
        assert_eq!(depths, vec!["100", "200"]);
    }

    #[test]
    fn test_quoted_comma_stays_one_cell() {
        let rows = parse_text("Depth,TotalGas,C1\n\"1,000\",5,\"2,5\"\n").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].depth, "1,000");
        assert_eq!(rows[0].total_gas, Some(5.0));
        // "2,5" is one cell; it is not a number, so it reads as zero.
        assert_eq!(rows[0].component(Component::C1), Some(0.0));
        assert_eq!(rows[0].component(Component::C2), None);
    }

    #[test]
    fn test_split_quoted_commas_escapes() {
        assert_eq!(split_quoted_commas(r#"a,"b,c","say ""hi""",,"#), vec!["a", "b,c", "say \"hi\"", "", ""]);
    }

    #[test]
    fn test_summary_lines_are_skipped() {
        let text = "Depth,TotalGas,C1\n100,5,1000\nMax Gas = 5.00\nC1 = 1000.00\niC4 = 0.00\nDepth = 100 m\n";
        let rows = parse_text(text).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].depth, "100");
    }

    #[test]
    fn test_spreadsheet_first_sheet_header_matched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.xlsx");

        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        for (col, name) in ["depth", "C1", "TotalGas (u)", "nc5"].into_iter().enumerate() {
            sheet.write_string(0, col as u16, name).unwrap();
        }
        sheet.write_number(1, 0, 250.0).unwrap();
        sheet.write_number(1, 1, 400.0).unwrap();
        sheet.write_number(1, 2, 2.0).unwrap();
        sheet.write_number(1, 3, 20.0).unwrap();
        sheet.write_number(2, 0, 251.5).unwrap();
        sheet.write_number(2, 2, 3.0).unwrap();
        sheet.write_string(4, 0, "Max Gas = 3.00").unwrap();
        workbook.add_worksheet().write_string(0, 0, "ignored").unwrap();
        workbook.save(&path).unwrap();

        let rows = read_file(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].depth, "250");
        assert_eq!(rows[0].total_gas, Some(2.0));
        assert_eq!(rows[0].component(Component::C1), Some(400.0));
        assert_eq!(rows[0].component(Component::NC5), Some(20.0));
        assert_eq!(rows[1].depth, "251.5");
        assert_eq!(rows[1].component(Component::C1), None);
    }

    #[test]
    fn test_spreadsheets_found_in_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.csv"), "100 2 400\n").unwrap();
        let mut workbook = rust_xlsxwriter::Workbook::new();
        workbook.add_worksheet().write_number(0, 0, 200.0).unwrap();
        workbook.save(dir.path().join("b.xlsx")).unwrap();

        let files = find_log_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        let depths: Vec<String> = read_path(dir.path()).unwrap().into_iter().map(|r| r.depth).collect();
        assert_eq!(depths, vec!["100", "200"]);
    }

    #[test]
    fn test_read_missing_file_errors() {
        assert!(read_file(Path::new("/definitely/not/here.csv")).is_err());
    }
}
