//! Tabular source parsing for CSV and Excel (.xlsx/.xlsm/.xlsb/.xls), plus
//! normalization of the hierarchy columns into path rows.

use crate::bootstrap::{RowSource, SourceError};
use anyhow::{Context, Result};
use calamine::{open_workbook_from_rs, Data, Reader, Xls, Xlsb, Xlsx};
use std::collections::HashSet;
use std::io::{Cursor, Read, Seek};
use std::path::PathBuf;

/// Raw parsed sheet data: first row as headers, remaining non-empty rows.
#[derive(Debug, Clone)]
pub struct RawSheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Dispatch file parsing by extension.
pub fn parse_file(filename: &str, data: &[u8]) -> Result<Vec<RawSheet>> {
    let ext = filename
        .rsplit('.')
        .next()
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "csv" => parse_csv(filename, data),
        "xlsx" | "xlsm" => {
            let workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(data))
                .context("Failed to open Excel workbook")?;
            parse_workbook(workbook)
        }
        "xlsb" => {
            let workbook: Xlsb<_> = open_workbook_from_rs(Cursor::new(data))
                .context("Failed to open Excel workbook")?;
            parse_workbook(workbook)
        }
        "xls" => {
            let workbook: Xls<_> = open_workbook_from_rs(Cursor::new(data))
                .context("Failed to open Excel workbook")?;
            parse_workbook(workbook)
        }
        _ => anyhow::bail!(
            "Unsupported file type: .{}. Supported: .csv, .xlsx, .xlsm, .xlsb, .xls",
            ext
        ),
    }
}

/// Parse a CSV file into a single RawSheet.
fn parse_csv(filename: &str, data: &[u8]) -> Result<Vec<RawSheet>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(data);

    let headers: Vec<String> = reader
        .headers()
        .context("Failed to read CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        anyhow::bail!("CSV file has no headers");
    }

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.context("Failed to read CSV record")?;
        let row: Vec<String> = record.iter().map(|f| f.trim().to_string()).collect();
        if row.iter().all(|v| v.is_empty()) {
            continue;
        }
        rows.push(row);
    }

    let name = filename
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(filename)
        .trim_end_matches(".csv")
        .to_string();

    Ok(vec![RawSheet {
        name,
        headers,
        rows,
    }])
}

/// Read every worksheet of an opened workbook. Unreadable sheets are skipped.
fn parse_workbook<RS, R>(mut workbook: R) -> Result<Vec<RawSheet>>
where
    RS: Read + Seek,
    R: Reader<RS>,
    R::Error: std::fmt::Display,
{
    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    let mut sheets = Vec::new();

    for name in &sheet_names {
        let range = match workbook.worksheet_range(name) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Skipping sheet '{}': {}", name, e);
                continue;
            }
        };

        if let Some(sheet) = range_to_raw_sheet(name, &range) {
            sheets.push(sheet);
        }
    }

    if sheets.is_empty() {
        anyhow::bail!("No sheets with data found in workbook");
    }

    Ok(sheets)
}

/// Convert a calamine Range into a RawSheet. First row = headers.
fn range_to_raw_sheet(name: &str, range: &calamine::Range<Data>) -> Option<RawSheet> {
    let mut row_iter = range.rows();

    let header_row = row_iter.next()?;
    let headers: Vec<String> = header_row.iter().map(cell_to_string).collect();

    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return None;
    }

    let rows: Vec<Vec<String>> = row_iter
        .map(|row| row.iter().map(cell_to_string).collect::<Vec<_>>())
        .filter(|values| !values.iter().all(|v| v.is_empty()))
        .collect();

    Some(RawSheet {
        name: name.to_string(),
        headers,
        rows,
    })
}

/// Convert a calamine cell to a trimmed string.
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            // Avoid trailing ".0" for whole numbers
            if *f == (*f as i64) as f64 && f.abs() < i64::MAX as f64 {
                format!("{}", *f as i64)
            } else {
                format!("{}", f)
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.as_f64().to_string(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#ERR:{:?}", e),
    }
}

/// Pick the hierarchy columns out of a sheet, forward-fill blanks and drop
/// exact-duplicate rows (first occurrence kept).
///
/// Fails if any of `columns` is missing from the sheet headers.
pub fn normalize_rows(sheet: &RawSheet, columns: &[String]) -> Result<Vec<Vec<String>>> {
    let positions = column_positions(sheet, columns).ok_or_else(|| {
        anyhow::anyhow!(
            "Sheet '{}' is missing hierarchy columns; expected {:?}, found {:?}",
            sheet.name,
            columns,
            sheet.headers
        )
    })?;

    let mut last: Vec<String> = vec![String::new(); positions.len()];
    let mut seen: HashSet<Vec<String>> = HashSet::new();
    let mut out = Vec::new();

    for row in &sheet.rows {
        let mut values = Vec::with_capacity(positions.len());
        for (slot, &pos) in positions.iter().enumerate() {
            let cell = row.get(pos).map(|c| c.trim()).unwrap_or("");
            if !cell.is_empty() {
                last[slot] = cell.to_string();
            }
            values.push(last[slot].clone());
        }

        if seen.insert(values.clone()) {
            out.push(values);
        }
    }

    Ok(out)
}

fn column_positions(sheet: &RawSheet, columns: &[String]) -> Option<Vec<usize>> {
    columns
        .iter()
        .map(|col| sheet.headers.iter().position(|h| h == col.trim()))
        .collect()
}

/// Spreadsheet file on disk read as hierarchy rows.
#[derive(Debug, Clone)]
pub struct SpreadsheetSource {
    path: PathBuf,
    columns: Vec<String>,
}

impl SpreadsheetSource {
    pub fn new(path: impl Into<PathBuf>, columns: Vec<String>) -> Self {
        Self {
            path: path.into(),
            columns,
        }
    }
}

impl RowSource for SpreadsheetSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn read_rows(&self) -> Result<Vec<Vec<String>>, SourceError> {
        if !self.path.is_file() {
            return Err(SourceError::Missing(self.path.clone()));
        }

        let data = std::fs::read(&self.path).map_err(|source| SourceError::Io {
            path: self.path.clone(),
            source,
        })?;

        let format_err = |e: anyhow::Error| SourceError::Format {
            path: self.path.clone(),
            reason: format!("{:#}", e),
        };

        let filename = self.path.to_string_lossy();
        let sheets = parse_file(&filename, &data).map_err(format_err)?;

        let sheet = sheets
            .iter()
            .find(|s| column_positions(s, &self.columns).is_some())
            .or_else(|| sheets.first())
            .ok_or_else(|| format_err(anyhow::anyhow!("No sheets found")))?;
        tracing::debug!("Reading hierarchy from sheet '{}'", sheet.name);

        normalize_rows(sheet, &self.columns).map_err(format_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn default_columns() -> Vec<String> {
        ["Entity", "Branch", "Department", "Unit", "Position"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn sheet(headers: &[&str], rows: &[&[&str]]) -> RawSheet {
        RawSheet {
            name: "test".to_string(),
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn test_parse_csv_basic() {
        let csv_data = b"Entity,Branch,Department,Unit,Position\nACME,North,Sales,Team1,Rep\n";
        let sheets = parse_file("orgs.csv", csv_data).unwrap();
        assert_eq!(sheets.len(), 1);
        assert_eq!(sheets[0].name, "orgs");
        assert_eq!(sheets[0].headers, default_columns());
        assert_eq!(sheets[0].rows[0], vec!["ACME", "North", "Sales", "Team1", "Rep"]);
    }

    #[test]
    fn test_parse_csv_flexible_and_skips_empty() {
        let csv_data = b"a,b,c\n1,2,3\n,,\n4,5\n";
        let sheets = parse_file("dir/flex.csv", csv_data).unwrap();
        assert_eq!(sheets[0].name, "flex");
        assert_eq!(sheets[0].rows.len(), 2);
        assert_eq!(sheets[0].rows[1], vec!["4", "5"]);
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(parse_file("orgs.txt", b"data").is_err());
    }

    #[test]
    fn test_invalid_workbook_is_error() {
        assert!(parse_file("orgs.xlsx", b"definitely not a zip").is_err());
    }

    #[test]
    fn test_normalize_forward_fills_blanks() {
        let s = sheet(
            &["Entity", "Branch", "Department", "Unit", "Position"],
            &[
                &["ACME", "North", "Sales", "Team1", "Rep"],
                &["", "", "", "Team2", "Rep"],
                &["", "South", "", "", "Manager"],
            ],
        );
        let rows = normalize_rows(&s, &default_columns()).unwrap();
        assert_eq!(
            rows,
            vec![
                vec!["ACME", "North", "Sales", "Team1", "Rep"],
                vec!["ACME", "North", "Sales", "Team2", "Rep"],
                vec!["ACME", "South", "Sales", "Team2", "Manager"],
            ]
        );
    }

    #[test]
    fn test_normalize_leading_blank_stays_blank() {
        let s = sheet(
            &["Entity", "Branch", "Department", "Unit", "Position"],
            &[&["ACME", "North", "", "Team1", "Rep"]],
        );
        let rows = normalize_rows(&s, &default_columns()).unwrap();
        assert_eq!(rows[0][2], "");
    }

    #[test]
    fn test_normalize_drops_exact_duplicates() {
        let s = sheet(
            &["Entity", "Branch", "Department", "Unit", "Position"],
            &[
                &["ACME", "North", "Sales", "Team1", "Rep"],
                &["ACME", "North", "Sales", "Team2", "Rep"],
                &["ACME", "North", "Sales", "Team1", "Rep"],
                // becomes a duplicate of row 2 after forward-fill
                &["", "", "", "Team2", ""],
            ],
        );
        let rows = normalize_rows(&s, &default_columns()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][3], "Team2");
    }

    #[test]
    fn test_normalize_selects_columns_by_header() {
        let s = sheet(
            &["Id", "Position", "Unit", "Department", "Branch", "Entity"],
            &[&["1", "Rep", "Team1", "Sales", "North", "ACME"]],
        );
        let rows = normalize_rows(&s, &default_columns()).unwrap();
        assert_eq!(rows[0], vec!["ACME", "North", "Sales", "Team1", "Rep"]);
    }

    #[test]
    fn test_normalize_short_row_reads_blank() {
        let s = sheet(
            &["Entity", "Branch", "Department", "Unit", "Position"],
            &[&["ACME", "North"]],
        );
        let rows = normalize_rows(&s, &default_columns()).unwrap();
        assert_eq!(rows[0], vec!["ACME", "North", "", "", ""]);
    }

    #[test]
    fn test_normalize_missing_column() {
        let s = sheet(&["Entity", "Branch"], &[&["ACME", "North"]]);
        assert!(normalize_rows(&s, &default_columns()).is_err());
    }

    #[test]
    fn test_spreadsheet_source_reads_csv() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "Entity,Branch,Department,Unit,Position").unwrap();
        writeln!(file, "ACME,North,Sales,Team1,Rep").unwrap();
        writeln!(file, ",,,Team2,").unwrap();
        file.flush().unwrap();

        let source = SpreadsheetSource::new(file.path(), default_columns());
        let rows = source.read_rows().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec!["ACME", "North", "Sales", "Team2", "Rep"]);
    }

    #[test]
    fn test_spreadsheet_source_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = SpreadsheetSource::new(dir.path().join("absent.xlsx"), default_columns());
        assert!(matches!(source.read_rows(), Err(SourceError::Missing(_))));
    }

    #[test]
    fn test_spreadsheet_source_wrong_headers() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "a,b,c").unwrap();
        writeln!(file, "1,2,3").unwrap();
        file.flush().unwrap();

        let source = SpreadsheetSource::new(file.path(), default_columns());
        assert!(matches!(source.read_rows(), Err(SourceError::Format { .. })));
    }
}
