//! CSV to XLSX conversion

use rust_xlsxwriter::{Format, Workbook};
use std::fs::OpenOptions;
use std::path::Path;
use tracing::debug;

use crate::export::CSV_DELIMITER;
use crate::export::error::{ExportError, is_locked};

/// Converts a finished CSV report into a spreadsheet.
///
/// Implementations run on the blocking pool and must report a locked target
/// as `ExportError::Busy`.
pub trait SpreadsheetConverter: Send + Sync {
    fn convert(&self, csv_path: &Path, xlsx_path: &Path) -> Result<(), ExportError>;
}

/// Writes one worksheet with a bold, frozen and filterable header row
#[derive(Debug, Default, Clone, Copy)]
pub struct XlsxConverter;

impl SpreadsheetConverter for XlsxConverter {
    fn convert(&self, csv_path: &Path, xlsx_path: &Path) -> Result<(), ExportError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(CSV_DELIMITER)
            .has_headers(false)
            .flexible(true)
            .from_path(csv_path)?;

        let mut workbook = Workbook::new();
        let header_format = Format::new().set_bold();
        let worksheet = workbook.add_worksheet();

        let mut rows: u32 = 0;
        let mut columns: u16 = 0;
        for record in reader.records() {
            let record = record?;
            for (col, cell) in record.iter().enumerate() {
                let col = col as u16;
                if rows == 0 {
                    worksheet.write_string_with_format(rows, col, cell, &header_format)?;
                } else if let Some(number) = numeric_cell(cell) {
                    worksheet.write_number(rows, col, number)?;
                } else {
                    worksheet.write_string(rows, col, cell)?;
                }
            }
            columns = columns.max(record.len() as u16);
            rows += 1;
        }

        if rows > 0 && columns > 0 {
            worksheet.set_freeze_panes(1, 0)?;
            worksheet.autofilter(0, 0, rows - 1, columns - 1)?;
            worksheet.autofit();
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(xlsx_path)
            .map_err(|e| {
                if is_locked(&e) {
                    ExportError::Busy(xlsx_path.to_path_buf())
                } else {
                    ExportError::Io(e)
                }
            })?;
        workbook.save_to_writer(file)?;

        debug!(path = %xlsx_path.display(), rows, "Spreadsheet written");
        Ok(())
    }
}

/// Parse a cell that should be stored as a number. Text such as zip codes
/// with leading zeros stays text.
fn numeric_cell(cell: &str) -> Option<f64> {
    let first = cell.chars().next()?;
    if !(first.is_ascii_digit() || first == '-') {
        return None;
    }
    let digits = cell.trim_start_matches('-');
    if digits.len() > 1 && digits.starts_with('0') && !digits.starts_with("0.") {
        return None;
    }
    cell.parse::<f64>().ok().filter(|n| n.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_numeric_cell() {
        assert_eq!(numeric_cell("200"), Some(200.0));
        assert_eq!(numeric_cell("-3"), Some(-3.0));
        assert_eq!(numeric_cell("0.5"), Some(0.5));
        assert_eq!(numeric_cell("0"), Some(0.0));
        assert_eq!(numeric_cell(""), None);
        assert_eq!(numeric_cell("007"), None);
        assert_eq!(numeric_cell("inf"), None);
        assert_eq!(numeric_cell("https://x.test/"), None);
        assert_eq!(numeric_cell("1 200"), None);
    }

    #[test]
    fn test_convert_writes_workbook() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("x.test.csv");
        let xlsx_path = dir.path().join("x.test.xlsx");
        fs::write(
            &csv_path,
            "response.url;response.status;result.title\nhttps://x.test/;200;Home\nhttps://x.test/a;404;\n",
        )
        .unwrap();

        XlsxConverter.convert(&csv_path, &xlsx_path).unwrap();

        let bytes = fs::read(&xlsx_path).unwrap();
        assert!(bytes.len() > 100);
        // XLSX files are zip archives
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn test_convert_missing_csv() {
        let dir = tempdir().unwrap();
        let result = XlsxConverter.convert(
            &dir.path().join("missing.csv"),
            &dir.path().join("missing.xlsx"),
        );
        assert!(matches!(result, Err(ExportError::Csv(_))));
    }
}
