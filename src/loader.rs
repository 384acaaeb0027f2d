use std::collections::HashSet;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use tracing::{debug, info};

use crate::models::{SurveyColumn, SurveyTable};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("survey file not found: {}", path.display())]
    NotFound { path: PathBuf },
    #[error("unsupported survey file format: {}", path.display())]
    UnsupportedFormat { path: PathBuf },
    #[error("unable to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("{} has no header row", path.display())]
    EmptySheet { path: PathBuf },
    #[error("expected column '{column}' is not present in the survey")]
    MissingColumn { column: String },
    #[error("survey has too many columns to export ({0})")]
    TooWide(usize),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("unable to write cleaned workbook: {0}")]
    Xlsx(#[from] XlsxError),
}

/// Turns a free-form question header into a safe SQL identifier.
pub fn normalize_column_name(raw: &str) -> String {
    let cleaned = raw.replace(['\u{feff}', '\u{200b}'], "");
    cleaned
        .trim()
        .chars()
        .filter(|ch| !matches!(ch, '?' | ',' | '(' | ')'))
        .map(|ch| if ch.is_alphanumeric() || ch == '_' { ch } else { '_' })
        .collect()
}

pub fn load_table(path: &Path) -> Result<SurveyTable, LoadError> {
    if !path.exists() {
        return Err(LoadError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let (headers, rows) = match extension.as_str() {
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => read_workbook(path)?,
        "csv" => read_csv(path)?,
        _ => {
            return Err(LoadError::UnsupportedFormat {
                path: path.to_path_buf(),
            })
        }
    };

    let columns = normalize_headers(&headers);
    let width = columns.len();
    let rows: Vec<Vec<Option<String>>> = rows
        .into_iter()
        .filter(|row| row.iter().any(Option::is_some))
        .map(|mut row| {
            row.resize(width, None);
            row
        })
        .collect();

    info!(
        path = %path.display(),
        rows = rows.len(),
        columns = width,
        "loaded survey table"
    );

    Ok(SurveyTable { columns, rows })
}

pub fn require_column(table: &SurveyTable, column: &str) -> Result<usize, LoadError> {
    table.position(column).ok_or_else(|| LoadError::MissingColumn {
        column: column.to_string(),
    })
}

/// Writes the normalized table to a fresh workbook, replacing any previous copy.
pub fn write_cleaned_copy(table: &SurveyTable, path: &Path) -> Result<(), LoadError> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let worksheet = workbook.add_worksheet();

    for (index, column) in table.columns.iter().enumerate() {
        worksheet.write_string_with_format(0, column_number(index)?, &column.name, &bold)?;
    }

    for (row_index, row) in table.rows.iter().enumerate() {
        let row_number = u32::try_from(row_index + 1).map_err(|_| LoadError::TooWide(row_index))?;
        for (index, cell) in row.iter().enumerate() {
            if let Some(value) = cell {
                worksheet.write_string(row_number, column_number(index)?, value)?;
            }
        }
    }

    workbook.save(path)?;
    debug!(path = %path.display(), "wrote cleaned survey copy");
    Ok(())
}

fn column_number(index: usize) -> Result<u16, LoadError> {
    u16::try_from(index).map_err(|_| LoadError::TooWide(index))
}

type RawSheet = (Vec<String>, Vec<Vec<Option<String>>>);

fn read_workbook(path: &Path) -> Result<RawSheet, LoadError> {
    let parse_error = |message: String| LoadError::Parse {
        path: path.to_path_buf(),
        message,
    };

    let mut workbook = open_workbook_auto(path).map_err(|err| parse_error(err.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| LoadError::EmptySheet {
            path: path.to_path_buf(),
        })?
        .map_err(|err| parse_error(err.to_string()))?;

    let mut rows = range.rows();
    let headers = rows
        .next()
        .ok_or_else(|| LoadError::EmptySheet {
            path: path.to_path_buf(),
        })?
        .iter()
        .map(|cell| cell_text(cell).unwrap_or_default())
        .collect();

    let records = rows
        .map(|row| row.iter().map(cell_text).collect())
        .collect();

    Ok((headers, records))
}

fn read_csv(path: &Path) -> Result<RawSheet, LoadError> {
    let parse_error = |err: csv::Error| LoadError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(parse_error)?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(parse_error)?
        .iter()
        .map(str::to_string)
        .collect();

    if headers.iter().all(|header| header.trim().is_empty()) {
        return Err(LoadError::EmptySheet {
            path: path.to_path_buf(),
        });
    }

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record.map_err(parse_error)?;
        records.push(
            record
                .iter()
                .map(|value| (!value.is_empty()).then(|| value.to_string()))
                .collect(),
        );
    }

    Ok((headers, records))
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(value) if value.is_empty() => None,
        Data::String(value) => Some(value.clone()),
        other => Some(other.to_string()),
    }
}

fn normalize_headers(headers: &[String]) -> Vec<SurveyColumn> {
    let mut taken = HashSet::new();

    headers
        .iter()
        .enumerate()
        .map(|(index, original)| {
            let mut base = normalize_column_name(original);
            if base.is_empty() {
                base = format!("column_{}", index + 1);
            }

            // SQLite column names compare case-insensitively.
            let mut name = base.clone();
            let mut suffix = 1;
            while taken.contains(&name.to_lowercase()) {
                suffix += 1;
                name = format!("{base}_{suffix}");
            }
            taken.insert(name.to_lowercase());

            SurveyColumn {
                original: original.clone(),
                name,
            }
        })
        .collect()
}
