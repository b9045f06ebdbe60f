pub mod xlsx;

pub use xlsx::WorkbookRows;

use calamine::{Data, Range};
use serde::{Deserialize, Serialize};

use crate::model::RowRef;
use crate::normalize::normalize_code;

/// Header texts that mark the code column.
pub const CODE_HEADERS: &[&str] = &["CODE", "SKU", "ITEM CODE", "PRODUCT CODE"];

/// Header texts that mark the column images go in.
pub const IMAGE_HEADERS: &[&str] = &["IMAGE", "PICTURE", "PHOTO", "PRODUCT IMAGE"];

/// Sheets whose name contains one of these hold totals, not products.
pub const SUMMARY_SHEETS: &[&str] = &["SUMMARY", "TOTAL"];

/// How many rows from the top are searched for header cells.
const HEADER_SEARCH_ROWS: usize = 20;

const MIN_SHEET_CODE_LEN: usize = 3;

/// Cell values that sit in a code column without being codes.
const NON_CODES: &[&str] = &["TOTAL", "SUBTOTAL", "GRANDTOTAL"];

/// One product sheet as found in a workbook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetIndex {
    pub name: String,
    /// Zero-based row holding the code header.
    pub header_row: u32,
    pub code_column: u32,
    pub image_column: Option<u32>,
    pub rows: Vec<RowRef>,
}

pub fn is_summary_sheet(name: &str) -> bool {
    let upper = name.to_uppercase();
    SUMMARY_SHEETS.iter().any(|s| upper.contains(s))
}

/// Locate the code (and image) columns of a sheet and collect its code rows.
///
/// Returns `None` when no code header appears in the first rows.
pub fn index_sheet(name: &str, range: &Range<Data>) -> Option<SheetIndex> {
    let (row0, col0) = range.start()?;

    let mut code_header: Option<(u32, u32)> = None;
    let mut image_column: Option<u32> = None;
    for (r, row) in range.rows().take(HEADER_SEARCH_ROWS).enumerate() {
        for (c, cell) in row.iter().enumerate() {
            let Some(text) = cell_text(cell) else {
                continue;
            };
            let (r, c) = (row0 + r as u32, col0 + c as u32);
            if image_column.is_none() && is_header(&text, IMAGE_HEADERS) {
                image_column = Some(c);
            } else if code_header.is_none() && is_header(&text, CODE_HEADERS) {
                code_header = Some((r, c));
            }
        }
    }
    let (header_row, code_column) = code_header?;

    let mut rows = Vec::new();
    for (r, row) in range.rows().enumerate() {
        let r = row0 + r as u32;
        if r <= header_row {
            continue;
        }
        let Some(cell) = row.get((code_column - col0) as usize) else {
            continue;
        };
        let Some(raw) = cell_text(cell) else {
            continue;
        };
        let key = normalize_code(&raw);
        if !is_sheet_code(&key) {
            continue;
        }
        rows.push(RowRef {
            sheet: name.to_string(),
            row: r,
            column: code_column,
            image_column,
            raw_code: raw,
            key,
        });
    }

    Some(SheetIndex {
        name: name.to_string(),
        header_row,
        code_column,
        image_column,
        rows,
    })
}

fn is_header(text: &str, names: &[&str]) -> bool {
    let upper = text.to_uppercase();
    names.iter().any(|name| upper.contains(name))
}

fn is_sheet_code(key: &str) -> bool {
    key.chars().count() >= MIN_SHEET_CODE_LEN && !NON_CODES.contains(&key)
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Data::Float(f) if f.fract() == 0.0 => Some(format!("{}", *f as i64)),
        Data::Float(f) => Some(f.to_string()),
        Data::Int(i) => Some(i.to_string()),
        Data::Empty | Data::Error(_) => None,
        _ => Some(cell.to_string()),
    }
}
