use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use calamine::{open_workbook_auto, Reader};
use tracing::{debug, info};

use super::{index_sheet, is_summary_sheet, SheetIndex};
use crate::binder::RowSource;
use crate::error::SkumatchError;
use crate::model::RowRef;

/// Product rows of a workbook, indexed by normalized code.
///
/// Reads `.xlsx`, `.xlsm`, `.xls` and `.ods` files. Summary sheets and
/// sheets without a code header are skipped.
#[derive(Debug, Clone, Default)]
pub struct WorkbookRows {
    sheets: Vec<SheetIndex>,
    by_key: HashMap<String, Vec<RowRef>>,
}

impl WorkbookRows {
    pub fn open(path: &Path) -> Result<Self, SkumatchError> {
        let mut workbook = open_workbook_auto(path).map_err(|e| {
            SkumatchError::Spreadsheet(format!("failed to open {}: {e}", path.display()))
        })?;

        let mut sheets = Vec::new();
        for name in workbook.sheet_names() {
            if is_summary_sheet(&name) {
                debug!(sheet = %name, "skipping summary sheet");
                continue;
            }
            let range = workbook.worksheet_range(&name).map_err(|e| {
                SkumatchError::Spreadsheet(format!("failed to read sheet '{name}': {e}"))
            })?;
            match index_sheet(&name, &range) {
                Some(index) => sheets.push(index),
                None => debug!(sheet = %name, "no code column, skipping sheet"),
            }
        }

        let rows = Self::from_sheets(sheets);
        info!(
            sheets = rows.sheets.len(),
            codes = rows.by_key.len(),
            "workbook indexed"
        );
        Ok(rows)
    }

    pub fn from_sheets(sheets: Vec<SheetIndex>) -> Self {
        let mut by_key: HashMap<String, Vec<RowRef>> = HashMap::new();
        for sheet in &sheets {
            for row in &sheet.rows {
                by_key.entry(row.key.clone()).or_default().push(row.clone());
            }
        }
        WorkbookRows { sheets, by_key }
    }

    pub fn sheets(&self) -> &[SheetIndex] {
        &self.sheets
    }

    /// Every distinct normalized code in the workbook.
    pub fn keys(&self) -> BTreeSet<String> {
        self.by_key.keys().cloned().collect()
    }
}

impl RowSource for WorkbookRows {
    /// Rows on sheets without an image column have nowhere to put an image
    /// and are left out.
    fn lookup_rows(&self, key: &str) -> Vec<RowRef> {
        self.by_key
            .get(key)
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.image_column.is_some())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}
