use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// How the codes found in a PDF line up with those in a spreadsheet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coverage {
    pub matched: Vec<String>,
    /// In the spreadsheet, absent from the PDF.
    pub missing_in_pdf: Vec<String>,
    /// In the PDF, absent from the spreadsheet.
    pub missing_in_sheet: Vec<String>,
}

impl Coverage {
    /// Share of spreadsheet codes that the PDF also carries, 0..=1.
    pub fn sheet_coverage(&self) -> f64 {
        let total = self.matched.len() + self.missing_in_pdf.len();
        if total == 0 {
            return 0.0;
        }
        self.matched.len() as f64 / total as f64
    }
}

pub fn compare_keys(pdf_keys: &BTreeSet<String>, sheet_keys: &BTreeSet<String>) -> Coverage {
    Coverage {
        matched: pdf_keys.intersection(sheet_keys).cloned().collect(),
        missing_in_pdf: sheet_keys.difference(pdf_keys).cloned().collect(),
        missing_in_sheet: pdf_keys.difference(sheet_keys).cloned().collect(),
    }
}
