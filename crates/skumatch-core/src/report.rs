use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SkumatchError;
use crate::model::CodeImageBinding;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Important,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Code recognized in the PDF, but no image could be paired with it.
    NoImageForCode,
    /// Code bound to an image, but no spreadsheet row carries it.
    NoRowForCode,
    /// Code follows a "must order with" phrase and gets no image of its own.
    DependentCode,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarningKind::NoImageForCode => write!(f, "no image"),
            WarningKind::NoRowForCode => write!(f, "no row"),
            WarningKind::DependentCode => write!(f, "dependent"),
        }
    }
}

/// A non-error condition the caller should show to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchWarning {
    pub kind: WarningKind,
    pub page: u32,
    pub raw_code: String,
    pub key: String,
    pub message: String,
    pub severity: Severity,
}

impl MatchWarning {
    pub fn no_image(page: u32, raw_code: &str, key: &str) -> Self {
        MatchWarning {
            kind: WarningKind::NoImageForCode,
            page,
            raw_code: raw_code.to_string(),
            key: key.to_string(),
            message: format!("code '{raw_code}' on page {page} has no image nearby"),
            severity: Severity::Important,
        }
    }

    pub fn no_row(page: u32, raw_code: &str, key: &str) -> Self {
        MatchWarning {
            kind: WarningKind::NoRowForCode,
            page,
            raw_code: raw_code.to_string(),
            key: key.to_string(),
            message: format!("code '{raw_code}' (page {page}) is in the PDF but not in the spreadsheet"),
            severity: Severity::Important,
        }
    }

    pub fn dependent(page: u32, raw_code: &str, key: &str) -> Self {
        MatchWarning {
            kind: WarningKind::DependentCode,
            page,
            raw_code: raw_code.to_string(),
            key: key.to_string(),
            message: format!("code '{raw_code}' on page {page} is a must-order-with reference"),
            severity: Severity::Info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunErrorKind {
    PageDecode,
    ImageDecode,
    InsertFailed,
    Other,
}

/// A recoverable failure: one page, binding or insert was dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunError {
    pub kind: RunErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_code: Option<String>,
    pub message: String,
}

impl From<&SkumatchError> for RunError {
    fn from(err: &SkumatchError) -> Self {
        let (kind, page, raw_code) = match err {
            SkumatchError::PageDecode { page, .. } => (RunErrorKind::PageDecode, Some(*page), None),
            SkumatchError::ImageDecode { page, code, .. } => {
                (RunErrorKind::ImageDecode, Some(*page), Some(code.clone()))
            }
            SkumatchError::Insert { .. } => (RunErrorKind::InsertFailed, None, None),
            _ => (RunErrorKind::Other, None, None),
        };
        RunError {
            kind,
            page,
            raw_code,
            message: err.to_string(),
        }
    }
}

/// Where an image was written in the spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub key: String,
    pub raw_code: String,
    pub page: u32,
    pub sheet: String,
    pub cell: String,
}

/// Everything a run produced. Fatal failures leave `fatal_error` set and
/// nothing written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub bindings: Vec<CodeImageBinding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub placements: Vec<Placement>,
    pub warnings: Vec<MatchWarning>,
    pub errors: Vec<RunError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal_error: Option<String>,
    pub cancelled: bool,
    pub pages_total: u32,
    pub pages_scanned: u32,
    pub codes_recognized: usize,
}

impl RunReport {
    pub fn fatal(err: &SkumatchError) -> Self {
        RunReport {
            fatal_error: Some(err.to_string()),
            ..RunReport::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.fatal_error.is_none() && !self.cancelled
    }

    pub fn warnings_of(&self, kind: WarningKind) -> impl Iterator<Item = &MatchWarning> {
        self.warnings.iter().filter(move |w| w.kind == kind)
    }
}
