use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SkumatchError {
    #[error("could not read PDF document: {0}")]
    DocumentRead(String),

    #[error("page {page} could not be decoded: {reason}")]
    PageDecode { page: u32, reason: String },

    #[error("image for code '{code}' on page {page} could not be decoded: {reason}")]
    ImageDecode {
        page: u32,
        code: String,
        reason: String,
    },

    #[error("target {path} is locked or not writable. Close it in the spreadsheet application and retry")]
    TargetLocked { path: PathBuf },

    #[error("failed to read spreadsheet: {0}")]
    Spreadsheet(String),

    #[error("failed to load config from {path}: {reason}")]
    ConfigLoad { path: PathBuf, reason: String },

    #[error("invalid config: {0}")]
    ConfigInvalid(String),

    #[error("could not update workbook: {0}")]
    Workbook(String),

    #[error("image insert failed for row {row} of sheet '{sheet}': {reason}")]
    Insert {
        sheet: String,
        row: u32,
        reason: String,
    },

    #[error("could not start worker pool: {0}")]
    WorkerPool(String),

    #[error("run aborted: {0}")]
    Aborted(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
}

impl SkumatchError {
    /// Whether this error aborts the whole run rather than a single page or binding.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            SkumatchError::PageDecode { .. }
                | SkumatchError::ImageDecode { .. }
                | SkumatchError::Insert { .. }
        )
    }
}
