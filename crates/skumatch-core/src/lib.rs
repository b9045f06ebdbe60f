pub mod binder;
pub mod compare;
pub mod config;
pub mod error;
pub mod imaging;
pub mod matcher;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod recognize;
pub mod report;
pub mod scan;
pub mod sink;
pub mod spreadsheet;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use binder::{ImageSink, RowSource};
use config::MatchConfig;
use error::SkumatchError;
use model::{PositionedImage, PositionedText, RecognizedCode};
use pipeline::{BindTarget, CancelToken};
use recognize::CodeRecognizer;
use report::{RunError, RunReport};
use scan::DocumentScanner;

/// Main API entry point: pair every code in a PDF with its nearest image.
///
/// Nothing is written. Config errors fail up front; everything later is
/// reported in the returned `RunReport`.
pub fn match_pdf(
    pdf_bytes: &[u8],
    scanner: &dyn DocumentScanner,
    config: &MatchConfig,
    cancel: &CancelToken,
) -> Result<RunReport, SkumatchError> {
    let compiled = config.compile()?;
    Ok(pipeline::run(pdf_bytes, scanner, &compiled, None, cancel))
}

/// Match a PDF and write each bound image into every spreadsheet row that
/// carries its code.
pub fn fill_rows(
    pdf_bytes: &[u8],
    scanner: &dyn DocumentScanner,
    config: &MatchConfig,
    rows: &dyn RowSource,
    sink: &mut dyn ImageSink,
    cancel: &CancelToken,
) -> Result<RunReport, SkumatchError> {
    let compiled = config.compile()?;
    let target = BindTarget { rows, sink };
    Ok(pipeline::run(pdf_bytes, scanner, &compiled, Some(target), cancel))
}

/// What recognition sees on one page, before matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageScan {
    pub page: u32,
    pub codes: Vec<RecognizedCode>,
    /// Greyed runs, which never yield codes.
    pub greyed: Vec<PositionedText>,
    pub images: Vec<PositionedImage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanSummary {
    pub pages: Vec<PageScan>,
    pub errors: Vec<RunError>,
}

impl ScanSummary {
    /// Keys of every code that could receive an image.
    pub fn keys(&self) -> BTreeSet<String> {
        self.pages
            .iter()
            .flat_map(|p| &p.codes)
            .filter(|c| !c.is_dependent)
            .map(|c| c.normalized_key.clone())
            .collect()
    }
}

/// Recognize codes on every page without matching or decoding images.
pub fn scan_codes(
    pdf_bytes: &[u8],
    scanner: &dyn DocumentScanner,
    config: &MatchConfig,
) -> Result<ScanSummary, SkumatchError> {
    let recognizer = CodeRecognizer::new(&config.compile()?);
    let doc = scanner.open(pdf_bytes)?;

    let mut summary = ScanSummary::default();
    for page in doc.pages() {
        match page {
            Ok(page) => summary.pages.push(PageScan {
                page: page.page,
                codes: recognizer.recognize(&page.texts),
                greyed: page.texts.into_iter().filter(|t| t.style.is_greyed).collect(),
                images: page.images,
            }),
            Err(err) => {
                warn!(error = %err, "skipping page");
                summary.errors.push(RunError::from(&err));
            }
        }
    }
    Ok(summary)
}
