use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{debug, info, warn};

use crate::binder::{ImageSink, RowBinder, RowSource};
use crate::config::{CompiledConfig, MatchConfig};
use crate::error::SkumatchError;
use crate::imaging::ImageNormalizer;
use crate::matcher::match_page;
use crate::model::{CodeImageBinding, ScannedPage};
use crate::recognize::CodeRecognizer;
use crate::report::{MatchWarning, RunError, RunReport};
use crate::scan::{DocumentScanner, Pages};

/// Shared flag a caller sets to stop a run at the next page boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Where bindings are written during a run.
pub struct BindTarget<'a> {
    pub rows: &'a dyn RowSource,
    pub sink: &'a mut dyn ImageSink,
}

/// Everything one page produced before binding.
struct PageOutcome {
    page: u32,
    codes: usize,
    bindings: Vec<CodeImageBinding>,
    warnings: Vec<MatchWarning>,
    errors: Vec<RunError>,
}

/// Run the pipeline over a PDF.
///
/// Pages are scanned in order on the calling thread, then recognized, matched
/// and normalized in batches on a worker pool. With a target, bindings are
/// written page by page in document order. Fatal failures come back as a
/// report with `fatal_error` set.
pub fn run(
    pdf_bytes: &[u8],
    scanner: &dyn DocumentScanner,
    config: &CompiledConfig,
    target: Option<BindTarget<'_>>,
    cancel: &CancelToken,
) -> RunReport {
    match run_pages(pdf_bytes, scanner, config, target, cancel) {
        Ok(report) => report,
        Err(err) => {
            warn!(error = %err, "run aborted");
            RunReport::fatal(&err)
        }
    }
}

fn run_pages(
    pdf_bytes: &[u8],
    scanner: &dyn DocumentScanner,
    config: &CompiledConfig,
    mut target: Option<BindTarget<'_>>,
    cancel: &CancelToken,
) -> Result<RunReport, SkumatchError> {
    let doc = scanner.open(pdf_bytes)?;
    let pages_total = doc.page_count();
    info!(backend = scanner.backend_name(), pages = pages_total, "document opened");

    if let Some(target) = target.as_mut() {
        target.sink.prepare()?;
    }

    let workers = config.config.worker_count();
    let pool = ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| SkumatchError::WorkerPool(e.to_string()))?;

    let recognizer = CodeRecognizer::new(config);
    let normalizer = config.config.normalizer();
    let mut binder = RowBinder::new();
    let mut report = RunReport {
        pages_total,
        ..RunReport::default()
    };

    let batch_size = (workers * 2).max(1);
    let mut pages = doc.pages();
    loop {
        let (batch, exhausted) = next_batch(&mut pages, batch_size, cancel, &mut report);

        let outcomes: Vec<PageOutcome> = pool.install(|| {
            batch
                .into_par_iter()
                .map(|page| process_page(page, &recognizer, &normalizer, &config.config))
                .collect()
        });

        for outcome in outcomes {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            debug!(
                page = outcome.page,
                codes = outcome.codes,
                bindings = outcome.bindings.len(),
                "page done"
            );
            report.pages_scanned += 1;
            report.codes_recognized += outcome.codes;
            report.warnings.extend(outcome.warnings);
            report.errors.extend(outcome.errors);

            if let Some(target) = target.as_mut() {
                let bound = binder.bind(&outcome.bindings, target.rows, &mut *target.sink);
                report.placements.extend(bound.placements);
                report.warnings.extend(bound.warnings);
                report.errors.extend(bound.errors);
            }
            report.bindings.extend(outcome.bindings);
        }

        if exhausted || report.cancelled || report.fatal_error.is_some() {
            break;
        }
    }

    if let Some(target) = target.as_mut() {
        if let Err(err) = target.sink.finish() {
            warn!(error = %err, "could not finish writing");
            report.fatal_error = Some(err.to_string());
        }
    }

    info!(
        pages = report.pages_scanned,
        bindings = report.bindings.len(),
        placements = report.placements.len(),
        warnings = report.warnings.len(),
        errors = report.errors.len(),
        cancelled = report.cancelled,
        "run finished"
    );
    Ok(report)
}

/// Scan up to `size` pages. Undecodable pages are recorded and skipped; a
/// fatal scanner error ends the run. Returns whether no pages are left.
fn next_batch(
    pages: &mut Pages<'_>,
    size: usize,
    cancel: &CancelToken,
    report: &mut RunReport,
) -> (Vec<ScannedPage>, bool) {
    let mut batch = Vec::with_capacity(size);
    while batch.len() < size {
        if cancel.is_cancelled() {
            report.cancelled = true;
            return (batch, false);
        }
        match pages.next() {
            Some(Ok(page)) => batch.push(page),
            Some(Err(err)) if err.is_fatal() => {
                warn!(error = %err, "scanner failed");
                report.fatal_error = Some(err.to_string());
                return (batch, true);
            }
            Some(Err(err)) => {
                warn!(error = %err, "skipping page");
                report.errors.push(RunError::from(&err));
            }
            None => return (batch, true),
        }
    }
    (batch, false)
}

fn process_page(
    page: ScannedPage,
    recognizer: &CodeRecognizer,
    normalizer: &ImageNormalizer,
    config: &MatchConfig,
) -> PageOutcome {
    let codes = recognizer.recognize(&page.texts);
    let matched = match_page(&codes, &page.images, config);

    let mut outcome = PageOutcome {
        page: page.page,
        codes: codes.len(),
        bindings: Vec::new(),
        warnings: Vec::new(),
        errors: Vec::new(),
    };

    for code in codes.iter().filter(|c| c.is_dependent) {
        outcome
            .warnings
            .push(MatchWarning::dependent(code.page, &code.raw_text, &code.normalized_key));
    }
    for &idx in &matched.unmatched {
        let code = &codes[idx];
        outcome
            .warnings
            .push(MatchWarning::no_image(code.page, &code.raw_text, &code.normalized_key));
    }

    for assignment in &matched.assignments {
        let code = &codes[assignment.code_index];
        let image = &page.images[assignment.image_index];
        match normalizer.normalize(image, &code.raw_text) {
            Ok(normalized) => outcome.bindings.push(CodeImageBinding {
                normalized_key: code.normalized_key.clone(),
                raw_code: code.raw_text.clone(),
                page: code.page,
                image_id: image.id.clone(),
                image: normalized,
            }),
            Err(err) => {
                warn!(error = %err, "dropping binding");
                outcome.errors.push(RunError::from(&err));
            }
        }
    }

    outcome
}
