use std::collections::HashSet;

use tracing::{debug, warn};

use crate::error::SkumatchError;
use crate::model::{CodeImageBinding, NormalizedImage, RowRef};
use crate::normalize::normalize_code;
use crate::report::{MatchWarning, Placement, RunError};

/// Looks up spreadsheet rows by normalized product code.
pub trait RowSource {
    /// Every row whose code normalizes to `key`. Empty when none does.
    fn lookup_rows(&self, key: &str) -> Vec<RowRef>;

    /// The key a code maps to. Must agree with how PDF codes are keyed.
    fn normalize(&self, code: &str) -> String {
        normalize_code(code)
    }
}

/// Receives images for spreadsheet rows.
pub trait ImageSink {
    /// Called once before any insert. Fails with `TargetLocked` when the
    /// target cannot be written.
    fn prepare(&mut self) -> Result<(), SkumatchError>;

    /// Place `image` at `row`, scaled to `width` x `height` pixels. Inserting
    /// into the same row twice replaces the earlier image.
    fn insert_image(
        &mut self,
        row: &RowRef,
        image: &NormalizedImage,
        width: u32,
        height: u32,
    ) -> Result<(), SkumatchError>;

    /// Called once after the last insert.
    fn finish(&mut self) -> Result<(), SkumatchError> {
        Ok(())
    }
}

/// What one call to [`RowBinder::bind`] produced.
#[derive(Debug, Default)]
pub struct BindOutcome {
    pub placements: Vec<Placement>,
    pub warnings: Vec<MatchWarning>,
    pub errors: Vec<RunError>,
}

/// Writes bound images into every spreadsheet row carrying their code.
///
/// Keys are deduplicated across calls: the first binding for a key wins and
/// later ones for the same key are skipped.
#[derive(Debug, Default)]
pub struct RowBinder {
    seen: HashSet<String>,
}

impl RowBinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(
        &mut self,
        bindings: &[CodeImageBinding],
        rows: &dyn RowSource,
        sink: &mut dyn ImageSink,
    ) -> BindOutcome {
        let mut outcome = BindOutcome::default();

        for binding in bindings {
            if !self.seen.insert(binding.normalized_key.clone()) {
                debug!(key = %binding.normalized_key, page = binding.page, "key already bound");
                continue;
            }

            let targets = rows.lookup_rows(&binding.normalized_key);
            if targets.is_empty() {
                outcome.warnings.push(MatchWarning::no_row(
                    binding.page,
                    &binding.raw_code,
                    &binding.normalized_key,
                ));
                continue;
            }

            for row in &targets {
                let (width, height) = (binding.image.width, binding.image.height);
                match sink.insert_image(row, &binding.image, width, height) {
                    Ok(()) => outcome.placements.push(Placement {
                        key: binding.normalized_key.clone(),
                        raw_code: binding.raw_code.clone(),
                        page: binding.page,
                        sheet: row.sheet.clone(),
                        cell: row.image_cell(),
                    }),
                    Err(err) => {
                        warn!(sheet = %row.sheet, row = row.row, error = %err, "insert failed");
                        outcome.errors.push(RunError::from(&err));
                    }
                }
            }
        }

        outcome
    }
}
