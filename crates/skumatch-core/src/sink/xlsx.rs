use std::collections::BTreeMap;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::ooxml::{place_images, Package, SheetImage};
use super::target::WriteTarget;
use super::POINTS_PER_PIXEL;
use crate::binder::ImageSink;
use crate::error::SkumatchError;
use crate::model::{cell_ref, NormalizedImage, RowRef};

/// Picture names carry this prefix so a rerun finds and replaces them.
const PICTURE_PREFIX: &str = "skumatch";

#[derive(Debug, Clone)]
struct PendingImage {
    png: Vec<u8>,
    width: u32,
    height: u32,
}

/// Embeds images as pictures anchored in the cells of an `.xlsx` or `.xlsm`
/// workbook, growing each image row to fit.
///
/// The source workbook is read in `prepare` and the target is written once,
/// in `finish`. A run that fails before then leaves no file behind.
#[derive(Debug)]
pub struct WorkbookSink {
    target: WriteTarget,
    package: Option<Package>,
    /// Sheet name to worksheet part.
    sheets: BTreeMap<String, String>,
    /// Per sheet, images keyed by zero-based (row, column).
    pending: BTreeMap<String, BTreeMap<(u32, u32), PendingImage>>,
}

impl WorkbookSink {
    pub fn new(target: WriteTarget) -> Self {
        WorkbookSink {
            target,
            package: None,
            sheets: BTreeMap::new(),
            pending: BTreeMap::new(),
        }
    }

    pub fn target(&self) -> &WriteTarget {
        &self.target
    }

    /// Number of pictures waiting for `finish`.
    pub fn pending(&self) -> usize {
        self.pending.values().map(BTreeMap::len).sum()
    }

    fn write(&self, package: &Package) -> Result<(), SkumatchError> {
        let dest = self.target.path();
        let dir = dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        package.write_to(tmp.as_file_mut())?;
        tmp.persist(dest).map_err(|e| match e.error.kind() {
            std::io::ErrorKind::PermissionDenied => SkumatchError::TargetLocked {
                path: dest.to_path_buf(),
            },
            _ => SkumatchError::Io(e.error),
        })?;
        Ok(())
    }
}

fn is_ooxml_workbook(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy();
            ext.eq_ignore_ascii_case("xlsx") || ext.eq_ignore_ascii_case("xlsm")
        })
        .unwrap_or(false)
}

impl ImageSink for WorkbookSink {
    fn prepare(&mut self) -> Result<(), SkumatchError> {
        self.target.check_writable()?;
        let source = self.target.source();
        if !is_ooxml_workbook(source) {
            return Err(SkumatchError::Workbook(format!(
                "{}: pictures can only be embedded in .xlsx or .xlsm workbooks, write them to a directory instead",
                source.display()
            )));
        }
        let package = Package::read(source)?;
        self.sheets = package.sheet_parts()?;
        debug!(
            source = %source.display(),
            sheets = self.sheets.len(),
            "workbook loaded"
        );
        self.package = Some(package);
        Ok(())
    }

    fn insert_image(
        &mut self,
        row: &RowRef,
        image: &NormalizedImage,
        width: u32,
        height: u32,
    ) -> Result<(), SkumatchError> {
        if !self.sheets.contains_key(&row.sheet) {
            return Err(SkumatchError::Insert {
                sheet: row.sheet.clone(),
                row: row.row + 1,
                reason: "sheet not found in workbook".into(),
            });
        }
        let column = row.image_column.unwrap_or(row.column);
        self.pending.entry(row.sheet.clone()).or_default().insert(
            (row.row, column),
            PendingImage {
                png: image.png.clone(),
                width,
                height,
            },
        );
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SkumatchError> {
        let Some(mut package) = self.package.take() else {
            return Ok(());
        };
        if self.pending.is_empty() && matches!(self.target, WriteTarget::Overwrite(_)) {
            info!(path = %self.target.path().display(), "no images to place");
            return Ok(());
        }

        for (sheet, images) in &self.pending {
            let part = self.sheets.get(sheet).ok_or_else(|| {
                SkumatchError::Workbook(format!("sheet '{sheet}' has no worksheet part"))
            })?;
            let placed: Vec<SheetImage<'_>> = images
                .iter()
                .map(|(&(row, column), image)| SheetImage {
                    row,
                    column,
                    png: &image.png,
                    width: image.width,
                    height: image.height,
                    row_height_pt: image.height as f32 * POINTS_PER_PIXEL,
                    name: format!("{PICTURE_PREFIX} {}", cell_ref(row, column)),
                })
                .collect();
            place_images(&mut package, part, &placed)?;
            debug!(sheet = %sheet, pictures = placed.len(), "sheet updated");
        }

        self.write(&package)?;
        info!(
            path = %self.target.path().display(),
            pictures = self.pending(),
            "workbook written"
        );
        Ok(())
    }
}
