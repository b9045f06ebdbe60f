use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::target::lock_file;
use super::POINTS_PER_PIXEL;
use crate::binder::ImageSink;
use crate::error::SkumatchError;
use crate::model::{NormalizedImage, RowRef};

pub const MANIFEST_FILE: &str = "placements.json";

/// One image anchored to a cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub sheet: String,
    /// One-based, as shown in the spreadsheet.
    pub row: u32,
    pub cell: String,
    pub code: String,
    pub key: String,
    pub file: String,
    pub width: u32,
    pub height: u32,
    pub row_height_pt: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub workbook: PathBuf,
    pub placements: Vec<ManifestEntry>,
}

/// Writes images as PNG files next to a placement manifest that a workbook
/// writer can apply.
///
/// Entries are keyed by sheet and cell, so inserting into a cell again
/// replaces its image and reruns leave the same manifest.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    workbook: PathBuf,
    entries: BTreeMap<(String, String), ManifestEntry>,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>, workbook: impl Into<PathBuf>) -> Self {
        DirectorySink {
            dir: dir.into(),
            workbook: workbook.into(),
            entries: BTreeMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest(&self) -> Manifest {
        Manifest {
            workbook: self.workbook.clone(),
            placements: self.entries.values().cloned().collect(),
        }
    }

    fn load_existing(&mut self) -> Result<(), SkumatchError> {
        let path = self.dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(());
        }
        let manifest: Manifest = serde_json::from_str(&fs::read_to_string(&path)?)?;
        for entry in manifest.placements {
            self.entries
                .insert((entry.sheet.clone(), entry.cell.clone()), entry);
        }
        debug!(entries = self.entries.len(), "loaded existing manifest");
        Ok(())
    }
}

impl ImageSink for DirectorySink {
    fn prepare(&mut self) -> Result<(), SkumatchError> {
        if let Some(lock) = lock_file(&self.workbook).filter(|l| l.exists()) {
            debug!(lock = %lock.display(), "workbook is open elsewhere");
            return Err(SkumatchError::TargetLocked {
                path: self.workbook.clone(),
            });
        }
        let locked = || SkumatchError::TargetLocked {
            path: self.dir.clone(),
        };
        fs::create_dir_all(&self.dir).map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => locked(),
            _ => SkumatchError::Io(e),
        })?;
        if fs::metadata(&self.dir)?.permissions().readonly() {
            return Err(locked());
        }
        self.load_existing()
    }

    fn insert_image(
        &mut self,
        row: &RowRef,
        image: &NormalizedImage,
        width: u32,
        height: u32,
    ) -> Result<(), SkumatchError> {
        let cell = row.image_cell();
        let file = format!("{}_{cell}.png", file_safe(&row.sheet));
        fs::write(self.dir.join(&file), &image.png).map_err(|e| SkumatchError::Insert {
            sheet: row.sheet.clone(),
            row: row.row + 1,
            reason: e.to_string(),
        })?;

        let entry = ManifestEntry {
            sheet: row.sheet.clone(),
            row: row.row + 1,
            cell: cell.clone(),
            code: row.raw_code.clone(),
            key: row.key.clone(),
            file,
            width,
            height,
            row_height_pt: height as f32 * POINTS_PER_PIXEL,
        };
        self.entries.insert((row.sheet.clone(), cell), entry);
        Ok(())
    }

    /// Write the manifest through a temporary file so a crash never leaves a
    /// truncated one behind.
    fn finish(&mut self) -> Result<(), SkumatchError> {
        let json = serde_json::to_string_pretty(&self.manifest())?;
        let path = self.dir.join(MANIFEST_FILE);
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.persist(&path).map_err(|e| SkumatchError::Io(e.error))?;
        info!(path = %path.display(), placements = self.entries.len(), "manifest written");
        Ok(())
    }
}

/// File-name form of a sheet name. A name that had to change carries a hash
/// of the original, so distinct sheets never share a file.
fn file_safe(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if safe == name {
        safe
    } else {
        format!("{safe}-{:08x}", fnv1a(name.as_bytes()))
    }
}

/// 32-bit FNV-1a, stable across runs and platforms.
fn fnv1a(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0x811c_9dc5, |h, b| (h ^ u32::from(*b)).wrapping_mul(0x0100_0193))
}
