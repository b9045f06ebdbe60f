use std::path::{Path, PathBuf};

use crate::error::SkumatchError;

/// Which workbook a run writes into. Decided once, before any write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteTarget {
    Overwrite(PathBuf),
    Copy { source: PathBuf, dest: PathBuf },
}

impl WriteTarget {
    /// `save_as_new` writes to `<stem>_with_images<ext>` beside the source.
    pub fn resolve(path: &Path, save_as_new: bool) -> Self {
        if !save_as_new {
            return WriteTarget::Overwrite(path.to_path_buf());
        }
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workbook".to_string());
        let name = match path.extension() {
            Some(ext) => format!("{stem}_with_images.{}", ext.to_string_lossy()),
            None => format!("{stem}_with_images"),
        };
        WriteTarget::Copy {
            source: path.to_path_buf(),
            dest: path.with_file_name(name),
        }
    }

    /// The workbook that receives images.
    pub fn path(&self) -> &Path {
        match self {
            WriteTarget::Overwrite(path) => path,
            WriteTarget::Copy { dest, .. } => dest,
        }
    }

    /// The workbook rows are read from.
    pub fn source(&self) -> &Path {
        match self {
            WriteTarget::Overwrite(path) => path,
            WriteTarget::Copy { source, .. } => source,
        }
    }

    /// Fail when the target is open in a spreadsheet application or read-only.
    pub fn check_writable(&self) -> Result<(), SkumatchError> {
        let path = self.path();
        if let Some(lock) = lock_file(path).filter(|l| l.exists()) {
            return Err(SkumatchError::TargetLocked { path: lock });
        }
        let read_only = std::fs::metadata(path)
            .map(|m| m.permissions().readonly())
            .unwrap_or(false);
        if read_only {
            return Err(SkumatchError::TargetLocked {
                path: path.to_path_buf(),
            });
        }
        Ok(())
    }
}

/// The Office owner file (`~$name`) present while a workbook is open.
pub fn lock_file(workbook: &Path) -> Option<PathBuf> {
    let name = workbook.file_name()?.to_string_lossy();
    Some(workbook.with_file_name(format!("~${name}")))
}
