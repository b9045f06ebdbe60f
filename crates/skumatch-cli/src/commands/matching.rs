use skumatch_core::error::SkumatchError;
use skumatch_core::model::CodeImageBinding;
use skumatch_core::pipeline::CancelToken;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::{effective_config, scanner_for};
use crate::output;
use crate::MatchArgs;

pub fn run(
    pdf_file: PathBuf,
    args: &MatchArgs,
    export: Option<PathBuf>,
    output_format: &str,
) -> Result<(), SkumatchError> {
    let config = effective_config(args)?;
    let pdf_bytes = std::fs::read(&pdf_file)?;
    let report = skumatch_core::match_pdf(
        &pdf_bytes,
        &scanner_for(&config),
        &config,
        &CancelToken::new(),
    )?;

    if let Some(fatal) = &report.fatal_error {
        return Err(SkumatchError::Aborted(fatal.clone()));
    }

    if let Some(dir) = export {
        let written = export_images(&report.bindings, &dir)?;
        eprintln!("Exported {written} image(s) to {}", dir.display());
    }

    match output_format {
        "json" => output::json::print(&report)?,
        _ => print!("{}", output::table::format_report(&report)),
    }
    Ok(())
}

/// Write each key's first bound image as `<KEY>.png`.
fn export_images(bindings: &[CodeImageBinding], dir: &Path) -> Result<usize, SkumatchError> {
    std::fs::create_dir_all(dir)?;
    let mut seen = HashSet::new();
    for binding in bindings {
        if !seen.insert(binding.normalized_key.as_str()) {
            continue;
        }
        let path = dir.join(format!("{}.png", binding.normalized_key));
        std::fs::write(path, &binding.image.png)?;
    }
    Ok(seen.len())
}
