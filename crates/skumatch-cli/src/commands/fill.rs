use skumatch_core::binder::ImageSink;
use skumatch_core::error::SkumatchError;
use skumatch_core::pipeline::CancelToken;
use skumatch_core::sink::{DirectorySink, WorkbookSink, WriteTarget};
use skumatch_core::spreadsheet::WorkbookRows;
use std::path::PathBuf;
use tracing::info;

use super::{effective_config, scanner_for};
use crate::output;
use crate::MatchArgs;

pub fn run(
    pdf_file: PathBuf,
    workbook: PathBuf,
    save_as_new: bool,
    images_dir: Option<PathBuf>,
    args: &MatchArgs,
    output_format: &str,
) -> Result<(), SkumatchError> {
    let config = effective_config(args)?;
    let pdf_bytes = std::fs::read(&pdf_file)?;

    // Nothing is written until the sink finishes, so a run that fails early
    // leaves no copy behind.
    let target = WriteTarget::resolve(&workbook, save_as_new);
    let rows = WorkbookRows::open(target.source())?;

    let (mut sink, written_to): (Box<dyn ImageSink>, PathBuf) = match images_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "writing images to directory");
            (Box::new(DirectorySink::new(&dir, target.source())), dir)
        }
        None => {
            info!(workbook = %target.path().display(), "writing into workbook");
            let path = target.path().to_path_buf();
            (Box::new(WorkbookSink::new(target)), path)
        }
    };

    let report = skumatch_core::fill_rows(
        &pdf_bytes,
        &scanner_for(&config),
        &config,
        &rows,
        sink.as_mut(),
        &CancelToken::new(),
    )?;

    match output_format {
        "json" => output::json::print(&report)?,
        _ => print!("{}", output::table::format_report(&report)),
    }

    if let Some(fatal) = report.fatal_error {
        return Err(SkumatchError::Aborted(fatal));
    }
    eprintln!(
        "Placed {} image(s), written to {}",
        report.placements.len(),
        written_to.display()
    );
    Ok(())
}
