use skumatch_core::compare::compare_keys;
use skumatch_core::error::SkumatchError;
use skumatch_core::spreadsheet::WorkbookRows;
use std::path::PathBuf;

use super::{effective_config, scanner_for};
use crate::output;
use crate::MatchArgs;

pub fn run(
    pdf_file: PathBuf,
    workbook: PathBuf,
    args: &MatchArgs,
    output_format: &str,
) -> Result<(), SkumatchError> {
    let config = effective_config(args)?;
    let pdf_bytes = std::fs::read(&pdf_file)?;
    let summary = skumatch_core::scan_codes(&pdf_bytes, &scanner_for(&config), &config)?;
    let rows = WorkbookRows::open(&workbook)?;

    let coverage = compare_keys(&summary.keys(), &rows.keys());
    match output_format {
        "json" => output::json::print(&coverage)?,
        _ => print!("{}", output::table::format_coverage(&coverage)),
    }
    Ok(())
}
