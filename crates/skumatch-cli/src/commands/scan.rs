use skumatch_core::error::SkumatchError;
use std::path::PathBuf;

use super::{effective_config, scanner_for};
use crate::output;
use crate::MatchArgs;

pub fn run(pdf_file: PathBuf, args: &MatchArgs, output_format: &str) -> Result<(), SkumatchError> {
    let config = effective_config(args)?;
    let pdf_bytes = std::fs::read(&pdf_file)?;
    let summary = skumatch_core::scan_codes(&pdf_bytes, &scanner_for(&config), &config)?;

    match output_format {
        "json" => output::json::print(&summary)?,
        _ => print!("{}", output::table::format_scan(&summary)),
    }
    Ok(())
}
