use std::path::Path;

use skumatch_core::config::load_config;
use skumatch_core::error::SkumatchError;

use super::effective_config;
use crate::MatchArgs;

pub fn show(args: &MatchArgs) -> Result<(), SkumatchError> {
    let config = effective_config(args)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

pub fn validate(file: &Path) -> Result<(), SkumatchError> {
    let config = load_config(file)?;
    // Regexes are only checked when compiled
    config.compile()?;
    println!("Config OK: {}", file.display());
    if config.max_distance.is_none() {
        println!("  max_distance is unset: any image below a code can match it");
    }
    Ok(())
}
