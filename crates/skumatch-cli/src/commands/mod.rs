pub mod compare;
pub mod config;
pub mod fill;
pub mod matching;
pub mod scan;

use skumatch_core::config::{load_config, validate_config, MatchConfig};
use skumatch_core::error::SkumatchError;
use skumatch_core::imaging::FitPolicy;
use skumatch_core::scan::lopdf::LopdfScanner;

use crate::MatchArgs;

/// Config file (or defaults) with command-line overrides applied.
pub fn effective_config(args: &MatchArgs) -> Result<MatchConfig, SkumatchError> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => MatchConfig::default(),
    };
    if let Some(workers) = args.workers {
        config.workers = Some(workers);
    }
    if let Some(width) = args.width {
        config.image_width = width;
    }
    if let Some(height) = args.height {
        config.image_height = height;
    }
    if args.crop {
        config.fit = FitPolicy::Crop;
    }
    validate_config(&config)?;
    Ok(config)
}

pub fn scanner_for(config: &MatchConfig) -> LopdfScanner {
    LopdfScanner::with_grey_rule(config.grey_rule())
}
