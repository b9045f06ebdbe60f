use crate::error::SkumatchError;
use crate::imaging::{FitPolicy, ImageNormalizer};
use crate::scan::GreyRule;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Shape of a product code: alphanumeric groups joined by hyphens or dashes.
pub const DEFAULT_CODE_PATTERN: &str =
    r"\b[A-Z0-9]{1,12}(?:[-\x{2010}-\x{2013}][A-Z0-9]{1,12}){0,4}\b";

/// Phrases that make the following code a dependency of another line item.
pub const DEFAULT_DEPENDENCY_PATTERN: &str = r"(?i)\b(?:must\s+(?:be\s+)?order(?:ed)?\s+with|order\s+with|requires?|required\s+with|included\s+with|see\s+also)\b";

/// Tunable options for recognition, matching and image output.
///
/// Every field has a default, so a config file only needs the fields it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatchConfig {
    /// Regex a token must match to be a candidate code.
    pub code_pattern: String,
    /// Regex for "must order with" phrasing that precedes a dependent code.
    pub dependency_pattern: String,
    /// Bounds on the normalized code length.
    pub min_code_len: usize,
    pub max_code_len: usize,
    /// Output image size in pixels.
    pub image_width: u32,
    pub image_height: u32,
    pub fit: FitPolicy,
    /// How far (in points) an image center may sit above the code center
    /// and still be eligible.
    pub vertical_tolerance: f32,
    /// Multiplier on the horizontal component of the center distance.
    pub horizontal_weight: f32,
    /// Pairs further apart than this (in points) are never matched.
    pub max_distance: Option<f32>,
    /// Fill luminance (0..1) at or above which low-saturation text is greyed.
    pub grey_threshold: f32,
    /// Fill alpha below which text counts as greyed.
    pub grey_alpha: f32,
    /// Page worker threads. Defaults to the available parallelism.
    pub workers: Option<usize>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            code_pattern: DEFAULT_CODE_PATTERN.to_string(),
            dependency_pattern: DEFAULT_DEPENDENCY_PATTERN.to_string(),
            min_code_len: 3,
            max_code_len: 24,
            image_width: 100,
            image_height: 100,
            fit: FitPolicy::Pad,
            vertical_tolerance: 6.0,
            horizontal_weight: 1.0,
            max_distance: None,
            grey_threshold: 0.55,
            grey_alpha: 0.7,
            workers: None,
        }
    }
}

/// A validated config with its patterns compiled.
#[derive(Debug, Clone)]
pub struct CompiledConfig {
    pub config: MatchConfig,
    pub code_re: Regex,
    pub dependency_re: Regex,
}

impl MatchConfig {
    pub fn compile(&self) -> Result<CompiledConfig, SkumatchError> {
        validate_config(self)?;
        let code_re = compile_pattern("code_pattern", &self.code_pattern)?;
        let dependency_re = compile_pattern("dependency_pattern", &self.dependency_pattern)?;
        Ok(CompiledConfig {
            config: self.clone(),
            code_re,
            dependency_re,
        })
    }
}

impl MatchConfig {
    /// Grey-text detection settings for a scanner.
    pub fn grey_rule(&self) -> GreyRule {
        GreyRule {
            luminance: self.grey_threshold,
            alpha: self.grey_alpha,
            ..GreyRule::default()
        }
    }

    pub fn normalizer(&self) -> ImageNormalizer {
        ImageNormalizer::new(self.image_width, self.image_height, self.fit)
    }

    /// Worker count for page processing, defaulting to the available cores.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

fn compile_pattern(field: &str, pattern: &str) -> Result<Regex, SkumatchError> {
    Regex::new(pattern)
        .map_err(|e| SkumatchError::ConfigInvalid(format!("{field} is not a valid regex: {e}")))
}

/// Load a config from a JSON file.
pub fn load_config(path: &Path) -> Result<MatchConfig, SkumatchError> {
    let content = std::fs::read_to_string(path).map_err(|e| SkumatchError::ConfigLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    parse_config(&content, path)
}

/// Parse a config from a JSON string.
pub fn parse_config(json: &str, source: &Path) -> Result<MatchConfig, SkumatchError> {
    let config: MatchConfig =
        serde_json::from_str(json).map_err(|e| SkumatchError::ConfigLoad {
            path: source.to_path_buf(),
            reason: e.to_string(),
        })?;
    validate_config(&config)?;
    Ok(config)
}

/// Parse a config from a JSON string (no file path context).
pub fn parse_config_str(json: &str) -> Result<MatchConfig, SkumatchError> {
    let config: MatchConfig = serde_json::from_str(json).map_err(SkumatchError::Json)?;
    validate_config(&config)?;
    Ok(config)
}

/// Validate that a config is usable.
pub fn validate_config(config: &MatchConfig) -> Result<(), SkumatchError> {
    if config.code_pattern.trim().is_empty() {
        return Err(SkumatchError::ConfigInvalid(
            "code_pattern must not be empty".into(),
        ));
    }
    if config.dependency_pattern.trim().is_empty() {
        return Err(SkumatchError::ConfigInvalid(
            "dependency_pattern must not be empty".into(),
        ));
    }
    if config.min_code_len == 0 || config.min_code_len > config.max_code_len {
        return Err(SkumatchError::ConfigInvalid(format!(
            "code length bounds {}..={} are invalid",
            config.min_code_len, config.max_code_len
        )));
    }
    if config.image_width == 0 || config.image_height == 0 {
        return Err(SkumatchError::ConfigInvalid(format!(
            "image size {}x{} must be non-zero",
            config.image_width, config.image_height
        )));
    }
    if !config.vertical_tolerance.is_finite() || config.vertical_tolerance < 0.0 {
        return Err(SkumatchError::ConfigInvalid(
            "vertical_tolerance must be a non-negative number".into(),
        ));
    }
    if !config.horizontal_weight.is_finite() || config.horizontal_weight < 0.0 {
        return Err(SkumatchError::ConfigInvalid(
            "horizontal_weight must be a non-negative number".into(),
        ));
    }
    if let Some(max) = config.max_distance {
        if !max.is_finite() || max <= 0.0 {
            return Err(SkumatchError::ConfigInvalid(
                "max_distance must be a positive number".into(),
            ));
        }
    }
    if !(0.0..=1.0).contains(&config.grey_threshold) || !(0.0..=1.0).contains(&config.grey_alpha)
    {
        return Err(SkumatchError::ConfigInvalid(
            "grey_threshold and grey_alpha must be within 0..=1".into(),
        ));
    }
    if config.workers == Some(0) {
        return Err(SkumatchError::ConfigInvalid(
            "workers must be at least 1".into(),
        ));
    }
    Ok(())
}
