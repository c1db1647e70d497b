//! Engine configuration (tunables, template prompts, families, extra profiles) from TOML.
//!
//! Every field has a default, so an empty file is a valid config. See
//! `EngineConfig::validate` for accepted ranges.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::{ExamProfile, TargetDistribution};
use crate::error::{EngineError, Result};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct EngineConfig {
  #[serde(default)] pub selector: SelectorTuning,
  #[serde(default)] pub validator: ValidatorConfig,
  #[serde(default)] pub cache: CacheConfig,
  #[serde(default)] pub sessions: SessionConfig,
  #[serde(default)] pub distribution: DistributionConfig,
  #[serde(default)] pub prompts: Prompts,
  /// Extra inheritance rules, consulted after the built-in table.
  #[serde(default)] pub families: Vec<FamilyRule>,
  /// Extra exam profiles, added to (or replacing) the built-in ones.
  #[serde(default)] pub profiles: Vec<ExamProfile>,
}

/// Bonus added to scenario/case_study deficits for synthesis-level or
/// advanced objectives. Needs product-level calibration.
pub const DEFAULT_RICH_STYLE_BIAS: f64 = 0.05;

#[derive(Clone, Debug, Deserialize)]
pub struct SelectorTuning {
  #[serde(default = "default_rich_style_bias")] pub rich_style_bias: f64,
}

fn default_rich_style_bias() -> f64 { DEFAULT_RICH_STYLE_BIAS }

impl Default for SelectorTuning {
  fn default() -> Self {
    Self { rich_style_bias: DEFAULT_RICH_STYLE_BIAS }
  }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ValidatorConfig {
  #[serde(default = "default_min_quality_score")] pub min_quality_score: u8,
  #[serde(default = "default_high_penalty")] pub high_penalty: u8,
  #[serde(default = "default_medium_penalty")] pub medium_penalty: u8,
  #[serde(default = "default_low_penalty")] pub low_penalty: u8,
}

fn default_min_quality_score() -> u8 { 70 }
fn default_high_penalty() -> u8 { 25 }
fn default_medium_penalty() -> u8 { 10 }
fn default_low_penalty() -> u8 { 5 }

impl Default for ValidatorConfig {
  fn default() -> Self {
    Self {
      min_quality_score: default_min_quality_score(),
      high_penalty: default_high_penalty(),
      medium_penalty: default_medium_penalty(),
      low_penalty: default_low_penalty(),
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
pub struct CacheConfig {
  #[serde(default = "default_ttl_secs")] pub ttl_secs: u64,
}

fn default_ttl_secs() -> u64 { 3600 }

impl Default for CacheConfig {
  fn default() -> Self {
    Self { ttl_secs: default_ttl_secs() }
  }
}

impl CacheConfig {
  pub fn ttl(&self) -> Duration {
    Duration::from_secs(self.ttl_secs)
  }
}

#[derive(Clone, Debug, Deserialize)]
pub struct SessionConfig {
  #[serde(default = "default_idle_timeout_secs")] pub idle_timeout_secs: u64,
}

fn default_idle_timeout_secs() -> u64 { 7200 }

impl Default for SessionConfig {
  fn default() -> Self {
    Self { idle_timeout_secs: default_idle_timeout_secs() }
  }
}

impl SessionConfig {
  pub fn idle_timeout(&self) -> Duration {
    Duration::from_secs(self.idle_timeout_secs)
  }
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct DistributionConfig {
  /// Global fallback when neither objective nor exam override the mix.
  #[serde(default)] pub default: TargetDistribution,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct FamilyRule {
  pub prefix: String,
  pub family: String,
}

/// Prompts used by the OpenAI template generator.
#[derive(Clone, Debug, Deserialize)]
pub struct Prompts {
  pub template_system: String,
  pub template_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      template_system: "You write reusable prompt skeletons for certification exam question generators. The skeleton is shared by every exam in a family, so write the literal placeholders {exam_name}, {topic} and {option_count} where the exam name, focus topic and option count belong. Output ONLY the skeleton text.".into(),
      template_user_template: "Exam family: {family}\nObjective: {objective_title} ({cognitive_level}, {difficulty})\nKey topics: {key_topics}\nTerminology: {terminology}\nStyle: {style}. {style_guidance}\nWrite a prompt skeleton that asks for ONE multiple-choice question in this style.".into(),
    }
  }
}

impl EngineConfig {
  /// Loads and validates the config at `path`.
  ///
  /// # Errors
  ///
  /// `Io` if the file cannot be read, `ConfigParse` on bad TOML and
  /// `ConfigValidation` on out-of-range values.
  pub fn load_from_file(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)?;
    let cfg: Self = toml::from_str(&contents).map_err(|e| EngineError::config_parse(path, e.to_string()))?;
    cfg.validate()?;
    Ok(cfg)
  }

  pub fn validate(&self) -> Result<()> {
    let bias = self.selector.rich_style_bias;
    if !(0.0..=1.0).contains(&bias) {
      return Err(EngineError::config_validation(
        format!("selector.rich_style_bias must be within [0, 1] (got {bias})"),
        "Use a small value such as 0.05",
      ));
    }
    let v = &self.validator;
    for (name, value) in [
      ("min_quality_score", v.min_quality_score),
      ("high_penalty", v.high_penalty),
      ("medium_penalty", v.medium_penalty),
      ("low_penalty", v.low_penalty),
    ] {
      if value > 100 {
        return Err(EngineError::config_validation(
          format!("validator.{name} must be at most 100 (got {value})"),
          "Scores and penalties are on a 0-100 scale",
        ));
      }
    }
    if self.cache.ttl_secs == 0 {
      return Err(EngineError::config_validation("cache.ttl_secs must be greater than 0", "Set cache.ttl_secs, e.g. 3600"));
    }
    if self.sessions.idle_timeout_secs == 0 {
      return Err(EngineError::config_validation(
        "sessions.idle_timeout_secs must be greater than 0",
        "Set sessions.idle_timeout_secs, e.g. 7200",
      ));
    }
    self.distribution.default.validate().map_err(|e| {
      EngineError::config_validation(format!("distribution.default: {e}"), "Make direct + scenario + case_study sum to 1.0")
    })?;
    if let Some(rule) = self.families.iter().find(|r| r.prefix.is_empty() || r.family.is_empty()) {
      return Err(EngineError::config_validation(
        format!("family rule {:?} has an empty prefix or family", rule),
        "Every [[families]] entry needs a non-empty prefix and family",
      ));
    }
    Ok(())
  }
}

/// Load `EngineConfig` from ENGINE_CONFIG_PATH. Unset means defaults; on any
/// read/parse/validation error the error is logged and defaults are used.
pub fn load_engine_config_from_env() -> EngineConfig {
  let Ok(path) = std::env::var("ENGINE_CONFIG_PATH") else {
    return EngineConfig::default();
  };
  match EngineConfig::load_from_file(Path::new(&path)) {
    Ok(cfg) => {
      info!(target: "style_engine", %path, profiles = cfg.profiles.len(), families = cfg.families.len(), "Loaded engine config (TOML)");
      cfg
    }
    Err(e) => {
      error!(target: "style_engine", %path, error = %e, "Failed to load engine config; using defaults");
      EngineConfig::default()
    }
  }
}
