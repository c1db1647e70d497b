//! Error types for the style engine.
//!
//! Not-found conditions are surfaced to the caller as-is; the engine never
//! substitutes a default exam. Template synthesis failures propagate from the
//! external generator unchanged.

use std::path::PathBuf;

/// A specialized `Result` type for style engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
  /// No exam profile is registered under this id.
  #[error("Exam not found: '{exam_id}'")]
  ExamNotFound { exam_id: String },

  /// The exam exists but has no objective with this id.
  #[error("Objective not found: '{objective_id}' in exam '{exam_id}'")]
  ObjectiveNotFound {
    exam_id: String,
    objective_id: String,
  },

  /// The external template generator failed. Nothing was cached.
  #[error("Template synthesis failed ({generator}): {message}")]
  TemplateSynthesis { generator: String, message: String },

  /// Config file could not be parsed.
  #[error("Invalid TOML in config file '{path}': {message}\n\nSuggestion: Validate the file with a TOML linter")]
  ConfigParse { path: PathBuf, message: String },

  /// Config values are out of range.
  #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
  ConfigValidation { message: String, suggestion: String },

  /// An exam profile violates a structural invariant (weights, ratios).
  #[error("Invalid exam profile '{exam_id}': {message}")]
  InvalidProfile { exam_id: String, message: String },

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
}

impl EngineError {
  #[must_use]
  pub fn exam_not_found(exam_id: impl Into<String>) -> Self {
    Self::ExamNotFound {
      exam_id: exam_id.into(),
    }
  }

  #[must_use]
  pub fn objective_not_found(exam_id: impl Into<String>, objective_id: impl Into<String>) -> Self {
    Self::ObjectiveNotFound {
      exam_id: exam_id.into(),
      objective_id: objective_id.into(),
    }
  }

  #[must_use]
  pub fn synthesis(generator: impl Into<String>, message: impl Into<String>) -> Self {
    Self::TemplateSynthesis {
      generator: generator.into(),
      message: message.into(),
    }
  }

  #[must_use]
  pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
    Self::ConfigParse {
      path: path.into(),
      message: message.into(),
    }
  }

  #[must_use]
  pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
    Self::ConfigValidation {
      message: message.into(),
      suggestion: suggestion.into(),
    }
  }

  #[must_use]
  pub fn invalid_profile(exam_id: impl Into<String>, message: impl Into<String>) -> Self {
    Self::InvalidProfile {
      exam_id: exam_id.into(),
      message: message.into(),
    }
  }

  /// Returns `true` for unknown exam/objective ids.
  #[must_use]
  pub const fn is_not_found(&self) -> bool {
    matches!(
      self,
      Self::ExamNotFound { .. } | Self::ObjectiveNotFound { .. }
    )
  }
}
