//! Public protocol structs for the HTTP endpoints (serde ready).
//! Keep this small and stable to evolve the engine and its callers independently.

use serde::{Deserialize, Serialize};

use crate::domain::{Question, QuestionStyle, StyleCounts, ValidationIssue, ValidationVerdict};
use crate::selector::StyleDecision;
use crate::state::PreparedQuestion;

/// How many suggestions a validation response carries inline.
pub const SUGGESTION_PREVIEW: usize = 3;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthOut {
  pub ok: bool,
  pub exams: usize,
  pub sessions: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIn {
  /// Generated when absent.
  #[serde(default)]
  pub session_id: Option<String>,
  pub exam_id: String,
}
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOut {
  pub session_id: String,
  pub exam_id: String,
  pub created: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextStyleIn {
  pub session_id: String,
  pub exam_id: String,
  pub objective_id: String,
  #[serde(default)]
  pub question_index: Option<usize>,
  /// Also render the family template for the chosen style.
  #[serde(default)]
  pub with_template: bool,
  #[serde(default)]
  pub topic: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateOut {
  pub key: String,
  pub prompt: String,
  pub cache_hit: bool,
  pub generator: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextStyleOut {
  #[serde(flatten)]
  pub decision: StyleDecision,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub template: Option<TemplateOut>,
}

impl From<StyleDecision> for NextStyleOut {
  fn from(decision: StyleDecision) -> Self {
    Self { decision, template: None }
  }
}

impl From<PreparedQuestion> for NextStyleOut {
  fn from(p: PreparedQuestion) -> Self {
    Self {
      decision: p.decision,
      template: Some(TemplateOut { key: p.template_key, prompt: p.prompt, cache_hit: p.cache_hit, generator: p.generator }),
    }
  }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordIn {
  pub session_id: String,
  pub exam_id: String,
  pub objective_id: String,
  pub style: QuestionStyle,
}
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOut {
  pub objective_id: String,
  pub counts: StyleCounts,
  pub total: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountsOut {
  pub session_id: String,
  pub objective_id: String,
  pub counts: StyleCounts,
  pub total: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamQuery {
  #[serde(default)]
  pub exam_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetOut {
  pub session_id: String,
  pub removed: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateIn {
  pub exam_id: String,
  pub objective_id: String,
  pub intended_style: QuestionStyle,
  pub question: Question,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateOut {
  pub is_valid: bool,
  pub score: u8,
  pub intended_style: QuestionStyle,
  pub detected_style: QuestionStyle,
  pub issues: Vec<ValidationIssue>,
  /// First few suggestions; `suggestion_count` has the full number.
  pub suggestions: Vec<String>,
  pub suggestion_count: usize,
}

impl From<ValidationVerdict> for ValidateOut {
  fn from(v: ValidationVerdict) -> Self {
    let suggestion_count = v.suggestions.len();
    Self {
      is_valid: v.is_valid,
      score: v.score,
      intended_style: v.intended_style,
      detected_style: v.detected_style,
      issues: v.issues,
      suggestions: v.suggestions.into_iter().take(SUGGESTION_PREVIEW).collect(),
      suggestion_count,
    }
  }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearOut {
  pub removed: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorOut {
  pub error: String,
  pub message: String,
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{IssueCode, Severity};

  #[test]
  fn test_validate_out_caps_suggestions() {
    let verdict = ValidationVerdict {
      is_valid: false,
      score: 40,
      intended_style: QuestionStyle::Direct,
      detected_style: QuestionStyle::Scenario,
      issues: vec![ValidationIssue { code: IssueCode::NarrativeInDirect, severity: Severity::High, message: "x".into() }],
      suggestions: (0..5).map(|i| format!("s{i}")).collect(),
    };
    let out = ValidateOut::from(verdict);
    assert_eq!(out.suggestions, vec!["s0", "s1", "s2"]);
    assert_eq!(out.suggestion_count, 5);
  }

  #[test]
  fn test_next_style_in_accepts_camel_case() {
    let body = r#"{"sessionId": "s1", "examId": "cfa-level-1", "objectiveId": "fsa", "withTemplate": true}"#;
    let parsed: NextStyleIn = serde_json::from_str(body).unwrap();
    assert_eq!(parsed.objective_id, "fsa");
    assert!(parsed.with_template);
    assert!(parsed.question_index.is_none());
  }

  #[test]
  fn test_validate_in_parses_style_and_question() {
    let body = r#"{"examId": "cfa-level-1", "objectiveId": "fsa", "intendedStyle": "case_study", "question": {"question": "Q?", "options": ["a", "b", "c"]}}"#;
    let parsed: ValidateIn = serde_json::from_str(body).unwrap();
    assert_eq!(parsed.intended_style, QuestionStyle::CaseStudy);
    assert_eq!(parsed.question.text, "Q?");
  }
}
