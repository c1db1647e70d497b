//! Domain models: exam profiles and objectives, question styles, target ratios,
//! running style counts, and the validation verdict.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Rhetorical shape of a generated question.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStyle {
  /// Single-sentence factual/conceptual probe.
  Direct,
  /// Short narrative framing that requires applied reasoning.
  Scenario,
  /// Multi-paragraph vignette with several data points.
  CaseStudy,
}

impl QuestionStyle {
  /// Every style, in tie-break priority order.
  pub const ALL: [QuestionStyle; 3] = [QuestionStyle::Direct, QuestionStyle::Scenario, QuestionStyle::CaseStudy];

  pub fn as_str(self) -> &'static str {
    match self {
      QuestionStyle::Direct => "direct",
      QuestionStyle::Scenario => "scenario",
      QuestionStyle::CaseStudy => "case_study",
    }
  }

  /// Scenario and case study carry narrative context; direct does not.
  pub fn is_rich(self) -> bool {
    !matches!(self, QuestionStyle::Direct)
  }
}

impl fmt::Display for QuestionStyle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CognitiveLevel {
  Knowledge,
  Application,
  Synthesis,
}

impl CognitiveLevel {
  pub fn as_str(self) -> &'static str {
    match self {
      CognitiveLevel::Knowledge => "knowledge",
      CognitiveLevel::Application => "application",
      CognitiveLevel::Synthesis => "synthesis",
    }
  }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
  Beginner,
  Intermediate,
  Advanced,
}

impl Difficulty {
  pub fn as_str(self) -> &'static str {
    match self {
      Difficulty::Beginner => "beginner",
      Difficulty::Intermediate => "intermediate",
      Difficulty::Advanced => "advanced",
    }
  }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
  MultipleChoice,
  MultipleSelect,
  TrueFalse,
  FreeResponse,
}

impl QuestionType {
  /// Question types answered by picking from an option list.
  pub fn is_choice_based(self) -> bool {
    !matches!(self, QuestionType::FreeResponse)
  }
}

/// Allowed tolerance when checking that ratios sum to 1.0.
pub const RATIO_SUM_TOLERANCE: f64 = 0.01;

/// Target fraction per style. Fractions sum to 1.0 (within tolerance).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetDistribution {
  pub direct: f64,
  pub scenario: f64,
  pub case_study: f64,
}

impl Default for TargetDistribution {
  fn default() -> Self {
    Self { direct: 0.6, scenario: 0.3, case_study: 0.1 }
  }
}

impl TargetDistribution {
  pub fn fraction(&self, style: QuestionStyle) -> f64 {
    match style {
      QuestionStyle::Direct => self.direct,
      QuestionStyle::Scenario => self.scenario,
      QuestionStyle::CaseStudy => self.case_study,
    }
  }

  pub fn sum(&self) -> f64 {
    self.direct + self.scenario + self.case_study
  }

  /// Checks non-negative fractions summing to 1.0.
  pub fn validate(&self) -> Result<(), String> {
    if QuestionStyle::ALL.iter().any(|s| self.fraction(*s) < 0.0 || !self.fraction(*s).is_finite()) {
      return Err(format!("fractions must be finite and non-negative: {:?}", self));
    }
    let sum = self.sum();
    if (sum - 1.0).abs() > RATIO_SUM_TOLERANCE {
      return Err(format!("fractions must sum to 1.0 (got {:.3})", sum));
    }
    Ok(())
  }
}

/// Running per-style counts for one (exam, objective) bucket.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StyleCounts {
  pub direct: u64,
  pub scenario: u64,
  pub case_study: u64,
}

impl StyleCounts {
  pub fn get(&self, style: QuestionStyle) -> u64 {
    match style {
      QuestionStyle::Direct => self.direct,
      QuestionStyle::Scenario => self.scenario,
      QuestionStyle::CaseStudy => self.case_study,
    }
  }

  pub fn increment(&mut self, style: QuestionStyle) {
    match style {
      QuestionStyle::Direct => self.direct += 1,
      QuestionStyle::Scenario => self.scenario += 1,
      QuestionStyle::CaseStudy => self.case_study += 1,
    }
  }

  pub fn total(&self) -> u64 {
    self.direct + self.scenario + self.case_study
  }

  pub fn merge(&mut self, other: &StyleCounts) {
    self.direct += other.direct;
    self.scenario += other.scenario;
    self.case_study += other.case_study;
  }

  /// Observed fractions, or `None` when nothing has been recorded.
  pub fn fractions(&self) -> Option<StyleFractions> {
    let total = self.total();
    if total == 0 {
      return None;
    }
    let t = total as f64;
    Some(StyleFractions {
      direct: self.direct as f64 / t,
      scenario: self.scenario as f64 / t,
      case_study: self.case_study as f64 / t,
    })
  }
}

/// Observed fraction per style.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StyleFractions {
  pub direct: f64,
  pub scenario: f64,
  pub case_study: f64,
}

impl StyleFractions {
  pub fn fraction(&self, style: QuestionStyle) -> f64 {
    match style {
      QuestionStyle::Direct => self.direct,
      QuestionStyle::Scenario => self.scenario,
      QuestionStyle::CaseStudy => self.case_study,
    }
  }
}

/// Objective-level style overrides.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StylePreferences {
  #[serde(default)] pub distribution: Option<TargetDistribution>,
  /// Styles this objective must never receive.
  #[serde(default)] pub forbidden: Vec<QuestionStyle>,
}

fn default_questions_per_session() -> u32 { 10 }

/// One weighted learning-outcome unit within an exam.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExamObjective {
  pub id: String,
  pub title: String,
  #[serde(default)] pub description: String,
  /// Percentage of the exam; weights across an exam sum to 100.
  pub weight: f64,
  pub cognitive_level: CognitiveLevel,
  pub difficulty: Difficulty,
  #[serde(default = "default_questions_per_session")] pub questions_per_session: u32,
  #[serde(default)] pub key_topics: Vec<String>,
  #[serde(default)] pub style_preferences: Option<StylePreferences>,
}

impl ExamObjective {
  pub fn forbids(&self, style: QuestionStyle) -> bool {
    self.style_preferences
      .as_ref()
      .map(|p| p.forbidden.contains(&style))
      .unwrap_or(false)
  }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExamConstraints {
  pub question_count: u32,
  pub time_limit_minutes: u32,
  pub option_count: u32,
  pub passing_score: f64,
}

impl Default for ExamConstraints {
  fn default() -> Self {
    Self { question_count: 50, time_limit_minutes: 90, option_count: 4, passing_score: 70.0 }
  }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExamContext {
  #[serde(default)] pub format: String,
  #[serde(default)] pub difficulty: String,
  #[serde(default)] pub terminology: Vec<String>,
}

fn default_true() -> bool { true }

/// Per-exam validation toggles.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSettings {
  /// Overrides the engine-wide validity threshold for this exam.
  #[serde(default)] pub min_quality_score: Option<u8>,
  #[serde(default = "default_true")] pub check_terminology: bool,
  #[serde(default = "default_true")] pub check_duplicate_options: bool,
}

impl Default for ValidationSettings {
  fn default() -> Self {
    Self { min_quality_score: None, check_terminology: true, check_duplicate_options: true }
  }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionGenerationSettings {
  #[serde(default)] pub style_distribution: Option<TargetDistribution>,
  #[serde(default)] pub validation: ValidationSettings,
}

/// Static description of a certification exam. Immutable for a session.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExamProfile {
  pub id: String,
  pub name: String,
  #[serde(default)] pub provider: String,
  pub objectives: Vec<ExamObjective>,
  #[serde(default)] pub question_types: Vec<QuestionType>,
  #[serde(default)] pub constraints: ExamConstraints,
  #[serde(default)] pub context: ExamContext,
  #[serde(default)] pub question_generation: QuestionGenerationSettings,
}

/// Allowed deviation when checking objective weights sum to 100.
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.5;

impl ExamProfile {
  pub fn objective(&self, objective_id: &str) -> Option<&ExamObjective> {
    self.objectives.iter().find(|o| o.id == objective_id)
  }

  /// True when every allowed question type needs an option list.
  pub fn requires_options(&self) -> bool {
    !self.question_types.is_empty() && self.question_types.iter().all(|t| t.is_choice_based())
  }

  /// Structural checks: weights sum to 100, unique objective ids, valid overrides.
  pub fn validate(&self) -> Result<(), String> {
    if self.objectives.is_empty() {
      return Err("profile has no objectives".into());
    }
    let total: f64 = self.objectives.iter().map(|o| o.weight).sum();
    if (total - 100.0).abs() > WEIGHT_SUM_TOLERANCE {
      return Err(format!("objective weights must sum to 100 (got {:.1})", total));
    }
    for (i, o) in self.objectives.iter().enumerate() {
      if self.objectives[..i].iter().any(|prev| prev.id == o.id) {
        return Err(format!("duplicate objective id '{}'", o.id));
      }
      if let Some(d) = o.style_preferences.as_ref().and_then(|p| p.distribution.as_ref()) {
        d.validate().map_err(|e| format!("objective '{}' distribution: {}", o.id, e))?;
      }
    }
    if let Some(d) = &self.question_generation.style_distribution {
      d.validate().map_err(|e| format!("exam distribution: {}", e))?;
    }
    Ok(())
  }
}

/// A finished question handed to the validator.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
  #[serde(default, alias = "question")] pub text: String,
  /// `None` validates the stem alone; `Some(empty)` is a malformed question
  /// when the exam requires options.
  #[serde(default)] pub options: Option<Vec<String>>,
  #[serde(default)] pub correct_answer: Option<String>,
  #[serde(default)] pub explanation: Option<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
  Low,
  Medium,
  High,
}

/// Machine-readable kind of a validation issue.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
  MissingText,
  MissingOptions,
  NarrativeInDirect,
  MultipleSentences,
  TooManyDataPoints,
  MissingNarrative,
  MultipleActors,
  MissingConcreteDetail,
  DefinitionRecall,
  TooShort,
  TooFewDataPoints,
  SparseTerminology,
  TerminologyAbsent,
  DuplicateOptions,
  OptionCountMismatch,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
  pub code: IssueCode,
  pub severity: Severity,
  pub message: String,
}

/// Outcome of checking a question against the style it was meant to satisfy.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationVerdict {
  pub is_valid: bool,
  /// 0-100.
  pub score: u8,
  pub intended_style: QuestionStyle,
  /// The style the text most resembles.
  pub detected_style: QuestionStyle,
  pub issues: Vec<ValidationIssue>,
  /// One actionable rewrite per issue, in issue order.
  pub suggestions: Vec<String>,
}

impl ValidationVerdict {
  pub fn has_severity(&self, severity: Severity) -> bool {
    self.issues.iter().any(|i| i.severity == severity)
  }
}
