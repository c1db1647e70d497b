//! Heuristic style validation of finished questions.
//!
//! Pure function of (question, intended style, exam): no model calls, no I/O.
//! Each rule emits at most one issue with a severity and a matching rewrite
//! suggestion; the score is 100 minus the configured per-severity penalties.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, instrument};

use crate::config::ValidatorConfig;
use crate::domain::{
  ExamObjective, ExamProfile, IssueCode, Question, QuestionStyle, Severity, ValidationIssue, ValidationVerdict,
};
use crate::util::trunc_for_log;

/// A case study shorter than this reads like a scenario.
pub const CASE_STUDY_MIN_WORDS: usize = 60;
pub const CASE_STUDY_MIN_SENTENCES: usize = 3;
pub const CASE_STUDY_MIN_DATA_POINTS: usize = 2;
/// Without a number, a scenario this long is assumed to carry contextual detail.
pub const SCENARIO_DETAIL_MIN_WORDS: usize = 25;

// Sentence terminator: punctuation followed by whitespace or end of text, so
// decimals like "1.3" do not split.
static SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+(?:\s+|$)").expect("valid regex"));

// Lowercased, without the final period.
const ABBREVIATIONS: &[&str] = &["e.g", "i.e", "u.s", "u.k", "vs", "etc", "inc", "corp", "ltd", "co", "approx"];

static PARAGRAPH_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").expect("valid regex"));

// "$1,200", "15%", "1.3", "2024".
static DATA_POINT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$?\d[\d,]*(?:\.\d+)?%?").expect("valid regex"));

// "A portfolio manager", "an analyst", "A mid-sized company".
static ACTOR_INTRO: Lazy<Regex> = Lazy::new(|| {
  Regex::new(
    r"(?i)\b(?:a|an)\s+(?:[a-z][a-z-]*\s+){0,2}?(?:portfolio manager|analyst|investor|company|firm|client|manager|developer|engineer|administrator|architect|team|student|customer|organization|organisation|bank|trader|consultant|startup|retailer|hospital|fund|business|advisor|adviser|ceo|cfo|cto|individual|family|couple|retiree|pension plan|insurer|university|agency)\b",
  )
  .expect("valid regex")
});

// "ABC firm", "XYZ Corp".
static NAMED_ORG: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"\b[A-Z]{2,}\s+(?:firm|Firm|corp|Corp|Corporation|company|Company|Inc|bank|Bank|fund|Fund|Ltd|LLC|Capital|Partners|Group)\b")
    .expect("valid regex")
});

// "is analyzing", "plans to", "has been asked to".
static SITUATION: Lazy<Regex> = Lazy::new(|| {
  Regex::new(
    r"(?i)\b(?:is|are|was|were)\s+(?:analyzing|analysing|considering|evaluating|reviewing|planning|deciding|preparing|designing|migrating|building|assessing|comparing)\b|\b(?:wants|plans|needs|has been asked|is asked|decides)\s+to\b",
  )
  .expect("valid regex")
});

static DEFINITION_PROBE: Lazy<Regex> = Lazy::new(|| {
  Regex::new(
    r"(?i)^\s*(?:what\s+(?:is|are|does)\b|define\b|which\s+of\s+the\s+following\s+(?:best\s+)?(?:defines|describes)\b)",
  )
  .expect("valid regex")
});

/// Surface measurements of a question stem.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextFeatures {
  pub words: usize,
  pub sentences: usize,
  pub paragraphs: usize,
  pub data_points: usize,
  /// Distinct introduced actors; a named organisation alone counts as one.
  pub actors: usize,
  pub has_narrative: bool,
  pub is_definition_probe: bool,
}

impl TextFeatures {
  pub fn analyze(text: &str) -> Self {
    let trimmed = text.trim();
    let sentences = count_sentences(trimmed);
    let paragraphs = PARAGRAPH_BREAK.split(trimmed).filter(|p| !p.trim().is_empty()).count();
    // "a firm's ROE" names a concept, not a character.
    let intros = ACTOR_INTRO.find_iter(trimmed).filter(|m| !is_possessive(&trimmed[m.end()..])).count();
    let named = NAMED_ORG.is_match(trimmed);
    let situation = SITUATION.is_match(trimmed);
    let actors = if intros > 0 { intros } else { usize::from(named) };
    Self {
      words: trimmed.split_whitespace().count(),
      sentences,
      paragraphs,
      data_points: DATA_POINT.find_iter(trimmed).count(),
      actors,
      has_narrative: actors > 0 || situation,
      is_definition_probe: DEFINITION_PROBE.is_match(trimmed),
    }
  }

  /// The style the stem most resembles.
  pub fn detected_style(&self) -> QuestionStyle {
    let long_enough = self.words >= CASE_STUDY_MIN_WORDS && self.sentences >= CASE_STUDY_MIN_SENTENCES;
    if long_enough && (self.data_points >= CASE_STUDY_MIN_DATA_POINTS || self.paragraphs >= 2) {
      QuestionStyle::CaseStudy
    } else if self.has_narrative {
      QuestionStyle::Scenario
    } else {
      QuestionStyle::Direct
    }
  }
}

fn is_possessive(rest: &str) -> bool {
  rest.starts_with("'s") || rest.starts_with("’s")
}

/// Splits on terminators, except after a known abbreviation or when the
/// next word starts lowercase ("U.S. GAAP", "e.g. ROE", "approx. three").
fn count_sentences(text: &str) -> usize {
  let mut count = 0;
  let mut start = 0;
  for m in SENTENCE_END.find_iter(text) {
    let last_word = text[start..m.start()]
      .split_whitespace()
      .next_back()
      .unwrap_or("")
      .trim_start_matches(|c: char| !c.is_alphanumeric())
      .to_lowercase();
    let continues_lower = text[m.end()..].chars().next().map_or(false, char::is_lowercase);
    if ABBREVIATIONS.contains(&last_word.as_str()) || continues_lower {
      continue;
    }
    if !text[start..m.start()].trim().is_empty() {
      count += 1;
    }
    start = m.end();
  }
  if !text[start..].trim().is_empty() {
    count += 1;
  }
  count
}

/// Whole-word, case-insensitive containment ("ROE" does not match "heroes").
fn contains_term(haystack_lower: &str, term: &str) -> bool {
  let needle = term.trim().to_lowercase();
  if needle.is_empty() {
    return false;
  }
  let is_word = |c: char| c.is_alphanumeric();
  let mut from = 0;
  while let Some(pos) = haystack_lower[from..].find(&needle) {
    let start = from + pos;
    let end = start + needle.len();
    let before_ok = haystack_lower[..start].chars().next_back().map_or(true, |c| !is_word(c));
    let after_ok = haystack_lower[end..].chars().next().map_or(true, |c| !is_word(c));
    if before_ok && after_ok {
      return true;
    }
    from = start + needle.chars().next().map_or(1, |c| c.len_utf8());
  }
  false
}

fn has_duplicate_options(options: &[String]) -> bool {
  let normalized: Vec<String> = options
    .iter()
    .map(|o| o.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase())
    .collect();
  normalized.iter().enumerate().any(|(i, o)| normalized[..i].contains(o))
}

struct Findings {
  issues: Vec<ValidationIssue>,
  suggestions: Vec<String>,
}

impl Findings {
  fn new() -> Self {
    Self { issues: Vec::new(), suggestions: Vec::new() }
  }

  fn push(&mut self, code: IssueCode, severity: Severity, message: String, suggestion: String) {
    self.issues.push(ValidationIssue { code, severity, message });
    if !self.suggestions.contains(&suggestion) {
      self.suggestions.push(suggestion);
    }
  }
}

#[derive(Clone, Debug, Default)]
pub struct QuestionValidator {
  config: ValidatorConfig,
}

impl QuestionValidator {
  pub fn new(config: ValidatorConfig) -> Self {
    Self { config }
  }

  fn penalty(&self, severity: Severity) -> u32 {
    u32::from(match severity {
      Severity::High => self.config.high_penalty,
      Severity::Medium => self.config.medium_penalty,
      Severity::Low => self.config.low_penalty,
    })
  }

  /// Exam override first, then the engine-wide threshold.
  pub fn threshold_for(&self, exam: &ExamProfile) -> u8 {
    exam.question_generation.validation.min_quality_score.unwrap_or(self.config.min_quality_score)
  }

  #[instrument(level = "debug", target = "validation", skip_all,
    fields(exam_id = %exam.id, objective_id = %objective.id, intended = %intended))]
  pub fn validate_question(
    &self,
    question: &Question,
    intended: QuestionStyle,
    exam: &ExamProfile,
    objective: &ExamObjective,
  ) -> ValidationVerdict {
    let mut findings = Findings::new();

    if question.text.trim().is_empty() {
      findings.push(
        IssueCode::MissingText,
        Severity::High,
        "question text is empty".into(),
        "Provide the question stem before validating.".into(),
      );
      debug!(target: "validation", "Rejected question with empty text.");
      return ValidationVerdict {
        is_valid: false,
        score: 0,
        intended_style: intended,
        detected_style: QuestionStyle::Direct,
        issues: findings.issues,
        suggestions: findings.suggestions,
      };
    }

    let features = TextFeatures::analyze(&question.text);
    let mut malformed = false;
    if let Some(options) = &question.options {
      if exam.requires_options() && options.iter().all(|o| o.trim().is_empty()) {
        malformed = true;
        findings.push(
          IssueCode::MissingOptions,
          Severity::High,
          format!("exam '{}' requires answer options but none were given", exam.id),
          format!("Add {} answer options with exactly one correct answer.", exam.constraints.option_count),
        );
      }
    }

    match intended {
      QuestionStyle::Direct => self.check_direct(&features, &mut findings),
      QuestionStyle::Scenario => self.check_scenario(&features, &mut findings),
      QuestionStyle::CaseStudy => self.check_case_study(&features, question, exam, &mut findings),
    }
    self.check_common(question, exam, &mut findings);

    let penalties: u32 = findings.issues.iter().map(|i| self.penalty(i.severity)).sum();
    let score = if malformed { 0 } else { 100u32.saturating_sub(penalties) as u8 };
    let threshold = self.threshold_for(exam);
    let verdict = ValidationVerdict {
      is_valid: !malformed && score >= threshold,
      score,
      intended_style: intended,
      detected_style: features.detected_style(),
      issues: findings.issues,
      suggestions: findings.suggestions,
    };
    debug!(
      target: "validation",
      score = verdict.score,
      threshold,
      is_valid = verdict.is_valid,
      detected = %verdict.detected_style,
      issues = verdict.issues.len(),
      text = %trunc_for_log(&question.text, 120),
      "Validated question."
    );
    verdict
  }

  fn check_direct(&self, f: &TextFeatures, out: &mut Findings) {
    if f.has_narrative {
      out.push(
        IssueCode::NarrativeInDirect,
        Severity::High,
        "direct question contains narrative framing (actor or situation)".into(),
        "Remove the character or company framing and ask the concept directly.".into(),
      );
    }
    if f.sentences > 1 {
      out.push(
        IssueCode::MultipleSentences,
        Severity::Medium,
        format!("direct question spans {} sentences", f.sentences),
        "Condense the question into a single sentence.".into(),
      );
    }
    if f.data_points > 1 {
      out.push(
        IssueCode::TooManyDataPoints,
        Severity::Medium,
        format!("direct question carries {} data points", f.data_points),
        "Keep at most one figure; a direct question should not require a calculation setup.".into(),
      );
    }
  }

  fn check_scenario(&self, f: &TextFeatures, out: &mut Findings) {
    if !f.has_narrative {
      out.push(
        IssueCode::MissingNarrative,
        Severity::High,
        "scenario question has no actor or situation".into(),
        "Open with a single actor in a concrete situation, e.g. \"An analyst at a mid-sized firm is reviewing...\"".into(),
      );
    }
    if f.actors > 1 {
      out.push(
        IssueCode::MultipleActors,
        Severity::Low,
        format!("scenario introduces {} actors", f.actors),
        "Keep the scenario to one actor.".into(),
      );
    }
    if f.data_points == 0 && f.words < SCENARIO_DETAIL_MIN_WORDS {
      out.push(
        IssueCode::MissingConcreteDetail,
        Severity::Medium,
        "scenario lacks a concrete numeric or contextual detail".into(),
        "Add at least one concrete figure or situational detail the answer depends on.".into(),
      );
    }
    if f.is_definition_probe {
      out.push(
        IssueCode::DefinitionRecall,
        Severity::Medium,
        "scenario asks for a definition rather than applied reasoning".into(),
        "Ask what the actor should conclude or do, not what a term means.".into(),
      );
    }
  }

  fn check_case_study(&self, f: &TextFeatures, question: &Question, exam: &ExamProfile, out: &mut Findings) {
    if f.words < CASE_STUDY_MIN_WORDS || f.sentences < CASE_STUDY_MIN_SENTENCES {
      out.push(
        IssueCode::TooShort,
        Severity::High,
        format!("case study is too short ({} words, {} sentences)", f.words, f.sentences),
        format!(
          "Expand into a vignette of at least {} sentences and {} words, ideally two paragraphs.",
          CASE_STUDY_MIN_SENTENCES, CASE_STUDY_MIN_WORDS
        ),
      );
    }
    if f.data_points < CASE_STUDY_MIN_DATA_POINTS {
      out.push(
        IssueCode::TooFewDataPoints,
        Severity::Medium,
        format!("case study has {} data point(s)", f.data_points),
        "Include several figures that must be combined to answer.".into(),
      );
    }
    if !f.has_narrative {
      out.push(
        IssueCode::MissingNarrative,
        Severity::Medium,
        "case study has no actor or situation".into(),
        "Frame the vignette around a firm, client or team facing a decision.".into(),
      );
    }
    let cfg = &exam.question_generation.validation;
    if cfg.check_terminology && !exam.context.terminology.is_empty() {
      let used = terms_used(question, exam);
      if used == 1 {
        out.push(
          IssueCode::SparseTerminology,
          Severity::Low,
          "case study uses only one exam term".into(),
          format!("Work in more of the exam's vocabulary ({}).", exam.context.terminology.join(", ")),
        );
      }
    }
  }

  fn check_common(&self, question: &Question, exam: &ExamProfile, out: &mut Findings) {
    let cfg = &exam.question_generation.validation;
    if cfg.check_terminology && !exam.context.terminology.is_empty() && terms_used(question, exam) == 0 {
      out.push(
        IssueCode::TerminologyAbsent,
        Severity::Medium,
        format!("none of the {} exam terms appear", exam.context.terminology.len()),
        format!("Use the exam's own terminology, e.g. {}.", exam.context.terminology.iter().take(3).cloned().collect::<Vec<_>>().join(", ")),
      );
    }
    let Some(options) = question.options.as_ref().filter(|o| o.iter().any(|s| !s.trim().is_empty())) else {
      return;
    };
    if cfg.check_duplicate_options && has_duplicate_options(options) {
      out.push(
        IssueCode::DuplicateOptions,
        Severity::High,
        "two or more answer options are identical".into(),
        "Make every answer option distinct.".into(),
      );
    }
    let expected = exam.constraints.option_count as usize;
    if expected > 0 && options.len() != expected {
      out.push(
        IssueCode::OptionCountMismatch,
        Severity::Low,
        format!("{} options given, exam uses {}", options.len(), expected),
        format!("Provide exactly {} answer options.", expected),
      );
    }
  }
}

/// Distinct exam terms found in the stem or options.
fn terms_used(question: &Question, exam: &ExamProfile) -> usize {
  let mut haystack = question.text.to_lowercase();
  if let Some(options) = &question.options {
    for o in options {
      haystack.push('\n');
      haystack.push_str(&o.to_lowercase());
    }
  }
  exam.context.terminology.iter().filter(|t| contains_term(&haystack, t)).count()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::seeds::seed_profiles;

  const ALPHA_SCENARIO: &str = "A portfolio manager at ABC firm is analyzing a stock with a beta of 1.3 and expected return of 15%. If the risk-free rate is 3% and market return is 10%, what is the stock's alpha?";

  const CASE_STUDY: &str = "Northwind Capital is a mid-sized asset manager. An analyst at the firm is reviewing Delta Corp, which reported net income of $120 million on equity of $800 million and total assets of $2,000 million.\n\nDelta plans to add leverage next year, which management expects to raise ROE while keeping ROA near 6%. The analyst must explain the change to the investment committee using DuPont analysis. Which factor most directly drives the expected increase in ROE?";

  fn cfa() -> ExamProfile {
    seed_profiles().into_iter().find(|p| p.id == "cfa-level-1").unwrap()
  }

  fn stem(text: &str) -> Question {
    Question { text: text.into(), ..Default::default() }
  }

  fn check(q: &Question, style: QuestionStyle) -> ValidationVerdict {
    let exam = cfa();
    let objective = exam.objective("fsa").unwrap().clone();
    QuestionValidator::default().validate_question(q, style, &exam, &objective)
  }

  fn codes(v: &ValidationVerdict) -> Vec<IssueCode> {
    v.issues.iter().map(|i| i.code).collect()
  }

  #[test]
  fn test_features_of_alpha_scenario() {
    let f = TextFeatures::analyze(ALPHA_SCENARIO);
    assert_eq!(f.sentences, 2);
    assert_eq!(f.data_points, 4);
    assert_eq!(f.actors, 1);
    assert!(f.has_narrative);
    assert!(!f.is_definition_probe);
    assert_eq!(f.detected_style(), QuestionStyle::Scenario);
  }

  #[test]
  fn test_narrative_rejected_as_direct() {
    let v = check(&stem(ALPHA_SCENARIO), QuestionStyle::Direct);
    assert!(!v.is_valid);
    assert!(v.has_severity(Severity::High));
    assert_eq!(
      codes(&v),
      vec![IssueCode::NarrativeInDirect, IssueCode::MultipleSentences, IssueCode::TooManyDataPoints]
    );
    assert_eq!(v.score, 55);
    assert_eq!(v.detected_style, QuestionStyle::Scenario);
    assert_eq!(v.suggestions.len(), v.issues.len());
  }

  #[test]
  fn test_same_text_passes_as_scenario() {
    let v = check(&stem(ALPHA_SCENARIO), QuestionStyle::Scenario);
    assert!(v.is_valid, "{:?}", v.issues);
    assert_eq!(v.score, 100);
  }

  #[test]
  fn test_definition_passes_as_direct() {
    let v = check(&stem("What is the primary difference between ROE and ROA?"), QuestionStyle::Direct);
    assert!(v.is_valid);
    assert!(v.score >= 70);
    assert_eq!(v.detected_style, QuestionStyle::Direct);
  }

  #[test]
  fn test_definition_as_scenario_is_flagged() {
    let v = check(&stem("What is the primary difference between ROE and ROA?"), QuestionStyle::Scenario);
    assert!(!v.is_valid);
    let c = codes(&v);
    assert!(c.contains(&IssueCode::MissingNarrative));
    assert!(c.contains(&IssueCode::DefinitionRecall));
    assert!(c.contains(&IssueCode::MissingConcreteDetail));
  }

  #[test]
  fn test_case_study_passes() {
    let v = check(&stem(CASE_STUDY), QuestionStyle::CaseStudy);
    assert!(v.is_valid, "{:?}", v.issues);
    assert_eq!(v.detected_style, QuestionStyle::CaseStudy);
  }

  #[test]
  fn test_short_case_study_is_penalized() {
    let v = check(&stem("An analyst sees ROE of 12%. What next?"), QuestionStyle::CaseStudy);
    assert!(!v.is_valid);
    let c = codes(&v);
    assert!(c.contains(&IssueCode::TooShort));
    assert!(c.contains(&IssueCode::TooFewDataPoints));
    assert!(c.contains(&IssueCode::SparseTerminology));
  }

  #[test]
  fn test_missing_terminology() {
    let v = check(&stem("Which statement about probability is correct?"), QuestionStyle::Direct);
    assert_eq!(codes(&v), vec![IssueCode::TerminologyAbsent]);
    assert_eq!(v.score, 90);
    assert!(v.is_valid);
  }

  #[test]
  fn test_empty_text_is_malformed() {
    let v = check(&stem("   "), QuestionStyle::Direct);
    assert!(!v.is_valid);
    assert_eq!(v.score, 0);
    assert_eq!(codes(&v), vec![IssueCode::MissingText]);
  }

  #[test]
  fn test_empty_options_are_malformed() {
    let q = Question { text: "What is ROE?".into(), options: Some(vec![]), ..Default::default() };
    let v = check(&q, QuestionStyle::Direct);
    assert!(!v.is_valid);
    assert_eq!(v.score, 0);
    assert!(codes(&v).contains(&IssueCode::MissingOptions));
  }

  #[test]
  fn test_option_checks() {
    let q = Question {
      text: "What does ROA measure?".into(),
      options: Some(vec!["Profitability of assets".into(), "profitability  of assets".into()]),
      ..Default::default()
    };
    let v = check(&q, QuestionStyle::Direct);
    assert_eq!(codes(&v), vec![IssueCode::DuplicateOptions, IssueCode::OptionCountMismatch]);
    assert_eq!(v.score, 70);
  }

  #[test]
  fn test_exam_threshold_override() {
    let aws = seed_profiles().into_iter().find(|p| p.id.starts_with("aws-")).unwrap();
    let v = QuestionValidator::default();
    assert_eq!(v.threshold_for(&aws), 65);
    assert_eq!(v.threshold_for(&cfa()), 70);
  }

  #[test]
  fn test_possessive_actor_is_not_narrative() {
    for text in [
      "What is a company's cost of equity?",
      "What is a firm's ROE if ROA is unchanged?",
      "Why does a bank’s ROA usually sit below its ROE?",
    ] {
      let v = check(&stem(text), QuestionStyle::Direct);
      assert!(!codes(&v).contains(&IssueCode::NarrativeInDirect), "{}: {:?}", text, v.issues);
      assert!(v.is_valid, "{}: {:?}", text, v.issues);
      assert_eq!(v.detected_style, QuestionStyle::Direct);
    }
    // The article-plus-actor intro still counts when it is not possessive.
    assert_eq!(TextFeatures::analyze("A company's analyst says a company is merging.").actors, 1);
  }

  #[test]
  fn test_abbreviations_do_not_split_sentences() {
    assert_eq!(count_sentences("What is the U.S. GAAP treatment of ROE adjustments?"), 1);
    assert_eq!(count_sentences("Which ratio, e.g. ROE or ROA, measures asset efficiency?"), 1);
    assert_eq!(count_sentences("Revenue rose 3.5% vs. last year. What drove ROE?"), 2);
    assert_eq!(count_sentences(ALPHA_SCENARIO), 2);

    for text in [
      "What is the U.S. GAAP treatment of ROE adjustments?",
      "Which ratio, e.g. ROE or ROA, measures asset efficiency?",
    ] {
      let v = check(&stem(text), QuestionStyle::Direct);
      assert!(codes(&v).is_empty(), "{}: {:?}", text, v.issues);
      assert_eq!(v.score, 100);
    }
  }

  #[test]
  fn test_contains_term_respects_word_boundaries() {
    assert!(contains_term("the firm's roe rose", "ROE"));
    assert!(!contains_term("heroes of finance", "ROE"));
    assert!(contains_term("use dupont analysis here", "DuPont analysis"));
  }
}
