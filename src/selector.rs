//! Next-style selection as an ordered pipeline of pure steps:
//!
//! 1. resolve the target mix (objective override, exam override, global default)
//! 2. drop styles the objective forbids and renormalise the remaining targets
//! 3. deficit = target - observed for each remaining style
//! 4. add the rich-style bias for synthesis-level or advanced objectives
//! 5. take the max, ties broken direct > scenario > case_study
//!
//! No randomness: identical inputs always yield the identical style.

use serde::Serialize;

use crate::config::SelectorTuning;
use crate::domain::{
  CognitiveLevel, Difficulty, ExamObjective, ExamProfile, QuestionStyle, StyleCounts,
  TargetDistribution,
};

/// Scores closer than this are treated as tied.
const SCORE_EPSILON: f64 = 1e-9;

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TargetSource {
  Objective,
  Exam,
  Default,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StyleScore {
  pub style: QuestionStyle,
  /// Renormalised target over the allowed styles.
  pub target: f64,
  pub observed: f64,
  pub deficit: f64,
  pub bias: f64,
  pub score: f64,
}

/// Full record of one selection, for diagnostics.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StyleDecision {
  pub style: QuestionStyle,
  pub question_index: usize,
  pub target_source: TargetSource,
  pub target: TargetDistribution,
  pub allowed: Vec<QuestionStyle>,
  pub scores: Vec<StyleScore>,
  /// Every style was forbidden, so the decision fell back to direct.
  pub forced_fallback: bool,
}

#[derive(Clone, Debug, Default)]
pub struct PatternSelector {
  tuning: SelectorTuning,
  default_distribution: TargetDistribution,
}

impl PatternSelector {
  pub fn new(tuning: SelectorTuning, default_distribution: TargetDistribution) -> Self {
    Self { tuning, default_distribution }
  }

  pub fn select_style(
    &self,
    exam: &ExamProfile,
    objective: &ExamObjective,
    current: &StyleCounts,
    question_index: usize,
  ) -> QuestionStyle {
    self.explain_style(exam, objective, current, question_index).style
  }

  pub fn explain_style(
    &self,
    exam: &ExamProfile,
    objective: &ExamObjective,
    current: &StyleCounts,
    question_index: usize,
  ) -> StyleDecision {
    let (target, target_source) = resolve_target(exam, objective, &self.default_distribution);
    let allowed = allowed_styles(objective);
    if allowed.is_empty() {
      return StyleDecision {
        style: QuestionStyle::Direct,
        question_index,
        target_source,
        target,
        allowed,
        scores: Vec::new(),
        forced_fallback: true,
      };
    }

    let bias = style_bias(objective, &self.tuning);
    let scores = score_styles(&target, &allowed, current, bias);
    let style = pick_best(&scores).unwrap_or(QuestionStyle::Direct);

    StyleDecision {
      style,
      question_index,
      target_source,
      target,
      allowed,
      scores,
      forced_fallback: false,
    }
  }
}

/// Objective override, then exam override, then the global default.
pub fn resolve_target(
  exam: &ExamProfile,
  objective: &ExamObjective,
  default: &TargetDistribution,
) -> (TargetDistribution, TargetSource) {
  if let Some(d) = objective.style_preferences.as_ref().and_then(|p| p.distribution) {
    return (d, TargetSource::Objective);
  }
  if let Some(d) = exam.question_generation.style_distribution {
    return (d, TargetSource::Exam);
  }
  (*default, TargetSource::Default)
}

/// Styles not forbidden by the objective, in priority order.
pub fn allowed_styles(objective: &ExamObjective) -> Vec<QuestionStyle> {
  QuestionStyle::ALL
    .into_iter()
    .filter(|s| !objective.forbids(*s))
    .collect()
}

/// Bias applied to rich styles for this objective.
pub fn style_bias(objective: &ExamObjective, tuning: &SelectorTuning) -> f64 {
  let hard = objective.cognitive_level == CognitiveLevel::Synthesis
    || objective.difficulty == Difficulty::Advanced;
  if hard {
    tuning.rich_style_bias
  } else {
    0.0
  }
}

/// Target renormalised over `allowed`; other styles get 0. When every allowed
/// style has a zero target the allowed styles share equally.
pub fn effective_target(target: &TargetDistribution, allowed: &[QuestionStyle]) -> TargetDistribution {
  let allowed_sum: f64 = allowed.iter().map(|s| target.fraction(*s)).sum();
  let share = |style: QuestionStyle| {
    if !allowed.contains(&style) {
      0.0
    } else if allowed_sum > 0.0 {
      target.fraction(style) / allowed_sum
    } else {
      1.0 / allowed.len() as f64
    }
  };
  TargetDistribution {
    direct: share(QuestionStyle::Direct),
    scenario: share(QuestionStyle::Scenario),
    case_study: share(QuestionStyle::CaseStudy),
  }
}

/// Deficit and bias per allowed style. An all-zero `current` counts as no
/// observations, so the deficit equals the target.
pub fn score_styles(
  target: &TargetDistribution,
  allowed: &[QuestionStyle],
  current: &StyleCounts,
  bias: f64,
) -> Vec<StyleScore> {
  let effective = effective_target(target, allowed);
  let total = current.total();

  allowed
    .iter()
    .map(|&style| {
      let target = effective.fraction(style);
      let observed = if total == 0 {
        0.0
      } else {
        current.get(style) as f64 / total as f64
      };
      let deficit = target - observed;
      let bias = if style.is_rich() { bias } else { 0.0 };
      StyleScore {
        style,
        target,
        observed,
        deficit,
        bias,
        score: deficit + bias,
      }
    })
    .collect()
}

/// Highest score wins; earlier entries win ties.
pub fn pick_best(scores: &[StyleScore]) -> Option<QuestionStyle> {
  let mut best: Option<&StyleScore> = None;
  for s in scores {
    match best {
      Some(b) if s.score <= b.score + SCORE_EPSILON => {}
      _ => best = Some(s),
    }
  }
  best.map(|s| s.style)
}
