//! Template synthesis seam.
//!
//! `TemplateGenerator` is the external collaborator the cache delegates to on a
//! miss. `LocalTemplateGenerator` is the deterministic built-in used when no
//! model endpoint is configured.
//!
//! Skeletons keep `{exam_name}`, `{topic}` and `{option_count}` placeholders so
//! sibling exams in a family can share them; see `render_template`.

use async_trait::async_trait;

use crate::domain::{ExamObjective, ExamProfile, QuestionStyle};
use crate::error::Result;
use crate::util::fill_template;

/// Everything a generator may use to build a skeleton.
#[derive(Clone, Copy, Debug)]
pub struct TemplateRequest<'a> {
  pub exam: &'a ExamProfile,
  pub family: &'a str,
  pub style: QuestionStyle,
  pub objective: &'a ExamObjective,
}

#[async_trait]
pub trait TemplateGenerator: Send + Sync {
  /// Short name used in logs and errors.
  fn name(&self) -> &'static str;

  async fn synthesize(&self, request: &TemplateRequest<'_>) -> Result<String>;
}

/// What each style should look like, phrased for a question writer.
pub fn style_guidance(style: QuestionStyle) -> &'static str {
  match style {
    QuestionStyle::Direct => {
      "Ask a single-sentence factual or conceptual question. No characters, companies or story framing, and at most one number."
    }
    QuestionStyle::Scenario => {
      "Open with one short situation involving a single actor (for example an analyst or a company), give at least one concrete figure or detail, then ask what they should conclude or do."
    }
    QuestionStyle::CaseStudy => {
      "Write a vignette of several sentences, ideally two paragraphs, with multiple data points and the exam's own terminology, then ask one question that requires combining them."
    }
  }
}

const LOCAL_SKELETON: &str = "[{family}/{style}] {exam_name}: {objective_title}\n\
Cognitive level: {cognitive_level}. Difficulty: {difficulty}.\n\
Focus topic: {topic} (drawn from: {key_topics}).\n\
Style: {guidance}\n\
Prefer this terminology where it fits: {terminology}.\n\
Provide exactly {option_count} answer options with one correct answer and a short explanation.";

#[derive(Clone, Debug, Default)]
pub struct LocalTemplateGenerator;

#[async_trait]
impl TemplateGenerator for LocalTemplateGenerator {
  fn name(&self) -> &'static str {
    "local"
  }

  async fn synthesize(&self, request: &TemplateRequest<'_>) -> Result<String> {
    let objective = request.objective;
    let key_topics = if objective.key_topics.is_empty() {
      objective.title.clone()
    } else {
      objective.key_topics.join(", ")
    };
    let terminology = if request.exam.context.terminology.is_empty() {
      "the standard vocabulary of the field".to_string()
    } else {
      request.exam.context.terminology.join(", ")
    };
    Ok(fill_template(
      LOCAL_SKELETON,
      &[
        ("family", request.family),
        ("style", request.style.as_str()),
        ("objective_title", objective.title.as_str()),
        ("cognitive_level", objective.cognitive_level.as_str()),
        ("difficulty", objective.difficulty.as_str()),
        ("key_topics", key_topics.as_str()),
        ("guidance", style_guidance(request.style)),
        ("terminology", terminology.as_str()),
      ],
    ))
  }
}

/// Fill the per-exam placeholders of a shared skeleton.
pub fn render_template(skeleton: &str, exam: &ExamProfile, topic: &str) -> String {
  let option_count = exam.constraints.option_count.to_string();
  fill_template(
    skeleton,
    &[
      ("exam_name", exam.name.as_str()),
      ("topic", topic),
      ("option_count", option_count.as_str()),
    ],
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::seeds::seed_profiles;

  #[tokio::test]
  async fn test_local_generator_is_deterministic() {
    let exam = seed_profiles().remove(0);
    let objective = exam.objective("fsa").unwrap();
    let req = TemplateRequest { exam: &exam, family: "cfa", style: QuestionStyle::Scenario, objective };
    let a = LocalTemplateGenerator.synthesize(&req).await.unwrap();
    let b = LocalTemplateGenerator.synthesize(&req).await.unwrap();
    assert_eq!(a, b);
    assert!(a.starts_with("[cfa/scenario]"));
    assert!(a.contains("Financial Statement Analysis"));
    assert!(a.contains("DuPont analysis"));
    assert!(a.contains("{exam_name}"));
  }

  #[tokio::test]
  async fn test_render_fills_exam_placeholders() {
    let exam = seed_profiles().remove(0);
    let objective = exam.objective("quant").unwrap();
    let req = TemplateRequest { exam: &exam, family: "cfa", style: QuestionStyle::Direct, objective };
    let skeleton = LocalTemplateGenerator.synthesize(&req).await.unwrap();
    let rendered = render_template(&skeleton, &exam, "probability");
    assert!(rendered.contains("CFA Level I: Quantitative Methods"));
    assert!(rendered.contains("Focus topic: probability"));
    assert!(rendered.contains("exactly 3 answer options"));
    assert!(!rendered.contains('{'));
  }
}
