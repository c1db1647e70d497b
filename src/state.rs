//! Application state: the engine facade shared by HTTP handlers and tests.
//!
//! This module owns:
//!   - the loaded config and the exam profile registry
//!   - the style selector and the per-session distribution tracker
//!   - the family template cache and its generator (OpenAI or local)
//!   - the question validator
//!
//! Every operation that names an exam or objective resolves it through the
//! registry first, so unknown ids surface as not-found errors and never touch
//! the tracker or the cache.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::config::{load_engine_config_from_env, EngineConfig};
use crate::distribution::{DistributionHealth, DistributionSummary, DistributionTracker};
use crate::domain::{Question, QuestionStyle, StyleCounts, ValidationVerdict};
use crate::error::Result;
use crate::openai::OpenAI;
use crate::registry::ProfileRegistry;
use crate::selector::{PatternSelector, StyleDecision};
use crate::template_cache::{FamilyTable, InheritanceTree, PerformanceMetrics, PreloadReport, TemplateCache};
use crate::templates::{render_template, LocalTemplateGenerator, TemplateGenerator};
use crate::validator::QuestionValidator;

/// Style decision plus the rendered generation prompt for it.
#[derive(Clone, Debug)]
pub struct PreparedQuestion {
  pub decision: StyleDecision,
  pub template_key: String,
  pub prompt: String,
  pub cache_hit: bool,
  pub generator: &'static str,
}

pub struct AppState {
  pub config: EngineConfig,
  pub registry: ProfileRegistry,
  pub selector: PatternSelector,
  pub tracker: DistributionTracker,
  pub cache: TemplateCache,
  pub validator: QuestionValidator,
}

impl AppState {
  /// Build the engine from a validated config and a template generator.
  #[instrument(level = "info", skip_all, fields(generator = generator.name()))]
  pub async fn new(config: EngineConfig, generator: Arc<dyn TemplateGenerator>) -> Self {
    let registry = ProfileRegistry::with_seeds(&config.profiles);
    let selector = PatternSelector::new(config.selector.clone(), config.distribution.default);
    let tracker = DistributionTracker::new(config.sessions.idle_timeout());
    let cache = TemplateCache::new(generator, FamilyTable::with_extra(&config.families), config.cache.ttl());
    cache.register_exams(registry.exam_ids()).await;
    let validator = QuestionValidator::new(config.validator.clone());

    info!(target: "style_engine", exams = registry.len(), ttl_secs = config.cache.ttl_secs, "Engine state ready");
    Self { config, registry, selector, tracker, cache, validator }
  }

  /// Build state from env: load config, then use OpenAI if configured, else the local generator.
  pub async fn from_env() -> Self {
    let config = load_engine_config_from_env();
    let generator: Arc<dyn TemplateGenerator> = match OpenAI::from_env(config.prompts.clone()) {
      Some(oa) => {
        info!(target: "style_engine", model = %oa.model, "OpenAI template generator enabled");
        Arc::new(oa)
      }
      None => {
        warn!(target: "style_engine", "OPENAI_API_KEY not set; using local template generator");
        Arc::new(LocalTemplateGenerator)
      }
    };
    Self::new(config, generator).await
  }

  /// Idempotently binds a session to an exam. Returns true if newly created.
  pub async fn start_session(&self, session_id: &str, exam_id: &str) -> Result<bool> {
    self.registry.get(exam_id)?;
    Ok(self.tracker.initialize_session(session_id, exam_id).await)
  }

  /// Picks the style for the next question of an objective. `question_index`
  /// defaults to the number of questions already recorded in the bucket.
  #[instrument(level = "info", skip(self), fields(style = tracing::field::Empty))]
  pub async fn next_style(
    &self,
    session_id: &str,
    exam_id: &str,
    objective_id: &str,
    question_index: Option<usize>,
  ) -> Result<StyleDecision> {
    let (exam, objective) = self.registry.objective(exam_id, objective_id)?;
    self.tracker.initialize_session(session_id, exam_id).await;
    let counts = self.tracker.bucket_counts(session_id, exam_id, objective_id).await;
    let index = question_index.unwrap_or(counts.total() as usize);
    let decision = self.selector.explain_style(&exam, &objective, &counts, index);
    tracing::Span::current().record("style", decision.style.as_str());
    info!(
      target: "style_engine",
      %session_id, %exam_id, %objective_id,
      style = %decision.style,
      question_index = index,
      target_source = ?decision.target_source,
      forced_fallback = decision.forced_fallback,
      "Next style selected"
    );
    Ok(decision)
  }

  /// Selects a style and renders the family template for it. Nothing is
  /// recorded: call `record_generated` once the question actually exists.
  pub async fn prepare_question(
    &self,
    session_id: &str,
    exam_id: &str,
    objective_id: &str,
    question_index: Option<usize>,
    topic: Option<&str>,
  ) -> Result<PreparedQuestion> {
    let decision = self.next_style(session_id, exam_id, objective_id, question_index).await?;
    let (exam, objective) = self.registry.objective(exam_id, objective_id)?;
    let lookup = self.cache.get_optimized_template(&exam, decision.style, &objective).await?;
    let topic = topic
      .map(str::to_string)
      .or_else(|| objective.key_topics.first().cloned())
      .unwrap_or_else(|| objective.title.clone());
    let prompt = render_template(&lookup.template.body, &exam, &topic);
    Ok(PreparedQuestion {
      decision,
      template_key: lookup.template.key.to_string(),
      prompt,
      cache_hit: lookup.cache_hit,
      generator: lookup.template.generator,
    })
  }

  /// Counts a successfully generated question. Returns the bucket after the increment.
  pub async fn record_generated(
    &self,
    session_id: &str,
    exam_id: &str,
    objective_id: &str,
    style: QuestionStyle,
  ) -> Result<StyleCounts> {
    self.registry.objective(exam_id, objective_id)?;
    Ok(self.tracker.record_generated(session_id, exam_id, objective_id, style).await)
  }

  pub fn validate_question(
    &self,
    question: &Question,
    intended: QuestionStyle,
    exam_id: &str,
    objective_id: &str,
  ) -> Result<ValidationVerdict> {
    let (exam, objective) = self.registry.objective(exam_id, objective_id)?;
    Ok(self.validator.validate_question(question, intended, &exam, &objective))
  }

  /// Counts for `objective_id` summed over every exam in the session.
  pub async fn style_counts(&self, session_id: &str, objective_id: &str) -> StyleCounts {
    self.tracker.get_next_style_counts(session_id, objective_id).await
  }

  pub async fn distribution_summary(&self, session_id: &str) -> Option<DistributionSummary> {
    self.tracker.get_distribution_summary(session_id).await
  }

  /// Health against `exam_id`, or the exam the session was started with.
  /// Unknown sessions score 100.
  pub async fn distribution_health(&self, session_id: &str, exam_id: Option<&str>) -> Result<DistributionHealth> {
    let exam_id = match exam_id {
      Some(id) => Some(id.to_string()),
      None => self.tracker.get_distribution_summary(session_id).await.map(|s| s.exam_id),
    };
    let Some(exam_id) = exam_id else {
      return Ok(DistributionHealth {
        session_id: session_id.to_string(),
        exam_id: String::new(),
        score: 100.0,
        objectives_evaluated: 0,
        total_questions: 0,
        objectives: Vec::new(),
      });
    };
    let exam = self.registry.get(&exam_id)?;
    Ok(
      self
        .tracker
        .calculate_distribution_health(session_id, &exam, &self.config.distribution.default)
        .await,
    )
  }

  pub async fn reset_session(&self, session_id: &str) -> bool {
    self.tracker.reset_session(session_id).await
  }

  pub async fn purge_idle_sessions(&self) -> usize {
    self.tracker.purge_idle_sessions().await
  }

  pub async fn template_metrics(&self) -> PerformanceMetrics {
    self.cache.get_performance_metrics().await
  }

  pub async fn inheritance_tree(&self, exam_id: &str) -> Result<InheritanceTree> {
    self.registry.get(exam_id)?;
    Ok(self.cache.get_inheritance_tree(exam_id).await)
  }

  pub async fn preload_templates(&self, exam_id: &str) -> Result<PreloadReport> {
    let exam = self.registry.get(exam_id)?;
    self.cache.preload_exam_templates(&exam).await
  }

  /// Clears the family of `exam_id`, or everything.
  pub async fn clear_templates(&self, exam_id: Option<&str>) -> usize {
    self.cache.clear_cache(exam_id).await
  }
}
