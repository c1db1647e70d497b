//! Template cache with family inheritance and TTL expiry.
//!
//! Entries are keyed by (family, style, objective signature). Exams whose id
//! matches a family prefix (`cfa-level-1`, `cfa-level-2`, ...) resolve to the
//! same family and therefore share skeletons. A miss falls through to the
//! external generator; the generator runs without any cache lock held, and a
//! failed synthesis stores nothing.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::config::FamilyRule;
use crate::domain::{ExamObjective, ExamProfile, QuestionStyle};
use crate::error::Result;
use crate::seeds::FAMILY_TABLE;
use crate::templates::{TemplateGenerator, TemplateRequest};

/// Static exam-id prefix rules. First match wins; unmatched exams are their own family.
#[derive(Clone, Debug)]
pub struct FamilyTable {
  rules: Vec<FamilyRule>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FamilyMembership {
  pub family: String,
  pub matched_prefix: Option<String>,
}

impl FamilyTable {
  /// Built-in rules followed by `extra`.
  pub fn with_extra(extra: &[FamilyRule]) -> Self {
    let rules = FAMILY_TABLE
      .iter()
      .map(|(prefix, family)| FamilyRule {
        prefix: prefix.to_string(),
        family: family.to_string(),
      })
      .chain(extra.iter().cloned())
      .collect();
    Self { rules }
  }

  pub fn resolve(&self, exam_id: &str) -> FamilyMembership {
    match self.rules.iter().find(|r| exam_id.starts_with(&r.prefix)) {
      Some(rule) => FamilyMembership {
        family: rule.family.clone(),
        matched_prefix: Some(rule.prefix.clone()),
      },
      None => FamilyMembership {
        family: exam_id.to_string(),
        matched_prefix: None,
      },
    }
  }
}

impl Default for FamilyTable {
  fn default() -> Self {
    Self::with_extra(&[])
  }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TemplateKey {
  pub family: String,
  pub style: QuestionStyle,
  pub objective_signature: String,
}

impl fmt::Display for TemplateKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}/{}", self.family, self.style, self.objective_signature)
  }
}

/// Exam-independent identity of an objective: title slug, level and difficulty.
pub fn objective_signature(objective: &ExamObjective) -> String {
  let mut slug = String::with_capacity(objective.title.len());
  for ch in objective.title.chars() {
    if ch.is_alphanumeric() {
      slug.extend(ch.to_lowercase());
    } else if !slug.is_empty() && !slug.ends_with('-') {
      slug.push('-');
    }
  }
  let slug = slug.trim_end_matches('-');
  format!(
    "{}|{}|{}",
    slug,
    objective.cognitive_level.as_str(),
    objective.difficulty.as_str()
  )
}

#[derive(Clone, Debug)]
pub struct CachedTemplate {
  pub key: TemplateKey,
  pub body: String,
  /// Exam whose request first synthesized this entry.
  pub source_exam_id: String,
  pub generator: &'static str,
  pub created_at: Instant,
}

impl CachedTemplate {
  pub fn age(&self) -> Duration {
    Instant::now().duration_since(self.created_at)
  }
}

#[derive(Clone, Debug)]
pub struct TemplateLookup {
  pub template: CachedTemplate,
  pub cache_hit: bool,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InheritanceTree {
  pub exam_id: String,
  pub family: String,
  pub matched_prefix: Option<String>,
  /// Known exams resolving to the same family.
  pub members: Vec<String>,
  /// Unexpired keys currently shared by the family.
  pub template_keys: Vec<String>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PreloadReport {
  pub exam_id: String,
  pub family: String,
  pub generated: usize,
  pub already_cached: usize,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
  pub cache_size: usize,
  pub hits: u64,
  pub misses: u64,
  pub hit_rate_percent: f64,
  pub expirations: u64,
  pub synthesis_failures: u64,
  pub ttl_secs: u64,
}

pub struct TemplateCache {
  entries: RwLock<HashMap<TemplateKey, CachedTemplate>>,
  members: RwLock<HashMap<String, BTreeSet<String>>>,
  families: FamilyTable,
  generator: Arc<dyn TemplateGenerator>,
  ttl: Duration,
  hits: AtomicU64,
  misses: AtomicU64,
  expirations: AtomicU64,
  synthesis_failures: AtomicU64,
}

impl TemplateCache {
  pub fn new(generator: Arc<dyn TemplateGenerator>, families: FamilyTable, ttl: Duration) -> Self {
    Self {
      entries: RwLock::new(HashMap::new()),
      members: RwLock::new(HashMap::new()),
      families,
      generator,
      ttl,
      hits: AtomicU64::new(0),
      misses: AtomicU64::new(0),
      expirations: AtomicU64::new(0),
      synthesis_failures: AtomicU64::new(0),
    }
  }

  pub fn key_for(&self, exam_id: &str, style: QuestionStyle, objective: &ExamObjective) -> TemplateKey {
    TemplateKey {
      family: self.families.resolve(exam_id).family,
      style,
      objective_signature: objective_signature(objective),
    }
  }

  /// Record exams as family members for `get_inheritance_tree`.
  pub async fn register_exams<I, S>(&self, exam_ids: I)
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let mut members = self.members.write().await;
    for id in exam_ids {
      let id = id.as_ref();
      let family = self.families.resolve(id).family;
      members.entry(family).or_default().insert(id.to_string());
    }
  }

  fn is_fresh(&self, entry: &CachedTemplate) -> bool {
    entry.age() < self.ttl
  }

  /// Cached skeleton for the exam's family, or a freshly synthesized one.
  #[instrument(level = "debug", skip_all, fields(exam_id = %exam.id, objective_id = %objective.id, %style))]
  pub async fn get_optimized_template(
    &self,
    exam: &ExamProfile,
    style: QuestionStyle,
    objective: &ExamObjective,
  ) -> Result<TemplateLookup> {
    let key = self.key_for(&exam.id, style, objective);

    let cached = { self.entries.read().await.get(&key).cloned() };
    if let Some(entry) = cached {
      if self.is_fresh(&entry) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        debug!(target: "template_cache", %key, "Template cache hit");
        return Ok(TemplateLookup { template: entry, cache_hit: true });
      }
      self.evict_if_stale(&key).await;
    }

    self.misses.fetch_add(1, Ordering::Relaxed);
    let template = self.synthesize_and_store(exam, key, style, objective).await?;
    Ok(TemplateLookup { template, cache_hit: false })
  }

  async fn evict_if_stale(&self, key: &TemplateKey) {
    let mut entries = self.entries.write().await;
    let stale = entries.get(key).map(|e| !self.is_fresh(e)).unwrap_or(false);
    if stale {
      entries.remove(key);
      self.expirations.fetch_add(1, Ordering::Relaxed);
      debug!(target: "template_cache", %key, "Evicted expired template");
    }
  }

  async fn synthesize_and_store(
    &self,
    exam: &ExamProfile,
    key: TemplateKey,
    style: QuestionStyle,
    objective: &ExamObjective,
  ) -> Result<CachedTemplate> {
    let request = TemplateRequest {
      exam,
      family: &key.family,
      style,
      objective,
    };
    let start = Instant::now();
    let body = match self.generator.synthesize(&request).await {
      Ok(body) => body,
      Err(e) => {
        self.synthesis_failures.fetch_add(1, Ordering::Relaxed);
        warn!(target: "template_cache", %key, generator = self.generator.name(), error = %e, "Template synthesis failed");
        return Err(e);
      }
    };
    let elapsed = start.elapsed();

    let template = CachedTemplate {
      key: key.clone(),
      body,
      source_exam_id: exam.id.clone(),
      generator: self.generator.name(),
      created_at: Instant::now(),
    };
    self.entries.write().await.insert(key.clone(), template.clone());
    self.members
      .write()
      .await
      .entry(key.family.clone())
      .or_default()
      .insert(exam.id.clone());
    info!(target: "template_cache", %key, generator = template.generator, ?elapsed, "Template synthesized and cached");
    Ok(template)
  }

  /// Eagerly synthesize every (objective x style) skeleton for the profile.
  /// Fresh entries are left alone, so repeated calls are cheap.
  #[instrument(level = "info", skip(self, exam), fields(exam_id = %exam.id))]
  pub async fn preload_exam_templates(&self, exam: &ExamProfile) -> Result<PreloadReport> {
    let family = self.families.resolve(&exam.id).family;
    let mut report = PreloadReport {
      exam_id: exam.id.clone(),
      family,
      generated: 0,
      already_cached: 0,
    };
    for objective in &exam.objectives {
      for style in QuestionStyle::ALL {
        let key = self.key_for(&exam.id, style, objective);
        let fresh = {
          let entries = self.entries.read().await;
          entries.get(&key).map(|e| self.is_fresh(e)).unwrap_or(false)
        };
        if fresh {
          report.already_cached += 1;
          continue;
        }
        self.synthesize_and_store(exam, key, style, objective).await?;
        report.generated += 1;
      }
    }
    info!(target: "template_cache", exam_id = %report.exam_id, generated = report.generated, already_cached = report.already_cached, "Preloaded exam templates");
    Ok(report)
  }

  /// Evicts every entry of the exam's family, or everything when `exam_id`
  /// is `None`. Returns the number evicted.
  #[instrument(level = "info", skip(self))]
  pub async fn clear_cache(&self, exam_id: Option<&str>) -> usize {
    let mut entries = self.entries.write().await;
    let before = entries.len();
    match exam_id {
      Some(id) => {
        let family = self.families.resolve(id).family;
        entries.retain(|key, _| key.family != family);
      }
      None => entries.clear(),
    }
    let evicted = before - entries.len();
    info!(target: "template_cache", evicted, "Template cache cleared");
    evicted
  }

  /// Read-only view of the exam's family and what it currently shares.
  pub async fn get_inheritance_tree(&self, exam_id: &str) -> InheritanceTree {
    let membership = self.families.resolve(exam_id);
    let mut members: BTreeSet<String> = self
      .members
      .read()
      .await
      .get(&membership.family)
      .cloned()
      .unwrap_or_default();
    members.insert(exam_id.to_string());

    let mut template_keys: Vec<String> = {
      let entries = self.entries.read().await;
      entries
        .values()
        .filter(|e| e.key.family == membership.family && self.is_fresh(e))
        .map(|e| e.key.to_string())
        .collect()
    };
    template_keys.sort();

    InheritanceTree {
      exam_id: exam_id.to_string(),
      family: membership.family,
      matched_prefix: membership.matched_prefix,
      members: members.into_iter().collect(),
      template_keys,
    }
  }

  pub async fn get_performance_metrics(&self) -> PerformanceMetrics {
    let hits = self.hits.load(Ordering::Relaxed);
    let misses = self.misses.load(Ordering::Relaxed);
    let lookups = hits + misses;
    let hit_rate_percent = if lookups == 0 {
      0.0
    } else {
      ((hits as f64 / lookups as f64) * 1000.0).round() / 10.0
    };
    PerformanceMetrics {
      cache_size: self.entries.read().await.len(),
      hits,
      misses,
      hit_rate_percent,
      expirations: self.expirations.load(Ordering::Relaxed),
      synthesis_failures: self.synthesis_failures.load(Ordering::Relaxed),
      ttl_secs: self.ttl.as_secs(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicUsize;

  use async_trait::async_trait;

  use crate::error::EngineError;
  use crate::seeds::seed_profiles;
  use crate::templates::LocalTemplateGenerator;

  #[derive(Default)]
  struct CountingGenerator {
    calls: AtomicUsize,
  }

  #[async_trait]
  impl TemplateGenerator for CountingGenerator {
    fn name(&self) -> &'static str {
      "counting"
    }

    async fn synthesize(&self, request: &TemplateRequest<'_>) -> Result<String> {
      let n = self.calls.fetch_add(1, Ordering::SeqCst);
      Ok(format!("{}:{}:{}#{}", request.family, request.style, request.objective.id, n))
    }
  }

  struct FailingGenerator;

  #[async_trait]
  impl TemplateGenerator for FailingGenerator {
    fn name(&self) -> &'static str {
      "failing"
    }

    async fn synthesize(&self, _request: &TemplateRequest<'_>) -> Result<String> {
      Err(EngineError::synthesis("failing", "upstream unavailable"))
    }
  }

  fn cache_with(generator: Arc<dyn TemplateGenerator>) -> TemplateCache {
    TemplateCache::new(generator, FamilyTable::default(), Duration::from_secs(3600))
  }

  fn profiles() -> (ExamProfile, ExamProfile) {
    let mut p = seed_profiles();
    let cfa2 = p.remove(1);
    let cfa1 = p.remove(0);
    (cfa1, cfa2)
  }

  #[test]
  fn test_family_resolution() {
    let table = FamilyTable::with_extra(&[FamilyRule { prefix: "ccna".into(), family: "cisco".into() }]);
    assert_eq!(table.resolve("cfa-level-3").family, "cfa");
    assert_eq!(table.resolve("cfa-level-3").matched_prefix.as_deref(), Some("cfa-"));
    assert_eq!(table.resolve("ccna-200-301").family, "cisco");
    let solo = table.resolve("custom-exam");
    assert_eq!(solo.family, "custom-exam");
    assert!(solo.matched_prefix.is_none());
  }

  #[test]
  fn test_objective_signature_is_exam_independent() {
    let (cfa1, cfa2) = profiles();
    let a = objective_signature(cfa1.objective("ethics").unwrap());
    let b = objective_signature(cfa2.objective("ethics").unwrap());
    assert_eq!(a, "ethical-and-professional-standards|application|intermediate");
    assert_eq!(a, b);
  }

  #[tokio::test]
  async fn test_second_lookup_hits_and_returns_identical_value() {
    let gen = Arc::new(CountingGenerator::default());
    let cache = cache_with(gen.clone());
    let (cfa1, _) = profiles();
    let obj = cfa1.objective("fsa").unwrap();

    let first = cache.get_optimized_template(&cfa1, QuestionStyle::Direct, obj).await.unwrap();
    assert!(!first.cache_hit);
    let m = cache.get_performance_metrics().await;
    assert_eq!((m.hits, m.misses), (0, 1));

    let second = cache.get_optimized_template(&cfa1, QuestionStyle::Direct, obj).await.unwrap();
    assert!(second.cache_hit);
    assert_eq!(second.template.body, first.template.body);
    assert_eq!(second.template.created_at, first.template.created_at);
    assert_eq!(gen.calls.load(Ordering::SeqCst), 1);

    let m = cache.get_performance_metrics().await;
    assert_eq!((m.hits, m.misses), (1, 1));
    assert_eq!(m.hit_rate_percent, 50.0);
    assert_eq!(m.cache_size, 1);
  }

  #[tokio::test]
  async fn test_sibling_exams_share_family_templates() {
    let gen = Arc::new(CountingGenerator::default());
    let cache = cache_with(gen.clone());
    let (cfa1, cfa2) = profiles();
    let first = cache
      .get_optimized_template(&cfa1, QuestionStyle::Scenario, cfa1.objective("ethics").unwrap())
      .await
      .unwrap();
    let sibling = cache
      .get_optimized_template(&cfa2, QuestionStyle::Scenario, cfa2.objective("ethics").unwrap())
      .await
      .unwrap();
    assert!(sibling.cache_hit);
    assert_eq!(sibling.template.source_exam_id, "cfa-level-1");
    assert_eq!(sibling.template.body, first.template.body);
    assert_eq!(gen.calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_expired_entry_is_resynthesized() {
    let gen = Arc::new(CountingGenerator::default());
    let cache = TemplateCache::new(gen.clone(), FamilyTable::default(), Duration::from_secs(60));
    let (cfa1, _) = profiles();
    let obj = cfa1.objective("quant").unwrap();

    cache.get_optimized_template(&cfa1, QuestionStyle::Direct, obj).await.unwrap();
    tokio::time::advance(Duration::from_secs(30)).await;
    assert!(cache.get_optimized_template(&cfa1, QuestionStyle::Direct, obj).await.unwrap().cache_hit);

    tokio::time::advance(Duration::from_secs(31)).await;
    let renewed = cache.get_optimized_template(&cfa1, QuestionStyle::Direct, obj).await.unwrap();
    assert!(!renewed.cache_hit);
    assert!(renewed.template.body.ends_with("#1"));

    let m = cache.get_performance_metrics().await;
    assert_eq!(m.expirations, 1);
    assert_eq!((m.hits, m.misses), (1, 2));
    assert_eq!(m.cache_size, 1);
  }

  #[tokio::test]
  async fn test_synthesis_failure_propagates_and_caches_nothing() {
    let cache = cache_with(Arc::new(FailingGenerator));
    let (cfa1, _) = profiles();
    let obj = cfa1.objective("fsa").unwrap();
    let err = cache.get_optimized_template(&cfa1, QuestionStyle::CaseStudy, obj).await.unwrap_err();
    assert!(matches!(err, EngineError::TemplateSynthesis { .. }));
    let m = cache.get_performance_metrics().await;
    assert_eq!(m.cache_size, 0);
    assert_eq!(m.synthesis_failures, 1);
    assert!(cache.preload_exam_templates(&cfa1).await.is_err());
  }

  #[tokio::test]
  async fn test_preload_is_idempotent() {
    let gen = Arc::new(CountingGenerator::default());
    let cache = cache_with(gen.clone());
    let (cfa1, _) = profiles();
    let expected = cfa1.objectives.len() * 3;

    let first = cache.preload_exam_templates(&cfa1).await.unwrap();
    assert_eq!(first.generated, expected);
    assert_eq!(first.already_cached, 0);

    let again = cache.preload_exam_templates(&cfa1).await.unwrap();
    assert_eq!(again.generated, 0);
    assert_eq!(again.already_cached, expected);
    assert_eq!(gen.calls.load(Ordering::SeqCst), expected);

    let m = cache.get_performance_metrics().await;
    assert_eq!(m.cache_size, expected);
    assert_eq!((m.hits, m.misses), (0, 0));
  }

  #[tokio::test]
  async fn test_clear_cache_by_family_and_all() {
    let cache = cache_with(Arc::new(LocalTemplateGenerator));
    let mut p = seed_profiles();
    let aws = p.remove(2);
    let cfa1 = p.remove(0);
    cache.preload_exam_templates(&cfa1).await.unwrap();
    cache.preload_exam_templates(&aws).await.unwrap();

    let cfa_entries = cfa1.objectives.len() * 3;
    let aws_entries = aws.objectives.len() * 3;
    assert_eq!(cache.clear_cache(Some("cfa-level-2")).await, cfa_entries);
    assert_eq!(cache.get_performance_metrics().await.cache_size, aws_entries);
    assert_eq!(cache.clear_cache(Some("cfa-level-1")).await, 0);
    assert_eq!(cache.clear_cache(None).await, aws_entries);
  }

  #[tokio::test]
  async fn test_inheritance_tree_lists_members_and_keys() {
    let cache = cache_with(Arc::new(LocalTemplateGenerator));
    let (cfa1, _) = profiles();
    cache.register_exams(["cfa-level-1", "cfa-level-2", "aws-solutions-architect-associate"]).await;
    let obj = cfa1.objective("fsa").unwrap();
    cache.get_optimized_template(&cfa1, QuestionStyle::Direct, obj).await.unwrap();

    let before = cache.get_performance_metrics().await;
    let tree = cache.get_inheritance_tree("cfa-level-2").await;
    assert_eq!(tree.family, "cfa");
    assert_eq!(tree.members, vec!["cfa-level-1".to_string(), "cfa-level-2".to_string()]);
    assert_eq!(
      tree.template_keys,
      vec!["cfa/direct/financial-statement-analysis|application|intermediate".to_string()]
    );
    assert_eq!(cache.get_performance_metrics().await, before);

    let solo = cache.get_inheritance_tree("unknown-exam").await;
    assert_eq!(solo.members, vec!["unknown-exam".to_string()]);
    assert!(solo.template_keys.is_empty());
  }
}
