//! Per-session style counters and distribution health.
//!
//! Sessions live in an outer map guarded by an `RwLock`; each session has its
//! own `Mutex`, so increments on one session serialize while other sessions
//! proceed in parallel. The outer write lock is only taken to create, reset or
//! sweep sessions. Nothing here is persisted.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::domain::{ExamProfile, QuestionStyle, StyleCounts, StyleFractions, TargetDistribution};
use crate::selector::{allowed_styles, effective_target, resolve_target};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct BucketKey {
  exam_id: String,
  objective_id: String,
}

#[derive(Debug)]
struct SessionState {
  exam_id: String,
  buckets: BTreeMap<BucketKey, StyleCounts>,
  last_active: Instant,
  /// Set once the session was reset or swept; holders of a stale handle must look it up again.
  retired: bool,
}

impl SessionState {
  fn new(exam_id: &str) -> Self {
    Self {
      exam_id: exam_id.to_string(),
      buckets: BTreeMap::new(),
      last_active: Instant::now(),
      retired: false,
    }
  }
}

type SessionHandle = Arc<Mutex<SessionState>>;

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectiveDistribution {
  pub exam_id: String,
  pub objective_id: String,
  pub total: u64,
  pub counts: StyleCounts,
  pub fractions: StyleFractions,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DistributionSummary {
  pub session_id: String,
  pub exam_id: String,
  pub total: u64,
  pub objectives: Vec<ObjectiveDistribution>,
}

impl DistributionSummary {
  /// Summary of a session with nothing recorded yet.
  pub fn empty(session_id: &str) -> Self {
    Self { session_id: session_id.to_string(), exam_id: String::new(), total: 0, objectives: Vec::new() }
  }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectiveHealth {
  pub objective_id: String,
  pub total: u64,
  /// Sum of |observed - target| over styles, in [0, 2].
  pub divergence: f64,
  pub score: f64,
}

/// 0-100 diagnostic; 100 means the observed mix matches the target exactly.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DistributionHealth {
  pub session_id: String,
  pub exam_id: String,
  pub score: f64,
  pub objectives_evaluated: usize,
  pub total_questions: u64,
  pub objectives: Vec<ObjectiveHealth>,
}

/// Maximum possible sum of absolute differences between two distributions.
const MAX_DIVERGENCE: f64 = 2.0;

fn divergence_to_score(divergence: f64) -> f64 {
  let raw = 100.0 * (1.0 - divergence / MAX_DIVERGENCE);
  (raw.clamp(0.0, 100.0) * 10.0).round() / 10.0
}

pub struct DistributionTracker {
  sessions: RwLock<HashMap<String, SessionHandle>>,
  idle_timeout: Duration,
}

impl DistributionTracker {
  pub fn new(idle_timeout: Duration) -> Self {
    Self {
      sessions: RwLock::new(HashMap::new()),
      idle_timeout,
    }
  }

  async fn handle(&self, session_id: &str) -> Option<SessionHandle> {
    self.sessions.read().await.get(session_id).cloned()
  }

  /// Existing handle, or a fresh session (sweeping idle ones while the write lock is held).
  async fn handle_or_init(&self, session_id: &str, exam_id: &str) -> (SessionHandle, bool) {
    if let Some(h) = self.handle(session_id).await {
      return (h, false);
    }
    let mut sessions = self.sessions.write().await;
    if let Some(h) = sessions.get(session_id) {
      return (h.clone(), false);
    }
    let swept = sweep_idle(&mut sessions, self.idle_timeout);
    if swept > 0 {
      info!(target: "distribution", swept, "Swept idle sessions");
    }
    let h = Arc::new(Mutex::new(SessionState::new(exam_id)));
    sessions.insert(session_id.to_string(), h.clone());
    (h, true)
  }

  /// Creates empty counters if absent; no-op otherwise. Returns whether it created.
  #[instrument(level = "debug", skip_all, fields(%session_id, %exam_id))]
  pub async fn initialize_session(&self, session_id: &str, exam_id: &str) -> bool {
    let (h, created) = self.handle_or_init(session_id, exam_id).await;
    h.lock().await.last_active = Instant::now();
    if created {
      debug!(target: "distribution", %session_id, %exam_id, "Session initialized");
    }
    created
  }

  /// Counts summed over every exam bucket of this objective; all-zero if unseen.
  pub async fn get_next_style_counts(&self, session_id: &str, objective_id: &str) -> StyleCounts {
    let Some(h) = self.handle(session_id).await else {
      return StyleCounts::default();
    };
    let state = h.lock().await;
    let mut counts = StyleCounts::default();
    for (key, c) in &state.buckets {
      if key.objective_id == objective_id {
        counts.merge(c);
      }
    }
    counts
  }

  /// Counts for one (exam, objective) bucket; all-zero if unseen.
  pub async fn bucket_counts(&self, session_id: &str, exam_id: &str, objective_id: &str) -> StyleCounts {
    let Some(h) = self.handle(session_id).await else {
      return StyleCounts::default();
    };
    let state = h.lock().await;
    state
      .buckets
      .get(&BucketKey {
        exam_id: exam_id.to_string(),
        objective_id: objective_id.to_string(),
      })
      .copied()
      .unwrap_or_default()
  }

  /// Increments the style and total for the bucket, initializing the session
  /// if needed. Returns the bucket's counts after the increment.
  #[instrument(level = "debug", skip_all, fields(%session_id, %exam_id, %objective_id, %style))]
  pub async fn record_generated(
    &self,
    session_id: &str,
    exam_id: &str,
    objective_id: &str,
    style: QuestionStyle,
  ) -> StyleCounts {
    let key = BucketKey {
      exam_id: exam_id.to_string(),
      objective_id: objective_id.to_string(),
    };
    loop {
      let (h, _) = self.handle_or_init(session_id, exam_id).await;
      let mut state = h.lock().await;
      if state.retired {
        continue;
      }
      state.last_active = Instant::now();
      let counts = state.buckets.entry(key.clone()).or_default();
      counts.increment(style);
      let after = *counts;
      debug!(target: "distribution", %session_id, %objective_id, %style, total = after.total(), "Recorded generated style");
      return after;
    }
  }

  /// Observed fractions for every bucket touched; `None` for unknown sessions.
  pub async fn get_distribution_summary(&self, session_id: &str) -> Option<DistributionSummary> {
    let h = self.handle(session_id).await?;
    let state = h.lock().await;
    let objectives: Vec<ObjectiveDistribution> = state
      .buckets
      .iter()
      .map(|(key, counts)| ObjectiveDistribution {
        exam_id: key.exam_id.clone(),
        objective_id: key.objective_id.clone(),
        total: counts.total(),
        counts: *counts,
        fractions: counts.fractions().unwrap_or_default(),
      })
      .collect();
    Some(DistributionSummary {
      session_id: session_id.to_string(),
      exam_id: state.exam_id.clone(),
      total: objectives.iter().map(|o| o.total).sum(),
      objectives,
    })
  }

  /// Divergence from target across all objectives of `exam` touched in the
  /// session, weighted by question count. No data yet scores 100.
  #[instrument(level = "debug", skip_all, fields(%session_id, exam_id = %exam.id))]
  pub async fn calculate_distribution_health(
    &self,
    session_id: &str,
    exam: &ExamProfile,
    default: &TargetDistribution,
  ) -> DistributionHealth {
    let mut buckets: Vec<(String, StyleCounts)> = Vec::new();
    if let Some(h) = self.handle(session_id).await {
      let state = h.lock().await;
      buckets.extend(
        state
          .buckets
          .iter()
          .filter(|(key, _)| key.exam_id == exam.id)
          .map(|(key, c)| (key.objective_id.clone(), *c)),
      );
    }

    let mut objectives = Vec::with_capacity(buckets.len());
    let mut weighted = 0.0;
    let mut total_questions = 0u64;
    for (objective_id, counts) in buckets {
      let Some(observed) = counts.fractions() else { continue };
      let target = match exam.objective(&objective_id) {
        Some(o) => effective_target(&resolve_target(exam, o, default).0, &allowed_styles(o)),
        None => exam.question_generation.style_distribution.unwrap_or(*default),
      };
      let divergence: f64 = QuestionStyle::ALL
        .iter()
        .map(|s| (observed.fraction(*s) - target.fraction(*s)).abs())
        .sum();
      let total = counts.total();
      weighted += divergence * total as f64;
      total_questions += total;
      objectives.push(ObjectiveHealth {
        objective_id,
        total,
        divergence,
        score: divergence_to_score(divergence),
      });
    }

    let score = if total_questions == 0 {
      100.0
    } else {
      divergence_to_score(weighted / total_questions as f64)
    };
    DistributionHealth {
      session_id: session_id.to_string(),
      exam_id: exam.id.clone(),
      score,
      objectives_evaluated: objectives.len(),
      total_questions,
      objectives,
    }
  }

  /// Drops all counters for the session. Returns whether it existed.
  #[instrument(level = "debug", skip_all, fields(%session_id))]
  pub async fn reset_session(&self, session_id: &str) -> bool {
    let removed = self.sessions.write().await.remove(session_id);
    match removed {
      Some(h) => {
        h.lock().await.retired = true;
        info!(target: "distribution", %session_id, "Session reset");
        true
      }
      None => false,
    }
  }

  /// Removes sessions idle longer than the timeout. Returns how many.
  pub async fn purge_idle_sessions(&self) -> usize {
    let mut sessions = self.sessions.write().await;
    sweep_idle(&mut sessions, self.idle_timeout)
  }

  pub async fn session_count(&self) -> usize {
    self.sessions.read().await.len()
  }
}

/// Sessions currently locked are in use and therefore not idle.
fn sweep_idle(sessions: &mut HashMap<String, SessionHandle>, idle_timeout: Duration) -> usize {
  let now = Instant::now();
  let before = sessions.len();
  sessions.retain(|_, h| match h.try_lock() {
    Ok(mut state) => {
      if now.duration_since(state.last_active) > idle_timeout {
        state.retired = true;
        false
      } else {
        true
      }
    }
    Err(_) => true,
  });
  before - sessions.len()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::seeds::seed_profiles;

  fn tracker() -> DistributionTracker {
    DistributionTracker::new(Duration::from_secs(600))
  }

  #[tokio::test]
  async fn test_initialize_is_idempotent() {
    let t = tracker();
    assert!(t.initialize_session("s1", "cfa-level-1").await);
    assert!(!t.initialize_session("s1", "cfa-level-1").await);
    assert_eq!(t.session_count().await, 1);
    let summary = t.get_distribution_summary("s1").await.unwrap();
    assert_eq!(summary.total, 0);
    assert!(summary.objectives.is_empty());
  }

  #[tokio::test]
  async fn test_unknown_session_reads_are_empty() {
    let t = tracker();
    assert_eq!(t.get_next_style_counts("nobody", "fsa").await, StyleCounts::default());
    assert!(t.get_distribution_summary("nobody").await.is_none());
    let exam = seed_profiles().remove(0);
    let health = t.calculate_distribution_health("nobody", &exam, &TargetDistribution::default()).await;
    assert_eq!(health.score, 100.0);
    assert_eq!(health.objectives_evaluated, 0);
  }

  #[tokio::test]
  async fn test_record_auto_initializes_and_conserves() {
    let t = tracker();
    let styles = [
      QuestionStyle::Direct,
      QuestionStyle::Scenario,
      QuestionStyle::Direct,
      QuestionStyle::CaseStudy,
      QuestionStyle::Direct,
    ];
    for s in styles {
      t.record_generated("s1", "cfa-level-1", "fsa", s).await;
    }
    let counts = t.get_next_style_counts("s1", "fsa").await;
    assert_eq!(counts.total(), 5);
    assert_eq!(counts.direct + counts.scenario + counts.case_study, 5);
    assert_eq!(counts.direct, 3);

    let summary = t.get_distribution_summary("s1").await.unwrap();
    assert_eq!(summary.total, 5);
    assert_eq!(summary.objectives[0].fractions.direct, 0.6);
  }

  #[tokio::test]
  async fn test_counts_per_objective_merge_exams() {
    let t = tracker();
    t.record_generated("s1", "cfa-level-1", "fsa", QuestionStyle::Direct).await;
    t.record_generated("s1", "cfa-level-2", "fsa", QuestionStyle::Scenario).await;
    t.record_generated("s1", "cfa-level-1", "quant", QuestionStyle::Direct).await;

    let merged = t.get_next_style_counts("s1", "fsa").await;
    assert_eq!(merged.total(), 2);
    let bucket = t.bucket_counts("s1", "cfa-level-1", "fsa").await;
    assert_eq!(bucket, StyleCounts { direct: 1, scenario: 0, case_study: 0 });
    assert_eq!(t.get_distribution_summary("s1").await.unwrap().objectives.len(), 3);
  }

  #[tokio::test]
  async fn test_reset_then_summary_is_empty() {
    let t = tracker();
    t.record_generated("s1", "cfa-level-1", "fsa", QuestionStyle::Direct).await;
    assert!(t.reset_session("s1").await);
    assert!(t.get_distribution_summary("s1").await.is_none());
    assert_eq!(t.get_next_style_counts("s1", "fsa").await.total(), 0);
    assert!(!t.reset_session("s1").await);
  }

  #[tokio::test]
  async fn test_health_perfect_and_skewed() {
    let t = tracker();
    let exam = seed_profiles().remove(0);
    let default = TargetDistribution::default();
    // fsa uses the default 60/30/10 mix.
    for _ in 0..6 {
      t.record_generated("good", &exam.id, "fsa", QuestionStyle::Direct).await;
    }
    for _ in 0..3 {
      t.record_generated("good", &exam.id, "fsa", QuestionStyle::Scenario).await;
    }
    t.record_generated("good", &exam.id, "fsa", QuestionStyle::CaseStudy).await;
    let good = t.calculate_distribution_health("good", &exam, &default).await;
    assert_eq!(good.score, 100.0);
    assert_eq!(good.objectives_evaluated, 1);

    for _ in 0..10 {
      t.record_generated("bad", &exam.id, "fsa", QuestionStyle::CaseStudy).await;
    }
    let bad = t.calculate_distribution_health("bad", &exam, &default).await;
    // |0-0.6| + |0-0.3| + |1-0.1| = 1.8 -> 10.0
    assert_eq!(bad.score, 10.0);
    assert!(bad.score < good.score);
  }

  #[tokio::test]
  async fn test_health_ignores_other_exams() {
    let t = tracker();
    let exam = seed_profiles().remove(0);
    t.record_generated("s1", "aws-solutions-architect-associate", "cost", QuestionStyle::CaseStudy).await;
    let h = t.calculate_distribution_health("s1", &exam, &TargetDistribution::default()).await;
    assert_eq!(h.objectives_evaluated, 0);
    assert_eq!(h.score, 100.0);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_concurrent_records_do_not_lose_increments() {
    let t = Arc::new(tracker());
    let mut tasks = Vec::new();
    for i in 0..200 {
      let t = t.clone();
      let style = QuestionStyle::ALL[i % 3];
      tasks.push(tokio::spawn(async move {
        t.record_generated("shared", "cfa-level-1", "fsa", style).await;
      }));
    }
    for task in tasks {
      task.await.unwrap();
    }
    let counts = t.get_next_style_counts("shared", "fsa").await;
    assert_eq!(counts.total(), 200);
    assert_eq!(counts.direct, 67);
    assert_eq!(counts.scenario, 67);
    assert_eq!(counts.case_study, 66);
  }

  #[tokio::test(start_paused = true)]
  async fn test_idle_sessions_are_swept() {
    let t = DistributionTracker::new(Duration::from_secs(60));
    t.record_generated("old", "cfa-level-1", "fsa", QuestionStyle::Direct).await;
    tokio::time::advance(Duration::from_secs(30)).await;
    t.record_generated("recent", "cfa-level-1", "fsa", QuestionStyle::Direct).await;
    tokio::time::advance(Duration::from_secs(45)).await;

    // Creating a new session sweeps "old" (75s idle) but keeps "recent" (45s).
    t.initialize_session("new", "cfa-level-1").await;
    assert_eq!(t.session_count().await, 2);
    assert!(t.get_distribution_summary("old").await.is_none());
    assert!(t.get_distribution_summary("recent").await.is_some());

    tokio::time::advance(Duration::from_secs(120)).await;
    assert_eq!(t.purge_idle_sessions().await, 2);
    assert_eq!(t.session_count().await, 0);
  }
}
