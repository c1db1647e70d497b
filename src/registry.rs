//! In-memory profile registry: built-in seeds plus profiles from config.
//!
//! Profiles are immutable once registered. Lookups of unknown ids report
//! not-found; the registry never fabricates a default exam.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, info, instrument};

use crate::domain::{ExamObjective, ExamProfile};
use crate::error::{EngineError, Result};
use crate::seeds::seed_profiles;

#[derive(Clone, Debug, Default)]
pub struct ProfileRegistry {
  by_id: HashMap<String, Arc<ExamProfile>>,
}

impl ProfileRegistry {
  /// Seeds first, then config profiles (which replace seeds with the same id).
  /// Profiles failing validation are skipped and logged.
  #[instrument(level = "info", skip_all, fields(extra = extra.len()))]
  pub fn with_seeds(extra: &[ExamProfile]) -> Self {
    let mut registry = Self::default();
    for p in seed_profiles().into_iter().chain(extra.iter().cloned()) {
      if let Err(e) = registry.insert(p) {
        error!(target: "style_engine", error = %e, "Skipping exam profile");
      }
    }
    for p in registry.by_id.values() {
      info!(target: "style_engine", exam_id = %p.id, objectives = p.objectives.len(), "Registered exam profile");
    }
    registry
  }

  /// Validate and register a profile, replacing any previous one with the same id.
  pub fn insert(&mut self, profile: ExamProfile) -> Result<()> {
    profile
      .validate()
      .map_err(|msg| EngineError::invalid_profile(&profile.id, msg))?;
    self.by_id.insert(profile.id.clone(), Arc::new(profile));
    Ok(())
  }

  pub fn get(&self, exam_id: &str) -> Result<Arc<ExamProfile>> {
    self.by_id
      .get(exam_id)
      .cloned()
      .ok_or_else(|| EngineError::exam_not_found(exam_id))
  }

  /// Resolve both ids at once.
  pub fn objective(&self, exam_id: &str, objective_id: &str) -> Result<(Arc<ExamProfile>, ExamObjective)> {
    let profile = self.get(exam_id)?;
    let objective = profile
      .objective(objective_id)
      .cloned()
      .ok_or_else(|| EngineError::objective_not_found(exam_id, objective_id))?;
    Ok((profile, objective))
  }

  pub fn exam_ids(&self) -> Vec<String> {
    let mut ids: Vec<String> = self.by_id.keys().cloned().collect();
    ids.sort();
    ids
  }

  pub fn len(&self) -> usize {
    self.by_id.len()
  }

  pub fn is_empty(&self) -> bool {
    self.by_id.is_empty()
  }
}
