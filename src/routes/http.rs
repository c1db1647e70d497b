//! HTTP endpoint handlers. These are thin wrappers that forward to `AppState`.
//! Each handler is instrumented and logs its ids and basic result info.

use std::sync::Arc;
use axum::{
  extract::{Path, Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::distribution::DistributionSummary;
use crate::error::EngineError;
use crate::protocol::*;
use crate::state::AppState;

impl IntoResponse for EngineError {
  fn into_response(self) -> Response {
    let (status, kind) = match &self {
      EngineError::ExamNotFound { .. } => (StatusCode::NOT_FOUND, "exam_not_found"),
      EngineError::ObjectiveNotFound { .. } => (StatusCode::NOT_FOUND, "objective_not_found"),
      EngineError::TemplateSynthesis { .. } => (StatusCode::BAD_GATEWAY, "template_synthesis"),
      EngineError::InvalidProfile { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_profile"),
      EngineError::ConfigParse { .. } | EngineError::ConfigValidation { .. } | EngineError::Io(_) => {
        (StatusCode::INTERNAL_SERVER_ERROR, "internal")
      }
    };
    warn!(target: "style_engine", %status, error = %self, "Request failed");
    (status, Json(ErrorOut { error: kind.into(), message: self.to_string() })).into_response()
  }
}

type ApiResult<T> = Result<Json<T>, EngineError>;

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, exams: state.registry.len(), sessions: state.tracker.session_count().await })
}

#[instrument(level = "info", skip(state, body), fields(exam_id = %body.exam_id))]
pub async fn http_post_session(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SessionIn>,
) -> ApiResult<SessionOut> {
  let session_id = body.session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
  let created = state.start_session(&session_id, &body.exam_id).await?;
  info!(target: "distribution", %session_id, exam_id = %body.exam_id, created, "HTTP session started");
  Ok(Json(SessionOut { session_id, exam_id: body.exam_id, created }))
}

#[instrument(level = "info", skip(state, body), fields(session_id = %body.session_id, objective_id = %body.objective_id))]
pub async fn http_post_next_style(
  State(state): State<Arc<AppState>>,
  Json(body): Json<NextStyleIn>,
) -> ApiResult<NextStyleOut> {
  let out: NextStyleOut = if body.with_template {
    state
      .prepare_question(&body.session_id, &body.exam_id, &body.objective_id, body.question_index, body.topic.as_deref())
      .await?
      .into()
  } else {
    state
      .next_style(&body.session_id, &body.exam_id, &body.objective_id, body.question_index)
      .await?
      .into()
  };
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, body), fields(session_id = %body.session_id, objective_id = %body.objective_id, style = %body.style))]
pub async fn http_post_record(
  State(state): State<Arc<AppState>>,
  Json(body): Json<RecordIn>,
) -> ApiResult<RecordOut> {
  let counts = state.record_generated(&body.session_id, &body.exam_id, &body.objective_id, body.style).await?;
  Ok(Json(RecordOut { objective_id: body.objective_id, total: counts.total(), counts }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_counts(
  State(state): State<Arc<AppState>>,
  Path((session_id, objective_id)): Path<(String, String)>,
) -> impl IntoResponse {
  let counts = state.style_counts(&session_id, &objective_id).await;
  Json(CountsOut { session_id, objective_id, total: counts.total(), counts })
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_distribution(
  State(state): State<Arc<AppState>>,
  Path(session_id): Path<String>,
) -> impl IntoResponse {
  // Unknown sessions read as empty rather than missing.
  let summary = state
    .distribution_summary(&session_id)
    .await
    .unwrap_or_else(|| DistributionSummary::empty(&session_id));
  Json(summary)
}

#[instrument(level = "info", skip(state, q))]
pub async fn http_get_health_score(
  State(state): State<Arc<AppState>>,
  Path(session_id): Path<String>,
  Query(q): Query<ExamQuery>,
) -> ApiResult<crate::distribution::DistributionHealth> {
  let health = state.distribution_health(&session_id, q.exam_id.as_deref()).await?;
  info!(target: "distribution", %session_id, score = health.score, "HTTP distribution health served");
  Ok(Json(health))
}

#[instrument(level = "info", skip(state))]
pub async fn http_delete_session(
  State(state): State<Arc<AppState>>,
  Path(session_id): Path<String>,
) -> impl IntoResponse {
  let removed = state.reset_session(&session_id).await;
  Json(ResetOut { session_id, removed })
}

#[instrument(level = "info", skip(state, body), fields(exam_id = %body.exam_id, intended = %body.intended_style, text_len = body.question.text.len()))]
pub async fn http_post_validate(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ValidateIn>,
) -> ApiResult<ValidateOut> {
  let verdict = state.validate_question(&body.question, body.intended_style, &body.exam_id, &body.objective_id)?;
  info!(target: "validation", score = verdict.score, is_valid = verdict.is_valid, "HTTP validation evaluated");
  Ok(Json(verdict.into()))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_template_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(state.template_metrics().await)
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_inheritance_tree(
  State(state): State<Arc<AppState>>,
  Path(exam_id): Path<String>,
) -> ApiResult<crate::template_cache::InheritanceTree> {
  Ok(Json(state.inheritance_tree(&exam_id).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_preload(
  State(state): State<Arc<AppState>>,
  Path(exam_id): Path<String>,
) -> ApiResult<crate::template_cache::PreloadReport> {
  let report = state.preload_templates(&exam_id).await?;
  info!(target: "template_cache", %exam_id, generated = report.generated, already_cached = report.already_cached, "HTTP preload done");
  Ok(Json(report))
}

#[instrument(level = "info", skip(state, q))]
pub async fn http_delete_templates(
  State(state): State<Arc<AppState>>,
  Query(q): Query<ExamQuery>,
) -> impl IntoResponse {
  let removed = state.clear_templates(q.exam_id.as_deref()).await;
  Json(ClearOut { removed })
}
