//! Minimal OpenAI client used as a template generator.
//!
//! We only call chat.completions and request plain text. Calls are instrumented
//! and log model names, latencies, and response sizes (not contents).
//!
//! NOTE: We never log the API key.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::config::Prompts;
use crate::error::{EngineError, Result};
use crate::templates::{style_guidance, TemplateGenerator, TemplateRequest};
use crate::util::fill_template;

const GENERATOR_NAME: &str = "openai";

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
  pub prompts: Prompts,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env(prompts: Prompts) -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let model =
      std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(20))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, model, prompts })
  }

  /// Plain-text chat completion.
  #[instrument(level = "info", skip(self, system, user), fields(model = %self.model, user_len = user.len()))]
  async fn chat_plain(&self, system: &str, user: &str, temperature: f32) -> std::result::Result<String, String> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      max_tokens: None,
    };

    let res = self.client.post(&url)
      .header(USER_AGENT, "style-engine/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await.map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or(body);
      return Err(format!("OpenAI HTTP {}: {}", status, msg));
    }

    let body: ChatCompletionResponse = res.json().await.map_err(|e| e.to_string())?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default().trim().to_string();

    Ok(text)
  }
}

/// User prompt for one skeleton request. Per-exam placeholders are left for render time.
pub fn template_user_prompt(prompts: &Prompts, request: &TemplateRequest<'_>) -> String {
  let objective = request.objective;
  let key_topics = objective.key_topics.join(", ");
  let terminology = request.exam.context.terminology.join(", ");
  fill_template(
    &prompts.template_user_template,
    &[
      ("family", request.family),
      ("objective_title", objective.title.as_str()),
      ("cognitive_level", objective.cognitive_level.as_str()),
      ("difficulty", objective.difficulty.as_str()),
      ("key_topics", key_topics.as_str()),
      ("terminology", terminology.as_str()),
      ("style", request.style.as_str()),
      ("style_guidance", style_guidance(request.style)),
    ],
  )
}

#[async_trait]
impl TemplateGenerator for OpenAI {
  fn name(&self) -> &'static str {
    GENERATOR_NAME
  }

  #[instrument(level = "info", skip_all, fields(family = %request.family, style = %request.style, objective_id = %request.objective.id))]
  async fn synthesize(&self, request: &TemplateRequest<'_>) -> Result<String> {
    let user = template_user_prompt(&self.prompts, request);
    let start = std::time::Instant::now();
    let result = self.chat_plain(&self.prompts.template_system, &user, 0.4).await;
    let elapsed = start.elapsed();

    match result {
      Ok(text) if text.is_empty() => {
        error!(?elapsed, "Model returned an empty skeleton");
        Err(EngineError::synthesis(GENERATOR_NAME, "empty completion"))
      }
      Ok(text) => {
        info!(?elapsed, skeleton_len = text.len(), "Template skeleton received");
        Ok(text)
      }
      Err(e) => {
        error!(?elapsed, error = %e, "Model call failed during template synthesis");
        Err(EngineError::synthesis(GENERATOR_NAME, e))
      }
    }
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::QuestionStyle;
  use crate::seeds::seed_profiles;

  #[test]
  fn test_user_prompt_keeps_render_placeholders() {
    let exam = seed_profiles().remove(0);
    let objective = exam.objective("fsa").unwrap();
    let req = TemplateRequest { exam: &exam, family: "cfa", style: QuestionStyle::CaseStudy, objective };
    let user = template_user_prompt(&Prompts::default(), &req);
    assert!(user.contains("Exam family: cfa"));
    assert!(user.contains("Style: case_study."));
    assert!(user.contains("DuPont analysis"));
    assert!(!user.contains("CFA Level I"));
  }

  #[test]
  fn test_extract_openai_error() {
    let body = r#"{"error": {"message": "Rate limit reached", "type": "requests"}}"#;
    assert_eq!(extract_openai_error(body).as_deref(), Some("Rate limit reached"));
    assert_eq!(extract_openai_error("not json"), None);
  }
}
