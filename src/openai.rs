//! Minimal OpenAI client implementing `ContentProvider`.
//!
//! We only call chat.completions and request either plain text or a strict JSON object.
//! Calls are instrumented and log model names, attempts, latencies and response sizes (not contents).
//!
//! NOTE: We never log the API key and we keep payload truncations short to avoid PII leaks.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::config::{Prompts, ProviderSettings};
use crate::domain::{Difficulty, Question};
use crate::error::ProviderError;
use crate::provider::{
  parse_narrative, parse_open_ended, parse_questions, parse_suggestions, ContentProvider, NarrativeContext,
  OpenEndedEvaluation, ResourceSuggestion,
};
use crate::util::{fill_template, trunc_for_log};

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub fast_model: String,
  pub strong_model: String,
  prompts: Prompts,
  settings: ProviderSettings,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env(prompts: Prompts, settings: ProviderSettings) -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let mut client = Self::new(base_url, api_key, prompts, settings).ok()?;
    if let Ok(m) = std::env::var("OPENAI_FAST_MODEL") {
      client.fast_model = m;
    }
    if let Ok(m) = std::env::var("OPENAI_STRONG_MODEL") {
      client.strong_model = m;
    }
    Some(client)
  }

  pub fn new(
    base_url: impl Into<String>,
    api_key: impl Into<String>,
    prompts: Prompts,
    settings: ProviderSettings,
  ) -> Result<Self, ProviderError> {
    let client = reqwest::Client::builder()
      .timeout(settings.request_timeout())
      .build()
      .map_err(|e| ProviderError::Transport(e.to_string()))?;
    Ok(Self {
      client,
      api_key: api_key.into(),
      base_url: base_url.into().trim_end_matches('/').to_string(),
      fast_model: "gpt-4o-mini".into(),
      strong_model: "gpt-4o".into(),
      prompts,
      settings,
    })
  }

  /// Plain-text chat completion. Used for narratives.
  async fn chat_plain(&self, model: &str, system: &str, user: &str, temperature: f32) -> Result<String, ProviderError> {
    self.chat_with_retries(model, system, user, temperature, None).await
  }

  /// JSON-object chat completion. Returns the raw JSON text for the caller's parser.
  async fn chat_json(&self, model: &str, system: &str, user: &str, temperature: f32) -> Result<String, ProviderError> {
    let format = ResponseFormat { r#type: "json_object".into() };
    self.chat_with_retries(model, system, user, temperature, Some(format)).await
  }

  /// Up to `max_attempts` tries with a fixed pause; only transient failures are retried.
  #[instrument(level = "info", skip(self, system, user, response_format), fields(model = %model, json = response_format.is_some()))]
  async fn chat_with_retries(
    &self,
    model: &str,
    system: &str,
    user: &str,
    temperature: f32,
    response_format: Option<ResponseFormat>,
  ) -> Result<String, ProviderError> {
    let req = ChatCompletionRequest {
      model: model.to_string(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      response_format,
      max_tokens: None,
    };

    let max_attempts = self.settings.attempts();
    let mut attempt = 1;
    loop {
      let start = Instant::now();
      match self.send_once(&req).await {
        Ok(text) => {
          info!(attempt, elapsed = ?start.elapsed(), resp_len = text.len(), "OpenAI call succeeded");
          return Ok(text);
        }
        Err(e) if e.is_retryable() && attempt < max_attempts => {
          warn!(attempt, max_attempts, error = %e, "OpenAI call failed; retrying after backoff");
          tokio::time::sleep(self.settings.backoff()).await;
          attempt += 1;
        }
        Err(e) => {
          warn!(attempt, error = %e, "OpenAI call failed; giving up");
          return Err(e);
        }
      }
    }
  }

  async fn send_once(&self, req: &ChatCompletionRequest) -> Result<String, ProviderError> {
    let url = format!("{}/chat/completions", self.base_url);
    let res = self.client.post(&url)
      .header(USER_AGENT, "aula-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(req).send().await?;

    if !res.status().is_success() {
      let status = res.status().as_u16();
      let body = res.text().await.unwrap_or_default();
      let message = extract_openai_error(&body).unwrap_or_else(|| trunc_for_log(&body, 200));
      return Err(ProviderError::Status { status, message });
    }

    let body: ChatCompletionResponse = res.json().await?;
    if let Some(usage) = &body.usage {
      debug!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    Ok(
      body.choices.first()
        .and_then(|c| c.message.content.clone())
        .unwrap_or_default()
        .trim()
        .to_string(),
    )
  }
}

#[async_trait]
impl ContentProvider for OpenAI {
  #[instrument(level = "info", skip(self, student_answer, model_answer), fields(answer_len = student_answer.len(), model = %self.strong_model))]
  async fn score_open_ended(&self, student_answer: &str, model_answer: &str) -> Result<OpenEndedEvaluation, ProviderError> {
    let user = fill_template(
      &self.prompts.open_ended_user_template,
      &[("model_answer", model_answer), ("student_answer", student_answer)],
    );
    let raw = self.chat_json(&self.strong_model, &self.prompts.open_ended_system, &user, 0.2).await?;
    parse_open_ended(&raw)
  }

  #[instrument(level = "info", skip(self, context), fields(model = %self.fast_model))]
  async fn generate_narrative(&self, context: &NarrativeContext) -> Result<String, ProviderError> {
    let template = match context {
      NarrativeContext::Recommendation { .. } => &self.prompts.recommendation_user_template,
      NarrativeContext::AssessmentFeedback { .. } => &self.prompts.feedback_user_template,
    };
    let rendered = context.render();
    let user = fill_template(template, &[("context", rendered.as_str())]);
    let raw = self.chat_plain(&self.fast_model, &self.prompts.narrative_system, &user, 0.7).await?;
    parse_narrative(&raw)
  }

  #[instrument(level = "info", skip(self), fields(model = %self.strong_model))]
  async fn generate_questions(&self, topic: &str, difficulty: Difficulty, count: usize) -> Result<Vec<Question>, ProviderError> {
    let count_s = count.to_string();
    let user = fill_template(
      &self.prompts.questions_user_template,
      &[("count", count_s.as_str()), ("topic", topic), ("difficulty", difficulty.as_str())],
    );
    let raw = self.chat_json(&self.strong_model, &self.prompts.questions_system, &user, 0.7).await?;
    let mut questions = parse_questions(&raw, topic, difficulty)?;
    questions.truncate(count);
    Ok(questions)
  }

  #[instrument(level = "info", skip(self, topics), fields(topics = topics.len(), model = %self.fast_model))]
  async fn suggest_resources(&self, topics: &[String]) -> Result<Vec<ResourceSuggestion>, ProviderError> {
    let joined = topics.join(", ");
    let user = fill_template(&self.prompts.resources_user_template, &[("topics", joined.as_str())]);
    let raw = self.chat_json(&self.fast_model, &self.prompts.resources_system, &user, 0.5).await?;
    parse_suggestions(&raw)
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

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
  use wiremock::matchers::{method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn completion(content: &str) -> serde_json::Value {
    serde_json::json!({
      "choices": [{ "message": { "content": content } }],
      "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
    })
  }

  fn client(server: &MockServer) -> OpenAI {
    let settings = ProviderSettings { timeout_secs: 5, max_attempts: 3, backoff_ms: 1 };
    OpenAI::new(server.uri(), "test-key", Prompts::default(), settings).unwrap()
  }

  async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.map(|r| r.len()).unwrap_or_default()
  }

  #[tokio::test]
  async fn transient_failures_are_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/chat/completions"))
      .respond_with(ResponseTemplate::new(503))
      .up_to_n_times(2)
      .mount(&server)
      .await;
    Mock::given(method("POST"))
      .and(path("/chat/completions"))
      .respond_with(ResponseTemplate::new(200).set_body_json(completion(r#"{"score": 85, "feedback": "Muy bien"}"#)))
      .mount(&server)
      .await;

    let eval = client(&server).score_open_ended("Sequías y guerras", "Causas múltiples").await.unwrap();
    assert_eq!(eval.sub_score, 85);
    assert_eq!(eval.feedback, "Muy bien");
    assert_eq!(request_count(&server).await, 3);
  }

  #[tokio::test]
  async fn gives_up_after_max_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .respond_with(ResponseTemplate::new(500))
      .mount(&server)
      .await;

    let err = client(&server).generate_narrative(&NarrativeContext::Recommendation {
      student_name: "Ana".into(),
      areas: vec![],
      completed_assessments: 0,
      mean_score: 0.0,
    }).await.unwrap_err();
    assert!(matches!(err, ProviderError::Status { status: 500, .. }));
    assert_eq!(request_count(&server).await, 3);
  }

  #[tokio::test]
  async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({"error": {"message": "bad model"}})))
      .mount(&server)
      .await;

    let err = client(&server).suggest_resources(&["Demografía".into()]).await.unwrap_err();
    assert_eq!(err, ProviderError::Status { status: 400, message: "bad model".into() });
    assert_eq!(request_count(&server).await, 1);
  }

  #[tokio::test]
  async fn out_of_range_grade_is_malformed_and_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .respond_with(ResponseTemplate::new(200).set_body_json(completion(r#"{"score": 250}"#)))
      .mount(&server)
      .await;

    let err = client(&server).score_open_ended("x", "y").await.unwrap_err();
    assert!(matches!(err, ProviderError::Malformed(_)));
    assert_eq!(request_count(&server).await, 1);
  }

  #[tokio::test]
  async fn generated_questions_are_capped_and_topic_filled() {
    let server = MockServer::start().await;
    let payload = r#"{"questions": [
      {"text": "¿Qué río atraviesa Brasil?", "type": "multiple_choice", "correctAnswer": "a",
       "options": [{"id": "a", "text": "Amazonas"}, {"id": "b", "text": "Nilo"}]},
      {"text": "El Amazonas desemboca en el Atlántico", "type": "true_false", "correctAnswer": "a"}
    ]}"#;
    Mock::given(method("POST"))
      .respond_with(ResponseTemplate::new(200).set_body_json(completion(payload)))
      .mount(&server)
      .await;

    let qs = client(&server).generate_questions("Hidrografía", Difficulty::Basic, 1).await.unwrap();
    assert_eq!(qs.len(), 1);
    assert_eq!(qs[0].topic, "Hidrografía");
  }
}
