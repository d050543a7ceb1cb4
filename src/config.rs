//! Loading agent configuration (prompts, provider limits, catalog bank) from TOML.
//!
//! See `AgentConfig` and `Prompts` for expected schema.

use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::{Difficulty, Resource, ResourceKind, ResourceSource, Subject};
use crate::recommend::DEFAULT_RESOURCE_LIMIT;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AgentConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub provider: ProviderSettings,
  #[serde(default)]
  pub recommendation: RecommendationSettings,
  #[serde(default)]
  pub resources: Vec<ResourceCfg>,
}

/// Upper bound on tries per provider call, whatever the config says.
pub const MAX_ATTEMPTS: u32 = 10;

/// Limits applied to every content-provider call.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
  /// Per-request HTTP timeout.
  pub timeout_secs: u64,
  pub max_attempts: u32,
  /// Fixed pause between attempts.
  pub backoff_ms: u64,
}

impl Default for ProviderSettings {
  fn default() -> Self {
    Self { timeout_secs: 20, max_attempts: 3, backoff_ms: 500 }
  }
}

impl ProviderSettings {
  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }

  pub fn backoff(&self) -> Duration {
    Duration::from_millis(self.backoff_ms)
  }

  /// `max_attempts` clamped to `1..=MAX_ATTEMPTS`.
  pub fn attempts(&self) -> u32 {
    self.max_attempts.clamp(1, MAX_ATTEMPTS)
  }

  /// Upper bound for one logical call including all retries, plus a little slack.
  /// Saturates instead of overflowing on extreme TOML values.
  pub fn call_deadline(&self) -> Duration {
    let attempts = self.attempts();
    self
      .request_timeout()
      .saturating_mul(attempts)
      .saturating_add(self.backoff().saturating_mul(attempts - 1))
      .saturating_add(Duration::from_secs(1))
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RecommendationSettings {
  pub resource_limit: usize,
}

impl Default for RecommendationSettings {
  fn default() -> Self {
    Self { resource_limit: DEFAULT_RESOURCE_LIMIT }
  }
}

/// Catalog entry accepted in TOML configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct ResourceCfg {
  #[serde(default)] pub id: Option<String>,
  pub title: String,
  #[serde(default)] pub description: String,
  #[serde(default)] pub kind: ResourceKind,
  #[serde(default)] pub subject: Option<Subject>,
  pub topics: Vec<String>,
  #[serde(default)] pub url: String,
  #[serde(default)] pub difficulty: Difficulty,
  #[serde(default)] pub duration_minutes: u32,
}

impl ResourceCfg {
  pub fn into_resource(self) -> Resource {
    Resource {
      id: self.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
      title: self.title,
      description: self.description,
      kind: self.kind,
      subject: self.subject,
      topics: self.topics,
      url: self.url,
      difficulty: self.difficulty,
      duration_minutes: self.duration_minutes,
      source: ResourceSource::Catalog,
    }
  }
}

/// Prompts used by the OpenAI provider. Defaults target Spanish-language history/geography tutoring.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub open_ended_system: String,
  pub open_ended_user_template: String,
  pub narrative_system: String,
  pub recommendation_user_template: String,
  pub feedback_user_template: String,
  pub questions_system: String,
  pub questions_user_template: String,
  pub resources_system: String,
  pub resources_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      open_ended_system: "Eres un profesor experto que evalúa respuestas educativas de manera justa y constructiva. Responde SOLO con JSON.".into(),
      open_ended_user_template: "Evalúa la siguiente respuesta de un estudiante comparándola con la respuesta modelo.\n\nRespuesta modelo:\n\"{model_answer}\"\n\nRespuesta del estudiante:\n\"{student_answer}\"\n\nCriterios: precisión conceptual (50%), completitud (30%), claridad (20%).\nDevuelve JSON: {\"score\": número 0-100, \"feedback\": string, \"strengths\": [string], \"suggestions\": [string]}".into(),
      narrative_system: "Eres un tutor educativo que proporciona recomendaciones personalizadas y motivadoras para estudiantes.".into(),
      recommendation_user_template: "Genera una recomendación educativa personalizada basada en:\n\n{context}\n\nDebe ser específica para historia y geografía, con tono motivador y de 2-3 oraciones.".into(),
      feedback_user_template: "Proporciona retroalimentación constructiva y motivadora basada en este desempeño:\n\n{context}\n\nIncluye: 1) un análisis breve, 2) recomendaciones para las áreas débiles, 3) estrategias de estudio.".into(),
      questions_system: "Eres un profesor experto en historia y geografía que crea evaluaciones educativas de alta calidad. Responde SOLO con JSON.".into(),
      questions_user_template: "Crea {count} preguntas sobre el tema '{topic}' con dificultad {difficulty}.\nDevuelve JSON {\"questions\": [...]} donde cada pregunta tiene: text, type (multiple_choice, true_false, open_ended, matching, ordering), options [{id,text}], matches [{id,text}] (solo matching), correctAnswer (id de opción, lista ordenada de ids, u objeto id->id según el tipo), modelAnswer (solo open_ended), explanation, topic, difficulty, points (5-15).".into(),
      resources_system: "Eres un experto educativo que sugiere recursos de aprendizaje de alta calidad. Responde SOLO con JSON.".into(),
      resources_user_template: "Sugiere un recurso educativo para cada uno de estos temas: {topics}.\nDevuelve JSON {\"resources\": [{\"title\", \"description\", \"type\" (article, video, exercise), \"url\", \"topic\"}]}.".into(),
    }
  }
}

/// Parse a TOML document into `AgentConfig`.
pub fn parse_agent_config(raw: &str) -> Result<AgentConfig, toml::de::Error> {
  toml::from_str::<AgentConfig>(raw)
}

/// Attempt to load `AgentConfig` from AGENT_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_agent_config_from_env() -> Option<AgentConfig> {
  let path = std::env::var("AGENT_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_agent_config(&s) {
      Ok(cfg) => {
        info!(target: "aula_backend", %path, resources = cfg.resources.len(), "Loaded agent config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "aula_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "aula_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_document_yields_defaults() {
    let cfg = parse_agent_config("").unwrap();
    assert_eq!(cfg.provider.max_attempts, 3);
    assert_eq!(cfg.provider.timeout_secs, 20);
    assert_eq!(cfg.recommendation.resource_limit, 4);
    assert!(cfg.resources.is_empty());
    assert!(cfg.prompts.open_ended_user_template.contains("{student_answer}"));
  }

  #[test]
  fn partial_sections_keep_remaining_defaults() {
    let raw = r#"
[provider]
max_attempts = 5

[prompts]
narrative_system = "Sé breve."

[[resources]]
title = "Ríos de América"
kind = "video"
subject = "geografia"
topics = ["Hidrografía"]
duration_minutes = 12
"#;
    let cfg = parse_agent_config(raw).unwrap();
    assert_eq!(cfg.provider.max_attempts, 5);
    assert_eq!(cfg.provider.backoff_ms, 500);
    assert_eq!(cfg.prompts.narrative_system, "Sé breve.");
    assert!(!cfg.prompts.questions_user_template.is_empty());
    let r = cfg.resources[0].clone().into_resource();
    assert_eq!(r.kind, ResourceKind::Video);
    assert_eq!(r.subject, Some(Subject::Geografia));
    assert_eq!(r.source, ResourceSource::Catalog);
  }

  #[test]
  fn call_deadline_covers_every_attempt() {
    let s = ProviderSettings { timeout_secs: 2, max_attempts: 3, backoff_ms: 100 };
    assert_eq!(s.call_deadline(), Duration::from_millis(2_000 * 3 + 100 * 2 + 1_000));
  }

  #[test]
  fn extreme_provider_settings_do_not_overflow() {
    let s = parse_agent_config("[provider]\ntimeout_secs = 9223372036854775807\nmax_attempts = 4294967295\nbackoff_ms = 9223372036854775807\n")
      .unwrap()
      .provider;
    assert_eq!(s.attempts(), MAX_ATTEMPTS);
    assert_eq!(s.call_deadline(), Duration::MAX);

    let zero = ProviderSettings { timeout_secs: 1, max_attempts: 0, backoff_ms: 0 };
    assert_eq!(zero.attempts(), 1);
    assert_eq!(zero.call_deadline(), Duration::from_secs(2));
  }
}
