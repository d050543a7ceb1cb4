//! The external content provider seam.
//!
//! Every adaptive text (open-ended grading, narratives, generated questions,
//! resource suggestions) comes from a `ContentProvider`. Implementations return
//! `Result<_, ProviderError>`; call sites decide the fallback. Raw JSON coming
//! back from a model goes through the strict `parse_*` functions below before
//! anything else sees it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{
  AnswerValue, Difficulty, Question, QuestionKind, QuestionOption, ResourceKind, TopicPerformance,
  DEFAULT_POINTS,
};
use crate::error::ProviderError;

/// Grade of one free-text answer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OpenEndedEvaluation {
  /// 0..=100
  pub sub_score: u8,
  pub feedback: String,
  #[serde(default)]
  pub strengths: Vec<String>,
  #[serde(default)]
  pub suggestions: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ResourceSuggestion {
  pub title: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub kind: ResourceKind,
  #[serde(default)]
  pub url: String,
  pub topic: String,
}

/// Compact per-area line used in narrative prompts.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AreaSummary {
  pub area: String,
  pub proficiency: f64,
  pub strengths: Vec<String>,
  pub weaknesses: Vec<String>,
}

/// Structured input for a narrative request.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NarrativeContext {
  Recommendation {
    student_name: String,
    areas: Vec<AreaSummary>,
    completed_assessments: usize,
    mean_score: f64,
  },
  AssessmentFeedback {
    student_name: String,
    subject: String,
    overall_score: u32,
    strengths: Vec<String>,
    weaknesses: Vec<String>,
    topics: Vec<TopicPerformance>,
  },
}

impl NarrativeContext {
  /// Plain-text rendering embedded into the user prompt.
  pub fn render(&self) -> String {
    match self {
      NarrativeContext::Recommendation { student_name, areas, completed_assessments, mean_score } => {
        let mut out = format!("Student: {student_name}\nKnowledge areas:\n");
        for a in areas {
          out.push_str(&format!(
            "- {} (level: {:.0}%, strengths: {}, weaknesses: {})\n",
            a.area,
            a.proficiency,
            a.strengths.join(", "),
            a.weaknesses.join(", ")
          ));
        }
        out.push_str(&format!(
          "Completed assessments: {completed_assessments}\nAverage score: {mean_score:.1}%"
        ));
        out
      }
      NarrativeContext::AssessmentFeedback { student_name, subject, overall_score, strengths, weaknesses, topics } => {
        let mut out = format!(
          "Student: {student_name}\nSubject: {subject}\nOverall score: {overall_score}%\n\nStrengths: {}\nAreas to improve: {}\n\nPer topic:\n",
          strengths.join(", "),
          weaknesses.join(", ")
        );
        for t in topics {
          out.push_str(&format!(
            "- {}: {:.1}% ({}/{} correct)\n",
            t.topic, t.score, t.correct_count, t.total_count
          ));
        }
        out
      }
    }
  }
}

#[async_trait]
pub trait ContentProvider: Send + Sync {
  async fn score_open_ended(
    &self,
    student_answer: &str,
    model_answer: &str,
  ) -> Result<OpenEndedEvaluation, ProviderError>;

  async fn generate_narrative(&self, context: &NarrativeContext) -> Result<String, ProviderError>;

  async fn generate_questions(
    &self,
    topic: &str,
    difficulty: Difficulty,
    count: usize,
  ) -> Result<Vec<Question>, ProviderError>;

  async fn suggest_resources(&self, topics: &[String]) -> Result<Vec<ResourceSuggestion>, ProviderError>;
}

/// Provider used when no API key is configured. Every call fails with `Disabled`,
/// which routes each call site straight to its fallback.
#[derive(Clone, Debug, Default)]
pub struct OfflineProvider;

#[async_trait]
impl ContentProvider for OfflineProvider {
  async fn score_open_ended(&self, _: &str, _: &str) -> Result<OpenEndedEvaluation, ProviderError> {
    Err(ProviderError::Disabled)
  }

  async fn generate_narrative(&self, _: &NarrativeContext) -> Result<String, ProviderError> {
    Err(ProviderError::Disabled)
  }

  async fn generate_questions(&self, _: &str, _: Difficulty, _: usize) -> Result<Vec<Question>, ProviderError> {
    Err(ProviderError::Disabled)
  }

  async fn suggest_resources(&self, _: &[String]) -> Result<Vec<ResourceSuggestion>, ProviderError> {
    Err(ProviderError::Disabled)
  }
}

// -------- Parse + validate --------

fn malformed(e: impl std::fmt::Display) -> ProviderError {
  ProviderError::Malformed(e.to_string())
}

/// Parse an open-ended grade. Scores must be numeric and within 0..=100.
pub fn parse_open_ended(raw: &str) -> Result<OpenEndedEvaluation, ProviderError> {
  #[derive(Deserialize)]
  struct Wire {
    score: f64,
    #[serde(default)]
    feedback: String,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    suggestions: Vec<String>,
  }

  let w: Wire = serde_json::from_str(raw).map_err(malformed)?;
  if !w.score.is_finite() || !(0.0..=100.0).contains(&w.score) {
    return Err(malformed(format!("score out of range: {}", w.score)));
  }
  Ok(OpenEndedEvaluation {
    sub_score: w.score.round() as u8,
    feedback: w.feedback,
    strengths: w.strengths,
    suggestions: w.suggestions,
  })
}

/// Parse a non-empty narrative text.
pub fn parse_narrative(raw: &str) -> Result<String, ProviderError> {
  let text = raw.trim();
  if text.is_empty() {
    return Err(malformed("empty narrative"));
  }
  Ok(text.to_string())
}

/// Parse generated questions. Invalid items are dropped; an empty result is an error.
pub fn parse_questions(raw: &str, fallback_topic: &str, difficulty: Difficulty) -> Result<Vec<Question>, ProviderError> {
  #[derive(Deserialize)]
  struct Wire {
    questions: Vec<WireQuestion>,
  }
  #[derive(Deserialize)]
  #[serde(rename_all = "camelCase")]
  struct WireQuestion {
    #[serde(default)]
    id: Option<String>,
    text: String,
    #[serde(rename = "type")]
    kind: QuestionKind,
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    difficulty: Option<Difficulty>,
    #[serde(default)]
    points: Option<u32>,
    correct_answer: AnswerValue,
    #[serde(default)]
    options: Vec<QuestionOption>,
    #[serde(default)]
    matches: Vec<QuestionOption>,
    #[serde(default, alias = "model_answer")]
    model_answer: Option<String>,
    #[serde(default)]
    explanation: String,
  }

  let w: Wire = serde_json::from_str(raw).map_err(malformed)?;
  let questions: Vec<Question> = w
    .questions
    .into_iter()
    .map(|q| Question {
      id: q.id.unwrap_or_default(),
      text: q.text,
      kind: q.kind,
      topic: q.topic.filter(|t| !t.trim().is_empty()).unwrap_or_else(|| fallback_topic.to_string()),
      difficulty: q.difficulty.unwrap_or(difficulty),
      points: q.points.unwrap_or(DEFAULT_POINTS),
      correct_answer: q.correct_answer,
      options: q.options,
      matches: q.matches,
      model_answer: q.model_answer,
      explanation: q.explanation,
    })
    .filter(is_well_formed)
    .collect();

  if questions.is_empty() {
    return Err(malformed("no valid questions in response"));
  }
  Ok(questions)
}

/// A question is usable when its answer key has the shape its kind needs.
pub fn is_well_formed(q: &Question) -> bool {
  if q.text.trim().is_empty() || q.topic.trim().is_empty() || q.points == 0 {
    return false;
  }
  match (q.kind, &q.correct_answer) {
    (QuestionKind::MultipleChoice, AnswerValue::Text(s)) => !s.is_empty(),
    (QuestionKind::TrueFalse, AnswerValue::Text(s)) => !s.is_empty(),
    (QuestionKind::TrueFalse, AnswerValue::Flag(_)) => true,
    (QuestionKind::Ordering, AnswerValue::Sequence(v)) => !v.is_empty(),
    (QuestionKind::Matching, AnswerValue::Mapping(m)) => !m.is_empty(),
    (QuestionKind::OpenEnded, _) => !q.reference_answer().trim().is_empty(),
    _ => false,
  }
}

/// Parse resource suggestions. Accepts the Spanish keys older prompts produced.
pub fn parse_suggestions(raw: &str) -> Result<Vec<ResourceSuggestion>, ProviderError> {
  #[derive(Deserialize)]
  struct Wire {
    resources: Vec<WireSuggestion>,
  }
  #[derive(Deserialize)]
  struct WireSuggestion {
    #[serde(alias = "título")]
    title: String,
    #[serde(default, alias = "descripción")]
    description: String,
    #[serde(default, rename = "type", alias = "tipo")]
    kind: Option<String>,
    #[serde(default)]
    url: String,
    #[serde(alias = "tema")]
    topic: String,
  }

  let w: Wire = serde_json::from_str(raw).map_err(malformed)?;
  Ok(
    w.resources
      .into_iter()
      .filter(|s| !s.title.trim().is_empty() && !s.topic.trim().is_empty())
      .map(|s| ResourceSuggestion {
        title: s.title,
        description: s.description,
        kind: s.kind.as_deref().map(resource_kind_from_label).unwrap_or_default(),
        url: s.url,
        topic: s.topic,
      })
      .collect(),
  )
}

fn resource_kind_from_label(label: &str) -> ResourceKind {
  match label.to_lowercase().as_str() {
    "video" => ResourceKind::Video,
    "exercise" | "ejercicio" => ResourceKind::Exercise,
    "article" | "artículo" | "articulo" => ResourceKind::Article,
    "document" | "documento" => ResourceKind::Document,
    "link" | "enlace" => ResourceKind::Link,
    _ => ResourceKind::Lesson,
  }
}
