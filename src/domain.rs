//! Domain models: questions, responses, assessments, students and their knowledge areas, resources.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Curriculum subtopic key, e.g. "Hidrografía".
pub type Topic = String;

/// Default points for a question that does not state its own.
pub const DEFAULT_POINTS: u32 = 10;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
  #[serde(alias = "Historia")]
  Historia,
  #[serde(alias = "geografía", alias = "Geografía")]
  Geografia,
}

impl Subject {
  /// Name of the curriculum KnowledgeArea this subject feeds.
  pub fn area_name(&self) -> &'static str {
    match self {
      Subject::Historia => "Historia",
      Subject::Geografia => "Geografía",
    }
  }

  pub fn all() -> [Subject; 2] {
    [Subject::Historia, Subject::Geografia]
  }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
  Basic,
  #[default]
  Intermediate,
  Advanced,
}

impl Difficulty {
  /// Weight used by the difficulty-weighted score.
  pub fn weight(&self) -> f64 {
    match self {
      Difficulty::Basic => 1.0,
      Difficulty::Intermediate => 1.5,
      Difficulty::Advanced => 2.0,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Difficulty::Basic => "basic",
      Difficulty::Intermediate => "intermediate",
      Difficulty::Advanced => "advanced",
    }
  }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
  #[serde(alias = "multiple-choice")]
  MultipleChoice,
  #[serde(alias = "true-false")]
  TrueFalse,
  #[serde(alias = "open-ended")]
  OpenEnded,
  Matching,
  #[serde(alias = "order")]
  Ordering,
}

/// An answer (or answer key) whose shape depends on the question kind.
///
/// `Other` swallows anything that does not fit one of the known shapes so a
/// malformed payload never fails deserialization of the whole submission.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AnswerValue {
  Flag(bool),
  Text(String),
  Sequence(Vec<String>),
  Mapping(BTreeMap<String, String>),
  Other(serde_json::Value),
}

impl AnswerValue {
  /// Empty text, sequence or mapping counts as no answer at all.
  pub fn is_blank(&self) -> bool {
    match self {
      AnswerValue::Flag(_) => false,
      AnswerValue::Text(s) => s.trim().is_empty(),
      AnswerValue::Sequence(v) => v.is_empty(),
      AnswerValue::Mapping(m) => m.is_empty(),
      AnswerValue::Other(v) => v.is_null(),
    }
  }

  pub fn as_text(&self) -> Option<&str> {
    match self {
      AnswerValue::Text(s) => Some(s),
      _ => None,
    }
  }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct QuestionOption {
  pub id: String,
  pub text: String,
}

/// One assessable item. Immutable once its assessment is generated.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Question {
  pub id: String,
  pub text: String,
  pub kind: QuestionKind,
  pub topic: Topic,
  #[serde(default)]
  pub difficulty: Difficulty,
  #[serde(default = "default_points")]
  pub points: u32,
  pub correct_answer: AnswerValue,
  #[serde(default)]
  pub options: Vec<QuestionOption>,
  #[serde(default)]
  pub matches: Vec<QuestionOption>,
  #[serde(default)]
  pub model_answer: Option<String>,
  #[serde(default)]
  pub explanation: String,
}

fn default_points() -> u32 {
  DEFAULT_POINTS
}

impl Question {
  /// Reference text an open-ended answer is compared against.
  pub fn reference_answer(&self) -> String {
    self
      .model_answer
      .clone()
      .or_else(|| self.correct_answer.as_text().map(str::to_string))
      .unwrap_or_default()
  }
}

/// A student's answer to one question as received from the client.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Response {
  pub question_id: String,
  #[serde(default)]
  pub answer: Option<AnswerValue>,
  /// Seconds spent on the question.
  #[serde(default)]
  pub time_spent: f64,
}

/// A response after scoring.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ScoredResponse {
  pub question_id: String,
  pub topic: Topic,
  pub answer: Option<AnswerValue>,
  pub time_spent: f64,
  pub is_correct: bool,
  pub score: u32,
  pub max_points: u32,
  #[serde(default)]
  pub feedback: Option<String>,
}

/// Aggregate over one assessment for one topic.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TopicPerformance {
  pub topic: Topic,
  pub correct_count: u32,
  pub total_count: u32,
  pub score: f64,
}

impl TopicPerformance {
  pub fn new(topic: impl Into<Topic>) -> Self {
    Self { topic: topic.into(), correct_count: 0, total_count: 0, score: 0.0 }
  }

  pub fn record(&mut self, correct: bool) {
    self.total_count += 1;
    if correct {
      self.correct_count += 1;
    }
    self.score = if self.total_count == 0 {
      0.0
    } else {
      100.0 * f64::from(self.correct_count) / f64::from(self.total_count)
    };
  }
}

/// Smoothed proficiency for one topic inside a knowledge area.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TopicProficiency {
  pub topic: Topic,
  pub proficiency: f64,
  pub last_assessment: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeArea {
  pub area: String,
  pub proficiency: f64,
  #[serde(default)]
  pub strengths: Vec<Topic>,
  #[serde(default)]
  pub weaknesses: Vec<Topic>,
  #[serde(default)]
  pub topics: Vec<TopicProficiency>,
  pub last_assessment: DateTime<Utc>,
}

impl KnowledgeArea {
  pub fn new(area: impl Into<String>, proficiency: f64, at: DateTime<Utc>) -> Self {
    Self {
      area: area.into(),
      proficiency,
      strengths: Vec::new(),
      weaknesses: Vec::new(),
      topics: Vec::new(),
      last_assessment: at,
    }
  }

  pub fn matches(&self, area: &str) -> bool {
    self.area.to_lowercase() == area.to_lowercase()
  }
}

/// History entry appended to the student after every analyzed assessment.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CompletedAssessment {
  pub assessment_id: String,
  pub subject: Subject,
  pub topics: Vec<Topic>,
  pub completed_at: DateTime<Utc>,
  pub score: u32,
  pub correct_answers: u32,
  pub total_questions: u32,
  pub strengths: Vec<Topic>,
  pub weaknesses: Vec<Topic>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Student {
  pub id: String,
  pub name: String,
  pub email: String,
  pub knowledge_areas: Vec<KnowledgeArea>,
  #[serde(default)]
  pub assessment_history: Vec<CompletedAssessment>,
  /// Optimistic concurrency token, bumped by the store on every save.
  #[serde(default)]
  pub version: u64,
}

impl Student {
  /// New student with one zero-proficiency area per curriculum subject.
  pub fn register(name: impl Into<String>, email: impl Into<String>) -> Self {
    let now = Utc::now();
    Self {
      id: uuid::Uuid::new_v4().to_string(),
      name: name.into(),
      email: email.into(),
      knowledge_areas: Subject::all()
        .iter()
        .map(|s| KnowledgeArea::new(s.area_name(), 0.0, now))
        .collect(),
      assessment_history: Vec::new(),
      version: 0,
    }
  }

  pub fn mean_historical_score(&self) -> f64 {
    if self.assessment_history.is_empty() {
      return 0.0;
    }
    let total: u64 = self.assessment_history.iter().map(|a| u64::from(a.score)).sum();
    total as f64 / self.assessment_history.len() as f64
  }
}

/// Lifecycle of an assessment. The client-side in-progress phase is never persisted.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentStatus {
  Generated,
  Submitted,
  Scored,
  Analyzed,
}

impl AssessmentStatus {
  pub fn accepts_submission(&self) -> bool {
    matches!(self, AssessmentStatus::Generated)
  }
}

/// Where the question set of an assessment came from.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuestionSource {
  Generated,
  Backup,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Assessment {
  pub id: String,
  pub student_id: String,
  pub subject: Subject,
  pub difficulty: Difficulty,
  pub topics: Vec<Topic>,
  pub questions: Vec<Question>,
  pub question_source: QuestionSource,
  #[serde(default)]
  pub responses: Vec<ScoredResponse>,
  pub status: AssessmentStatus,
  #[serde(default)]
  pub overall_score: Option<u32>,
  #[serde(default)]
  pub feedback: Option<String>,
  pub created_at: DateTime<Utc>,
  #[serde(default)]
  pub completed_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub version: u64,
}

impl Assessment {
  pub fn question(&self, id: &str) -> Option<&Question> {
    self.questions.iter().find(|q| q.id == id)
  }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
  #[default]
  Lesson,
  Video,
  Document,
  Exercise,
  Link,
  Article,
}

/// Catalog items come from the store; generated ones were synthesized by the provider.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResourceSource {
  #[default]
  Catalog,
  Generated,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Resource {
  pub id: String,
  pub title: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub kind: ResourceKind,
  #[serde(default)]
  pub subject: Option<Subject>,
  pub topics: Vec<Topic>,
  #[serde(default)]
  pub url: String,
  #[serde(default)]
  pub difficulty: Difficulty,
  #[serde(default)]
  pub duration_minutes: u32,
  #[serde(default)]
  pub source: ResourceSource,
}

impl Resource {
  pub fn covers(&self, topic: &str) -> bool {
    self.topics.iter().any(|t| t == topic)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn answer_value_parses_each_shape() {
    let v: AnswerValue = serde_json::from_str("\"b\"").unwrap();
    assert_eq!(v, AnswerValue::Text("b".into()));
    let v: AnswerValue = serde_json::from_str("[\"a\",\"c\"]").unwrap();
    assert_eq!(v, AnswerValue::Sequence(vec!["a".into(), "c".into()]));
    let v: AnswerValue = serde_json::from_str("{\"a\":\"2\"}").unwrap();
    assert!(matches!(v, AnswerValue::Mapping(_)));
    let v: AnswerValue = serde_json::from_str("true").unwrap();
    assert_eq!(v, AnswerValue::Flag(true));
    let v: AnswerValue = serde_json::from_str("42").unwrap();
    assert!(matches!(v, AnswerValue::Other(_)));
  }

  #[test]
  fn question_kind_accepts_legacy_spellings() {
    let k: QuestionKind = serde_json::from_str("\"multiple-choice\"").unwrap();
    assert_eq!(k, QuestionKind::MultipleChoice);
    let k: QuestionKind = serde_json::from_str("\"order\"").unwrap();
    assert_eq!(k, QuestionKind::Ordering);
  }

  #[test]
  fn topic_performance_guards_empty_topic() {
    let mut p = TopicPerformance::new("Hidrografía");
    assert_eq!(p.score, 0.0);
    for ok in [true, true, true, true, false] {
      p.record(ok);
    }
    assert_eq!((p.correct_count, p.total_count), (4, 5));
    assert!((p.score - 80.0).abs() < 1e-9);
  }

  #[test]
  fn registration_seeds_curriculum_areas() {
    let s = Student::register("Ana", "ana@example.com");
    let names: Vec<_> = s.knowledge_areas.iter().map(|a| a.area.as_str()).collect();
    assert_eq!(names, vec!["Historia", "Geografía"]);
    assert!(s.knowledge_areas.iter().all(|a| a.proficiency == 0.0));
    assert_eq!(s.mean_historical_score(), 0.0);
  }
}
