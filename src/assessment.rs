//! Assessment lifecycle: generation, submission and analysis.
//!
//! An assessment moves `Generated → Submitted → Scored → Analyzed`, and every
//! transition is persisted through a versioned save. Only a `Generated`
//! assessment accepts a submission, so a replay (or a concurrent duplicate
//! that loses the version race) is a `Conflict` and never scores twice.

use std::{collections::HashSet, sync::Arc, time::Duration};

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{
  Assessment, AssessmentStatus, Difficulty, Question, QuestionSource, Response, Student, Subject, Topic,
  TopicPerformance,
};
use crate::error::TutorError;
use crate::proficiency::{Classification, ProficiencyTracker, ProficiencyUpdate, STRENGTH_THRESHOLD};
use crate::provider::{is_well_formed, ContentProvider, NarrativeContext, OpenEndedEvaluation};
use crate::recommend::{NarrativeSource, RecommendationSelector, Recommendations};
use crate::scoring::{aggregate_by_topic, analyze_patterns, overall_score, weighted_score, ResponsePatterns, ScoringEngine};
use crate::seeds::{backup_questions, curriculum_topics};
use crate::store::PersistenceStore;
use crate::util::bounded;

pub const DEFAULT_QUESTION_COUNT: usize = 5;
pub const MAX_QUESTION_COUNT: usize = 20;
/// Topics tested by an assessment whose topics were not requested.
pub const ADAPTIVE_TOPIC_COUNT: usize = 3;
/// Area proficiency under which generated assessments are basic.
const BASIC_BELOW: f64 = 40.0;
pub const FEEDBACK_FALLBACK: &str = "No se pudo generar retroalimentación personalizada. Por favor, revisa tu desempeño en cada tema y enfócate en las áreas que necesitan mejora.";

/// Everything the client gets back from one successful submission.
#[derive(Clone, Debug, Serialize)]
pub struct SubmissionReport {
  pub assessment: Assessment,
  pub overall_score: u32,
  pub weighted_score: f64,
  pub topic_performance: Vec<TopicPerformance>,
  pub classification: Classification,
  pub patterns: ResponsePatterns,
  pub feedback: String,
  pub feedback_source: NarrativeSource,
  pub recommendations: Recommendations,
}

pub struct AssessmentService {
  store: Arc<dyn PersistenceStore>,
  provider: Arc<dyn ContentProvider>,
  scoring: ScoringEngine,
  tracker: Arc<ProficiencyTracker>,
  recommender: Arc<RecommendationSelector>,
  deadline: Duration,
}

impl AssessmentService {
  pub fn new(
    store: Arc<dyn PersistenceStore>,
    provider: Arc<dyn ContentProvider>,
    scoring: ScoringEngine,
    tracker: Arc<ProficiencyTracker>,
    recommender: Arc<RecommendationSelector>,
    deadline: Duration,
  ) -> Self {
    Self { store, provider, scoring, tracker, recommender, deadline }
  }

  /// Build and persist a new assessment for `student_id`.
  ///
  /// With no `topics`, the weaknesses of the student's area for `subject` are
  /// tested, or a slice of the curriculum when there are none. With no
  /// `difficulty`, it follows the area's proficiency. Questions are requested
  /// per topic. If any request fails or nothing valid comes back, the
  /// built-in set for `subject` is used instead.
  #[instrument(level = "info", skip(self, topics), fields(topics = topics.len()))]
  pub async fn generate(
    &self,
    student_id: &str,
    subject: Subject,
    difficulty: Option<Difficulty>,
    topics: Vec<Topic>,
    count: usize,
  ) -> Result<Assessment, TutorError> {
    let student = self.store.find_student(student_id).await?;
    let count = count.clamp(1, MAX_QUESTION_COUNT);
    let requested = dedup(topics.into_iter().filter(|t| !t.trim().is_empty()));
    let area = student.knowledge_areas.iter().find(|a| a.matches(subject.area_name()));
    let difficulty = difficulty.unwrap_or_else(|| area.map(|a| difficulty_for(a.proficiency)).unwrap_or_default());

    let adaptive = requested.is_empty();
    let topics = if adaptive { adaptive_topics(&student, subject) } else { requested };
    debug!(target: "assessment", adaptive, ?topics, ?difficulty, "Assessment topics chosen");

    let (questions, question_source) = match self.generated_questions(&topics, difficulty, count).await {
      Some(qs) => (qs, QuestionSource::Generated),
      None => (backup_questions(subject, difficulty), QuestionSource::Backup),
    };
    // Chosen topics only describe the assessment when the provider wrote it.
    let topics = if adaptive && question_source == QuestionSource::Backup {
      dedup(questions.iter().map(|q| q.topic.clone()))
    } else {
      topics
    };

    let assessment = Assessment {
      id: Uuid::new_v4().to_string(),
      student_id: student_id.to_string(),
      subject,
      difficulty,
      topics,
      questions,
      question_source,
      responses: Vec::new(),
      status: AssessmentStatus::Generated,
      overall_score: None,
      feedback: None,
      created_at: Utc::now(),
      completed_at: None,
      version: 0,
    };
    let saved = self.store.save_assessment(assessment).await?;
    info!(
      target: "assessment",
      assessment_id = %saved.id,
      questions = saved.questions.len(),
      source = ?saved.question_source,
      "Assessment generated"
    );
    Ok(saved)
  }

  async fn generated_questions(&self, topics: &[Topic], difficulty: Difficulty, count: usize) -> Option<Vec<Question>> {
    if topics.is_empty() {
      debug!(target: "assessment", "No topics requested; using backup questions");
      return None;
    }
    let per_topic = count.div_ceil(topics.len());
    let calls = topics
      .iter()
      .map(|t| bounded(self.deadline, self.provider.generate_questions(t, difficulty, per_topic)));

    let mut questions = Vec::new();
    for (topic, result) in topics.iter().zip(join_all(calls).await) {
      match result {
        Ok(qs) => questions.extend(qs.into_iter().filter(is_well_formed)),
        Err(e) => {
          warn!(target: "assessment", %topic, error = %e, "Question generation failed; using backup questions");
          return None;
        }
      }
    }
    if questions.is_empty() {
      warn!(target: "assessment", "Provider returned no usable questions; using backup questions");
      return None;
    }
    questions.truncate(count);
    for (i, q) in questions.iter_mut().enumerate() {
      q.id = format!("q{}", i + 1);
    }
    Some(questions)
  }

  pub async fn get(&self, assessment_id: &str) -> Result<Assessment, TutorError> {
    self.store.find_assessment(assessment_id).await
  }

  /// Score, analyze and persist one submission. All-or-nothing per assessment id.
  #[instrument(level = "info", skip(self, responses), fields(%assessment_id, responses = responses.len()))]
  pub async fn submit(&self, assessment_id: &str, responses: Vec<Response>) -> Result<SubmissionReport, TutorError> {
    let mut assessment = self.store.find_assessment(assessment_id).await?;
    if !assessment.status.accepts_submission() {
      warn!(target: "assessment", %assessment_id, status = ?assessment.status, "Rejected resubmission");
      return Err(TutorError::Conflict(format!(
        "assessment {assessment_id} was already submitted (status {:?})",
        assessment.status
      )));
    }
    check_responses(&assessment, &responses)?;

    assessment.status = AssessmentStatus::Submitted;
    let mut assessment = self.store.save_assessment(assessment).await?;

    let scored = self.scoring.score_all(&assessment.questions, &responses).await;
    let overall = overall_score(&scored);
    let weighted = weighted_score(&assessment.questions, &scored);
    let topic_performance = aggregate_by_topic(&scored);
    let patterns = analyze_patterns(&scored);
    let completed_at = Utc::now();

    let update = ProficiencyUpdate {
      assessment_id: assessment.id.clone(),
      subject: assessment.subject,
      topics: assessment.topics.clone(),
      performances: topic_performance.clone(),
      overall_score: overall,
      correct_answers: scored.iter().filter(|r| r.is_correct).count() as u32,
      total_questions: scored.len() as u32,
      completed_at,
    };

    assessment.responses = scored;
    assessment.overall_score = Some(overall);
    assessment.completed_at = Some(completed_at);
    assessment.status = AssessmentStatus::Scored;
    let mut assessment = self.store.save_assessment(assessment).await?;
    info!(target: "assessment", %assessment_id, overall, weighted, "Assessment scored");

    let (student, classification) = self.tracker.record_assessment(&assessment.student_id, &update).await?;
    let (feedback, feedback_source) = self.feedback(&student, &assessment, &topic_performance, &classification).await;
    let recommendations = self.recommender.recommend(&student).await?;

    assessment.feedback = Some(feedback.clone());
    assessment.status = AssessmentStatus::Analyzed;
    let assessment = self.store.save_assessment(assessment).await?;
    info!(target: "assessment", %assessment_id, "Assessment analyzed");

    Ok(SubmissionReport {
      assessment,
      overall_score: overall,
      weighted_score: weighted,
      topic_performance,
      classification,
      patterns,
      feedback,
      feedback_source,
      recommendations,
    })
  }

  async fn feedback(
    &self,
    student: &Student,
    assessment: &Assessment,
    topics: &[TopicPerformance],
    classification: &Classification,
  ) -> (String, NarrativeSource) {
    let context = NarrativeContext::AssessmentFeedback {
      student_name: student.name.clone(),
      subject: assessment.subject.area_name().to_string(),
      overall_score: assessment.overall_score.unwrap_or_default(),
      strengths: classification.strengths.clone(),
      weaknesses: classification.weaknesses.clone(),
      topics: topics.to_vec(),
    };
    match bounded(self.deadline, self.provider.generate_narrative(&context)).await {
      Ok(text) => (text, NarrativeSource::Generated),
      Err(e) => {
        error!(target: "assessment", assessment_id = %assessment.id, error = %e, "Feedback generation failed; using fallback");
        (FEEDBACK_FALLBACK.into(), NarrativeSource::Fallback)
      }
    }
  }

  /// Grade one free-text answer outside of any assessment.
  #[instrument(level = "info", skip_all, fields(answer_len = student_answer.len()))]
  pub async fn evaluate_open_ended(&self, student_answer: &str, model_answer: &str) -> Result<OpenEndedEvaluation, TutorError> {
    if student_answer.trim().is_empty() || model_answer.trim().is_empty() {
      return Err(TutorError::InvalidSubmission("both answers must be non-empty".into()));
    }
    Ok(self.scoring.grade_open_ended(student_answer, model_answer).await)
  }
}

/// Every response must name a question of this assessment, at most once.
fn check_responses(assessment: &Assessment, responses: &[Response]) -> Result<(), TutorError> {
  let mut seen = HashSet::new();
  for r in responses {
    if assessment.question(&r.question_id).is_none() {
      return Err(TutorError::not_found("question", &r.question_id));
    }
    if !seen.insert(r.question_id.as_str()) {
      return Err(TutorError::InvalidSubmission(format!("duplicate response for question {}", r.question_id)));
    }
  }
  Ok(())
}

/// Difficulty matching a smoothed area proficiency.
pub fn difficulty_for(proficiency: f64) -> Difficulty {
  if proficiency < BASIC_BELOW {
    Difficulty::Basic
  } else if proficiency < STRENGTH_THRESHOLD {
    Difficulty::Intermediate
  } else {
    Difficulty::Advanced
  }
}

/// Weak topics of the subject's area, else a curriculum window that moves with each completed assessment.
fn adaptive_topics(student: &Student, subject: Subject) -> Vec<Topic> {
  let weaknesses = student
    .knowledge_areas
    .iter()
    .find(|a| a.matches(subject.area_name()))
    .map(|a| a.weaknesses.clone())
    .unwrap_or_default();
  if !weaknesses.is_empty() {
    return dedup(weaknesses.into_iter()).into_iter().take(ADAPTIVE_TOPIC_COUNT).collect();
  }
  let curriculum = curriculum_topics(subject);
  let offset = (student.assessment_history.len() * ADAPTIVE_TOPIC_COUNT) % curriculum.len().max(1);
  curriculum
    .iter()
    .cycle()
    .skip(offset)
    .take(ADAPTIVE_TOPIC_COUNT.min(curriculum.len()))
    .map(|t| t.to_string())
    .collect()
}

fn dedup(topics: impl Iterator<Item = Topic>) -> Vec<Topic> {
  let mut out: Vec<Topic> = Vec::new();
  for t in topics {
    if !out.contains(&t) {
      out.push(t);
    }
  }
  out
}
