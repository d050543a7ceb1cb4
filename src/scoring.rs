//! Per-question correctness, per-topic aggregation and overall scores.
//!
//! Closed item kinds are scored by pure functions. Open-ended answers are
//! graded by the content provider; when it fails the answer gets a fixed
//! sub-score of 50 and generic feedback so submission never blocks on it.

use std::{sync::Arc, time::Duration};

use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::domain::{AnswerValue, Question, QuestionKind, Response, ScoredResponse, TopicPerformance};
use crate::provider::{ContentProvider, OpenEndedEvaluation};
use crate::util::bounded;

/// Sub-score used when the open-ended evaluator is unavailable.
pub const OPEN_ENDED_FALLBACK_SUB_SCORE: u8 = 50;
/// An open-ended answer counts as correct for topic aggregation from this sub-score on.
pub const OPEN_ENDED_PASS_MARK: u8 = 60;
pub const OPEN_ENDED_FALLBACK_FEEDBACK: &str = "No se pudo realizar una evaluación detallada de tu respuesta. Revisa que tu respuesta aborde los puntos principales del tema y compárala con la respuesta modelo.";

const QUICK_ANSWER_SECS: f64 = 15.0;
const SLOW_ANSWER_SECS: f64 = 120.0;
const CONSISTENT_ERROR_COUNT: u32 = 2;

/// The answer does not have the shape its question kind requires.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
  #[error("{kind:?} question expects {expected}, got {actual}")]
  WrongShape { kind: QuestionKind, expected: &'static str, actual: &'static str },
  #[error("expected {expected} entries, got {actual}")]
  WrongLength { expected: usize, actual: usize },
  #[error("mapping keys differ from the answer key")]
  KeyMismatch,
}

fn shape_name(v: &AnswerValue) -> &'static str {
  match v {
    AnswerValue::Flag(_) => "flag",
    AnswerValue::Text(_) => "text",
    AnswerValue::Sequence(_) => "sequence",
    AnswerValue::Mapping(_) => "mapping",
    AnswerValue::Other(_) => "unknown",
  }
}

/// Outcome of the synchronous evaluation step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Evaluation {
  Scored { is_correct: bool, score: u32 },
  /// Open-ended: grading belongs to the external evaluator.
  Deferred,
}

/// Check a closed answer against the key. Open-ended questions are not handled here.
pub fn check_answer(question: &Question, answer: &AnswerValue) -> Result<bool, ValidationError> {
  let wrong_shape = |expected| ValidationError::WrongShape {
    kind: question.kind,
    expected,
    actual: shape_name(answer),
  };

  match question.kind {
    QuestionKind::MultipleChoice | QuestionKind::TrueFalse => match (&question.correct_answer, answer) {
      (AnswerValue::Text(key), AnswerValue::Text(given)) => Ok(key == given),
      (AnswerValue::Flag(key), AnswerValue::Flag(given)) => Ok(key == given),
      _ => Err(wrong_shape("option identifier")),
    },
    QuestionKind::Ordering => {
      let AnswerValue::Sequence(key) = &question.correct_answer else {
        return Err(wrong_shape("sequence"));
      };
      let AnswerValue::Sequence(given) = answer else {
        return Err(wrong_shape("sequence"));
      };
      if key.len() != given.len() {
        return Err(ValidationError::WrongLength { expected: key.len(), actual: given.len() });
      }
      Ok(key == given)
    }
    QuestionKind::Matching => {
      let AnswerValue::Mapping(key) = &question.correct_answer else {
        return Err(wrong_shape("mapping"));
      };
      let AnswerValue::Mapping(given) = answer else {
        return Err(wrong_shape("mapping"));
      };
      if !key.keys().eq(given.keys()) {
        return Err(ValidationError::KeyMismatch);
      }
      Ok(key == given)
    }
    QuestionKind::OpenEnded => Err(wrong_shape("closed item")),
  }
}

/// Pure evaluation of one answer. Missing or blank answers score zero for every kind.
pub fn evaluate(question: &Question, answer: Option<&AnswerValue>) -> Evaluation {
  let Some(answer) = answer.filter(|a| !a.is_blank()) else {
    return Evaluation::Scored { is_correct: false, score: 0 };
  };
  if question.kind == QuestionKind::OpenEnded {
    return match answer {
      AnswerValue::Text(_) => Evaluation::Deferred,
      _ => Evaluation::Scored { is_correct: false, score: 0 },
    };
  }
  let is_correct = match check_answer(question, answer) {
    Ok(ok) => ok,
    Err(e) => {
      debug!(target: "assessment", question_id = %question.id, error = %e, "Answer failed validation; scored as incorrect");
      false
    }
  };
  Evaluation::Scored { is_correct, score: if is_correct { question.points } else { 0 } }
}

/// Points earned for an open-ended answer graded with `sub_score`.
pub fn open_ended_points(sub_score: u8, points: u32) -> u32 {
  (f64::from(sub_score.min(100)) / 100.0 * f64::from(points)).round() as u32
}

/// Group scored responses by topic in first-seen order.
pub fn aggregate_by_topic(scored: &[ScoredResponse]) -> Vec<TopicPerformance> {
  let mut out: Vec<TopicPerformance> = Vec::new();
  for r in scored {
    let idx = match out.iter().position(|p| p.topic == r.topic) {
      Some(i) => i,
      None => {
        out.push(TopicPerformance::new(r.topic.clone()));
        out.len() - 1
      }
    };
    out[idx].record(r.is_correct);
  }
  out
}

/// round(100 × earned / max); 0 when nothing was at stake.
pub fn overall_score(scored: &[ScoredResponse]) -> u32 {
  let max: u64 = scored.iter().map(|r| u64::from(r.max_points)).sum();
  if max == 0 {
    return 0;
  }
  let earned: u64 = scored.iter().map(|r| u64::from(r.score.min(r.max_points))).sum();
  (100.0 * earned as f64 / max as f64).round() as u32
}

/// Correctness weighted by question difficulty, 0..=100.
pub fn weighted_score(questions: &[Question], scored: &[ScoredResponse]) -> f64 {
  let mut total = 0.0;
  let mut earned = 0.0;
  for r in scored {
    let Some(q) = questions.iter().find(|q| q.id == r.question_id) else { continue };
    let w = q.difficulty.weight();
    total += w;
    if r.is_correct {
      earned += w;
    }
  }
  if total == 0.0 { 0.0 } else { 100.0 * earned / total }
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct ResponsePatterns {
  pub quick_answers: u32,
  pub slow_answers: u32,
  /// (topic, wrong answers) in first-seen order.
  pub errors_by_topic: Vec<(String, u32)>,
  /// Topics with repeated errors.
  pub improvement_areas: Vec<String>,
  pub average_response_time: f64,
}

pub fn analyze_patterns(scored: &[ScoredResponse]) -> ResponsePatterns {
  let mut p = ResponsePatterns::default();
  for r in scored {
    if r.time_spent < QUICK_ANSWER_SECS {
      p.quick_answers += 1;
    }
    if r.time_spent > SLOW_ANSWER_SECS {
      p.slow_answers += 1;
    }
    if r.is_correct {
      continue;
    }
    let count = match p.errors_by_topic.iter_mut().find(|(t, _)| *t == r.topic) {
      Some((_, n)) => {
        *n += 1;
        *n
      }
      None => {
        p.errors_by_topic.push((r.topic.clone(), 1));
        1
      }
    };
    if count >= CONSISTENT_ERROR_COUNT && !p.improvement_areas.contains(&r.topic) {
      p.improvement_areas.push(r.topic.clone());
    }
  }
  if !scored.is_empty() {
    p.average_response_time = scored.iter().map(|r| r.time_spent).sum::<f64>() / scored.len() as f64;
  }
  p
}

/// Scores responses, calling out to the provider for open-ended items.
#[derive(Clone)]
pub struct ScoringEngine {
  provider: Arc<dyn ContentProvider>,
  deadline: Duration,
}

impl ScoringEngine {
  pub fn new(provider: Arc<dyn ContentProvider>, deadline: Duration) -> Self {
    Self { provider, deadline }
  }

  /// Grade a free-text answer, falling back to the fixed sub-score on any provider failure.
  #[instrument(level = "info", skip(self, student_answer, model_answer), fields(answer_len = student_answer.len()))]
  pub async fn grade_open_ended(&self, student_answer: &str, model_answer: &str) -> OpenEndedEvaluation {
    match bounded(self.deadline, self.provider.score_open_ended(student_answer, model_answer)).await {
      Ok(e) => e,
      Err(e) => {
        warn!(target: "assessment", error = %e, "Open-ended evaluation failed; using fallback sub-score");
        OpenEndedEvaluation {
          sub_score: OPEN_ENDED_FALLBACK_SUB_SCORE,
          feedback: OPEN_ENDED_FALLBACK_FEEDBACK.into(),
          strengths: vec!["Respuesta proporcionada".into()],
          suggestions: vec!["Revisar el material de estudio y la respuesta modelo".into()],
        }
      }
    }
  }

  /// Score one response to its question.
  pub async fn score_response(&self, question: &Question, response: Option<&Response>) -> ScoredResponse {
    let answer = response.and_then(|r| r.answer.as_ref());
    let mut scored = ScoredResponse {
      question_id: question.id.clone(),
      topic: question.topic.clone(),
      answer: answer.cloned(),
      time_spent: response.map(|r| r.time_spent.max(0.0)).unwrap_or(0.0),
      is_correct: false,
      score: 0,
      max_points: question.points,
      feedback: None,
    };

    match evaluate(question, answer) {
      Evaluation::Scored { is_correct, score } => {
        scored.is_correct = is_correct;
        scored.score = score;
      }
      Evaluation::Deferred => {
        let text = answer.and_then(AnswerValue::as_text).unwrap_or_default();
        let grade = self.grade_open_ended(text, &question.reference_answer()).await;
        scored.is_correct = grade.sub_score >= OPEN_ENDED_PASS_MARK;
        scored.score = open_ended_points(grade.sub_score, question.points);
        scored.feedback = Some(grade.feedback);
      }
    }
    scored
  }

  /// Score every question in presentation order. Open-ended gradings run concurrently;
  /// this resolves once the slowest of them has a final score.
  #[instrument(level = "info", skip_all, fields(questions = questions.len(), responses = responses.len()))]
  pub async fn score_all(&self, questions: &[Question], responses: &[Response]) -> Vec<ScoredResponse> {
    let futs = questions.iter().map(|q| {
      let r = responses.iter().find(|r| r.question_id == q.id);
      self.score_response(q, r)
    });
    join_all(futs).await
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use proptest::prelude::*;

  use super::*;
  use crate::domain::Difficulty;
  use crate::provider::testing::ScriptedProvider;

  fn q(id: &str, kind: QuestionKind, topic: &str, key: AnswerValue, points: u32) -> Question {
    Question {
      id: id.into(),
      text: format!("question {id}"),
      kind,
      topic: topic.into(),
      difficulty: Difficulty::Intermediate,
      points,
      correct_answer: key,
      options: vec![],
      matches: vec![],
      model_answer: None,
      explanation: String::new(),
    }
  }

  fn mc(id: &str, topic: &str, key: &str) -> Question {
    q(id, QuestionKind::MultipleChoice, topic, AnswerValue::Text(key.into()), 10)
  }

  fn resp(id: &str, answer: Option<AnswerValue>) -> Response {
    Response { question_id: id.into(), answer, time_spent: 30.0 }
  }

  fn text(s: &str) -> AnswerValue {
    AnswerValue::Text(s.into())
  }

  fn mapping(pairs: &[(&str, &str)]) -> AnswerValue {
    AnswerValue::Mapping(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect::<BTreeMap<_, _>>())
  }

  fn engine(p: ScriptedProvider) -> ScoringEngine {
    ScoringEngine::new(Arc::new(p), Duration::from_secs(5))
  }

  #[test]
  fn multiple_choice_is_exact_match() {
    let question = mc("q1", "Hidrografía", "a");
    assert_eq!(evaluate(&question, Some(&text("a"))), Evaluation::Scored { is_correct: true, score: 10 });
    assert_eq!(evaluate(&question, Some(&text("b"))), Evaluation::Scored { is_correct: false, score: 0 });
    assert_eq!(evaluate(&question, Some(&text("A"))), Evaluation::Scored { is_correct: false, score: 0 });
  }

  #[test]
  fn missing_or_blank_answer_scores_zero_for_every_kind() {
    let open = q("q9", QuestionKind::OpenEnded, "T", text("modelo"), 15);
    for question in [mc("q1", "T", "a"), open] {
      assert_eq!(evaluate(&question, None), Evaluation::Scored { is_correct: false, score: 0 });
      assert_eq!(evaluate(&question, Some(&text("  "))), Evaluation::Scored { is_correct: false, score: 0 });
    }
  }

  #[test]
  fn matching_requires_same_keys_and_values() {
    let question = q("q3", QuestionKind::Matching, "Geografía Política", mapping(&[("a", "2"), ("b", "1")]), 10);
    assert_eq!(evaluate(&question, Some(&mapping(&[("b", "1"), ("a", "2")]))), Evaluation::Scored { is_correct: true, score: 10 });
    assert_eq!(evaluate(&question, Some(&mapping(&[("a", "2")]))), Evaluation::Scored { is_correct: false, score: 0 });
    assert_eq!(evaluate(&question, Some(&mapping(&[("a", "2"), ("b", "3")]))), Evaluation::Scored { is_correct: false, score: 0 });
    assert_eq!(evaluate(&question, Some(&text("a2b1"))), Evaluation::Scored { is_correct: false, score: 0 });
    assert_eq!(check_answer(&question, &mapping(&[("a", "2"), ("c", "1")])), Err(ValidationError::KeyMismatch));
  }

  #[test]
  fn ordering_is_elementwise_and_length_checked() {
    let key = AnswerValue::Sequence(vec!["a".into(), "c".into(), "b".into()]);
    let question = q("q5", QuestionKind::Ordering, "Revolución Industrial", key.clone(), 15);
    assert_eq!(evaluate(&question, Some(&key)), Evaluation::Scored { is_correct: true, score: 15 });
    let swapped = AnswerValue::Sequence(vec!["a".into(), "b".into(), "c".into()]);
    assert_eq!(evaluate(&question, Some(&swapped)), Evaluation::Scored { is_correct: false, score: 0 });
    let short = AnswerValue::Sequence(vec!["a".into(), "c".into()]);
    assert_eq!(check_answer(&question, &short), Err(ValidationError::WrongLength { expected: 3, actual: 2 }));
  }

  #[test]
  fn unknown_shapes_never_panic() {
    let question = mc("q1", "T", "a");
    let weird = AnswerValue::Other(serde_json::json!(42));
    assert_eq!(evaluate(&question, Some(&weird)), Evaluation::Scored { is_correct: false, score: 0 });
  }

  #[test]
  fn open_ended_is_deferred() {
    let question = q("q4", QuestionKind::OpenEnded, "T", text("modelo"), 15);
    assert_eq!(evaluate(&question, Some(&text("mi respuesta"))), Evaluation::Deferred);
    let list = AnswerValue::Sequence(vec!["x".into()]);
    assert_eq!(evaluate(&question, Some(&list)), Evaluation::Scored { is_correct: false, score: 0 });
  }

  #[test]
  fn open_ended_points_round_sub_score() {
    assert_eq!(open_ended_points(80, 15), 12);
    assert_eq!(open_ended_points(50, 15), 8);
    assert_eq!(open_ended_points(100, 10), 10);
    assert_eq!(open_ended_points(0, 10), 0);
  }

  #[tokio::test]
  async fn three_of_five_correct_scores_sixty() {
    let questions: Vec<_> = (1..=5).map(|i| mc(&format!("q{i}"), "Historia Antigua", "a")).collect();
    let responses: Vec<_> = (1..=5)
      .map(|i| resp(&format!("q{i}"), Some(text(if i <= 3 { "a" } else { "b" }))))
      .collect();
    let scored = engine(ScriptedProvider::failing()).score_all(&questions, &responses).await;
    assert_eq!(overall_score(&scored), 60);
  }

  #[tokio::test]
  async fn open_ended_uses_provider_sub_score() {
    let question = q("q4", QuestionKind::OpenEnded, "Geografía de América", text("modelo"), 15);
    let r = resp("q4", Some(text("El canal conecta dos océanos")));
    let scored = engine(ScriptedProvider::failing().with_open_ended(80)).score_response(&question, Some(&r)).await;
    assert_eq!(scored.score, 12);
    assert!(scored.is_correct);
    assert_eq!(scored.feedback.as_deref(), Some("graded"));
  }

  #[tokio::test]
  async fn open_ended_falls_back_when_provider_fails() {
    let question = q("q4", QuestionKind::OpenEnded, "T", text("modelo"), 15);
    let r = resp("q4", Some(text("algo")));
    let scored = engine(ScriptedProvider::failing()).score_response(&question, Some(&r)).await;
    assert_eq!(scored.score, 8);
    assert!(!scored.is_correct);
    assert_eq!(scored.feedback.as_deref(), Some(OPEN_ENDED_FALLBACK_FEEDBACK));
  }

  #[tokio::test]
  async fn score_all_keeps_question_order_and_fills_missing() {
    let questions = vec![mc("q1", "A", "a"), mc("q2", "B", "b"), mc("q3", "A", "c")];
    let responses = vec![resp("q3", Some(text("c"))), resp("q1", Some(text("a")))];
    let scored = engine(ScriptedProvider::failing()).score_all(&questions, &responses).await;
    let ids: Vec<_> = scored.iter().map(|s| s.question_id.as_str()).collect();
    assert_eq!(ids, vec!["q1", "q2", "q3"]);
    assert!(!scored[1].is_correct);
    let topics = aggregate_by_topic(&scored);
    assert_eq!(topics.len(), 2);
    assert_eq!((topics[0].topic.as_str(), topics[0].correct_count, topics[0].total_count), ("A", 2, 2));
    assert_eq!((topics[1].topic.as_str(), topics[1].correct_count, topics[1].score), ("B", 0, 0.0));
  }

  #[test]
  fn overall_score_guards_zero_max_points() {
    assert_eq!(overall_score(&[]), 0);
  }

  #[test]
  fn weighted_score_favours_hard_questions() {
    let mut easy = mc("q1", "T", "a");
    easy.difficulty = Difficulty::Basic;
    let mut hard = mc("q2", "T", "a");
    hard.difficulty = Difficulty::Advanced;
    let scored = vec![
      ScoredResponse { question_id: "q1".into(), topic: "T".into(), answer: None, time_spent: 0.0, is_correct: false, score: 0, max_points: 10, feedback: None },
      ScoredResponse { question_id: "q2".into(), topic: "T".into(), answer: None, time_spent: 0.0, is_correct: true, score: 10, max_points: 10, feedback: None },
    ];
    let w = weighted_score(&[easy, hard], &scored);
    assert!((w - 200.0 / 3.0).abs() < 1e-9);
  }

  #[test]
  fn patterns_flag_repeated_topic_errors() {
    let mk = |id: &str, topic: &str, ok: bool, t: f64| ScoredResponse {
      question_id: id.into(),
      topic: topic.into(),
      answer: None,
      time_spent: t,
      is_correct: ok,
      score: 0,
      max_points: 10,
      feedback: None,
    };
    let scored = vec![mk("1", "Demografía", false, 5.0), mk("2", "Hidrografía", false, 200.0), mk("3", "Demografía", false, 60.0), mk("4", "Hidrografía", true, 35.0)];
    let p = analyze_patterns(&scored);
    assert_eq!(p.quick_answers, 1);
    assert_eq!(p.slow_answers, 1);
    assert_eq!(p.improvement_areas, vec!["Demografía".to_string()]);
    assert_eq!(p.errors_by_topic, vec![("Demografía".to_string(), 2), ("Hidrografía".to_string(), 1)]);
    assert!((p.average_response_time - 75.0).abs() < 1e-9);
  }

  fn scored_strategy() -> impl Strategy<Value = Vec<ScoredResponse>> {
    prop::collection::vec((1u32..20, any::<bool>()), 0..30).prop_map(|items| {
      items
        .into_iter()
        .enumerate()
        .map(|(i, (points, ok))| ScoredResponse {
          question_id: format!("q{i}"),
          topic: format!("t{}", i % 3),
          answer: None,
          time_spent: 10.0,
          is_correct: ok,
          score: if ok { points } else { 0 },
          max_points: points,
          feedback: None,
        })
        .collect()
    })
  }

  proptest! {
    #[test]
    fn overall_score_is_bounded(scored in scored_strategy()) {
      let s = overall_score(&scored);
      prop_assert!(s <= 100);
      if !scored.is_empty() && scored.iter().all(|r| r.is_correct) {
        prop_assert_eq!(s, 100);
      }
      if scored.iter().all(|r| !r.is_correct) {
        prop_assert_eq!(s, 0);
      }
    }

    #[test]
    fn evaluate_is_pure(key in "[a-d]", given in "[a-d]") {
      let question = mc("q1", "T", &key);
      let answer = text(&given);
      let first = evaluate(&question, Some(&answer));
      let second = evaluate(&question, Some(&answer));
      prop_assert_eq!(first, second);
      prop_assert_eq!(first, Evaluation::Scored { is_correct: key == given, score: if key == given { 10 } else { 0 } });
    }

    #[test]
    fn topic_counts_are_consistent(scored in scored_strategy()) {
      let topics = aggregate_by_topic(&scored);
      let total: u32 = topics.iter().map(|t| t.total_count).sum();
      prop_assert_eq!(total as usize, scored.len());
      for t in topics {
        prop_assert!(t.correct_count <= t.total_count);
        prop_assert!((0.0..=100.0).contains(&t.score));
      }
    }
  }
}
