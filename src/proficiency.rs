//! Folding assessment results into a student's knowledge areas.
//!
//! Proficiency is a fixed-weight exponential moving average (0.3 on the newest
//! observation). Strength/weakness labels come from the raw per-assessment
//! topic score, not the smoothed value. Strengths accumulate across
//! assessments; weaknesses are replaced by each new assessment. A topic that
//! turns weak again leaves the strengths set so no topic carries both labels.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex},
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};

use crate::domain::{CompletedAssessment, KnowledgeArea, Student, Subject, Topic, TopicPerformance, TopicProficiency};
use crate::error::TutorError;
use crate::store::PersistenceStore;

pub const HISTORY_WEIGHT: f64 = 0.7;
pub const OBSERVATION_WEIGHT: f64 = 0.3;
/// Per-assessment topic score at or above which a topic is a strength.
pub const STRENGTH_THRESHOLD: f64 = 70.0;

/// EMA step. A first observation is taken as-is.
pub fn smooth(existing: Option<f64>, observed: f64) -> f64 {
  let observed = observed.clamp(0.0, 100.0);
  let next = match existing {
    Some(p) => p * HISTORY_WEIGHT + observed * OBSERVATION_WEIGHT,
    None => observed,
  };
  next.clamp(0.0, 100.0)
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Classification {
  pub strengths: Vec<Topic>,
  pub weaknesses: Vec<Topic>,
}

/// Split topics by the strength threshold, keeping first-seen order.
pub fn classify(performances: &[TopicPerformance]) -> Classification {
  let mut c = Classification::default();
  for p in performances {
    let bucket = if p.score >= STRENGTH_THRESHOLD { &mut c.strengths } else { &mut c.weaknesses };
    if !bucket.contains(&p.topic) {
      bucket.push(p.topic.clone());
    }
  }
  c
}

/// Everything the tracker needs to know about one completed assessment.
#[derive(Clone, Debug)]
pub struct ProficiencyUpdate {
  pub assessment_id: String,
  pub subject: Subject,
  pub topics: Vec<Topic>,
  pub performances: Vec<TopicPerformance>,
  pub overall_score: u32,
  pub correct_answers: u32,
  pub total_questions: u32,
  pub completed_at: DateTime<Utc>,
}

/// Apply an update to an in-memory student. Pure; persistence is the caller's job.
pub fn fold_assessment(student: &mut Student, update: &ProficiencyUpdate) -> Classification {
  let classification = classify(&update.performances);
  let area_name = update.subject.area_name();
  let at = update.completed_at;

  let idx = match student.knowledge_areas.iter().position(|a| a.matches(area_name)) {
    Some(i) => {
      let area = &mut student.knowledge_areas[i];
      area.proficiency = smooth(Some(area.proficiency), f64::from(update.overall_score));
      i
    }
    None => {
      student
        .knowledge_areas
        .push(KnowledgeArea::new(area_name, smooth(None, f64::from(update.overall_score)), at));
      student.knowledge_areas.len() - 1
    }
  };
  let area = &mut student.knowledge_areas[idx];
  area.last_assessment = at;

  for perf in &update.performances {
    match area.topics.iter_mut().find(|t| t.topic == perf.topic) {
      Some(t) => {
        t.proficiency = smooth(Some(t.proficiency), perf.score);
        t.last_assessment = at;
      }
      None => area.topics.push(TopicProficiency {
        topic: perf.topic.clone(),
        proficiency: smooth(None, perf.score),
        last_assessment: at,
      }),
    }
  }

  for s in &classification.strengths {
    if !area.strengths.contains(s) {
      area.strengths.push(s.clone());
    }
  }
  area.strengths.retain(|s| !classification.weaknesses.contains(s));
  area.weaknesses = classification.weaknesses.clone();

  if !student.assessment_history.iter().any(|h| h.assessment_id == update.assessment_id) {
    student.assessment_history.push(CompletedAssessment {
      assessment_id: update.assessment_id.clone(),
      subject: update.subject,
      topics: update.topics.clone(),
      completed_at: at,
      score: update.overall_score,
      correct_answers: update.correct_answers,
      total_questions: update.total_questions,
      strengths: classification.strengths.clone(),
      weaknesses: classification.weaknesses.clone(),
    });
  }

  classification
}

/// A topic whose smoothed proficiency is below the strength threshold.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReinforcementArea {
  pub area: String,
  pub topic: Topic,
  pub proficiency: f64,
}

pub struct ProficiencyTracker {
  store: Arc<dyn PersistenceStore>,
  locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ProficiencyTracker {
  pub fn new(store: Arc<dyn PersistenceStore>) -> Self {
    Self { store, locks: Mutex::new(HashMap::new()) }
  }

  fn lock_for(&self, student_id: &str) -> Arc<tokio::sync::Mutex<()>> {
    let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    locks.entry(student_id.to_string()).or_default().clone()
  }

  /// Forget the student's lock once no other update holds or awaits it.
  fn release(&self, student_id: &str, lock: Arc<tokio::sync::Mutex<()>>) {
    let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    // One reference in the map, one here.
    if Arc::strong_count(&lock) == 2 {
      locks.remove(student_id);
    }
  }

  #[cfg(test)]
  fn tracked_students(&self) -> usize {
    self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
  }

  /// Fold one assessment into the stored student. Updates for the same student
  /// are serialized; the whole knowledge-area set is written once or not at all.
  #[instrument(level = "info", skip(self, update), fields(%student_id, assessment_id = %update.assessment_id))]
  pub async fn record_assessment(
    &self,
    student_id: &str,
    update: &ProficiencyUpdate,
  ) -> Result<(Student, Classification), TutorError> {
    let lock = self.lock_for(student_id);
    let result = {
      let _guard = lock.lock().await;
      self.fold_and_save(student_id, update).await
    };
    self.release(student_id, lock);
    let (saved, classification) = result?;

    info!(
      target: "proficiency",
      %student_id,
      strengths = ?classification.strengths,
      weaknesses = ?classification.weaknesses,
      "Knowledge areas updated"
    );
    Ok((saved, classification))
  }

  async fn fold_and_save(&self, student_id: &str, update: &ProficiencyUpdate) -> Result<(Student, Classification), TutorError> {
    let mut student = self.store.find_student(student_id).await?;
    let classification = fold_assessment(&mut student, update);
    let saved = self.store.save_student(student).await?;
    Ok((saved, classification))
  }

  /// Topics below the threshold, weakest first.
  pub fn areas_to_reinforce(student: &Student) -> Vec<ReinforcementArea> {
    let mut out: Vec<ReinforcementArea> = student
      .knowledge_areas
      .iter()
      .flat_map(|a| {
        a.topics.iter().filter(|t| t.proficiency < STRENGTH_THRESHOLD).map(move |t| ReinforcementArea {
          area: a.area.clone(),
          topic: t.topic.clone(),
          proficiency: t.proficiency,
        })
      })
      .collect();
    out.sort_by(|a, b| a.proficiency.total_cmp(&b.proficiency));
    out
  }
}
