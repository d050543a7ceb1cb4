//! Turning a student's weaknesses into prioritized resources plus one narrative.
//!
//! Weak topics are flattened in knowledge-area order, then in insertion order
//! within each area; the first one is the priority topic. Catalog resources are
//! looked up first; topics the catalog leaves uncovered are sent to the provider
//! for synthesized suggestions, which are tagged `Generated`.

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{Difficulty, Resource, ResourceSource, Student, Topic};
use crate::error::TutorError;
use crate::provider::{AreaSummary, ContentProvider, NarrativeContext, ResourceSuggestion};
use crate::store::PersistenceStore;
use crate::util::bounded;

pub const DEFAULT_RESOURCE_LIMIT: usize = 4;
pub const NARRATIVE_FALLBACK: &str = "Concentra tus esfuerzos en las áreas donde has mostrado mayor dificultad, dedicando tiempo adicional a los temas con puntajes más bajos. Utiliza los recursos recomendados para reforzar tus conocimientos y realiza evaluaciones frecuentes para medir tu progreso.";
pub const NO_WEAKNESS_MESSAGE: &str = "¡Excelente! Tienes un buen nivel en todas las áreas evaluadas.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Urgency {
  Recommended,
  ImprovementArea,
  Priority,
}

/// Urgency of a resource given the ordered weak-topic list.
pub fn urgency_for(resource: &Resource, weak_topics: &[Topic]) -> Urgency {
  match weak_topics.first() {
    Some(first) if resource.covers(first) => Urgency::Priority,
    _ if weak_topics.iter().any(|t| resource.covers(t)) => Urgency::ImprovementArea,
    _ => Urgency::Recommended,
  }
}

/// Weak topics across all areas, area order first, duplicates dropped.
pub fn flatten_weaknesses(student: &Student) -> Vec<Topic> {
  let mut out: Vec<Topic> = Vec::new();
  for area in &student.knowledge_areas {
    for w in &area.weaknesses {
      if !out.contains(w) {
        out.push(w.clone());
      }
    }
  }
  out
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RecommendedActivity {
  pub resource: Resource,
  pub urgency: Urgency,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeSource {
  Generated,
  Fallback,
  /// No weaknesses: fixed affirmation, provider not consulted.
  Affirmation,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Recommendations {
  pub main_recommendation: String,
  pub narrative_source: NarrativeSource,
  pub weak_topics: Vec<Topic>,
  pub recommended_activities: Vec<RecommendedActivity>,
}

pub struct RecommendationSelector {
  store: Arc<dyn PersistenceStore>,
  provider: Arc<dyn ContentProvider>,
  resource_limit: usize,
  deadline: Duration,
}

impl RecommendationSelector {
  pub fn new(
    store: Arc<dyn PersistenceStore>,
    provider: Arc<dyn ContentProvider>,
    resource_limit: usize,
    deadline: Duration,
  ) -> Self {
    Self { store, provider, resource_limit, deadline }
  }

  #[instrument(level = "info", skip(self), fields(%student_id))]
  pub async fn recommend_for(&self, student_id: &str) -> Result<Recommendations, TutorError> {
    let student = self.store.find_student(student_id).await?;
    self.recommend(&student).await
  }

  /// Store errors are fatal; provider errors only degrade the output.
  #[instrument(level = "info", skip(self, student), fields(student_id = %student.id))]
  pub async fn recommend(&self, student: &Student) -> Result<Recommendations, TutorError> {
    let weak_topics = flatten_weaknesses(student);
    if weak_topics.is_empty() {
      info!(target: "recommendation", student_id = %student.id, "No weaknesses; skipping provider calls");
      return Ok(Recommendations {
        main_recommendation: NO_WEAKNESS_MESSAGE.into(),
        narrative_source: NarrativeSource::Affirmation,
        weak_topics,
        recommended_activities: Vec::new(),
      });
    }

    let mut resources = self.store.find_resources_by_topics(&weak_topics, self.resource_limit).await?;

    if resources.len() < weak_topics.len() {
      let unmet: Vec<Topic> = weak_topics
        .iter()
        .filter(|t| !resources.iter().any(|r| r.covers(t)))
        .cloned()
        .collect();
      if !unmet.is_empty() {
        resources.extend(self.synthesize(&unmet).await);
      }
    }

    let recommended_activities: Vec<RecommendedActivity> = resources
      .into_iter()
      .map(|resource| {
        let urgency = urgency_for(&resource, &weak_topics);
        RecommendedActivity { resource, urgency }
      })
      .collect();

    let (main_recommendation, narrative_source) = self.narrative(student).await;

    info!(
      target: "recommendation",
      student_id = %student.id,
      weak = weak_topics.len(),
      activities = recommended_activities.len(),
      source = ?narrative_source,
      "Recommendations built"
    );

    Ok(Recommendations { main_recommendation, narrative_source, weak_topics, recommended_activities })
  }

  async fn synthesize(&self, unmet: &[Topic]) -> Vec<Resource> {
    match bounded(self.deadline, self.provider.suggest_resources(unmet)).await {
      Ok(suggestions) => suggestions
        .into_iter()
        .filter(|s| unmet.contains(&s.topic))
        .map(suggestion_to_resource)
        .collect(),
      Err(e) => {
        warn!(target: "recommendation", error = %e, unmet = ?unmet, "Resource synthesis failed; catalog results only");
        Vec::new()
      }
    }
  }

  async fn narrative(&self, student: &Student) -> (String, NarrativeSource) {
    let context = NarrativeContext::Recommendation {
      student_name: student.name.clone(),
      areas: student
        .knowledge_areas
        .iter()
        .map(|a| AreaSummary {
          area: a.area.clone(),
          proficiency: a.proficiency,
          strengths: a.strengths.clone(),
          weaknesses: a.weaknesses.clone(),
        })
        .collect(),
      completed_assessments: student.assessment_history.len(),
      mean_score: student.mean_historical_score(),
    };
    match bounded(self.deadline, self.provider.generate_narrative(&context)).await {
      Ok(text) => (text, NarrativeSource::Generated),
      Err(e) => {
        error!(target: "recommendation", student_id = %student.id, error = %e, "Narrative generation failed; using fallback");
        (NARRATIVE_FALLBACK.into(), NarrativeSource::Fallback)
      }
    }
  }
}

fn suggestion_to_resource(s: ResourceSuggestion) -> Resource {
  Resource {
    id: format!("gen-{}", Uuid::new_v4()),
    title: s.title,
    description: s.description,
    kind: s.kind,
    subject: None,
    topics: vec![s.topic],
    url: s.url,
    difficulty: Difficulty::Intermediate,
    duration_minutes: 30,
    source: ResourceSource::Generated,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{KnowledgeArea, ResourceKind};
  use crate::provider::testing::ScriptedProvider;
  use crate::store::InMemoryStore;
  use chrono::Utc;

  fn resource(id: &str, topics: &[&str]) -> Resource {
    Resource {
      id: id.into(),
      title: id.to_uppercase(),
      description: String::new(),
      kind: ResourceKind::Lesson,
      subject: None,
      topics: topics.iter().map(|t| t.to_string()).collect(),
      url: String::new(),
      difficulty: Difficulty::Intermediate,
      duration_minutes: 25,
      source: ResourceSource::Catalog,
    }
  }

  fn student(weak: Vec<(&str, Vec<&str>)>) -> Student {
    let mut s = Student::register("Ana", "ana@example.com");
    s.knowledge_areas = weak
      .into_iter()
      .map(|(area, ws)| {
        let mut a = KnowledgeArea::new(area, 55.0, Utc::now());
        a.weaknesses = ws.iter().map(|w| w.to_string()).collect();
        a
      })
      .collect();
    s
  }

  fn selector(store: InMemoryStore, provider: Arc<ScriptedProvider>) -> RecommendationSelector {
    RecommendationSelector::new(Arc::new(store), provider, DEFAULT_RESOURCE_LIMIT, Duration::from_secs(5))
  }

  fn suggestion(topic: &str) -> ResourceSuggestion {
    ResourceSuggestion {
      title: format!("Guía de {topic}"),
      description: String::new(),
      kind: ResourceKind::Article,
      url: "https://ejemplo.com".into(),
      topic: topic.into(),
    }
  }

  #[test]
  fn weaknesses_flatten_in_area_order_without_duplicates() {
    let s = student(vec![("Historia", vec!["Historia Antigua", "Civilizaciones Mesoamericanas"]), ("Geografía", vec!["Demografía", "Historia Antigua"])]);
    assert_eq!(flatten_weaknesses(&s), vec!["Historia Antigua", "Civilizaciones Mesoamericanas", "Demografía"]);
  }

  #[test]
  fn priority_overrides_improvement_area() {
    let weak = vec!["Demografía".to_string(), "Hidrografía".to_string()];
    assert_eq!(urgency_for(&resource("a", &["Demografía", "Hidrografía"]), &weak), Urgency::Priority);
    assert_eq!(urgency_for(&resource("b", &["Hidrografía"]), &weak), Urgency::ImprovementArea);
    assert_eq!(urgency_for(&resource("c", &["Historia Antigua"]), &weak), Urgency::Recommended);
  }

  #[tokio::test]
  async fn no_weaknesses_skips_provider() {
    let provider = Arc::new(ScriptedProvider::failing().with_narrative("unused"));
    let sel = selector(InMemoryStore::new(), provider.clone());
    let out = sel.recommend(&student(vec![("Geografía", vec![])])).await.unwrap();
    assert_eq!(out.main_recommendation, NO_WEAKNESS_MESSAGE);
    assert_eq!(out.narrative_source, NarrativeSource::Affirmation);
    assert!(out.recommended_activities.is_empty());
    assert!(provider.calls().is_empty());
  }

  #[tokio::test]
  async fn narrative_failure_falls_back_with_catalog_activities() {
    let store = InMemoryStore::with_resources(vec![resource("dem", &["Demografía"]), resource("geo", &["Geografía Política"])]);
    let provider = Arc::new(ScriptedProvider::failing());
    let sel = selector(store, provider.clone());
    let out = sel.recommend(&student(vec![("Geografía", vec!["Geografía Política", "Demografía"])])).await.unwrap();

    assert_eq!(out.main_recommendation, NARRATIVE_FALLBACK);
    assert_eq!(out.narrative_source, NarrativeSource::Fallback);
    let urgencies: Vec<_> = out.recommended_activities.iter().map(|a| (a.resource.id.as_str(), a.urgency)).collect();
    assert_eq!(urgencies, vec![("dem", Urgency::ImprovementArea), ("geo", Urgency::Priority)]);
    assert!(out.recommended_activities.iter().all(|a| a.resource.source == ResourceSource::Catalog));
    assert!(!provider.calls().contains(&"suggest_resources"));
  }

  #[tokio::test]
  async fn uncovered_topics_are_synthesized_and_tagged() {
    let store = InMemoryStore::with_resources(vec![resource("dem", &["Demografía"])]);
    let provider = Arc::new(
      ScriptedProvider::failing()
        .with_narrative("Repasa Hidrografía cada día.")
        .with_suggestions(vec![suggestion("Hidrografía"), suggestion("Tema ajeno")]),
    );
    let sel = selector(store, provider.clone());
    let out = sel.recommend(&student(vec![("Geografía", vec!["Hidrografía", "Demografía"])])).await.unwrap();

    assert_eq!(out.main_recommendation, "Repasa Hidrografía cada día.");
    assert_eq!(out.recommended_activities.len(), 2);
    let generated = &out.recommended_activities[1];
    assert_eq!(generated.resource.source, ResourceSource::Generated);
    assert_eq!(generated.resource.topics, vec!["Hidrografía".to_string()]);
    assert_eq!(generated.urgency, Urgency::Priority);
    assert_eq!(out.recommended_activities[0].urgency, Urgency::ImprovementArea);
  }

  #[tokio::test]
  async fn catalog_results_are_capped() {
    let store = InMemoryStore::with_resources((0..6).map(|i| resource(&format!("r{i}"), &["Demografía"])).collect());
    let provider = Arc::new(ScriptedProvider::failing().with_narrative("ok"));
    let out = selector(store, provider).recommend(&student(vec![("Geografía", vec!["Demografía"])])).await.unwrap();
    assert_eq!(out.recommended_activities.len(), DEFAULT_RESOURCE_LIMIT);
  }

  #[tokio::test]
  async fn unknown_student_is_not_found() {
    let sel = selector(InMemoryStore::new(), Arc::new(ScriptedProvider::failing()));
    assert!(matches!(sel.recommend_for("ghost").await, Err(TutorError::NotFound { .. })));
  }
}
