//! Application state: the store, the content provider and the services built on them.
//!
//! This module owns:
//!   - the in-memory store, seeded with the built-in catalog, TOML bank entries and a demo student
//!   - the content provider (OpenAI when a key is configured, offline otherwise)
//!   - scoring, proficiency, recommendation and assessment services sharing both
//!
//! Every provider-backed call is bounded by the deadline derived from `[provider]` settings.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::assessment::AssessmentService;
use crate::config::{load_agent_config_from_env, AgentConfig, ResourceCfg};
use crate::domain::{Resource, Student};
use crate::error::TutorError;
use crate::openai::OpenAI;
use crate::proficiency::ProficiencyTracker;
use crate::provider::{ContentProvider, OfflineProvider};
use crate::recommend::RecommendationSelector;
use crate::scoring::ScoringEngine;
use crate::seeds::{demo_student, seed_resources};
use crate::store::{InMemoryStore, PersistenceStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PersistenceStore>,
    pub provider_name: &'static str,
    pub resource_limit: usize,
    pub recommender: Arc<RecommendationSelector>,
    pub assessments: Arc<AssessmentService>,
}

impl AppState {
    /// Build state from env: load config, init OpenAI, seed the store.
    #[instrument(level = "info", skip_all)]
    pub async fn from_env() -> Self {
        let cfg = load_agent_config_from_env().unwrap_or_default();
        let (provider, provider_name): (Arc<dyn ContentProvider>, &'static str) =
            match OpenAI::from_env(cfg.prompts.clone(), cfg.provider.clone()) {
                Some(oa) => {
                    info!(target: "aula_backend", fast = %oa.fast_model, strong = %oa.strong_model, "OpenAI provider enabled");
                    (Arc::new(oa), "openai")
                }
                None => {
                    warn!(target: "aula_backend", "OPENAI_API_KEY not set; running with offline fallbacks only");
                    (Arc::new(OfflineProvider), "offline")
                }
            };
        Self::build(cfg, provider, provider_name).await
    }

    /// Wire every service around one store and one provider.
    pub async fn build(cfg: AgentConfig, provider: Arc<dyn ContentProvider>, provider_name: &'static str) -> Self {
        let mut catalog = seed_resources();
        let bank = cfg.resources.len();
        catalog.extend(cfg.resources.into_iter().map(|r| r.into_resource()));
        let store = InMemoryStore::with_resources(catalog);
        if let Err(e) = store.save_student(demo_student()).await {
            error!(target: "aula_backend", error = %e, "Failed to seed demo student");
        }
        info!(
            target: "aula_backend",
            resources = store.resource_count().await,
            bank,
            "Store seeded"
        );

        let store: Arc<dyn PersistenceStore> = Arc::new(store);
        let deadline = cfg.provider.call_deadline();
        let resource_limit = cfg.recommendation.resource_limit;

        let scoring = ScoringEngine::new(provider.clone(), deadline);
        let tracker = Arc::new(ProficiencyTracker::new(store.clone()));
        let recommender = Arc::new(RecommendationSelector::new(
            store.clone(),
            provider.clone(),
            resource_limit,
            deadline,
        ));
        let assessments = Arc::new(AssessmentService::new(
            store.clone(),
            provider,
            scoring,
            tracker,
            recommender.clone(),
            deadline,
        ));

        Self { store, provider_name, resource_limit, recommender, assessments }
    }

    #[instrument(level = "info", skip(self, name, email))]
    pub async fn register_student(&self, name: &str, email: &str) -> Result<Student, TutorError> {
        let (name, email) = (name.trim(), email.trim());
        if name.is_empty() || email.is_empty() {
            return Err(TutorError::InvalidSubmission("name and email are required".into()));
        }
        let student = self.store.save_student(Student::register(name, email)).await?;
        info!(target: "aula_backend", id = %student.id, "Student registered");
        Ok(student)
    }

    /// Validate and append one catalog entry posted over HTTP.
    #[instrument(level = "info", skip(self, entry), fields(title = %entry.title))]
    pub async fn add_resource(&self, entry: ResourceCfg) -> Result<Resource, TutorError> {
        if entry.title.trim().is_empty() || entry.topics.iter().all(|t| t.trim().is_empty()) {
            return Err(TutorError::InvalidSubmission("title and at least one topic are required".into()));
        }
        let resource = self.store.add_resource(entry.into_resource()).await?;
        info!(target: "aula_backend", id = %resource.id, "Resource added to catalog");
        Ok(resource)
    }

    /// Catalog lookup; `limit` falls back to the configured recommendation limit.
    pub async fn resources_for(&self, topics: &[String], limit: Option<usize>) -> Result<Vec<Resource>, TutorError> {
        let limit = limit.unwrap_or(self.resource_limit);
        self.store.find_resources_by_topics(topics, limit).await
    }
}
