//! Public protocol structs for the HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.
//! Domain records (students, assessments, reports) are returned as-is.

use serde::{Deserialize, Serialize};

use crate::assessment::DEFAULT_QUESTION_COUNT;
use crate::config::ResourceCfg;
use crate::domain::{Difficulty, Resource, Response, Subject, Topic};
use crate::proficiency::ReinforcementArea;

#[derive(Debug, Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub provider: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct RegisterIn {
    pub name: String,
    pub email: String,
}

/// Omitted `topics` and `difficulty` are chosen from the student's record.
#[derive(Debug, Deserialize)]
pub struct CreateAssessmentIn {
    pub student_id: String,
    pub subject: Subject,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub topics: Vec<Topic>,
    #[serde(default = "default_count")]
    pub count: usize,
}

fn default_count() -> usize {
    DEFAULT_QUESTION_COUNT
}

#[derive(Debug, Deserialize)]
pub struct SubmitIn {
    pub responses: Vec<Response>,
}

#[derive(Debug, Deserialize)]
pub struct EvaluateIn {
    pub student_answer: String,
    pub model_answer: String,
}

#[derive(Debug, Serialize)]
pub struct ReinforceOut {
    pub student_id: String,
    pub areas: Vec<ReinforcementArea>,
}

/// `?topics=a,b&limit=n`
#[derive(Debug, Deserialize)]
pub struct ResourcesQuery {
    #[serde(default)]
    pub topics: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ResourcesQuery {
    pub fn topic_list(&self) -> Vec<String> {
        self.topics
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Catalog entry posted to `/api/v1/resources`; same shape as a `[[resources]]` TOML entry.
pub type ResourceIn = ResourceCfg;

#[derive(Debug, Serialize)]
pub struct ResourcesOut {
    pub resources: Vec<Resource>,
}
