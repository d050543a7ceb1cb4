//! Persistence seam and the in-memory store used by the server and tests.
//!
//! Saves are optimistic: the caller hands back the record with the version it
//! read, the store bumps it. A stale version is a `Conflict`.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::domain::{Assessment, Resource, Student};
use crate::error::TutorError;

#[async_trait]
pub trait PersistenceStore: Send + Sync {
  async fn find_student(&self, id: &str) -> Result<Student, TutorError>;

  /// Upsert. Returns the stored record with its new version.
  async fn save_student(&self, student: Student) -> Result<Student, TutorError>;

  /// Resources whose topics intersect `topics`, in catalog order, at most `limit`.
  async fn find_resources_by_topics(&self, topics: &[String], limit: usize) -> Result<Vec<Resource>, TutorError>;

  async fn find_resource(&self, id: &str) -> Result<Resource, TutorError>;

  /// Append to the catalog. An id already in use is a `Conflict`.
  async fn add_resource(&self, resource: Resource) -> Result<Resource, TutorError>;

  async fn find_assessment(&self, id: &str) -> Result<Assessment, TutorError>;

  async fn save_assessment(&self, assessment: Assessment) -> Result<Assessment, TutorError>;
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
  students: Arc<RwLock<HashMap<String, Student>>>,
  assessments: Arc<RwLock<HashMap<String, Assessment>>>,
  resources: Arc<RwLock<Vec<Resource>>>,
}

impl InMemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_resources(resources: Vec<Resource>) -> Self {
    Self { resources: Arc::new(RwLock::new(resources)), ..Self::default() }
  }

  pub async fn resource_count(&self) -> usize {
    self.resources.read().await.len()
  }
}

fn check_version(entity: &str, id: &str, stored: u64, given: u64) -> Result<(), TutorError> {
  if stored != given {
    return Err(TutorError::Conflict(format!(
      "{entity} {id} was modified concurrently (stored version {stored}, given {given})"
    )));
  }
  Ok(())
}

#[async_trait]
impl PersistenceStore for InMemoryStore {
  async fn find_student(&self, id: &str) -> Result<Student, TutorError> {
    self.students.read().await.get(id).cloned().ok_or_else(|| TutorError::not_found("student", id))
  }

  #[instrument(level = "debug", skip(self, student), fields(id = %student.id, version = student.version))]
  async fn save_student(&self, mut student: Student) -> Result<Student, TutorError> {
    let mut students = self.students.write().await;
    match students.get(&student.id) {
      Some(stored) => check_version("student", &student.id, stored.version, student.version)?,
      None => check_version("student", &student.id, 0, student.version)?,
    }
    student.version += 1;
    students.insert(student.id.clone(), student.clone());
    debug!(target: "store", id = %student.id, version = student.version, "Student saved");
    Ok(student)
  }

  async fn find_resources_by_topics(&self, topics: &[String], limit: usize) -> Result<Vec<Resource>, TutorError> {
    let resources = self.resources.read().await;
    Ok(
      resources
        .iter()
        .filter(|r| r.topics.iter().any(|t| topics.contains(t)))
        .take(limit)
        .cloned()
        .collect(),
    )
  }

  async fn find_resource(&self, id: &str) -> Result<Resource, TutorError> {
    let resources = self.resources.read().await;
    resources.iter().find(|r| r.id == id).cloned().ok_or_else(|| TutorError::not_found("resource", id))
  }

  #[instrument(level = "debug", skip(self, resource), fields(id = %resource.id))]
  async fn add_resource(&self, resource: Resource) -> Result<Resource, TutorError> {
    let mut resources = self.resources.write().await;
    if resources.iter().any(|r| r.id == resource.id) {
      return Err(TutorError::Conflict(format!("resource {} already exists", resource.id)));
    }
    resources.push(resource.clone());
    debug!(target: "store", id = %resource.id, total = resources.len(), "Resource added");
    Ok(resource)
  }

  async fn find_assessment(&self, id: &str) -> Result<Assessment, TutorError> {
    self.assessments.read().await.get(id).cloned().ok_or_else(|| TutorError::not_found("assessment", id))
  }

  #[instrument(level = "debug", skip(self, assessment), fields(id = %assessment.id, status = ?assessment.status))]
  async fn save_assessment(&self, mut assessment: Assessment) -> Result<Assessment, TutorError> {
    let mut assessments = self.assessments.write().await;
    match assessments.get(&assessment.id) {
      Some(stored) => check_version("assessment", &assessment.id, stored.version, assessment.version)?,
      None => check_version("assessment", &assessment.id, 0, assessment.version)?,
    }
    assessment.version += 1;
    assessments.insert(assessment.id.clone(), assessment.clone());
    Ok(assessment)
  }
}
