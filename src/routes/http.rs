//! HTTP endpoint handlers. These are thin wrappers that forward to the services on `AppState`.
//! Each handler is instrumented and logs ids and basic result info; failures map through `TutorError`.

use std::sync::Arc;

use axum::{
  extract::{Path, Query, State},
  http::StatusCode,
  Json,
};
use tracing::{info, instrument};

use crate::assessment::SubmissionReport;
use crate::domain::{Assessment, Resource, Student};
use crate::error::TutorError;
use crate::proficiency::ProficiencyTracker;
use crate::protocol::*;
use crate::provider::OpenEndedEvaluation;
use crate::recommend::Recommendations;
use crate::state::AppState;

type ApiResult<T> = Result<Json<T>, TutorError>;

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> Json<HealthOut> {
  Json(HealthOut { ok: true, provider: state.provider_name })
}

#[instrument(level = "info", skip(state, body), fields(name_len = body.name.len()))]
pub async fn http_register_student(
  State(state): State<Arc<AppState>>,
  Json(body): Json<RegisterIn>,
) -> Result<(StatusCode, Json<Student>), TutorError> {
  let student = state.register_student(&body.name, &body.email).await?;
  Ok((StatusCode::CREATED, Json(student)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_student(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<Student> {
  Ok(Json(state.store.find_student(&id).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_recommendations(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> ApiResult<Recommendations> {
  let rec = state.recommender.recommend_for(&id).await?;
  info!(target: "recommendation", student_id = %id, activities = rec.recommended_activities.len(), "HTTP recommendations served");
  Ok(Json(rec))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_reinforce(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<ReinforceOut> {
  let student = state.store.find_student(&id).await?;
  let areas = ProficiencyTracker::areas_to_reinforce(&student);
  Ok(Json(ReinforceOut { student_id: student.id, areas }))
}

#[instrument(level = "info", skip(state, body), fields(student_id = %body.student_id, subject = ?body.subject))]
pub async fn http_create_assessment(
  State(state): State<Arc<AppState>>,
  Json(body): Json<CreateAssessmentIn>,
) -> Result<(StatusCode, Json<Assessment>), TutorError> {
  let a = state
    .assessments
    .generate(&body.student_id, body.subject, body.difficulty, body.topics, body.count)
    .await?;
  Ok((StatusCode::CREATED, Json(a)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_assessment(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<Assessment> {
  Ok(Json(state.assessments.get(&id).await?))
}

#[instrument(level = "info", skip(state, body), fields(responses = body.responses.len()))]
pub async fn http_submit_assessment(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<SubmitIn>,
) -> ApiResult<SubmissionReport> {
  let report = state.assessments.submit(&id, body.responses).await?;
  info!(target: "assessment", assessment_id = %id, score = report.overall_score, "HTTP submission analyzed");
  Ok(Json(report))
}

#[instrument(level = "info", skip(state, body), fields(answer_len = body.student_answer.len()))]
pub async fn http_evaluate(
  State(state): State<Arc<AppState>>,
  Json(body): Json<EvaluateIn>,
) -> ApiResult<OpenEndedEvaluation> {
  Ok(Json(state.assessments.evaluate_open_ended(&body.student_answer, &body.model_answer).await?))
}

#[instrument(level = "info", skip(state, q))]
pub async fn http_get_resources(
  State(state): State<Arc<AppState>>,
  Query(q): Query<ResourcesQuery>,
) -> ApiResult<ResourcesOut> {
  let resources = state.resources_for(&q.topic_list(), q.limit).await?;
  Ok(Json(ResourcesOut { resources }))
}

#[instrument(level = "info", skip(state, body), fields(title = %body.title))]
pub async fn http_add_resource(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ResourceIn>,
) -> Result<(StatusCode, Json<Resource>), TutorError> {
  let resource = state.add_resource(body).await?;
  Ok((StatusCode::CREATED, Json(resource)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_resource(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<Resource> {
  Ok(Json(state.store.find_resource(&id).await?))
}
