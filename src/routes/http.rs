//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented; failures render through `TutorError`'s JSON body.

use std::sync::Arc;
use axum::{extract::{Path, Query, State}, http::StatusCode, Json, response::IntoResponse};
use tracing::{info, instrument};

use crate::analytics::{ProgressSummary, TimeRange};
use crate::error::TutorError;
use crate::logic::*;
use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, assistant: state.assistant.name().to_string() })
}

#[instrument(level = "info", skip(state))]
pub async fn http_list_topics(
  State(state): State<Arc<AppState>>,
  Query(q): Query<TopicsQuery>,
) -> Json<Vec<TopicOut>> {
  Json(list_topics(&state, q.scope).await)
}

#[instrument(level = "info", skip(state))]
pub async fn http_topic_problems(
  State(state): State<Arc<AppState>>,
  Path(topic_id): Path<String>,
) -> Result<Json<Vec<ProblemOut>>, TutorError> {
  Ok(Json(topic_problems(&state, &topic_id).await?))
}

#[instrument(level = "info", skip(state, body), fields(user_id = %body.user_id, problem_id = %body.problem_id, outcome = ?body.outcome))]
pub async fn http_post_attempt(
  State(state): State<Arc<AppState>>,
  Json(body): Json<AttemptIn>,
) -> Result<(StatusCode, Json<MasteryOut>), TutorError> {
  let mastery = submit_attempt(&state, body).await?;
  info!(target: "mastery", topic_id = %mastery.topic_id, score = mastery.score, "HTTP attempt recorded");
  Ok((StatusCode::CREATED, Json(mastery)))
}

#[instrument(level = "info", skip(state), fields(user_id = %q.user_id))]
pub async fn http_next_practice(
  State(state): State<Arc<AppState>>,
  Query(q): Query<PracticeQuery>,
) -> Result<Json<PracticeOut>, TutorError> {
  Ok(Json(next_practice(&state, &q.user_id, q.scope, q.count).await?))
}

#[instrument(level = "info", skip(state), fields(user_id = %q.user_id))]
pub async fn http_get_mastery(
  State(state): State<Arc<AppState>>,
  Query(q): Query<UserQuery>,
) -> Result<Json<Vec<MasteryOut>>, TutorError> {
  Ok(Json(mastery_snapshot(&state, &q.user_id).await?))
}

#[instrument(level = "info", skip(state), fields(user_id = %q.user_id))]
pub async fn http_get_progress(
  State(state): State<Arc<AppState>>,
  Query(q): Query<ProgressQuery>,
) -> Result<Json<ProgressSummary>, TutorError> {
  let range = TimeRange { from: q.from, to: q.to };
  Ok(Json(progress(&state, &q.user_id, q.scope, range).await?))
}

#[instrument(level = "info", skip(state, body), fields(user_id = %body.user_id))]
pub async fn http_open_session(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SessionIn>,
) -> Result<(StatusCode, Json<SessionOut>), TutorError> {
  let session = open_session(&state, &body.user_id, body.scope).await?;
  Ok((StatusCode::CREATED, Json(session)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_session(
  State(state): State<Arc<AppState>>,
  Path(session_id): Path<String>,
) -> Result<Json<SessionOut>, TutorError> {
  Ok(Json(get_session(&state, &session_id).await?))
}

#[instrument(level = "info", skip(state, body), fields(%session_id, text_len = body.text.len()))]
pub async fn http_post_turn(
  State(state): State<Arc<AppState>>,
  Path(session_id): Path<String>,
  Json(body): Json<TurnIn>,
) -> Result<Json<ChatOut>, TutorError> {
  Ok(Json(session_turn(&state, &session_id, &body.text).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_end_session(
  State(state): State<Arc<AppState>>,
  Path(session_id): Path<String>,
) -> Result<Json<SessionOut>, TutorError> {
  Ok(Json(end_session(&state, &session_id).await?))
}

#[instrument(level = "info", skip(state, body), fields(question_len = body.question.len()))]
pub async fn http_post_assist(
  State(state): State<Arc<AppState>>,
  Json(body): Json<AssistIn>,
) -> Result<Json<AssistOut>, TutorError> {
  Ok(Json(assist(&state, &body.question).await?))
}
