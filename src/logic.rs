//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! Handlers stay thin: they parse transport input, call in here, and render the result. Every
//! operation returns `TutorError` so both transports map failures the same way.

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::analytics::{ProgressSummary, TimeRange};
use crate::assistant::Completion;
use crate::domain::{Attempt, Role, Turn};
use crate::error::TutorError;
use crate::protocol::{
  AssistOut, AttemptIn, ChatOut, MasteryOut, PracticeOut, ProblemOut, SessionOut, TopicOut,
};
use crate::state::AppState;

/// Upper bound on problems returned by one practice request.
pub const MAX_PRACTICE_COUNT: usize = 50;

fn require(field: &str, value: &str) -> Result<(), TutorError> {
  if value.trim().is_empty() {
    return Err(TutorError::InvalidInput(format!("{field} must not be empty")));
  }
  Ok(())
}

fn scope_or_default(state: &AppState, scope: Option<String>) -> String {
  scope
    .map(|s| s.trim().to_string())
    .filter(|s| !s.is_empty())
    .unwrap_or_else(|| state.config.engine.default_scope.clone())
}

#[instrument(level = "info", skip(state))]
pub async fn list_topics(state: &AppState, scope: Option<String>) -> Vec<TopicOut> {
  let scope = scope_or_default(state, scope);
  state.catalog.topic_details(&scope).await.into_iter().map(TopicOut::from).collect()
}

/// Problems of one topic, easiest first.
#[instrument(level = "info", skip(state))]
pub async fn topic_problems(state: &AppState, topic_id: &str) -> Result<Vec<ProblemOut>, TutorError> {
  if !state.catalog.knows_topic(topic_id).await {
    return Err(TutorError::UnknownTopic(topic_id.to_string()));
  }
  let mut problems = state.catalog.problems(topic_id).await;
  problems.sort_by(|a, b| a.difficulty.cmp(&b.difficulty).then_with(|| a.problem_id.cmp(&b.problem_id)));
  Ok(problems.iter().map(ProblemOut::from).collect())
}

/// Resolve the attempt's topic from the catalog, then record it.
#[instrument(level = "info", skip(state, input), fields(user_id = %input.user_id, problem_id = %input.problem_id))]
pub async fn submit_attempt(state: &AppState, input: AttemptIn) -> Result<MasteryOut, TutorError> {
  require("userId", &input.user_id)?;
  require("problemId", &input.problem_id)?;

  let known = state.catalog.problem(&input.problem_id).await;
  let topic_id = match (input.topic_id, known) {
    (Some(t), Some(p)) if t != p.topic_id => {
      return Err(TutorError::InvalidInput(format!(
        "problem {} belongs to topic {}, not {}",
        p.problem_id, p.topic_id, t
      )));
    }
    (Some(t), _) => t,
    (None, Some(p)) => p.topic_id,
    (None, None) => {
      return Err(TutorError::InvalidInput(format!(
        "topicId is required for problem {} outside the catalog",
        input.problem_id
      )));
    }
  };

  let attempt = Attempt {
    user_id: input.user_id,
    topic_id,
    problem_id: input.problem_id,
    outcome: input.outcome,
    timestamp: input.timestamp.unwrap_or_else(Utc::now),
    latency_ms: input.latency_ms.unwrap_or(0),
  };
  let mastery = state.estimator.record_attempt(attempt).await?;
  Ok(MasteryOut::from(&mastery))
}

#[instrument(level = "info", skip(state))]
pub async fn next_practice(
  state: &AppState,
  user_id: &str,
  scope: Option<String>,
  count: Option<usize>,
) -> Result<PracticeOut, TutorError> {
  require("userId", user_id)?;
  let scope = scope_or_default(state, scope);
  let count = count.unwrap_or(1).min(MAX_PRACTICE_COUNT);
  let queue = state.selector.select_next(user_id, &scope, count).await?;
  let problems: Vec<ProblemOut> = queue.map(|p| ProblemOut::from(&p)).collect();
  debug!(target: "practice", %user_id, %scope, served = problems.len(), "Practice served");
  Ok(PracticeOut { user_id: user_id.to_string(), scope, problems })
}

#[instrument(level = "info", skip(state))]
pub async fn mastery_snapshot(state: &AppState, user_id: &str) -> Result<Vec<MasteryOut>, TutorError> {
  require("userId", user_id)?;
  let snapshot = state.estimator.snapshot(user_id).await?;
  Ok(snapshot.iter().map(MasteryOut::from).collect())
}

/// Progress over `range`; completion is measured against the catalog of `scope`.
#[instrument(level = "info", skip(state))]
pub async fn progress(
  state: &AppState,
  user_id: &str,
  scope: Option<String>,
  range: TimeRange,
) -> Result<ProgressSummary, TutorError> {
  require("userId", user_id)?;
  let scope = scope_or_default(state, scope);
  state.analytics.summarize(user_id, &scope, range).await
}

#[instrument(level = "info", skip(state))]
pub async fn open_session(state: &AppState, user_id: &str, scope: Option<String>) -> Result<SessionOut, TutorError> {
  require("userId", user_id)?;
  let scope = scope_or_default(state, scope);
  let session = state.sessions.open_session(user_id, &scope).await?;
  Ok(SessionOut::from(&session))
}

#[instrument(level = "info", skip(state))]
pub async fn get_session(state: &AppState, session_id: &str) -> Result<SessionOut, TutorError> {
  let session = state.sessions.session(session_id).await?;
  Ok(SessionOut::from(&session))
}

#[instrument(level = "info", skip(state, text), fields(text_len = text.len()))]
pub async fn session_turn(state: &AppState, session_id: &str, text: &str) -> Result<ChatOut, TutorError> {
  let outcome = state.sessions.submit_turn(session_id, text).await?;
  Ok(ChatOut::from(&outcome))
}

#[instrument(level = "info", skip(state))]
pub async fn end_session(state: &AppState, session_id: &str) -> Result<SessionOut, TutorError> {
  let session = state.sessions.end_session(session_id).await?;
  Ok(SessionOut::from(&session))
}

/// One-shot question outside any session. Nothing is stored, so a failed completion is the
/// caller's error to see.
#[instrument(level = "info", skip(state, question), fields(question_len = question.len()))]
pub async fn assist(state: &AppState, question: &str) -> Result<AssistOut, TutorError> {
  require("question", question)?;
  let now = Utc::now();
  let turns = [
    Turn::new(Role::System, state.config.prompts.assist_system.clone(), now),
    Turn::new(Role::User, question.trim(), now),
  ];
  let completion: Completion = state.assistant.complete(&turns).await.map_err(|e| {
    warn!(target: "dsa_tutor", assistant = state.assistant.name(), error = %e, "Assist completion failed");
    TutorError::AssistantUnavailable(e.to_string())
  })?;
  let code_example = completion.code_example();
  info!(target: "dsa_tutor", reply_len = completion.text.len(), has_code = code_example.is_some(), "Assist answered");
  Ok(AssistOut { response: completion.text, code_example })
}
