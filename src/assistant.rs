//! Text-completion boundary for the tutor, plus the OpenAI-compatible client behind it.
//!
//! The model only ever returns raw text. A reply may end with the tag `[[practice]]`, which marks
//! the learner's request as a practice request; the tag is stripped before the text is shown.
//! Calls are instrumented and log model names, latencies, and response sizes (not contents).
//!
//! NOTE: We never log the API key.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::domain::{Role, Turn, TurnKind};
use crate::util::trunc_for_log;

const PRACTICE_TAG: &str = "[[practice]]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
  PracticeRequest,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
  pub text: String,
  pub intent: Option<Intent>,
}

impl Completion {
  /// Split a raw model reply into display text and intent tag.
  pub fn from_raw(raw: &str) -> Self {
    let intent = find_tag(raw).map(|_| Intent::PracticeRequest);
    let text = if intent.is_some() { strip_tag(raw) } else { raw.trim().to_string() };
    Self { text, intent }
  }

  /// First fenced code block of the reply, without the fence lines.
  pub fn code_example(&self) -> Option<String> {
    let start = self.text.find("```")?;
    let after_fence = &self.text[start + 3..];
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    let code = body[..end].trim_end().to_string();
    if code.is_empty() { None } else { Some(code) }
  }
}

/// ASCII case-insensitive search; the tag is ASCII so a hit always sits on a char boundary.
fn find_tag(s: &str) -> Option<usize> {
  let tag = PRACTICE_TAG.as_bytes();
  s.as_bytes().windows(tag.len()).position(|w| w.eq_ignore_ascii_case(tag))
}

fn strip_tag(raw: &str) -> String {
  let mut out = String::with_capacity(raw.len());
  let mut rest = raw;
  while let Some(pos) = find_tag(rest) {
    out.push_str(&rest[..pos]);
    rest = &rest[pos + PRACTICE_TAG.len()..];
  }
  out.push_str(rest);
  out.trim().to_string()
}

#[derive(Debug, Error)]
pub enum AssistantError {
  #[error("request failed: {0}")]
  Request(#[from] reqwest::Error),
  #[error("HTTP {status}: {message}")]
  HttpStatus { status: u16, message: String },
  #[error("completion had no choices")]
  EmptyChoices,
}

#[async_trait]
pub trait TextCompletion: Send + Sync {
  /// One completion for the given conversation. Retries are the caller's business.
  async fn complete(&self, turns: &[Turn]) -> Result<Completion, AssistantError>;
  fn name(&self) -> &str;
}

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
    let base_url = std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());

    let client = reqwest::Client::builder().timeout(Duration::from_secs(20)).build().ok()?;

    Some(Self { client, api_key, base_url: base_url.trim_end_matches('/').to_string(), model })
  }
}

#[async_trait]
impl TextCompletion for OpenAI {
  #[instrument(level = "info", skip(self, turns), fields(model = %self.model, turns = turns.len()))]
  async fn complete(&self, turns: &[Turn]) -> Result<Completion, AssistantError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: to_messages(turns),
      temperature: 0.3,
    };

    let start = Instant::now();
    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, "dsa-tutor-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req)
      .send()
      .await?;

    if !res.status().is_success() {
      let status = res.status().as_u16();
      let body = res.text().await.unwrap_or_default();
      let message = extract_openai_error(&body).unwrap_or_else(|| trunc_for_log(&body, 200));
      error!(status, elapsed = ?start.elapsed(), "Completion request rejected");
      return Err(AssistantError::HttpStatus { status, message });
    }

    let body: ChatCompletionResponse = res.json().await?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let raw = body
      .choices
      .into_iter()
      .next()
      .and_then(|c| c.message.content)
      .ok_or(AssistantError::EmptyChoices)?;
    info!(elapsed = ?start.elapsed(), reply_len = raw.len(), "Completion received");
    Ok(Completion::from_raw(&raw))
  }

  fn name(&self) -> &str {
    "openai"
  }
}

/// Placeholder turns never reach the model; they were not model output.
fn to_messages(turns: &[Turn]) -> Vec<ChatMessageReq> {
  turns
    .iter()
    .filter(|t| t.kind != TurnKind::AssistantUnavailable)
    .map(|t| ChatMessageReq {
      role: match t.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
      }
      .into(),
      content: t.text.clone(),
    })
    .collect()
}

/// Rule-based stand-in used when no completion service is configured.
pub struct OfflineTutor;

const PRACTICE_WORDS: [&str; 5] = ["practice", "problem", "exercise", "quiz me", "challenge"];

#[async_trait]
impl TextCompletion for OfflineTutor {
  async fn complete(&self, turns: &[Turn]) -> Result<Completion, AssistantError> {
    let question = turns
      .iter()
      .rev()
      .find(|t| t.role == Role::User)
      .map(|t| t.text.to_lowercase())
      .unwrap_or_default();

    if PRACTICE_WORDS.iter().any(|w| question.contains(w)) {
      return Ok(Completion {
        text: "Here is a problem picked for where you are right now. Try it before asking for hints.".into(),
        intent: Some(Intent::PracticeRequest),
      });
    }

    let text = if question.contains("big o") || question.contains("complexity") {
      "Count how the work grows with input size: one pass is O(n), a nested pass over the same input is O(n^2), halving each step is O(log n)."
    } else if question.contains("recurs") {
      "Define the base case first, then make each call work on a strictly smaller input. Draw the call tree for a small example."
    } else if question.contains("dynamic programming") || question.contains(" dp") {
      "Write the state (what a subproblem means), the transition between states, and the base values. Then decide top-down with memo or bottom-up table."
    } else if question.contains("graph") || question.contains("bfs") || question.contains("dfs") {
      "BFS finds shortest paths in unweighted graphs; DFS is simpler for reachability and cycle checks. Track visited nodes either way."
    } else {
      "Start by restating the problem with a tiny example, then pick the data structure that makes the key operation cheap."
    };
    Ok(Completion { text: text.into(), intent: None })
  }

  fn name(&self) -> &str {
    "offline"
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Utc;

  fn turn(role: Role, text: &str) -> Turn {
    Turn { role, text: text.into(), timestamp: Utc::now(), kind: TurnKind::Message, tokens: 1 }
  }

  #[test]
  fn practice_tag_is_detected_and_stripped() {
    let c = Completion::from_raw("Sure, let's practise arrays.\n[[PRACTICE]]");
    assert_eq!(c.intent, Some(Intent::PracticeRequest));
    assert_eq!(c.text, "Sure, let's practise arrays.");

    let c = Completion::from_raw("  Just an answer.  ");
    assert_eq!(c.intent, None);
    assert_eq!(c.text, "Just an answer.");
  }

  #[test]
  fn code_example_is_first_fenced_block() {
    let c = Completion::from_raw("Use two pointers:\n```python\ni, j = 0, len(a) - 1\n```\nDone.");
    assert_eq!(c.code_example().as_deref(), Some("i, j = 0, len(a) - 1"));
    assert!(Completion::from_raw("no code here").code_example().is_none());
  }

  #[test]
  fn placeholder_turns_are_not_sent_to_the_model() {
    let mut placeholder = turn(Role::Assistant, "unavailable");
    placeholder.kind = TurnKind::AssistantUnavailable;
    let msgs = to_messages(&[turn(Role::System, "sys"), turn(Role::User, "hi"), placeholder]);
    let roles: Vec<_> = msgs.iter().map(|m| m.role.as_str()).collect();
    assert_eq!(roles, vec!["system", "user"]);
  }

  #[test]
  fn openai_error_body_is_unwrapped() {
    let body = r#"{"error":{"message":"Rate limit reached","type":"requests"}}"#;
    assert_eq!(extract_openai_error(body).as_deref(), Some("Rate limit reached"));
    assert!(extract_openai_error("<html>").is_none());
  }

  #[tokio::test]
  async fn offline_tutor_flags_practice_requests() {
    let c = OfflineTutor.complete(&[turn(Role::User, "Can I get a practice problem?")]).await.unwrap();
    assert_eq!(c.intent, Some(Intent::PracticeRequest));
    let c = OfflineTutor.complete(&[turn(Role::User, "What is big O of binary search?")]).await.unwrap();
    assert_eq!(c.intent, None);
    assert!(c.text.contains("O(log n)"));
  }
}
