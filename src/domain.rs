//! Domain models used by the backend: attempts, topic mastery, problems, and tutoring sessions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a practice attempt ended.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
  Correct,
  Incorrect,
  Skipped,
}

impl Outcome {
  /// Target value the mastery score is pulled towards.
  pub fn signal(self) -> f64 {
    match self {
      Outcome::Correct => 1.0,
      Outcome::Skipped => 0.3,
      Outcome::Incorrect => 0.0,
    }
  }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
  Easy,
  Medium,
  Hard,
}

impl Difficulty {
  pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

  /// Difficulty band a learner with this mastery score should practise at.
  pub fn for_score(score: f64) -> Self {
    if score < 0.33 {
      Difficulty::Easy
    } else if score <= 0.66 {
      Difficulty::Medium
    } else {
      Difficulty::Hard
    }
  }

  fn rank(self) -> i32 {
    match self {
      Difficulty::Easy => 0,
      Difficulty::Medium => 1,
      Difficulty::Hard => 2,
    }
  }

  pub fn distance(self, other: Difficulty) -> u32 {
    (self.rank() - other.rank()).unsigned_abs()
  }
}

/// One practice attempt. Immutable once created; owned by the attempt log.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Attempt {
  pub user_id: String,
  pub topic_id: String,
  pub problem_id: String,
  pub outcome: Outcome,
  pub timestamp: DateTime<Utc>,
  pub latency_ms: u64,
}

/// Idempotency key of an attempt in the log.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AttemptKey {
  pub user_id: String,
  pub problem_id: String,
  pub timestamp_ms: i64,
}

impl Attempt {
  pub fn key(&self) -> AttemptKey {
    AttemptKey {
      user_id: self.user_id.clone(),
      problem_id: self.problem_id.clone(),
      timestamp_ms: self.timestamp.timestamp_millis(),
    }
  }
}

/// Per-(user, topic) mastery estimate. Derived from the attempt log.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TopicMastery {
  pub user_id: String,
  pub topic_id: String,
  pub score: f64,
  pub attempt_count: u32,
  #[serde(default)]
  pub last_updated: Option<DateTime<Utc>>,
}

/// Reference problem served by the content catalog.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Problem {
  pub problem_id: String,
  pub topic_id: String,
  pub difficulty: Difficulty,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub metadata: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Topic {
  pub topic_id: String,
  pub name: String,
  pub scopes: Vec<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
  System,
  User,
  Assistant,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
  #[default]
  Message,
  /// Placeholder inserted when the completion service failed.
  AssistantUnavailable,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Turn {
  pub role: Role,
  pub text: String,
  pub timestamp: DateTime<Utc>,
  #[serde(default)]
  pub kind: TurnKind,
  pub tokens: i64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
  Active,
  Pruning,
  Closed,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
  Ended,
  IdleTimeout,
  TurnLimit,
}

/// Bounded tutoring conversation of one user.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionContext {
  pub session_id: String,
  pub user_id: String,
  pub curriculum_scope: String,
  pub turns: Vec<Turn>,
  pub token_budget: i64,
  pub token_budget_remaining: i64,
  pub state: SessionState,
  #[serde(default)]
  pub close_reason: Option<CloseReason>,
  pub user_turns: u32,
  pub created_at: DateTime<Utc>,
  pub last_activity: DateTime<Utc>,
}
