//! Persistence boundary: attempt log, mastery arena, and session records.
//!
//! `Persistence` is what a real database adapter implements. `InMemoryStore` is the default
//! engine and keeps everything behind tokio `RwLock`s, the same way the rest of the app state is
//! held. Writes go through `with_backoff`, which retries transient failures.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::domain::{Attempt, AttemptKey, SessionContext, SessionState, TopicMastery};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
  #[error("write failed: {0}")]
  Write(String),
  #[error("read failed: {0}")]
  Read(String),
}

/// Result of an idempotent append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
  Appended,
  Duplicate,
}

#[async_trait]
pub trait Persistence: Send + Sync {
  /// Durable append. Appending an attempt whose key is already logged is a no-op.
  async fn append_attempt(&self, attempt: &Attempt) -> Result<AppendOutcome, StoreError>;
  async fn has_attempt(&self, key: &AttemptKey) -> Result<bool, StoreError>;
  /// Attempts of one (user, topic) pair in log order.
  async fn topic_attempts(&self, user_id: &str, topic_id: &str) -> Result<Vec<Attempt>, StoreError>;
  /// Every attempt of a user in log order.
  async fn user_attempts(&self, user_id: &str) -> Result<Vec<Attempt>, StoreError>;

  async fn load_mastery(&self, user_id: &str, topic_id: &str) -> Result<Option<TopicMastery>, StoreError>;
  async fn user_masteries(&self, user_id: &str) -> Result<Vec<TopicMastery>, StoreError>;
  async fn upsert_mastery(&self, mastery: &TopicMastery) -> Result<(), StoreError>;

  async fn load_session(&self, session_id: &str) -> Result<Option<SessionContext>, StoreError>;
  async fn upsert_session(&self, session: &SessionContext) -> Result<(), StoreError>;
  /// Ids of sessions that are not closed.
  async fn open_session_ids(&self) -> Result<Vec<String>, StoreError>;
  /// Delete closed sessions last active before `cutoff`. Returns how many were removed.
  async fn purge_closed_sessions(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;
}

#[derive(Default)]
struct AttemptLog {
  entries: Vec<Attempt>,
  keys: HashSet<AttemptKey>,
}

#[derive(Default)]
pub struct InMemoryStore {
  log: RwLock<AttemptLog>,
  mastery: RwLock<HashMap<(String, String), TopicMastery>>,
  sessions: RwLock<HashMap<String, SessionContext>>,
}

impl InMemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl Persistence for InMemoryStore {
  async fn append_attempt(&self, attempt: &Attempt) -> Result<AppendOutcome, StoreError> {
    let mut log = self.log.write().await;
    if !log.keys.insert(attempt.key()) {
      return Ok(AppendOutcome::Duplicate);
    }
    log.entries.push(attempt.clone());
    Ok(AppendOutcome::Appended)
  }

  async fn has_attempt(&self, key: &AttemptKey) -> Result<bool, StoreError> {
    Ok(self.log.read().await.keys.contains(key))
  }

  async fn topic_attempts(&self, user_id: &str, topic_id: &str) -> Result<Vec<Attempt>, StoreError> {
    let log = self.log.read().await;
    Ok(
      log
        .entries
        .iter()
        .filter(|a| a.user_id == user_id && a.topic_id == topic_id)
        .cloned()
        .collect(),
    )
  }

  async fn user_attempts(&self, user_id: &str) -> Result<Vec<Attempt>, StoreError> {
    let log = self.log.read().await;
    Ok(log.entries.iter().filter(|a| a.user_id == user_id).cloned().collect())
  }

  async fn load_mastery(&self, user_id: &str, topic_id: &str) -> Result<Option<TopicMastery>, StoreError> {
    let key = (user_id.to_string(), topic_id.to_string());
    Ok(self.mastery.read().await.get(&key).cloned())
  }

  async fn user_masteries(&self, user_id: &str) -> Result<Vec<TopicMastery>, StoreError> {
    let map = self.mastery.read().await;
    let mut out: Vec<TopicMastery> = map.values().filter(|m| m.user_id == user_id).cloned().collect();
    out.sort_by(|a, b| a.topic_id.cmp(&b.topic_id));
    Ok(out)
  }

  async fn upsert_mastery(&self, mastery: &TopicMastery) -> Result<(), StoreError> {
    let key = (mastery.user_id.clone(), mastery.topic_id.clone());
    self.mastery.write().await.insert(key, mastery.clone());
    Ok(())
  }

  async fn load_session(&self, session_id: &str) -> Result<Option<SessionContext>, StoreError> {
    Ok(self.sessions.read().await.get(session_id).cloned())
  }

  async fn upsert_session(&self, session: &SessionContext) -> Result<(), StoreError> {
    self.sessions.write().await.insert(session.session_id.clone(), session.clone());
    Ok(())
  }

  async fn open_session_ids(&self) -> Result<Vec<String>, StoreError> {
    let map = self.sessions.read().await;
    Ok(
      map
        .values()
        .filter(|s| s.state != SessionState::Closed)
        .map(|s| s.session_id.clone())
        .collect(),
    )
  }

  async fn purge_closed_sessions(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
    let mut map = self.sessions.write().await;
    let before = map.len();
    map.retain(|_, s| s.state != SessionState::Closed || s.last_activity >= cutoff);
    Ok(before - map.len())
  }
}

/// Bounded exponential backoff for persistence writes.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self { max_attempts: 3, base_backoff_ms: 100 }
  }
}

impl RetryPolicy {
  fn delay(&self, retry: u32) -> Duration {
    let base = self.base_backoff_ms.saturating_mul(1u64 << retry.min(16));
    let jitter = if self.base_backoff_ms > 1 {
      rand::thread_rng().gen_range(0..=self.base_backoff_ms / 2)
    } else {
      0
    };
    Duration::from_millis(base + jitter)
  }
}

/// Run a write, retrying failures with exponential backoff. Only `StoreError::Write` is retried.
pub async fn with_backoff<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, StoreError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, StoreError>>,
{
  let attempts = policy.max_attempts.max(1);
  let mut retry = 0;
  loop {
    match op().await {
      Ok(v) => {
        if retry > 0 {
          debug!(target: "dsa_tutor", %what, retry, "Persistence write succeeded after retry");
        }
        return Ok(v);
      }
      Err(StoreError::Write(msg)) if retry + 1 < attempts => {
        let delay = policy.delay(retry);
        warn!(target: "dsa_tutor", %what, retry, error = %msg, delay_ms = delay.as_millis() as u64, "Persistence write failed, retrying");
        tokio::time::sleep(delay).await;
        retry += 1;
      }
      Err(e) => return Err(e),
    }
  }
}
