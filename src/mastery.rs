//! Mastery estimation: an exponentially weighted score per (user, topic) with a decaying
//! learning rate, always recomputable by replaying the attempt log.
//!
//! Update rule for an attempt with signal `s` when `n` attempts were already applied:
//!
//!   α     = 1 / (1 + n)
//!   score = clamp(score + α · (s − score), 0, 1)
//!
//! Writes for the same (user, topic) are serialized so incremental updates always match a replay.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::catalog::ContentCatalog;
use crate::domain::{Attempt, TopicMastery};
use crate::error::TutorError;
use crate::store::{with_backoff, Persistence, RetryPolicy};
use crate::util::KeyedLocks;

impl TopicMastery {
  /// Cold-start record: never attempted, score 0.
  pub fn cold(user_id: &str, topic_id: &str) -> Self {
    Self {
      user_id: user_id.to_string(),
      topic_id: topic_id.to_string(),
      score: 0.0,
      attempt_count: 0,
      last_updated: None,
    }
  }

  pub fn learning_rate(&self) -> f64 {
    1.0 / (1.0 + self.attempt_count as f64)
  }

  pub fn apply(&mut self, attempt: &Attempt) {
    let alpha = self.learning_rate();
    let next = self.score + alpha * (attempt.outcome.signal() - self.score);
    self.score = next.clamp(0.0, 1.0);
    self.attempt_count += 1;
    self.last_updated = Some(attempt.timestamp);
  }

  /// Rebuild from cold start by applying `attempts` in order.
  pub fn replay(user_id: &str, topic_id: &str, attempts: &[Attempt]) -> Self {
    let mut m = Self::cold(user_id, topic_id);
    for a in attempts.iter().filter(|a| a.user_id == user_id && a.topic_id == topic_id) {
      m.apply(a);
    }
    m
  }
}

pub struct MasteryEstimator {
  catalog: Arc<dyn ContentCatalog>,
  store: Arc<dyn Persistence>,
  retry: RetryPolicy,
  locks: KeyedLocks<(String, String)>,
}

impl MasteryEstimator {
  pub fn new(catalog: Arc<dyn ContentCatalog>, store: Arc<dyn Persistence>, retry: RetryPolicy) -> Self {
    Self { catalog, store, retry, locks: KeyedLocks::new() }
  }

  /// Log the attempt, then fold it into the topic's mastery.
  #[instrument(level = "info", skip(self, attempt), fields(user_id = %attempt.user_id, topic_id = %attempt.topic_id, problem_id = %attempt.problem_id, outcome = ?attempt.outcome))]
  pub async fn record_attempt(&self, attempt: Attempt) -> Result<TopicMastery, TutorError> {
    if !self.catalog.knows_topic(&attempt.topic_id).await {
      warn!(target: "mastery", topic_id = %attempt.topic_id, "Attempt for unknown topic rejected");
      return Err(TutorError::UnknownTopic(attempt.topic_id));
    }

    let _guard = self.locks.lock((attempt.user_id.clone(), attempt.topic_id.clone())).await;

    if self.store.has_attempt(&attempt.key()).await? {
      info!(target: "mastery", "Attempt already logged; rebuilding mastery from log");
      let rebuilt = self.rebuild(&attempt.user_id, &attempt.topic_id).await?;
      self.persist(&rebuilt).await?;
      return Ok(rebuilt);
    }

    let (mut mastery, _) = self.reconciled(&attempt.user_id, &attempt.topic_id).await?;
    if let Some(last) = mastery.last_updated {
      if attempt.timestamp < last {
        return Err(TutorError::StaleAttempt {
          topic_id: attempt.topic_id,
          attempted: attempt.timestamp.to_rfc3339(),
          last: last.to_rfc3339(),
        });
      }
    }

    let outcome = with_backoff(&self.retry, "append_attempt", || self.store.append_attempt(&attempt)).await?;
    debug!(target: "mastery", ?outcome, "Attempt appended to log");

    let before = mastery.score;
    mastery.apply(&attempt);
    self.persist(&mastery).await?;
    info!(target: "mastery", before, after = mastery.score, attempt_count = mastery.attempt_count, "Mastery updated");
    Ok(mastery)
  }

  /// Current mastery of one topic; cold-start record if never attempted.
  #[instrument(level = "debug", skip(self))]
  pub async fn mastery(&self, user_id: &str, topic_id: &str) -> Result<TopicMastery, TutorError> {
    let _guard = self.locks.lock((user_id.to_string(), topic_id.to_string())).await;
    self.healed(user_id, topic_id).await
  }

  /// All mastery records of a user, ordered by topic id. Covers every topic with logged
  /// attempts, including ones whose record was never written.
  #[instrument(level = "debug", skip(self))]
  pub async fn snapshot(&self, user_id: &str) -> Result<Vec<TopicMastery>, TutorError> {
    let mut records: BTreeMap<String, TopicMastery> = self
      .store
      .user_masteries(user_id)
      .await?
      .into_iter()
      .map(|m| (m.topic_id.clone(), m))
      .collect();

    let mut logged: BTreeMap<String, u32> = records.keys().map(|t| (t.clone(), 0)).collect();
    for a in self.store.user_attempts(user_id).await? {
      *logged.entry(a.topic_id).or_default() += 1;
    }

    for (topic_id, count) in logged {
      if records.get(&topic_id).map(|m| m.attempt_count) == Some(count) {
        continue;
      }
      let _guard = self.locks.lock((user_id.to_string(), topic_id.clone())).await;
      let m = self.healed(user_id, &topic_id).await?;
      records.insert(topic_id, m);
    }
    Ok(records.into_values().collect())
  }

  /// Recompute from the attempt log and store the result.
  #[instrument(level = "info", skip(self))]
  pub async fn replay(&self, user_id: &str, topic_id: &str) -> Result<TopicMastery, TutorError> {
    let _guard = self.locks.lock((user_id.to_string(), topic_id.to_string())).await;
    let rebuilt = self.rebuild(user_id, topic_id).await?;
    self.persist(&rebuilt).await?;
    Ok(rebuilt)
  }

  async fn rebuild(&self, user_id: &str, topic_id: &str) -> Result<TopicMastery, TutorError> {
    let attempts = self.store.topic_attempts(user_id, topic_id).await?;
    Ok(TopicMastery::replay(user_id, topic_id, &attempts))
  }

  /// Stored mastery, rebuilt from the log when it disagrees with the log length. The flag is
  /// set when a rebuild happened.
  async fn reconciled(&self, user_id: &str, topic_id: &str) -> Result<(TopicMastery, bool), TutorError> {
    let stored = self.store.load_mastery(user_id, topic_id).await?;
    let attempts = self.store.topic_attempts(user_id, topic_id).await?;
    match stored {
      Some(m) if m.attempt_count as usize == attempts.len() => Ok((m, false)),
      None if attempts.is_empty() => Ok((TopicMastery::cold(user_id, topic_id), false)),
      stale => {
        warn!(
          target: "mastery",
          %user_id,
          %topic_id,
          stored_count = stale.map(|m| m.attempt_count).unwrap_or(0),
          logged = attempts.len(),
          "Mastery out of sync with attempt log; replaying"
        );
        Ok((TopicMastery::replay(user_id, topic_id, &attempts), true))
      }
    }
  }

  /// Reconciled record for reads. A rebuilt record is written back; if that write fails the
  /// read still returns the rebuilt value and the next access tries again.
  /// Caller holds the (user, topic) lock.
  async fn healed(&self, user_id: &str, topic_id: &str) -> Result<TopicMastery, TutorError> {
    let (mastery, rebuilt) = self.reconciled(user_id, topic_id).await?;
    if rebuilt {
      if let Err(e) = self.persist(&mastery).await {
        warn!(target: "mastery", %user_id, %topic_id, error = %e, "Could not store rebuilt mastery");
      }
    }
    Ok(mastery)
  }

  async fn persist(&self, mastery: &TopicMastery) -> Result<(), TutorError> {
    with_backoff(&self.retry, "upsert_mastery", || self.store.upsert_mastery(mastery)).await?;
    Ok(())
  }
}
