//! Read-only progress rollups over the attempt log and mastery records.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::catalog::ContentCatalog;
use crate::domain::{Attempt, Difficulty, Outcome, TopicMastery};
use crate::error::TutorError;
use crate::store::Persistence;

/// Inclusive time window; open ends are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeRange {
  pub from: Option<DateTime<Utc>>,
  pub to: Option<DateTime<Utc>>,
}

impl TimeRange {
  pub fn contains(&self, ts: DateTime<Utc>) -> bool {
    self.from.map_or(true, |f| ts >= f) && self.to.map_or(true, |t| ts <= t)
  }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MasterySample {
  pub timestamp: DateTime<Utc>,
  pub score: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TopicProgress {
  pub topic_id: String,
  pub attempts: u32,
  pub correct: u32,
  pub incorrect: u32,
  pub skipped: u32,
  pub accuracy: f64,
  pub mastery: f64,
  pub trajectory: Vec<MasterySample>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyProgress {
  pub difficulty: Difficulty,
  pub attempts: u32,
  pub correct: u32,
  pub accuracy: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
  pub user_id: String,
  pub scope: String,
  pub total_attempts: u32,
  pub correct: u32,
  pub accuracy: f64,
  pub problems_solved: u32,
  /// Problems the catalog holds for `scope`.
  pub total_problems: u32,
  /// Share of `total_problems` solved in range; 0 for an empty scope.
  pub completion_rate: f64,
  pub time_invested_ms: u64,
  pub topics: Vec<TopicProgress>,
  pub difficulties: Vec<DifficultyProgress>,
}

fn ratio(part: u32, whole: u32) -> f64 {
  if whole == 0 { 0.0 } else { part as f64 / whole as f64 }
}

/// Catalog facts `summarize` needs for one scope.
#[derive(Debug, Clone, Default)]
pub struct ScopeContent {
  pub scope: String,
  /// Ids of every problem under the scope's topics.
  pub problems: HashSet<String>,
  /// Difficulty band per problem id. Unknown problems are left out of the difficulty breakdown only.
  pub difficulty_of: HashMap<String, Difficulty>,
}

/// Fold a user's attempts (log order) into a summary for `range`.
///
/// Trajectories replay each topic from cold start over the whole log and keep the samples that
/// fall inside the range. A stored mastery is reported as current only while its attempt count
/// matches the log; otherwise the replayed score is.
pub fn summarize(
  user_id: &str,
  attempts: &[Attempt],
  masteries: &[TopicMastery],
  content: &ScopeContent,
  range: TimeRange,
) -> ProgressSummary {
  let difficulty_of = &content.difficulty_of;
  let stored: HashMap<&str, &TopicMastery> = masteries.iter().map(|m| (m.topic_id.as_str(), m)).collect();

  let mut by_topic: BTreeMap<&str, Vec<&Attempt>> = BTreeMap::new();
  for a in attempts.iter().filter(|a| a.user_id == user_id) {
    by_topic.entry(a.topic_id.as_str()).or_default().push(a);
  }

  let mut topics = Vec::new();
  let mut per_band: BTreeMap<Difficulty, (u32, u32)> = Difficulty::ALL.iter().map(|d| (*d, (0, 0))).collect();
  let mut solved: HashSet<&str> = HashSet::new();
  let mut time_invested_ms = 0u64;

  for (topic_id, log) in by_topic {
    let mut running = TopicMastery::cold(user_id, topic_id);
    let mut tp = TopicProgress {
      topic_id: topic_id.to_string(),
      attempts: 0,
      correct: 0,
      incorrect: 0,
      skipped: 0,
      accuracy: 0.0,
      mastery: 0.0,
      trajectory: Vec::new(),
    };

    for a in log {
      running.apply(a);
      if !range.contains(a.timestamp) {
        continue;
      }
      tp.attempts += 1;
      match a.outcome {
        Outcome::Correct => {
          tp.correct += 1;
          solved.insert(a.problem_id.as_str());
        }
        Outcome::Incorrect => tp.incorrect += 1,
        Outcome::Skipped => tp.skipped += 1,
      }
      time_invested_ms = time_invested_ms.saturating_add(a.latency_ms);
      tp.trajectory.push(MasterySample { timestamp: a.timestamp, score: running.score });

      if let Some(band) = difficulty_of.get(&a.problem_id) {
        let slot = per_band.entry(*band).or_insert((0, 0));
        slot.0 += 1;
        if a.outcome == Outcome::Correct {
          slot.1 += 1;
        }
      }
    }

    if tp.attempts == 0 {
      continue;
    }
    tp.accuracy = ratio(tp.correct, tp.attempts);
    tp.mastery = stored
      .get(topic_id)
      .filter(|m| m.attempt_count == running.attempt_count)
      .map_or(running.score, |m| m.score);
    topics.push(tp);
  }

  let total_attempts: u32 = topics.iter().map(|t| t.attempts).sum();
  let correct: u32 = topics.iter().map(|t| t.correct).sum();
  let total_problems = content.problems.len() as u32;
  let solved_in_scope = solved.iter().filter(|p| content.problems.contains(**p)).count() as u32;

  ProgressSummary {
    user_id: user_id.to_string(),
    scope: content.scope.clone(),
    total_attempts,
    correct,
    accuracy: ratio(correct, total_attempts),
    problems_solved: solved.len() as u32,
    total_problems,
    completion_rate: ratio(solved_in_scope, total_problems),
    time_invested_ms,
    topics,
    difficulties: per_band
      .into_iter()
      .map(|(difficulty, (attempts, correct))| DifficultyProgress { difficulty, attempts, correct, accuracy: ratio(correct, attempts) })
      .collect(),
  }
}

/// Fetches what `summarize` needs from the store and catalog.
pub struct AnalyticsAggregator {
  catalog: Arc<dyn ContentCatalog>,
  store: Arc<dyn Persistence>,
}

impl AnalyticsAggregator {
  pub fn new(catalog: Arc<dyn ContentCatalog>, store: Arc<dyn Persistence>) -> Self {
    Self { catalog, store }
  }

  #[instrument(level = "info", skip(self))]
  pub async fn summarize(&self, user_id: &str, scope: &str, range: TimeRange) -> Result<ProgressSummary, TutorError> {
    if let (Some(from), Some(to)) = (range.from, range.to) {
      if from > to {
        return Err(TutorError::InvalidInput(format!("range start {from} is after its end {to}")));
      }
    }

    let attempts = self.store.user_attempts(user_id).await?;
    let masteries = self.store.user_masteries(user_id).await?;

    let mut content = ScopeContent { scope: scope.to_string(), ..ScopeContent::default() };
    for topic_id in self.catalog.topics(scope).await {
      for p in self.catalog.problems(&topic_id).await {
        content.difficulty_of.insert(p.problem_id.clone(), p.difficulty);
        content.problems.insert(p.problem_id);
      }
    }
    for a in &attempts {
      if content.difficulty_of.contains_key(&a.problem_id) {
        continue;
      }
      if let Some(p) = self.catalog.problem(&a.problem_id).await {
        content.difficulty_of.insert(p.problem_id, p.difficulty);
      }
    }

    let summary = summarize(user_id, &attempts, &masteries, &content, range);
    debug!(
      target: "dsa_tutor",
      %user_id,
      %scope,
      total = summary.total_attempts,
      topics = summary.topics.len(),
      completion = summary.completion_rate,
      "Progress summarized"
    );
    Ok(summary)
  }
}
