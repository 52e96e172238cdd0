//! Adaptive practice selection.
//!
//! Topics are ranked weakest first (ties: least recently practised first). Each topic gets a
//! lane of candidates ordered by difficulty band distance from the band its mastery calls for.
//! Problems answered correctly in the topic's recent attempts are skipped unless nothing else is
//! left in their band. The queue then walks the lanes round-robin.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::catalog::ContentCatalog;
use crate::domain::{Attempt, Difficulty, Outcome, Problem, TopicMastery};
use crate::error::TutorError;
use crate::mastery::MasteryEstimator;
use crate::store::Persistence;

pub struct PracticeSelector {
  catalog: Arc<dyn ContentCatalog>,
  store: Arc<dyn Persistence>,
  estimator: Arc<MasteryEstimator>,
  anti_repeat_window: usize,
}

/// Finite, single-pass sequence of recommended problems.
#[derive(Debug)]
pub struct PracticeQueue {
  lanes: VecDeque<VecDeque<Problem>>,
  remaining: usize,
  served: HashSet<String>,
}

impl PracticeQueue {
  fn new(lanes: VecDeque<VecDeque<Problem>>, limit: usize) -> Self {
    Self { lanes, remaining: limit, served: HashSet::new() }
  }
}

impl Iterator for PracticeQueue {
  type Item = Problem;

  fn next(&mut self) -> Option<Problem> {
    while self.remaining > 0 {
      let mut lane = self.lanes.pop_front()?;
      while let Some(p) = lane.pop_front() {
        if self.served.insert(p.problem_id.clone()) {
          self.remaining -= 1;
          if !lane.is_empty() {
            self.lanes.push_back(lane);
          }
          return Some(p);
        }
      }
    }
    None
  }
}

impl PracticeSelector {
  /// Masteries are read through `estimator`, so records lost to a failed write are rebuilt
  /// before ranking.
  pub fn new(
    catalog: Arc<dyn ContentCatalog>,
    store: Arc<dyn Persistence>,
    estimator: Arc<MasteryEstimator>,
    anti_repeat_window: usize,
  ) -> Self {
    Self { catalog, store, estimator, anti_repeat_window }
  }

  #[instrument(level = "info", skip(self))]
  pub async fn select_next(&self, user_id: &str, scope: &str, count: usize) -> Result<PracticeQueue, TutorError> {
    let topics = self.catalog.topics(scope).await;
    if topics.is_empty() {
      info!(target: "practice", %scope, "Curriculum scope has no topics");
      return Err(TutorError::NoContentAvailable(scope.to_string()));
    }

    let masteries: HashMap<String, TopicMastery> = self
      .estimator
      .snapshot(user_id)
      .await?
      .into_iter()
      .map(|m| (m.topic_id.clone(), m))
      .collect();

    let mut ranked: Vec<TopicMastery> = topics
      .iter()
      .map(|t| masteries.get(t).cloned().unwrap_or_else(|| TopicMastery::cold(user_id, t)))
      .collect();
    ranked.sort_by(rank_weakest_first);

    let mut lanes = VecDeque::new();
    for m in &ranked {
      let problems = self.catalog.problems(&m.topic_id).await;
      if problems.is_empty() {
        debug!(target: "practice", topic_id = %m.topic_id, "Topic has no problems; skipped");
        continue;
      }
      let attempts = self.store.topic_attempts(user_id, &m.topic_id).await?;
      let lane = plan_topic(&problems, &attempts, m.score, self.anti_repeat_window);
      debug!(target: "practice", topic_id = %m.topic_id, score = m.score, band = ?Difficulty::for_score(m.score), candidates = lane.len(), "Topic lane planned");
      lanes.push_back(lane);
    }

    if lanes.is_empty() {
      info!(target: "practice", %scope, "No topic in scope has problems");
      return Err(TutorError::NoContentAvailable(scope.to_string()));
    }

    info!(target: "practice", %user_id, %scope, count, topics = lanes.len(), weakest = %ranked[0].topic_id, "Practice queue built");
    Ok(PracticeQueue::new(lanes, count))
  }
}

/// Ascending score, then stalest first (never attempted is stalest), then topic id.
fn rank_weakest_first(a: &TopicMastery, b: &TopicMastery) -> Ordering {
  a.score
    .partial_cmp(&b.score)
    .unwrap_or(Ordering::Equal)
    .then_with(|| a.last_updated.cmp(&b.last_updated))
    .then_with(|| a.topic_id.cmp(&b.topic_id))
}

/// Ordered candidates for one topic. `attempts` must be in log order.
fn plan_topic(problems: &[Problem], attempts: &[Attempt], score: f64, window: usize) -> VecDeque<Problem> {
  let target = Difficulty::for_score(score);

  let recent = &attempts[attempts.len().saturating_sub(window)..];
  let excluded: HashSet<&str> = recent
    .iter()
    .filter(|a| a.outcome == Outcome::Correct)
    .map(|a| a.problem_id.as_str())
    .collect();

  let mut last_seen: HashMap<&str, DateTime<Utc>> = HashMap::new();
  for a in attempts {
    let slot = last_seen.entry(a.problem_id.as_str()).or_insert(a.timestamp);
    if a.timestamp > *slot {
      *slot = a.timestamp;
    }
  }

  let mut bands = Difficulty::ALL.to_vec();
  bands.sort_by_key(|d| (d.distance(target), *d));

  let mut lane = VecDeque::new();
  for band in bands {
    let mut in_band: Vec<&Problem> = problems.iter().filter(|p| p.difficulty == band).collect();
    in_band.sort_by(|a, b| {
      last_seen
        .get(a.problem_id.as_str())
        .cmp(&last_seen.get(b.problem_id.as_str()))
        .then_with(|| a.problem_id.cmp(&b.problem_id))
    });
    let fresh: Vec<&Problem> = in_band.iter().copied().filter(|p| !excluded.contains(p.problem_id.as_str())).collect();
    let chosen = if fresh.is_empty() { in_band } else { fresh };
    lane.extend(chosen.into_iter().cloned());
  }
  lane
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::catalog::InMemoryCatalog;
  use crate::domain::Topic;
  use crate::mastery::MasteryEstimator;
  use crate::store::{InMemoryStore, RetryPolicy};
  use chrono::TimeZone;
  use std::collections::BTreeMap;

  fn problem(id: &str, topic: &str, difficulty: Difficulty) -> Problem {
    Problem {
      problem_id: id.into(),
      topic_id: topic.into(),
      difficulty,
      title: id.into(),
      metadata: BTreeMap::new(),
    }
  }

  fn topic(id: &str) -> Topic {
    Topic { topic_id: id.into(), name: id.into(), scopes: vec!["core".into()] }
  }

  fn attempt(topic: &str, problem: &str, outcome: Outcome, secs: i64) -> Attempt {
    Attempt {
      user_id: "u1".into(),
      topic_id: topic.into(),
      problem_id: problem.into(),
      outcome,
      timestamp: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
      latency_ms: 1000,
    }
  }

  struct Fixture {
    estimator: Arc<MasteryEstimator>,
    selector: PracticeSelector,
  }

  fn fixture(topics: Vec<Topic>, problems: Vec<Problem>, window: usize) -> Fixture {
    let catalog: Arc<dyn ContentCatalog> = Arc::new(InMemoryCatalog::new(topics, problems));
    let store: Arc<dyn Persistence> = Arc::new(InMemoryStore::new());
    let estimator = Arc::new(MasteryEstimator::new(catalog.clone(), store.clone(), RetryPolicy { max_attempts: 1, base_backoff_ms: 1 }));
    Fixture { estimator: estimator.clone(), selector: PracticeSelector::new(catalog, store, estimator, window) }
  }

  fn ids(queue: PracticeQueue) -> Vec<String> {
    queue.map(|p| p.problem_id).collect()
  }

  #[tokio::test]
  async fn weakest_topic_comes_first() {
    let f = fixture(
      vec![topic("arrays"), topic("graphs")],
      vec![problem("a1", "arrays", Difficulty::Easy), problem("g1", "graphs", Difficulty::Easy)],
      5,
    );
    f.estimator.record_attempt(attempt("arrays", "a1", Outcome::Correct, 0)).await.unwrap();
    let out = ids(f.selector.select_next("u1", "core", 2).await.unwrap());
    assert_eq!(out, vec!["g1", "a1"]);
  }

  #[tokio::test]
  async fn ties_go_to_least_recently_attempted_topic() {
    let f = fixture(
      vec![topic("arrays"), topic("graphs"), topic("trees")],
      vec![
        problem("a1", "arrays", Difficulty::Easy),
        problem("g1", "graphs", Difficulty::Easy),
        problem("t1", "trees", Difficulty::Easy),
      ],
      5,
    );
    // Both end at score 0; graphs was touched earlier than arrays; trees never.
    f.estimator.record_attempt(attempt("graphs", "g1", Outcome::Incorrect, 0)).await.unwrap();
    f.estimator.record_attempt(attempt("arrays", "a1", Outcome::Incorrect, 10)).await.unwrap();
    let out = ids(f.selector.select_next("u1", "core", 3).await.unwrap());
    assert_eq!(out, vec!["t1", "g1", "a1"]);
  }

  #[tokio::test]
  async fn difficulty_band_follows_mastery() {
    let problems = vec![
      problem("e", "arrays", Difficulty::Easy),
      problem("m", "arrays", Difficulty::Medium),
      problem("h", "arrays", Difficulty::Hard),
    ];
    let f = fixture(vec![topic("arrays")], problems, 0);
    assert_eq!(f.selector.select_next("u1", "core", 1).await.unwrap().next().unwrap().problem_id, "e");

    // One correct answer from cold start puts the score at 1.0.
    f.estimator.record_attempt(attempt("arrays", "e", Outcome::Correct, 0)).await.unwrap();
    assert_eq!(f.selector.select_next("u1", "core", 1).await.unwrap().next().unwrap().problem_id, "h");

    // 1.0 then incorrect with α = 1/2 gives 0.5.
    f.estimator.record_attempt(attempt("arrays", "h", Outcome::Incorrect, 1)).await.unwrap();
    assert_eq!(f.selector.select_next("u1", "core", 1).await.unwrap().next().unwrap().problem_id, "m");
  }

  #[tokio::test]
  async fn recently_solved_problem_is_excluded_when_band_has_alternatives() {
    let f = fixture(
      vec![topic("arrays")],
      vec![problem("e1", "arrays", Difficulty::Easy), problem("e2", "arrays", Difficulty::Easy), problem("m1", "arrays", Difficulty::Medium)],
      5,
    );
    // Drive the score low but leave a correct answer for e1 inside the window.
    f.estimator.record_attempt(attempt("arrays", "e2", Outcome::Incorrect, 0)).await.unwrap();
    f.estimator.record_attempt(attempt("arrays", "e2", Outcome::Incorrect, 1)).await.unwrap();
    f.estimator.record_attempt(attempt("arrays", "e2", Outcome::Incorrect, 2)).await.unwrap();
    f.estimator.record_attempt(attempt("arrays", "e1", Outcome::Correct, 3)).await.unwrap();
    let out = ids(f.selector.select_next("u1", "core", 5).await.unwrap());
    assert_eq!(out, vec!["e2", "m1"]);
  }

  #[tokio::test]
  async fn repetition_is_the_fallback_when_band_is_exhausted() {
    let f = fixture(
      vec![topic("arrays")],
      vec![problem("e1", "arrays", Difficulty::Easy), problem("h1", "arrays", Difficulty::Hard)],
      5,
    );
    for i in 0..3 {
      f.estimator.record_attempt(attempt("arrays", "h1", Outcome::Incorrect, i)).await.unwrap();
    }
    f.estimator.record_attempt(attempt("arrays", "e1", Outcome::Correct, 3)).await.unwrap();
    // Score 0.25 targets easy; e1 is the only easy problem, so it comes back.
    let out = ids(f.selector.select_next("u1", "core", 2).await.unwrap());
    assert_eq!(out, vec!["e1", "h1"]);
  }

  #[test]
  fn exclusion_lapses_once_outside_the_window() {
    let lane = plan_topic(
      &[problem("e1", "arrays", Difficulty::Easy), problem("e2", "arrays", Difficulty::Easy)],
      &[
        attempt("arrays", "e1", Outcome::Correct, 0),
        attempt("arrays", "e2", Outcome::Incorrect, 1),
        attempt("arrays", "e2", Outcome::Incorrect, 2),
      ],
      0.1,
      2,
    );
    // e1 is stalest and no longer inside the two-attempt window.
    let order: Vec<_> = lane.iter().map(|p| p.problem_id.as_str()).collect();
    assert_eq!(order, vec!["e1", "e2"]);
  }

  #[test]
  fn missing_band_falls_back_to_nearest_easier_first() {
    let lane = plan_topic(
      &[problem("e", "t", Difficulty::Easy), problem("h", "t", Difficulty::Hard)],
      &[],
      0.5,
      5,
    );
    let order: Vec<_> = lane.iter().map(|p| p.problem_id.as_str()).collect();
    assert_eq!(order, vec!["e", "h"]);
  }

  #[tokio::test]
  async fn queue_is_bounded_and_interleaves_topics() {
    let f = fixture(
      vec![topic("arrays"), topic("graphs")],
      vec![
        problem("a1", "arrays", Difficulty::Easy),
        problem("a2", "arrays", Difficulty::Easy),
        problem("g1", "graphs", Difficulty::Easy),
        problem("g2", "graphs", Difficulty::Easy),
      ],
      5,
    );
    let out = ids(f.selector.select_next("u1", "core", 3).await.unwrap());
    assert_eq!(out, vec!["a1", "g1", "a2"]);

    let all = ids(f.selector.select_next("u1", "core", 50).await.unwrap());
    assert_eq!(all.len(), 4);

    assert!(f.selector.select_next("u1", "core", 0).await.unwrap().next().is_none());
  }

  #[tokio::test]
  async fn queue_cannot_be_restarted() {
    let f = fixture(vec![topic("arrays")], vec![problem("a1", "arrays", Difficulty::Easy)], 5);
    let mut q = f.selector.select_next("u1", "core", 3).await.unwrap();
    assert!(q.next().is_some());
    assert!(q.next().is_none());
    assert!(q.next().is_none());
  }

  #[tokio::test]
  async fn empty_scope_reports_no_content() {
    let f = fixture(vec![topic("arrays")], vec![], 5);
    let err = f.selector.select_next("u1", "core", 1).await.unwrap_err();
    assert!(matches!(err, TutorError::NoContentAvailable(_)));
    let err = f.selector.select_next("u1", "advanced", 1).await.unwrap_err();
    assert!(matches!(err, TutorError::NoContentAvailable(s) if s == "advanced"));
  }

  #[tokio::test]
  async fn topic_with_problems_never_yields_empty_result() {
    let f = fixture(vec![topic("arrays")], vec![problem("h1", "arrays", Difficulty::Hard)], 5);
    f.estimator.record_attempt(attempt("arrays", "h1", Outcome::Correct, 0)).await.unwrap();
    let out = ids(f.selector.select_next("u1", "core", 1).await.unwrap());
    assert_eq!(out, vec!["h1"]);
  }
}
