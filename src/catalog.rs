//! Content catalog boundary: topics per curriculum scope and problems per topic.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::TutorConfig;
use crate::domain::{Problem, Topic};
use crate::seeds::{seed_problems, seed_topics};

#[async_trait]
pub trait ContentCatalog: Send + Sync {
  /// Topic ids in a curriculum scope, in catalog order.
  async fn topics(&self, scope: &str) -> Vec<String>;
  async fn problems(&self, topic_id: &str) -> Vec<Problem>;
  async fn problem(&self, problem_id: &str) -> Option<Problem>;
  async fn knows_topic(&self, topic_id: &str) -> bool;
  async fn topic_details(&self, scope: &str) -> Vec<Topic>;
}

/// Read-only catalog held in memory. Built once at startup.
pub struct InMemoryCatalog {
  topics: Vec<Topic>,
  by_topic: HashMap<String, Vec<Problem>>,
  by_id: HashMap<String, Problem>,
}

impl InMemoryCatalog {
  pub fn new(topics: Vec<Topic>, problems: Vec<Problem>) -> Self {
    let mut by_topic: HashMap<String, Vec<Problem>> = HashMap::new();
    let mut by_id = HashMap::new();
    for p in problems {
      if !topics.iter().any(|t| t.topic_id == p.topic_id) {
        warn!(target: "dsa_tutor", problem_id = %p.problem_id, topic_id = %p.topic_id, "Skipping problem for undeclared topic");
        continue;
      }
      if by_id.contains_key(&p.problem_id) {
        warn!(target: "dsa_tutor", problem_id = %p.problem_id, "Skipping duplicate problem id");
        continue;
      }
      by_topic.entry(p.topic_id.clone()).or_default().push(p.clone());
      by_id.insert(p.problem_id.clone(), p);
    }
    Self { topics, by_topic, by_id }
  }

  /// Catalog from TOML config if it declares topics, otherwise the built-in DSA seeds.
  pub fn from_config(cfg: &TutorConfig) -> Self {
    if cfg.topics.is_empty() {
      info!(target: "dsa_tutor", "No topics configured; using built-in DSA catalog");
      return Self::new(seed_topics(), seed_problems());
    }

    let default_scope = cfg.engine.default_scope.clone();
    let topics = cfg
      .topics
      .iter()
      .map(|t| Topic {
        topic_id: t.id.clone(),
        name: t.name.clone().unwrap_or_else(|| t.id.clone()),
        scopes: if t.scopes.is_empty() { vec![default_scope.clone()] } else { t.scopes.clone() },
      })
      .collect();
    let problems = cfg
      .problems
      .iter()
      .map(|p| {
        let mut metadata = BTreeMap::new();
        if let Some(url) = &p.url {
          metadata.insert("url".to_string(), url.clone());
        }
        metadata.insert("source".to_string(), "config".to_string());
        Problem {
          problem_id: p.id.clone(),
          topic_id: p.topic.clone(),
          difficulty: p.difficulty,
          title: p.title.clone().unwrap_or_else(|| p.id.clone()),
          metadata,
        }
      })
      .collect();
    Self::new(topics, problems)
  }

  pub fn problem_count(&self) -> usize {
    self.by_id.len()
  }
}

#[async_trait]
impl ContentCatalog for InMemoryCatalog {
  async fn topics(&self, scope: &str) -> Vec<String> {
    self
      .topics
      .iter()
      .filter(|t| t.scopes.iter().any(|s| s == scope))
      .map(|t| t.topic_id.clone())
      .collect()
  }

  async fn problems(&self, topic_id: &str) -> Vec<Problem> {
    self.by_topic.get(topic_id).cloned().unwrap_or_default()
  }

  async fn problem(&self, problem_id: &str) -> Option<Problem> {
    self.by_id.get(problem_id).cloned()
  }

  async fn knows_topic(&self, topic_id: &str) -> bool {
    self.topics.iter().any(|t| t.topic_id == topic_id)
  }

  async fn topic_details(&self, scope: &str) -> Vec<Topic> {
    self.topics.iter().filter(|t| t.scopes.iter().any(|s| s == scope)).cloned().collect()
  }
}
