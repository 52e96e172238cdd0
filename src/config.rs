//! Loading tutor configuration (engine knobs, session limits, prompts, optional catalog) from TOML.
//!
//! See `TutorConfig` for the expected schema. Every section is optional.

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::Difficulty;
use crate::store::RetryPolicy;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct TutorConfig {
  #[serde(default)]
  pub engine: EngineSettings,
  #[serde(default)]
  pub session: SessionSettings,
  #[serde(default)]
  pub persistence: PersistenceSettings,
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub topics: Vec<TopicCfg>,
  #[serde(default)]
  pub problems: Vec<ProblemCfg>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
  /// Recent attempts per topic that block a correctly answered problem from coming back.
  pub anti_repeat_window: usize,
  pub default_scope: String,
}

impl Default for EngineSettings {
  fn default() -> Self {
    Self { anti_repeat_window: 5, default_scope: "core".into() }
  }
}

/// One token each for the latest user turn and its reply.
pub const MIN_TOKEN_BUDGET: i64 = 2;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
  pub token_budget: i64,
  pub min_retained_turns: usize,
  pub idle_timeout_secs: u64,
  pub max_user_turns: u32,
  pub sweep_interval_secs: u64,
  /// How long a closed session is kept after its last activity before the sweep deletes it.
  pub closed_retention_secs: u64,
}

impl Default for SessionSettings {
  fn default() -> Self {
    Self {
      token_budget: 3000,
      min_retained_turns: 2,
      idle_timeout_secs: 30 * 60,
      max_user_turns: 40,
      sweep_interval_secs: 60,
      closed_retention_secs: 24 * 60 * 60,
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PersistenceSettings {
  pub max_attempts: u32,
  pub base_backoff_ms: u64,
}

impl Default for PersistenceSettings {
  fn default() -> Self {
    let p = RetryPolicy::default();
    Self { max_attempts: p.max_attempts, base_backoff_ms: p.base_backoff_ms }
  }
}

impl PersistenceSettings {
  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy { max_attempts: self.max_attempts.max(1), base_backoff_ms: self.base_backoff_ms }
  }
}

/// Prompts sent to the completion service. `{scope}` is replaced with the session's curriculum scope.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub tutor_system: String,
  pub assist_system: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      tutor_system: "You are a patient tutor for data structures and algorithms (curriculum: {scope}). \
        Explain ideas step by step, prefer hints over full solutions, and keep answers short. \
        When the learner asks for a practice problem or exercise, end your reply with the tag [[practice]]."
        .into(),
      assist_system: "You are a DSA expert. Answer the question concisely. \
        If code helps, include one short example in a fenced code block."
        .into(),
    }
  }
}

/// Topic entry accepted in TOML configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct TopicCfg {
  pub id: String,
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default)]
  pub scopes: Vec<String>,
}

/// Problem entry accepted in TOML configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct ProblemCfg {
  pub id: String,
  pub topic: String,
  pub difficulty: Difficulty,
  #[serde(default)]
  pub title: Option<String>,
  #[serde(default)]
  pub url: Option<String>,
}

impl TutorConfig {
  /// Clamp values that would break invariants further down.
  pub fn sanitized(mut self) -> Self {
    self.session.min_retained_turns = self.session.min_retained_turns.max(1);
    self.session.token_budget = self.session.token_budget.max(MIN_TOKEN_BUDGET);
    self.session.max_user_turns = self.session.max_user_turns.max(1);
    self.persistence.max_attempts = self.persistence.max_attempts.max(1);
    if self.engine.default_scope.trim().is_empty() {
      self.engine.default_scope = EngineSettings::default().default_scope;
    }
    self
  }
}

pub fn parse_config(s: &str) -> Result<TutorConfig, toml::de::Error> {
  toml::from_str::<TutorConfig>(s).map(TutorConfig::sanitized)
}

/// Attempt to load `TutorConfig` from TUTOR_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_tutor_config_from_env() -> Option<TutorConfig> {
  let path = std::env::var("TUTOR_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_config(&s) {
      Ok(cfg) => {
        info!(target: "dsa_tutor", %path, topics = cfg.topics.len(), problems = cfg.problems.len(), "Loaded tutor config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "dsa_tutor", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "dsa_tutor", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_config_uses_defaults() {
    let cfg = parse_config("").unwrap();
    assert_eq!(cfg.engine.anti_repeat_window, 5);
    assert_eq!(cfg.engine.default_scope, "core");
    assert_eq!(cfg.session.min_retained_turns, 2);
    assert_eq!(cfg.persistence.max_attempts, 3);
    assert!(cfg.prompts.tutor_system.contains("[[practice]]"));
  }

  #[test]
  fn parses_sections_and_catalog() {
    let cfg = parse_config(
      r#"
        [engine]
        anti_repeat_window = 3

        [session]
        token_budget = 500
        min_retained_turns = 0
        closed_retention_secs = 90

        [[topics]]
        id = "heaps"
        name = "Heaps"
        scopes = ["core", "interview"]

        [[problems]]
        id = "kth-largest"
        topic = "heaps"
        difficulty = "medium"
        title = "Kth Largest Element"
      "#,
    )
    .unwrap();
    assert_eq!(cfg.engine.anti_repeat_window, 3);
    assert_eq!(cfg.engine.default_scope, "core");
    assert_eq!(cfg.session.token_budget, 500);
    // Clamped: at least the most recent user turn is always kept.
    assert_eq!(cfg.session.min_retained_turns, 1);
    assert_eq!(cfg.session.closed_retention_secs, 90);
    assert_eq!(cfg.topics[0].scopes, vec!["core", "interview"]);
    assert_eq!(cfg.problems[0].difficulty, Difficulty::Medium);
  }

  #[test]
  fn token_budget_is_raised_to_fit_one_exchange() {
    let cfg = parse_config("[session]\ntoken_budget = 0\n").unwrap();
    assert_eq!(cfg.session.token_budget, MIN_TOKEN_BUDGET);
    assert_eq!(cfg.session.closed_retention_secs, 86_400);
  }
}
