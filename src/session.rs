//! Tutoring sessions: bounded conversation context, usage limits, and the Active → Pruning →
//! Active / Active → Closed state machine.
//!
//! Every mutation of one session runs under that session's lock. A failed completion call becomes
//! a placeholder turn so the conversation stays consistent.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::assistant::{Intent, TextCompletion};
use crate::config::{SessionSettings, MIN_TOKEN_BUDGET};
use crate::domain::{CloseReason, Problem, Role, SessionContext, SessionState, Turn, TurnKind};
use crate::error::TutorError;
use crate::selector::PracticeSelector;
use crate::store::{with_backoff, Persistence, RetryPolicy};
use crate::util::{estimate_tokens, fill_template, truncate_to_tokens, KeyedLocks};

const UNAVAILABLE_REPLY: &str = "The tutor is unavailable right now. Your message was kept; please try again shortly.";

impl Turn {
  pub fn new(role: Role, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
    let text = text.into();
    let tokens = estimate_tokens(&text);
    Self { role, text, timestamp, kind: TurnKind::Message, tokens }
  }

  pub fn assistant_unavailable(timestamp: DateTime<Utc>) -> Self {
    Self { kind: TurnKind::AssistantUnavailable, ..Self::new(Role::Assistant, UNAVAILABLE_REPLY, timestamp) }
  }
}

impl SessionContext {
  pub fn new(user_id: &str, scope: &str, token_budget: i64, now: DateTime<Utc>) -> Self {
    Self {
      session_id: Uuid::new_v4().to_string(),
      user_id: user_id.to_string(),
      curriculum_scope: scope.to_string(),
      turns: Vec::new(),
      token_budget,
      token_budget_remaining: token_budget,
      state: SessionState::Active,
      close_reason: None,
      user_turns: 0,
      created_at: now,
      last_activity: now,
    }
  }

  pub fn is_closed(&self) -> bool {
    self.state == SessionState::Closed
  }

  pub fn is_idle(&self, now: DateTime<Utc>, idle_timeout_secs: u64) -> bool {
    now - self.last_activity > ChronoDuration::seconds(idle_timeout_secs as i64)
  }

  fn push(&mut self, turn: Turn) {
    if turn.role == Role::User {
      self.user_turns += 1;
    }
    self.token_budget_remaining -= turn.tokens;
    self.turns.push(turn);
  }

  fn close(&mut self, reason: CloseReason) {
    self.state = SessionState::Closed;
    self.close_reason = Some(reason);
  }

  fn recount(&mut self) {
    self.token_budget_remaining = self.token_budget - self.turns.iter().map(|t| t.tokens).sum::<i64>();
  }

  /// Bring the session back within budget. Returns how many turns were dropped.
  ///
  /// Oldest unprotected non-system turns go first. The most recent user turn, the
  /// `min_retained - 1` turns before it, and everything after it are protected. If that is not
  /// enough, turns are shortened: older protected turns, then the latest user turn and the reply
  /// to it (never below one token each), then system turns. A turn shortened to nothing is
  /// dropped. With a budget of at least `MIN_TOKEN_BUDGET` the session always ends within budget.
  pub fn prune(&mut self, min_retained: usize) -> usize {
    if self.token_budget_remaining >= 0 {
      return 0;
    }
    self.state = SessionState::Pruning;

    let last_user = self.turns.iter().rposition(|t| t.role == Role::User);
    let protected_from = match last_user {
      Some(u) => (u + 1).saturating_sub(min_retained.max(1)),
      None => self.turns.len(),
    };
    let protected_tail = self.turns.len() - protected_from;

    let mut dropped = 0;
    while self.token_budget_remaining < 0 {
      let open_end = self.turns.len() - protected_tail;
      let Some(victim) = self.turns[..open_end].iter().position(|t| t.role != Role::System) else {
        break;
      };
      let t = self.turns.remove(victim);
      self.token_budget_remaining += t.tokens;
      dropped += 1;
    }

    if self.token_budget_remaining < 0 {
      let latest: Vec<usize> = match self.turns.iter().rposition(|t| t.role == Role::User) {
        Some(u) => (u..self.turns.len()).filter(|&i| self.turns[i].role != Role::System).collect(),
        None => Vec::new(),
      };
      let mut order: Vec<usize> = (0..self.turns.len())
        .filter(|i| self.turns[*i].role != Role::System && !latest.contains(i))
        .collect();
      order.extend(latest.iter().copied());
      order.extend((0..self.turns.len()).filter(|&i| self.turns[i].role == Role::System));

      for i in order {
        let deficit = -self.token_budget_remaining;
        if deficit <= 0 {
          break;
        }
        let floor = if latest.contains(&i) { 1 } else { 0 };
        let turn = &mut self.turns[i];
        let keep = (turn.tokens - deficit).max(floor);
        if keep < turn.tokens {
          turn.text = truncate_to_tokens(&turn.text, keep);
          turn.tokens = keep;
          self.recount();
        }
      }

      let before = self.turns.len();
      self.turns.retain(|t| t.tokens > 0);
      dropped += before - self.turns.len();
    }

    self.recount();
    self.state = SessionState::Active;
    debug!(target: "session", session_id = %self.session_id, dropped, remaining = self.token_budget_remaining, turns = self.turns.len(), "Session pruned");
    dropped
  }
}

/// Result of one learner turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
  pub session: SessionContext,
  pub reply: Turn,
  pub recommendation: Option<Problem>,
  /// Why a requested recommendation could not be produced.
  pub recommendation_error: Option<String>,
  pub code_example: Option<String>,
}

pub struct SessionManager {
  store: Arc<dyn Persistence>,
  selector: Arc<PracticeSelector>,
  assistant: Arc<dyn TextCompletion>,
  settings: SessionSettings,
  system_prompt: String,
  retry: RetryPolicy,
  locks: KeyedLocks<String>,
}

impl SessionManager {
  pub fn new(
    store: Arc<dyn Persistence>,
    selector: Arc<PracticeSelector>,
    assistant: Arc<dyn TextCompletion>,
    settings: SessionSettings,
    system_prompt: String,
    retry: RetryPolicy,
  ) -> Self {
    Self { store, selector, assistant, settings, system_prompt, retry, locks: KeyedLocks::new() }
  }

  #[instrument(level = "info", skip(self))]
  pub async fn open_session(&self, user_id: &str, scope: &str) -> Result<SessionContext, TutorError> {
    self.open_session_at(user_id, scope, Utc::now()).await
  }

  pub async fn open_session_at(&self, user_id: &str, scope: &str, now: DateTime<Utc>) -> Result<SessionContext, TutorError> {
    if user_id.trim().is_empty() {
      return Err(TutorError::InvalidInput("userId must not be empty".into()));
    }
    let mut session = SessionContext::new(user_id, scope, self.settings.token_budget, now);
    let prompt = fill_template(&self.system_prompt, &[("scope", scope)]);
    if !prompt.trim().is_empty() {
      session.push(Turn::new(Role::System, prompt, now));
      session.prune(self.settings.min_retained_turns);
    }
    self.persist(&session).await?;
    info!(target: "session", session_id = %session.session_id, %user_id, %scope, budget = session.token_budget, "Session opened");
    Ok(session)
  }

  #[instrument(level = "debug", skip(self))]
  pub async fn session(&self, session_id: &str) -> Result<SessionContext, TutorError> {
    self
      .store
      .load_session(session_id)
      .await?
      .ok_or_else(|| TutorError::UnknownSession(session_id.to_string()))
  }

  #[instrument(level = "info", skip(self, text), fields(text_len = text.len()))]
  pub async fn submit_turn(&self, session_id: &str, text: &str) -> Result<TurnOutcome, TutorError> {
    self.submit_turn_at(session_id, text, Utc::now()).await
  }

  pub async fn submit_turn_at(&self, session_id: &str, text: &str, now: DateTime<Utc>) -> Result<TurnOutcome, TutorError> {
    let text = text.trim();
    if text.is_empty() {
      return Err(TutorError::InvalidInput("turn text must not be empty".into()));
    }

    let _guard = self.locks.lock(session_id.to_string()).await;
    let mut session = self.session(session_id).await?;

    if session.is_closed() {
      debug!(target: "session", %session_id, reason = ?session.close_reason, "Turn rejected on closed session");
      return Err(TutorError::SessionClosed(session_id.to_string()));
    }
    if session.is_idle(now, self.settings.idle_timeout_secs) {
      session.close(CloseReason::IdleTimeout);
      self.persist(&session).await?;
      info!(target: "session", %session_id, "Session closed after inactivity");
      return Err(TutorError::SessionClosed(session_id.to_string()));
    }

    let min_retained = self.settings.min_retained_turns;
    session.push(Turn::new(Role::User, text, now));
    session.prune(min_retained);

    let (reply, intent, code_example) = match self.assistant.complete(&session.turns).await {
      Ok(c) => {
        let code = c.code_example();
        (Turn::new(Role::Assistant, c.text, now), c.intent, code)
      }
      Err(e) => {
        let err = TutorError::AssistantUnavailable(e.to_string());
        warn!(target: "session", %session_id, assistant = self.assistant.name(), error = %err, "Completion failed; inserting placeholder turn");
        (Turn::assistant_unavailable(now), None, None)
      }
    };
    session.push(reply.clone());
    session.prune(min_retained);
    session.last_activity = now;

    if session.user_turns >= self.settings.max_user_turns {
      session.close(CloseReason::TurnLimit);
      info!(target: "session", %session_id, user_turns = session.user_turns, "Session reached its turn limit");
    }

    let (recommendation, recommendation_error) = match intent {
      Some(Intent::PracticeRequest) => {
        match self.selector.select_next(&session.user_id, &session.curriculum_scope, 1).await {
          Ok(mut queue) => (queue.next(), None),
          Err(e) => {
            warn!(target: "session", %session_id, error = %e, "Practice recommendation unavailable");
            (None, Some(e.to_string()))
          }
        }
      }
      None => (None, None),
    };

    self.persist(&session).await?;
    info!(
      target: "session",
      %session_id,
      remaining = session.token_budget_remaining,
      turns = session.turns.len(),
      recommended = recommendation.as_ref().map(|p| p.problem_id.as_str()).unwrap_or("-"),
      "Turn handled"
    );
    Ok(TurnOutcome { session, reply, recommendation, recommendation_error, code_example })
  }

  /// Close on explicit request. Ending an already closed session returns it unchanged.
  #[instrument(level = "info", skip(self))]
  pub async fn end_session(&self, session_id: &str) -> Result<SessionContext, TutorError> {
    let _guard = self.locks.lock(session_id.to_string()).await;
    let mut session = self.session(session_id).await?;
    if session.is_closed() {
      return Ok(session);
    }
    session.close(CloseReason::Ended);
    self.persist(&session).await?;
    info!(target: "session", %session_id, "Session ended");
    Ok(session)
  }

  /// Close every open session idle for longer than the configured window, then delete closed
  /// sessions whose last activity is older than the retention window. Returns how many were closed.
  #[instrument(level = "debug", skip(self))]
  pub async fn sweep_idle(&self, now: DateTime<Utc>) -> Result<usize, TutorError> {
    let mut closed = 0;
    for id in self.store.open_session_ids().await? {
      let _guard = self.locks.lock(id.clone()).await;
      let Some(mut session) = self.store.load_session(&id).await? else { continue };
      if session.is_closed() || !session.is_idle(now, self.settings.idle_timeout_secs) {
        continue;
      }
      session.close(CloseReason::IdleTimeout);
      self.persist(&session).await?;
      closed += 1;
    }
    if closed > 0 {
      info!(target: "session", closed, "Idle sessions closed");
    }

    let cutoff = now - ChronoDuration::seconds(self.settings.closed_retention_secs as i64);
    let purged = with_backoff(&self.retry, "purge_closed_sessions", || self.store.purge_closed_sessions(cutoff)).await?;
    if purged > 0 {
      info!(target: "session", purged, "Expired closed sessions removed");
    }
    Ok(closed)
  }

  async fn persist(&self, session: &SessionContext) -> Result<(), TutorError> {
    with_backoff(&self.retry, "upsert_session", || self.store.upsert_session(session)).await?;
    Ok(())
  }
}
