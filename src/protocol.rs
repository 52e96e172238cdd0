//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analytics::ProgressSummary;
use crate::domain::{CloseReason, Difficulty, Outcome, Problem, Role, SessionContext, SessionState, Topic, TopicMastery, Turn, TurnKind};
use crate::session::TurnOutcome;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    SubmitAttempt {
        attempt: AttemptIn,
    },
    NextPractice {
        #[serde(rename = "userId")]
        user_id: String,
        #[serde(default)]
        count: Option<usize>,
        #[serde(default)]
        scope: Option<String>,
    },
    Mastery {
        #[serde(rename = "userId")]
        user_id: String,
    },
    Progress {
        #[serde(rename = "userId")]
        user_id: String,
        #[serde(default)]
        from: Option<DateTime<Utc>>,
        #[serde(default)]
        to: Option<DateTime<Utc>>,
        #[serde(default)]
        scope: Option<String>,
    },
    OpenSession {
        #[serde(rename = "userId")]
        user_id: String,
        #[serde(default)]
        scope: Option<String>,
    },
    SessionTurn {
        #[serde(rename = "sessionId")]
        session_id: String,
        text: String,
    },
    EndSession {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    Assist {
        question: String,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    AttemptRecorded {
        mastery: MasteryOut,
    },
    Practice {
        practice: PracticeOut,
    },
    Mastery {
        topics: Vec<MasteryOut>,
    },
    Progress {
        summary: ProgressSummary,
    },
    Session {
        session: SessionOut,
    },
    TurnResult {
        result: Box<ChatOut>,
    },
    Assist {
        assist: AssistOut,
    },
    Error {
        code: String,
        message: String,
    },
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Clone, Deserialize)]
pub struct AttemptIn {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "problemId")]
    pub problem_id: String,
    /// Derived from the catalog when omitted.
    #[serde(rename = "topicId", default)]
    pub topic_id: Option<String>,
    pub outcome: Outcome,
    /// Defaults to the time the server receives the attempt.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "latencyMs", default)]
    pub latency_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct MasteryOut {
    #[serde(rename = "topicId")]
    pub topic_id: String,
    pub score: f64,
    #[serde(rename = "attemptCount")]
    pub attempt_count: u32,
    #[serde(rename = "lastUpdated")]
    pub last_updated: Option<DateTime<Utc>>,
    pub band: Difficulty,
}

impl From<&TopicMastery> for MasteryOut {
    fn from(m: &TopicMastery) -> Self {
        Self {
            topic_id: m.topic_id.clone(),
            score: m.score,
            attempt_count: m.attempt_count,
            last_updated: m.last_updated,
            band: Difficulty::for_score(m.score),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    #[serde(rename = "userId")]
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PracticeQuery {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub count: Option<usize>,
    pub scope: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProgressQuery {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub scope: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TopicsQuery {
    pub scope: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TopicOut {
    pub id: String,
    pub name: String,
    pub scopes: Vec<String>,
}

impl From<Topic> for TopicOut {
    fn from(t: Topic) -> Self {
        Self { id: t.topic_id, name: t.name, scopes: t.scopes }
    }
}

#[derive(Debug, Serialize)]
pub struct ProblemOut {
    pub id: String,
    #[serde(rename = "topicId")]
    pub topic_id: String,
    pub difficulty: Difficulty,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl From<&Problem> for ProblemOut {
    fn from(p: &Problem) -> Self {
        Self {
            id: p.problem_id.clone(),
            topic_id: p.topic_id.clone(),
            difficulty: p.difficulty,
            title: p.title.clone(),
            url: p.metadata.get("url").cloned(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PracticeOut {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub scope: String,
    pub problems: Vec<ProblemOut>,
}

#[derive(Debug, Deserialize)]
pub struct SessionIn {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TurnIn {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct TurnView {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub kind: TurnKind,
}

impl From<&Turn> for TurnView {
    fn from(t: &Turn) -> Self {
        Self { role: t.role, text: t.text.clone(), timestamp: t.timestamp, kind: t.kind }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionOut {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub scope: String,
    pub state: SessionState,
    #[serde(rename = "closeReason")]
    pub close_reason: Option<CloseReason>,
    #[serde(rename = "tokenBudget")]
    pub token_budget: i64,
    #[serde(rename = "tokenBudgetRemaining")]
    pub token_budget_remaining: i64,
    #[serde(rename = "userTurns")]
    pub user_turns: u32,
    pub turns: Vec<TurnView>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "lastActivity")]
    pub last_activity: DateTime<Utc>,
}

impl From<&SessionContext> for SessionOut {
    fn from(s: &SessionContext) -> Self {
        Self {
            session_id: s.session_id.clone(),
            user_id: s.user_id.clone(),
            scope: s.curriculum_scope.clone(),
            state: s.state,
            close_reason: s.close_reason,
            token_budget: s.token_budget,
            token_budget_remaining: s.token_budget_remaining,
            user_turns: s.user_turns,
            // System prompts stay server-side.
            turns: s.turns.iter().filter(|t| t.role != Role::System).map(TurnView::from).collect(),
            created_at: s.created_at,
            last_activity: s.last_activity,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatOut {
    pub session: SessionOut,
    pub reply: TurnView,
    pub recommendation: Option<ProblemOut>,
    #[serde(rename = "recommendationError", skip_serializing_if = "Option::is_none")]
    pub recommendation_error: Option<String>,
    #[serde(rename = "codeExample", skip_serializing_if = "Option::is_none")]
    pub code_example: Option<String>,
}

impl From<&TurnOutcome> for ChatOut {
    fn from(o: &TurnOutcome) -> Self {
        Self {
            session: SessionOut::from(&o.session),
            reply: TurnView::from(&o.reply),
            recommendation: o.recommendation.as_ref().map(ProblemOut::from),
            recommendation_error: o.recommendation_error.clone(),
            code_example: o.code_example.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AssistIn {
    pub question: String,
}
#[derive(Debug, Serialize)]
pub struct AssistOut {
    pub response: String,
    #[serde(rename = "codeExample")]
    pub code_example: Option<String>,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub assistant: String,
}
