//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic. We reply with a single JSON message per request.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{info, error, instrument, debug};

use crate::analytics::TimeRange;
use crate::error::TutorError;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::logic::*;
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "dsa_tutor", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "dsa_tutor", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        // Parse, dispatch, serialize response.
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "dsa_tutor", "WS received: {:?}", &incoming);
            handle_client_ws(incoming, &state).await
          }
          Err(e) => ServerWsMessage::Error { code: "INVALID_INPUT".into(), message: format!("Invalid JSON: {}", e) },
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "code": "INTERNAL", "message": format!("Serialization error: {}", e) }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "dsa_tutor", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "dsa_tutor", "WebSocket disconnected");
}

fn ws_error(e: TutorError) -> ServerWsMessage {
  ServerWsMessage::Error { code: e.code().to_string(), message: e.to_string() }
}

#[instrument(level = "info", skip(state))]
pub async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  let result = match msg {
    ClientWsMessage::Ping => Ok(ServerWsMessage::Pong),

    ClientWsMessage::SubmitAttempt { attempt } => submit_attempt(state, attempt)
      .await
      .map(|mastery| ServerWsMessage::AttemptRecorded { mastery }),

    ClientWsMessage::NextPractice { user_id, count, scope } => next_practice(state, &user_id, scope, count)
      .await
      .map(|practice| ServerWsMessage::Practice { practice }),

    ClientWsMessage::Mastery { user_id } => mastery_snapshot(state, &user_id)
      .await
      .map(|topics| ServerWsMessage::Mastery { topics }),

    ClientWsMessage::Progress { user_id, from, to, scope } => progress(state, &user_id, scope, TimeRange { from, to })
      .await
      .map(|summary| ServerWsMessage::Progress { summary }),

    ClientWsMessage::OpenSession { user_id, scope } => open_session(state, &user_id, scope)
      .await
      .map(|session| ServerWsMessage::Session { session }),

    ClientWsMessage::SessionTurn { session_id, text } => session_turn(state, &session_id, &text)
      .await
      .map(|result| ServerWsMessage::TurnResult { result: Box::new(result) }),

    ClientWsMessage::EndSession { session_id } => end_session(state, &session_id)
      .await
      .map(|session| ServerWsMessage::Session { session }),

    ClientWsMessage::Assist { question } => assist(state, &question)
      .await
      .map(|assist| ServerWsMessage::Assist { assist }),
  };
  result.unwrap_or_else(ws_error)
}
