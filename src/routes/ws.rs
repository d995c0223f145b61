//! WebSocket upgrade + session loop. One connection is one game session.
//!
//! The socket reader and the session's timer channel are multiplexed with
//! `select!`, so the session is mutated by one event at a time. After every
//! event the client receives the resulting notices and a fresh `state` view.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn, Instrument};
use uuid::Uuid;

use crate::domain::FinishReason;
use crate::logic::persist_result;
use crate::progression::{Effect, Session};
use crate::protocol::{to_view, ClientWsMessage, ServerWsMessage};
use crate::scheduler::{Scheduler, TimerFire};
use crate::state::AppState;
use crate::storage::Storage;

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "numquest", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| {
    let session_id = Uuid::new_v4();
    handle_ws(socket, state).instrument(tracing::info_span!("session", %session_id))
  })
}

/// What one event produced for the client.
#[derive(Debug, Default)]
pub struct Step {
  pub messages: Vec<ServerWsMessage>,
  /// The session is over; close the socket.
  pub done: bool,
}

/// Owns a session and its timers and turns effects into outgoing messages.
pub struct SessionDriver {
  session: Session,
  scheduler: Scheduler,
  storage: Arc<Storage>,
}

impl SessionDriver {
  pub fn new(session: Session, scheduler: Scheduler, storage: Arc<Storage>) -> Self {
    Self { session, scheduler, storage }
  }

  pub fn session(&self) -> &Session {
    &self.session
  }

  pub fn snapshot(&self) -> ServerWsMessage {
    ServerWsMessage::State { view: to_view(&self.session) }
  }

  pub fn handle(&mut self, msg: ClientWsMessage) -> Step {
    let s = &mut self.session;
    let effects = match msg {
      ClientWsMessage::Ping => return Step { messages: vec![ServerWsMessage::Pong], done: false },
      ClientWsMessage::SelectDifficulty { difficulty } => s.select_difficulty(difficulty),
      ClientWsMessage::JumpToLevel { level } => s.jump_to_level(level),
      ClientWsMessage::Hint => s.hint(),
      ClientWsMessage::Pick { value } => s.pick(value),
      ClientWsMessage::Catch { item_id } => s.catch_item(item_id),
      ClientWsMessage::MovePlatform { x } => s.move_platform(x),
      ClientWsMessage::NudgePlatform { delta } => s.nudge_platform(delta),
      ClientWsMessage::DropCard { card_id, slot } => s.drop_card(card_id, slot),
      ClientWsMessage::ClearSlot { slot } => s.clear_slot(slot),
      ClientWsMessage::ReturnCard { card_id } => s.return_card(card_id),
      ClientWsMessage::SlotHint { slot } => s.slot_hint(slot),
      ClientWsMessage::CheckExpression => s.check_expression(),
      ClientWsMessage::Finish => s.finish(),
      ClientWsMessage::Exit => s.exit(),
    };
    self.apply(effects)
  }

  pub fn on_fire(&mut self, fire: TimerFire) -> Step {
    match self.session.on_fire(fire) {
      Some(effects) => self.apply(effects),
      None => Step::default(),
    }
  }

  fn apply(&mut self, effects: Vec<Effect>) -> Step {
    let mut step = Step::default();
    let mut closing = None;
    for effect in effects {
      match effect {
        Effect::Notice { kind, text } => step.messages.push(ServerWsMessage::Notice { kind, text }),
        Effect::Hint(text) => step.messages.push(ServerWsMessage::Hint { text }),
        Effect::Arm { generation, plan } => self.scheduler.arm(generation, plan),
        Effect::Disarm => self.scheduler.disarm(),
        Effect::HaltSpawner => self.scheduler.halt_spawner(),
        Effect::After { generation, delay_ms, deferred } => self.scheduler.after(generation, delay_ms, deferred),
        Effect::Close { reason } => closing = Some(reason),
      }
    }
    match closing {
      None => step.messages.push(self.snapshot()),
      Some(None) => {
        info!(target: "game", player = %self.session.player(), "session exited without saving");
        step.messages.push(ServerWsMessage::game_over(None, None));
        step.done = true;
      }
      Some(Some(reason)) => self.close_with(reason, &mut step),
    }
    step
  }

  /// Save the result, then end the session. A failed save keeps it running.
  fn close_with(&mut self, reason: FinishReason, step: &mut Step) {
    let saved = self
      .session
      .closing_record(reason)
      .map_err(|e| e.to_string())
      .and_then(|record| persist_result(&self.storage, &record).map(|_| record).map_err(|e| e.to_string()));
    match saved {
      Ok(record) => {
        for effect in self.session.close() {
          if effect == Effect::Disarm {
            self.scheduler.disarm();
          }
        }
        info!(target: "game", player = %record.name, score = record.score, reason = reason.as_str(), "game over");
        step.messages.push(ServerWsMessage::game_over(Some(reason), Some(record)));
        step.done = true;
      }
      Err(message) => {
        error!(target: "game", %message, "could not save the result; session stays open");
        step.messages.push(ServerWsMessage::Error { message: format!("Could not save the result: {message}") });
        step.messages.push(self.snapshot());
      }
    }
  }
}

async fn send(socket: &mut WebSocket, msg: &ServerWsMessage) -> bool {
  let out = serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
  });
  match socket.send(Message::Text(out)).await {
    Ok(()) => true,
    Err(e) => {
      error!(target: "numquest", error = %e, "WS send error");
      false
    }
  }
}

async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  let Some(player) = state.storage.current_player() else {
    warn!(target: "numquest", "WebSocket without a bound player; closing");
    let msg = ServerWsMessage::Error { message: "Enter your name first".into() };
    send(&mut socket, &msg).await;
    let _ = socket.send(Message::Close(None)).await;
    return;
  };
  info!(target: "numquest", %player, "WebSocket connected");

  let (tx, mut rx) = mpsc::unbounded_channel();
  let session = Session::new(player, state.config.clone());
  let mut driver = SessionDriver::new(session, Scheduler::new(tx), state.storage.clone());
  if !send(&mut socket, &driver.snapshot()).await {
    return;
  }

  'session: loop {
    let step = tokio::select! {
      incoming = socket.recv() => match incoming {
        Some(Ok(Message::Text(txt))) => match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(msg) => {
            debug!(target: "numquest", ?msg, "WS received");
            driver.handle(msg)
          }
          Err(e) => Step { messages: vec![ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) }], done: false },
        },
        Some(Ok(Message::Ping(payload))) => {
          let _ = socket.send(Message::Pong(payload)).await;
          continue;
        }
        Some(Ok(Message::Close(_))) | None => break,
        Some(Err(e)) => {
          warn!(target: "numquest", error = %e, "WS receive error");
          break;
        }
        Some(Ok(_)) => continue,
      },
      Some(fire) = rx.recv() => driver.on_fire(fire),
    };

    for msg in &step.messages {
      if !send(&mut socket, msg).await {
        break 'session;
      }
    }
    if step.done {
      let _ = socket.send(Message::Close(None)).await;
      break;
    }
  }
  info!(target: "numquest", phase = ?driver.session().phase(), "WebSocket disconnected");
}
