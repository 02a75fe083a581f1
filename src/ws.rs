//! WebSocket transport: decodes client intents, forwards them to rooms and
//! streams room messages back to the socket.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{RoomError, RoomResult};
use crate::game::{Intent, NewPlayer, Outbound, RoomHandle};
use crate::server::AppState;
use crate::types::*;

/// Handle the full lifecycle of one client socket.
pub async fn handle_socket(socket: WebSocket, state: AppState, user_id: UserId) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ServerMsg>();

    // Room actors push into the channel; only this task touches the sink.
    let writer = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to encode server message");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut connection = Connection::new(state, user_id, outbound_tx);
    info!(connection = %connection.id, user_id = %connection.user_id, "websocket connected");

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => connection.on_text(text.as_str()).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                debug!(connection = %connection.id, error = %err, "websocket receive error");
                break;
            }
        }
    }

    info!(connection = %connection.id, "websocket disconnected");
    connection.on_disconnect().await;
    writer.abort();
}

/// Per-socket state: who is on the other end and which room they are in.
struct Connection {
    id: ConnectionId,
    user_id: UserId,
    outbound: Outbound,
    room: Option<RoomHandle>,
    state: AppState,
}

impl Connection {
    fn new(state: AppState, user_id: UserId, outbound: Outbound) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            outbound,
            room: None,
            state,
        }
    }

    async fn on_text(&mut self, text: &str) {
        let msg = match serde_json::from_str::<ClientMsg>(text) {
            Ok(msg) => msg,
            Err(err) => {
                warn!(connection = %self.id, error = %err, "invalid client message");
                self.reply(RoomError::validation(format!("Invalid message: {err}")).to_message());
                return;
            }
        };
        let room = msg.room_code().map(str::to_owned);
        if let Err(err) = self.dispatch(msg).await {
            debug!(connection = %self.id, room = ?room, error = %err, "request rejected");
            self.reply(err.to_message());
        }
    }

    async fn dispatch(&mut self, msg: ClientMsg) -> RoomResult<()> {
        match msg {
            ClientMsg::CreateRoom {
                display_name,
                time_limit,
                quiz_config,
                quiz_id,
            } => {
                self.ensure_not_in_room().await?;
                let quiz = self.resolve_quiz(quiz_config, quiz_id)?;
                let host = self.new_player(display_name);
                let handle = self.state.registry.create_room(host, quiz, time_limit)?;
                self.room = Some(handle);
                Ok(())
            }
            ClientMsg::JoinRoom {
                room_code,
                display_name,
            } => {
                self.ensure_not_in_room().await?;
                let player = self.new_player(display_name);
                let (handle, _) = self.state.registry.join_room(&room_code, player).await?;
                self.room = Some(handle);
                Ok(())
            }
            ClientMsg::PlayerReady { room_code, ready } => {
                self.send_intent(&room_code, Intent::Ready { ready }).await
            }
            ClientMsg::UpdateQuiz {
                room_code,
                quiz_config,
                quiz_id,
                time_limit,
            } => {
                let quiz = self.resolve_quiz(quiz_config, quiz_id)?;
                self.send_intent(&room_code, Intent::UpdateQuiz { quiz, time_limit })
                    .await
            }
            ClientMsg::StartGame { room_code } => self.send_intent(&room_code, Intent::Start).await,
            ClientMsg::SubmitAnswer {
                room_code,
                question_index,
                answer,
                elapsed_seconds,
            } => {
                if let Some(reported) = elapsed_seconds {
                    debug!(connection = %self.id, question_index, reported, "client-reported elapsed time");
                }
                self.send_intent(
                    &room_code,
                    Intent::SubmitAnswer {
                        question_index,
                        answer,
                    },
                )
                .await
            }
            ClientMsg::LeaveRoom { room_code } => {
                self.send_intent(&room_code, Intent::Leave).await?;
                self.forget_room(&room_code);
                Ok(())
            }
            ClientMsg::CloseRoom { room_code } => {
                self.send_intent(&room_code, Intent::Close).await?;
                self.forget_room(&room_code);
                Ok(())
            }
        }
    }

    async fn send_intent(&self, room_code: &str, intent: Intent) -> RoomResult<()> {
        let handle = self.state.registry.get_room(room_code)?;
        handle.intent(&self.id, intent).await
    }

    /// A socket plays in one room at a time. A closed room, or one where the
    /// same user has since re-attached from another socket, no longer counts.
    async fn ensure_not_in_room(&mut self) -> RoomResult<()> {
        if let Some(handle) = &self.room {
            if handle.is_attached(&self.id).await {
                return Err(RoomError::validation(format!(
                    "Already in room {}; leave it first",
                    handle.code
                )));
            }
            debug!(connection = %self.id, room = %handle.code, "dropping stale room membership");
        }
        self.room = None;
        Ok(())
    }

    fn forget_room(&mut self, room_code: &str) {
        if self
            .room
            .as_ref()
            .is_some_and(|handle| handle.code == crate::registry::normalize_code(room_code))
        {
            self.room = None;
        }
    }

    fn resolve_quiz(
        &self,
        quiz_config: Option<QuizConfig>,
        quiz_id: Option<String>,
    ) -> RoomResult<Option<QuizConfig>> {
        if let Some(quiz) = quiz_config {
            return Ok(Some(quiz));
        }
        let Some(quiz_id) = quiz_id else {
            return Ok(None);
        };
        self.state
            .quizzes
            .iter()
            .find(|q| q.id == quiz_id)
            .map(|q| Some(q.quiz.clone()))
            .ok_or_else(|| RoomError::not_found(format!("Quiz {quiz_id} not found")))
    }

    fn new_player(&self, display_name: String) -> NewPlayer {
        NewPlayer {
            connection_id: self.id.clone(),
            user_id: self.user_id.clone(),
            display_name,
            outbound: self.outbound.clone(),
        }
    }

    fn reply(&self, msg: ServerMsg) {
        let _ = self.outbound.send(msg);
    }

    async fn on_disconnect(&mut self) {
        if let Some(handle) = self.room.take() {
            handle.disconnect(&self.id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::ServerConfig;
    use crate::registry::Registry;
    use crate::store::MemoryResultStore;

    type Inbox = mpsc::UnboundedReceiver<ServerMsg>;

    fn state() -> AppState {
        let quiz = QuizConfig {
            topic: "Space".into(),
            difficulty: "easy".into(),
            question_type: QuestionType::TrueFalse,
            questions: vec![Question {
                text: "The Sun is a star".into(),
                options: vec!["True".into(), "False".into()],
                correct_index: 0,
                explanation: None,
            }],
        };
        AppState {
            registry: Registry::new(ServerConfig::default(), Arc::new(MemoryResultStore::new())),
            quizzes: Arc::new(vec![QuizWithId {
                id: "space".into(),
                quiz,
            }]),
        }
    }

    fn connection(state: &AppState, user_id: &str) -> (Connection, Inbox) {
        let (outbound, inbox) = mpsc::unbounded_channel();
        (Connection::new(state.clone(), user_id.to_string(), outbound), inbox)
    }

    /// Everything delivered so far, once the room tasks have run.
    async fn drain(inbox: &mut Inbox) -> Vec<ServerMsg> {
        tokio::task::yield_now().await;
        let mut received = Vec::new();
        while let Ok(msg) = inbox.try_recv() {
            received.push(msg);
        }
        received
    }

    fn error_codes(messages: &[ServerMsg]) -> Vec<&str> {
        messages
            .iter()
            .filter_map(|m| match m {
                ServerMsg::Error { code, .. } => Some(code.as_str()),
                _ => None,
            })
            .collect()
    }

    async fn create_room(conn: &mut Connection, inbox: &mut Inbox) -> String {
        conn.on_text(r#"{"type":"create-room","displayName":"Ada","quizId":"space"}"#)
            .await;
        match inbox.recv().await {
            Some(ServerMsg::RoomCreated { room, .. }) => room.code,
            other => panic!("expected room-created, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_frames_get_a_validation_error() {
        let state = state();
        let (mut conn, mut inbox) = connection(&state, "ada");

        conn.on_text("{ not json").await;
        conn.on_text(r#"{"type":"dance","roomCode":"K3F9QZ"}"#).await;

        let received = drain(&mut inbox).await;
        assert_eq!(error_codes(&received), ["validation", "validation"]);
    }

    #[tokio::test]
    async fn unknown_quiz_id_is_not_found() {
        let state = state();
        let (mut conn, mut inbox) = connection(&state, "ada");

        conn.on_text(r#"{"type":"create-room","displayName":"Ada","quizId":"oceans"}"#)
            .await;

        let received = drain(&mut inbox).await;
        assert_eq!(error_codes(&received), ["not-found"]);
        assert!(state.registry.is_empty());
    }

    #[tokio::test]
    async fn rejected_intents_reach_only_the_sender() {
        let state = state();
        let (mut host, mut host_inbox) = connection(&state, "ada");
        let (mut guest, mut guest_inbox) = connection(&state, "grace");
        let code = create_room(&mut host, &mut host_inbox).await;

        guest
            .on_text(&format!(
                r#"{{"type":"join-room","roomCode":"{code}","displayName":"Grace"}}"#
            ))
            .await;
        guest
            .on_text(&format!(r#"{{"type":"start-game","roomCode":"{code}"}}"#))
            .await;

        let guest_received = drain(&mut guest_inbox).await;
        assert_eq!(error_codes(&guest_received), ["validation"]);
        let host_received = drain(&mut host_inbox).await;
        assert!(error_codes(&host_received).is_empty());
        assert!(
            host_received
                .iter()
                .any(|m| matches!(m, ServerMsg::PlayerJoined { .. }))
        );
    }

    #[tokio::test]
    async fn socket_replaced_by_a_rejoin_can_start_over() {
        let state = state();
        let (mut first, mut first_inbox) = connection(&state, "ada");
        let (mut second, mut second_inbox) = connection(&state, "ada");
        let code = create_room(&mut first, &mut first_inbox).await;

        second
            .on_text(&format!(
                r#"{{"type":"join-room","roomCode":"{code}","displayName":"Ada"}}"#
            ))
            .await;
        let rejoined = drain(&mut second_inbox).await;
        assert!(
            rejoined
                .iter()
                .any(|m| matches!(m, ServerMsg::RoomJoined { rejoined: true, .. }))
        );
        drain(&mut first_inbox).await;

        let fresh = create_room(&mut first, &mut first_inbox).await;
        assert_ne!(fresh, code);
        assert!(error_codes(&drain(&mut first_inbox).await).is_empty());
    }

    #[tokio::test]
    async fn attached_socket_cannot_open_a_second_room() {
        let state = state();
        let (mut conn, mut inbox) = connection(&state, "ada");
        create_room(&mut conn, &mut inbox).await;

        conn.on_text(r#"{"type":"create-room","displayName":"Ada"}"#).await;
        let received = drain(&mut inbox).await;
        assert_eq!(error_codes(&received), ["validation"]);
        assert_eq!(state.registry.len(), 1);
    }
}
