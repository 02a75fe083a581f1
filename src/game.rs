//! The room actor: one tokio task per room, the only writer of its [`Room`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{RoomError, RoomResult};
use crate::player::PlayerSession;
use crate::registry::Registry;
use crate::room::{Room, RoomEvent, RoomSettings};
use crate::store::ResultStore;
use crate::types::*;

const COMMAND_BUFFER: usize = 256;

/// Outbound queue of a single connection, drained by its socket writer.
pub type Outbound = mpsc::UnboundedSender<ServerMsg>;

/// Room-scoped intents a member can issue.
#[derive(Debug, Clone)]
pub enum Intent {
    Ready {
        ready: bool,
    },
    UpdateQuiz {
        quiz: Option<QuizConfig>,
        time_limit: Option<u32>,
    },
    Start,
    SubmitAnswer {
        question_index: usize,
        answer: Option<SubmittedAnswer>,
    },
    Leave,
    Close,
}

/// Commands the transport and the actor's own timers send to a room task.
#[derive(Debug)]
pub enum RoomCommand {
    Join {
        player: NewPlayer,
        reply: oneshot::Sender<RoomResult<RoomSnapshot>>,
    },
    Intent {
        connection_id: ConnectionId,
        intent: Intent,
        reply: oneshot::Sender<RoomResult<()>>,
    },
    Disconnect {
        connection_id: ConnectionId,
    },
    Attached {
        connection_id: ConnectionId,
        reply: oneshot::Sender<bool>,
    },
    DeadlineElapsed {
        user_id: UserId,
        question_index: usize,
    },
    GraceElapsed {
        epoch: u64,
    },
    Shutdown {
        reason: String,
    },
}

/// A connection asking to enter a room.
#[derive(Debug, Clone)]
pub struct NewPlayer {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub display_name: String,
    pub outbound: Outbound,
}

/// Lifetimes the actor enforces on its room.
#[derive(Debug, Clone)]
pub struct RoomTiming {
    pub empty_room_grace: Duration,
    pub finished_room_ttl: Duration,
}

impl Default for RoomTiming {
    fn default() -> Self {
        Self {
            empty_room_grace: Duration::from_secs(30),
            finished_room_ttl: Duration::from_secs(120),
        }
    }
}

/// Everything a room task needs from the rest of the process.
#[derive(Clone)]
pub struct RoomContext {
    pub registry: Arc<Registry>,
    pub store: Arc<dyn ResultStore>,
    pub settings: RoomSettings,
    pub timing: RoomTiming,
}

/// Cheap, cloneable address of a running room.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    pub code: String,
    pub created_at: Instant,
    cmd_tx: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub async fn join(&self, player: NewPlayer) -> RoomResult<RoomSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(RoomCommand::Join { player, reply })
            .await
            .map_err(|_| RoomError::Closed)?;
        rx.await.map_err(|_| RoomError::Closed)?
    }

    pub async fn intent(&self, connection_id: &str, intent: Intent) -> RoomResult<()> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(RoomCommand::Intent {
                connection_id: connection_id.to_string(),
                intent,
                reply,
            })
            .await
            .map_err(|_| RoomError::Closed)?;
        rx.await.map_err(|_| RoomError::Closed)?
    }

    pub async fn disconnect(&self, connection_id: &str) {
        let _ = self
            .cmd_tx
            .send(RoomCommand::Disconnect {
                connection_id: connection_id.to_string(),
            })
            .await;
    }

    /// Whether `connection_id` still speaks for a session in this room. False
    /// after the same user re-attached from another connection, or once the
    /// room is gone.
    pub async fn is_attached(&self, connection_id: &str) -> bool {
        let (reply, rx) = oneshot::channel();
        let sent = self
            .cmd_tx
            .send(RoomCommand::Attached {
                connection_id: connection_id.to_string(),
                reply,
            })
            .await;
        sent.is_ok() && rx.await.unwrap_or(false)
    }

    pub async fn shutdown(&self, reason: &str) {
        let _ = self
            .cmd_tx
            .send(RoomCommand::Shutdown {
                reason: reason.to_string(),
            })
            .await;
    }

    /// True once the room task has stopped.
    pub fn is_closed(&self) -> bool {
        self.cmd_tx.is_closed()
    }
}

/// Build a room with `host` as its only player and spawn its task.
pub fn spawn_room(
    code: String,
    host: NewPlayer,
    quiz: Option<QuizConfig>,
    time_limit_seconds: u32,
    ctx: RoomContext,
) -> RoomResult<RoomHandle> {
    let session = PlayerSession::new(
        host.connection_id.clone(),
        host.user_id.clone(),
        host.display_name.clone(),
    );
    let room = Room::new(code.clone(), session, quiz, time_limit_seconds, ctx.settings.clone())?;

    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let handle = RoomHandle {
        code: code.clone(),
        created_at: Instant::now(),
        cmd_tx: cmd_tx.clone(),
    };

    let mut connections = HashMap::new();
    connections.insert(host.connection_id, host.outbound);
    let actor = RoomActor {
        room,
        code: code.clone(),
        connections,
        deadlines: HashMap::new(),
        grace: None,
        grace_epoch: 0,
        finished: false,
        closing: false,
        cmd_tx: cmd_tx.downgrade(),
        ctx,
    };
    tokio::spawn(actor.run(cmd_rx));

    info!(room = %code, host = %host.user_id, "room created");
    Ok(handle)
}

struct RoomActor {
    room: Room,
    code: String,
    connections: HashMap<ConnectionId, Outbound>,
    deadlines: HashMap<UserId, (usize, JoinHandle<()>)>,
    grace: Option<JoinHandle<()>>,
    grace_epoch: u64,
    finished: bool,
    closing: bool,
    cmd_tx: mpsc::WeakSender<RoomCommand>,
    ctx: RoomContext,
}

impl RoomActor {
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<RoomCommand>) {
        self.flush();

        while let Some(cmd) = cmd_rx.recv().await {
            self.handle(cmd);
            self.flush();
            if self.closing {
                break;
            }
            self.update_grace();
        }

        for (_, (_, timer)) in self.deadlines.drain() {
            timer.abort();
        }
        if let Some(grace) = self.grace.take() {
            grace.abort();
        }
        self.ctx.registry.remove_room(&self.code);
        info!(room = %self.code, "room task ended");
    }

    fn handle(&mut self, cmd: RoomCommand) {
        let now = Instant::now();
        match cmd {
            RoomCommand::Join { player, reply } => {
                let NewPlayer {
                    connection_id,
                    user_id,
                    display_name,
                    outbound,
                } = player;
                let result = self
                    .room
                    .join(connection_id.clone(), user_id, &display_name, now);
                if result.is_ok() {
                    self.connections.insert(connection_id, outbound);
                }
                let _ = reply.send(result);
            }
            RoomCommand::Intent {
                connection_id,
                intent,
                reply,
            } => {
                let result = self.apply_intent(&connection_id, intent, now);
                if let Err(err) = &result {
                    debug!(room = %self.code, connection = %connection_id, error = %err, "intent rejected");
                }
                let _ = reply.send(result);
            }
            RoomCommand::Disconnect { connection_id } => {
                self.room.disconnect(&connection_id);
                self.connections.remove(&connection_id);
            }
            RoomCommand::Attached {
                connection_id,
                reply,
            } => {
                let _ = reply.send(self.room.is_attached(&connection_id));
            }
            RoomCommand::DeadlineElapsed {
                user_id,
                question_index,
            } => {
                if self
                    .deadlines
                    .get(&user_id)
                    .is_some_and(|(index, _)| *index == question_index)
                {
                    self.deadlines.remove(&user_id);
                }
                self.room.deadline_elapsed(&user_id, question_index, now);
            }
            RoomCommand::GraceElapsed { epoch } => {
                if epoch != self.grace_epoch {
                    return;
                }
                self.grace = None;
                if self.finished {
                    self.room.shutdown("Results delivered");
                } else if self.lobby_abandoned() {
                    self.room.shutdown("Everyone disconnected");
                }
            }
            RoomCommand::Shutdown { reason } => self.room.shutdown(&reason),
        }
    }

    fn apply_intent(&mut self, connection_id: &str, intent: Intent, now: Instant) -> RoomResult<()> {
        match intent {
            Intent::Ready { ready } => self.room.set_ready(connection_id, ready),
            Intent::UpdateQuiz { quiz, time_limit } => {
                self.room.update_quiz(connection_id, quiz, time_limit)
            }
            Intent::Start => self.room.start(connection_id, now),
            Intent::SubmitAnswer {
                question_index,
                answer,
            } => self
                .room
                .submit_answer(connection_id, question_index, answer, now),
            Intent::Leave => self.room.leave(connection_id),
            Intent::Close => self.room.close(connection_id),
        }
    }

    /// Execute every effect the room queued, in order.
    fn flush(&mut self) {
        for event in self.room.drain_events() {
            match event {
                RoomEvent::SendTo { connection_id, msg } => {
                    if let Some(tx) = self.connections.get(&connection_id) {
                        let _ = tx.send(msg);
                    }
                }
                RoomEvent::Broadcast { msg } => {
                    for tx in self.connections.values() {
                        let _ = tx.send(msg.clone());
                    }
                }
                RoomEvent::BroadcastExcept { exclude, msg } => {
                    for (connection_id, tx) in &self.connections {
                        if *connection_id != exclude {
                            let _ = tx.send(msg.clone());
                        }
                    }
                }
                RoomEvent::Detach { connection_id } => {
                    self.connections.remove(&connection_id);
                }
                RoomEvent::ArmDeadline {
                    user_id,
                    question_index,
                    after,
                } => self.arm_deadline(user_id, question_index, after),
                RoomEvent::CancelDeadline { user_id } => {
                    if let Some((_, timer)) = self.deadlines.remove(&user_id) {
                        timer.abort();
                    }
                }
                RoomEvent::Finished { results } => {
                    self.finished = true;
                    let store = self.ctx.store.clone();
                    let code = self.code.clone();
                    tokio::spawn(async move {
                        match store.save(results).await {
                            Ok(()) => info!(room = %code, "results stored"),
                            Err(err) => warn!(room = %code, error = %err, "failed to store results"),
                        }
                    });
                    let ttl = self.ctx.timing.finished_room_ttl;
                    self.arm_grace(ttl);
                }
                RoomEvent::Close { reason } => {
                    info!(room = %self.code, reason = %reason, "closing room");
                    self.closing = true;
                }
            }
        }
    }

    fn arm_deadline(&mut self, user_id: UserId, question_index: usize, after: Duration) {
        if let Some((_, previous)) = self.deadlines.remove(&user_id) {
            previous.abort();
        }
        let cmd_tx = self.cmd_tx.clone();
        let timer_user = user_id.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(tx) = cmd_tx.upgrade() {
                let _ = tx
                    .send(RoomCommand::DeadlineElapsed {
                        user_id: timer_user,
                        question_index,
                    })
                    .await;
            }
        });
        self.deadlines.insert(user_id, (question_index, timer));
    }

    /// Nobody connected to a room that has not started. A game in progress is
    /// driven to completion by its deadlines instead.
    fn lobby_abandoned(&self) -> bool {
        self.room.state() == RoomState::Lobby && self.room.connected_count() == 0
    }

    /// Keep an abandonment timer running exactly while the lobby is empty.
    fn update_grace(&mut self) {
        if self.finished {
            return;
        }
        match (self.lobby_abandoned(), self.grace.is_some()) {
            (true, false) => {
                let grace = self.ctx.timing.empty_room_grace;
                debug!(room = %self.code, ?grace, "lobby is empty; scheduling removal");
                self.arm_grace(grace);
            }
            (false, true) => {
                debug!(room = %self.code, "lobby occupied or game started; removal cancelled");
                self.cancel_grace();
            }
            _ => {}
        }
    }

    fn arm_grace(&mut self, after: Duration) {
        self.cancel_grace();
        let epoch = self.grace_epoch;
        let cmd_tx = self.cmd_tx.clone();
        self.grace = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(tx) = cmd_tx.upgrade() {
                let _ = tx.send(RoomCommand::GraceElapsed { epoch }).await;
            }
        }));
    }

    fn cancel_grace(&mut self) {
        if let Some(grace) = self.grace.take() {
            grace.abort();
        }
        self.grace_epoch += 1;
    }
}
