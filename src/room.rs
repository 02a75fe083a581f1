//! Authoritative state of a single quiz room.
//!
//! A [`Room`] is plain data plus a state machine. It never touches channels or
//! timers itself: every operation queues [`RoomEvent`]s that the owning actor
//! (see `game.rs`) drains and executes.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;
use thiserror::Error;
use tokio::time::Instant;

use crate::error::{RoomError, RoomResult};
use crate::player::{Advance, PlayerSession};
use crate::types::*;

pub const MAX_DISPLAY_NAME_CHARS: usize = 20;

/// Limits a room enforces, taken from the server configuration.
#[derive(Debug, Clone)]
pub struct RoomSettings {
    pub max_players: usize,
    pub min_time_limit: u32,
    pub max_time_limit: u32,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            max_players: 10,
            min_time_limit: 5,
            max_time_limit: 300,
        }
    }
}

/// Effects produced by room operations, executed in order by the room actor.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// Send a message to a specific connection.
    SendTo {
        connection_id: ConnectionId,
        msg: ServerMsg,
    },
    /// Send a message to every attached connection.
    Broadcast { msg: ServerMsg },
    /// Send a message to every attached connection but one.
    BroadcastExcept {
        exclude: ConnectionId,
        msg: ServerMsg,
    },
    /// Stop routing room traffic to a connection.
    Detach { connection_id: ConnectionId },
    /// Schedule an automatic missed answer for `(user_id, question_index)`.
    ArmDeadline {
        user_id: UserId,
        question_index: usize,
        after: Duration,
    },
    /// Drop any pending deadline for the player.
    CancelDeadline { user_id: UserId },
    /// Every player is done; results are final.
    Finished { results: RoomResults },
    /// The room is over and should be unregistered.
    Close { reason: String },
}

/// Transitions of the room-level state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomTransition {
    Start,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {transition:?} cannot be applied while {from}")]
pub struct InvalidTransition {
    pub from: RoomState,
    pub transition: RoomTransition,
}

/// Compute the room state after `transition`, if it is allowed from `from`.
pub fn next_state(from: RoomState, transition: RoomTransition) -> Result<RoomState, InvalidTransition> {
    match (from, transition) {
        (RoomState::Lobby, RoomTransition::Start) => Ok(RoomState::InProgress),
        (RoomState::InProgress, RoomTransition::Complete) => Ok(RoomState::Finished),
        (from, transition) => Err(InvalidTransition { from, transition }),
    }
}

/// Wall clock in unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Trim and bound a display name.
pub fn validate_display_name(name: &str) -> RoomResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RoomError::validation("Display name cannot be empty"));
    }
    if name.chars().count() > MAX_DISPLAY_NAME_CHARS {
        return Err(RoomError::validation(format!(
            "Display name cannot exceed {MAX_DISPLAY_NAME_CHARS} characters"
        )));
    }
    Ok(name.to_string())
}

/// Check quiz content once, before the game starts.
pub fn validate_quiz(quiz: &QuizConfig) -> RoomResult<()> {
    if quiz.questions.is_empty() {
        return Err(RoomError::validation("Quiz has no questions"));
    }
    let expected = quiz.question_type.option_count();
    for (index, question) in quiz.questions.iter().enumerate() {
        if question.text.trim().is_empty() {
            return Err(RoomError::validation(format!(
                "Question {} has no text",
                index + 1
            )));
        }
        if question.options.len() != expected {
            return Err(RoomError::validation(format!(
                "Question {} must have {expected} options, found {}",
                index + 1,
                question.options.len()
            )));
        }
        if question.correct_index >= question.options.len() {
            return Err(RoomError::validation(format!(
                "Question {} has no option at index {}",
                index + 1,
                question.correct_index
            )));
        }
    }
    Ok(())
}

pub struct Room {
    code: String,
    host_id: UserId,
    quiz: Option<QuizConfig>,
    time_limit_seconds: u32,
    players: IndexMap<UserId, PlayerSession>,
    state: RoomState,
    started_at: Option<u64>,
    ended_at: Option<u64>,
    results: Option<RoomResults>,
    settings: RoomSettings,
    events: Vec<RoomEvent>,
}

impl Room {
    /// Create a room in the lobby with `host` as its only player.
    pub fn new(
        code: String,
        mut host: PlayerSession,
        quiz: Option<QuizConfig>,
        time_limit_seconds: u32,
        settings: RoomSettings,
    ) -> RoomResult<Self> {
        check_time_limit(time_limit_seconds, &settings)?;
        if quiz.as_ref().is_some_and(|q| q.questions.is_empty()) {
            return Err(RoomError::validation("Quiz has no questions"));
        }
        host.display_name = validate_display_name(&host.display_name)?;
        host.ready = true;

        let host_id = host.user_id.clone();
        let host_connection = host.connection_id.clone();
        let mut players = IndexMap::new();
        players.insert(host_id.clone(), host);

        let mut room = Self {
            code,
            host_id,
            quiz,
            time_limit_seconds,
            players,
            state: RoomState::Lobby,
            started_at: None,
            ended_at: None,
            results: None,
            settings,
            events: Vec::new(),
        };

        let msg = ServerMsg::RoomCreated {
            room: room.snapshot(),
            user_id: room.host_id.clone(),
        };
        room.send_to(&host_connection, msg);
        Ok(room)
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn state(&self) -> RoomState {
        self.state
    }

    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    pub fn time_limit_seconds(&self) -> u32 {
        self.time_limit_seconds
    }

    pub fn player(&self, user_id: &str) -> Option<&PlayerSession> {
        self.players.get(user_id)
    }

    pub fn players(&self) -> impl Iterator<Item = &PlayerSession> {
        self.players.values()
    }

    pub fn connected_count(&self) -> usize {
        self.players.values().filter(|p| p.connected).count()
    }

    pub fn question_count(&self) -> usize {
        self.quiz.as_ref().map_or(0, |q| q.questions.len())
    }

    pub fn results(&self) -> Option<&RoomResults> {
        self.results.as_ref()
    }

    /// Take every effect queued since the last call.
    pub fn drain_events(&mut self) -> Vec<RoomEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            code: self.code.clone(),
            host_id: self.host_id.clone(),
            state: self.state,
            time_limit_seconds: self.time_limit_seconds,
            max_players: self.settings.max_players,
            quiz: self.quiz.as_ref().map(QuizConfig::summary),
            players: self
                .players
                .values()
                .map(|p| p.summary(p.user_id == self.host_id))
                .collect(),
            started_at: self.started_at,
            ended_at: self.ended_at,
        }
    }

    /// Score-sorted view of every player; ties go to the lower total answer time,
    /// then to the earlier joiner.
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let mut ranked: Vec<&PlayerSession> = self.players.values().collect();
        ranked.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.total_elapsed_seconds().total_cmp(&b.total_elapsed_seconds()))
        });
        ranked
            .into_iter()
            .enumerate()
            .map(|(index, p)| LeaderboardEntry {
                rank: index + 1,
                user_id: p.user_id.clone(),
                display_name: p.display_name.clone(),
                score: p.score,
                answered: p.answer_log.len(),
                correct_count: p.correct_count(),
                total_elapsed_seconds: p.total_elapsed_seconds(),
                finished: p.finished,
                connected: p.connected,
            })
            .collect()
    }

    /// Add a player, or re-attach a returning one to their existing session.
    pub fn join(
        &mut self,
        connection_id: ConnectionId,
        user_id: UserId,
        display_name: &str,
        now: Instant,
    ) -> RoomResult<RoomSnapshot> {
        if self.players.contains_key(&user_id) {
            return Ok(self.rejoin(connection_id, &user_id, now));
        }
        if self.state != RoomState::Lobby {
            return Err(RoomError::conflict("Game has already started"));
        }
        if self.players.len() >= self.settings.max_players {
            return Err(RoomError::conflict("Room is full"));
        }
        let display_name = validate_display_name(display_name)?;

        let player = PlayerSession::new(connection_id.clone(), user_id.clone(), display_name);
        let summary = player.summary(false);
        self.players.insert(user_id.clone(), player);

        let snapshot = self.snapshot();
        self.send_to(
            &connection_id,
            ServerMsg::RoomJoined {
                room: snapshot.clone(),
                user_id,
                rejoined: false,
                current_question: None,
                tally: None,
            },
        );
        self.broadcast_except(&connection_id, ServerMsg::PlayerJoined { player: summary });
        Ok(snapshot)
    }

    fn rejoin(&mut self, connection_id: ConnectionId, user_id: &str, now: Instant) -> RoomSnapshot {
        let question_count = self.question_count();
        let time_limit = self.time_limit_seconds;
        let (previous_connection, was_connected) = {
            let Some(player) = self.players.get_mut(user_id) else {
                return self.snapshot();
            };
            let previous = std::mem::replace(&mut player.connection_id, connection_id.clone());
            let was_connected = player.connected;
            player.connected = true;
            (previous, was_connected)
        };
        if was_connected && previous_connection != connection_id {
            self.events.push(RoomEvent::Detach {
                connection_id: previous_connection,
            });
        }

        let (current_question, tally) = match self.players.get(user_id) {
            Some(player) => {
                let current = player.answering().and_then(|(index, started_at)| {
                    let remaining = Duration::from_secs(u64::from(time_limit))
                        .saturating_sub(now.saturating_duration_since(started_at));
                    self.question_view(index, remaining)
                });
                let tally = player.finished.then(|| player.tally(question_count));
                (current, tally)
            }
            None => (None, None),
        };

        let snapshot = self.snapshot();
        self.send_to(
            &connection_id,
            ServerMsg::RoomJoined {
                room: snapshot.clone(),
                user_id: user_id.to_string(),
                rejoined: true,
                current_question,
                tally,
            },
        );
        if let Some(results) = self.results.clone() {
            self.send_to(&connection_id, ServerMsg::GameFinished { results });
        }
        self.broadcast_except(
            &connection_id,
            ServerMsg::PlayerConnectionUpdate {
                user_id: user_id.to_string(),
                connected: true,
            },
        );
        tracing::info!(room = %self.code, user_id = %user_id, "player reconnected");
        snapshot
    }

    pub fn is_attached(&self, connection_id: &str) -> bool {
        self.member_id(connection_id).is_ok()
    }

    /// Resolve the session the connection is currently attached to.
    fn member_id(&self, connection_id: &str) -> RoomResult<UserId> {
        self.players
            .values()
            .find(|p| p.connected && p.connection_id == connection_id)
            .map(|p| p.user_id.clone())
            .ok_or_else(|| RoomError::validation("You are not a member of this room"))
    }

    fn host_member(&self, connection_id: &str, action: &str) -> RoomResult<UserId> {
        let user_id = self.member_id(connection_id)?;
        if user_id != self.host_id {
            return Err(RoomError::validation(format!("Only the host can {action}")));
        }
        Ok(user_id)
    }

    fn require_lobby(&self) -> RoomResult<()> {
        if self.state != RoomState::Lobby {
            return Err(RoomError::validation("Room is no longer in the lobby"));
        }
        Ok(())
    }

    pub fn set_ready(&mut self, connection_id: &str, ready: bool) -> RoomResult<()> {
        self.require_lobby()?;
        let user_id = self.member_id(connection_id)?;
        if let Some(player) = self.players.get_mut(&user_id) {
            player.ready = ready;
        }

        let ready_count = self
            .players
            .values()
            .filter(|p| p.ready || p.user_id == self.host_id)
            .count();
        let player_count = self.players.len();
        self.broadcast(ServerMsg::PlayerReadyUpdate {
            user_id,
            ready,
            ready_count,
            player_count,
        });
        if player_count > 1 && ready_count == player_count {
            self.broadcast(ServerMsg::AllPlayersReady {
                room_code: self.code.clone(),
            });
        }
        Ok(())
    }

    /// Replace the quiz and/or the per-question time limit.
    pub fn update_quiz(
        &mut self,
        connection_id: &str,
        quiz: Option<QuizConfig>,
        time_limit_seconds: Option<u32>,
    ) -> RoomResult<()> {
        self.host_member(connection_id, "change the quiz")?;
        self.require_lobby()?;
        if quiz.is_none() && time_limit_seconds.is_none() {
            return Err(RoomError::validation("Nothing to update"));
        }
        if let Some(limit) = time_limit_seconds {
            check_time_limit(limit, &self.settings)?;
        }
        if quiz.as_ref().is_some_and(|q| q.questions.is_empty()) {
            return Err(RoomError::validation("Quiz has no questions"));
        }

        if let Some(quiz) = quiz {
            let summary = quiz.summary();
            self.quiz = Some(quiz);
            self.broadcast(ServerMsg::QuizUpdated { quiz: summary });
        }
        if let Some(limit) = time_limit_seconds {
            self.time_limit_seconds = limit;
            self.broadcast(ServerMsg::TimeLimitUpdated {
                time_limit_seconds: limit,
            });
        }
        Ok(())
    }

    /// Lobby → InProgress; every player is shown question 0 individually.
    pub fn start(&mut self, connection_id: &str, now: Instant) -> RoomResult<()> {
        self.host_member(connection_id, "start the game")?;
        self.require_lobby()?;
        let Some(quiz) = self.quiz.as_ref() else {
            return Err(RoomError::validation("No quiz has been set"));
        };
        validate_quiz(quiz)?;
        let waiting: Vec<&str> = self
            .players
            .values()
            .filter(|p| p.user_id != self.host_id && !p.ready)
            .map(|p| p.display_name.as_str())
            .collect();
        if !waiting.is_empty() {
            return Err(RoomError::validation(format!(
                "Waiting for players to be ready: {}",
                waiting.join(", ")
            )));
        }

        self.state = next_state(self.state, RoomTransition::Start)
            .map_err(|err| RoomError::validation(err.to_string()))?;
        self.started_at = Some(now_millis());
        let question_count = self.question_count();
        let after = Duration::from_secs(u64::from(self.time_limit_seconds));

        self.broadcast(ServerMsg::GameStarted {
            question_count,
            time_limit_seconds: self.time_limit_seconds,
            started_at: self.started_at,
        });

        let first = self.question_view(0, after);
        let mut fan_out = Vec::with_capacity(self.players.len());
        for player in self.players.values_mut() {
            player.start(now);
            fan_out.push((player.connection_id.clone(), player.user_id.clone()));
        }
        for (connection_id, user_id) in fan_out {
            if let Some(question) = first.clone() {
                self.send_to(
                    &connection_id,
                    ServerMsg::PlayerNextQuestion {
                        question,
                        previous: None,
                    },
                );
            }
            self.events.push(RoomEvent::ArmDeadline {
                user_id,
                question_index: 0,
                after,
            });
        }
        self.broadcast_leaderboard();
        tracing::info!(room = %self.code, players = self.players.len(), question_count, "game started");
        Ok(())
    }

    /// Score an answer for the player behind `connection_id`.
    ///
    /// Repeats for an already answered question are accepted and ignored.
    pub fn submit_answer(
        &mut self,
        connection_id: &str,
        question_index: usize,
        answer: Option<SubmittedAnswer>,
        now: Instant,
    ) -> RoomResult<()> {
        let user_id = self.member_id(connection_id)?;
        if self.state != RoomState::InProgress {
            return Err(RoomError::validation("Game is not in progress"));
        }
        let Some(player) = self.players.get(&user_id) else {
            return Err(RoomError::validation("You are not a member of this room"));
        };
        if question_index < player.answer_log.len() {
            tracing::debug!(room = %self.code, user_id = %user_id, question_index, "duplicate answer ignored");
            return Ok(());
        }
        match player.answering() {
            Some((current, _)) if current == question_index => {
                self.resolve_question(&user_id, answer, now, false);
                Ok(())
            }
            _ => Err(RoomError::validation(format!(
                "Question {question_index} is not your current question"
            ))),
        }
    }

    /// The server-side deadline for `(user_id, question_index)` fired.
    ///
    /// Ignored when the player already moved past that question.
    pub fn deadline_elapsed(&mut self, user_id: &str, question_index: usize, now: Instant) {
        if self.state != RoomState::InProgress {
            return;
        }
        let still_answering = self
            .players
            .get(user_id)
            .and_then(|p| p.answering())
            .is_some_and(|(current, _)| current == question_index);
        if still_answering {
            tracing::debug!(room = %self.code, user_id = %user_id, question_index, "deadline elapsed");
            self.resolve_question(user_id, None, now, true);
        }
    }

    /// Scoring then advancing for one player.
    fn resolve_question(
        &mut self,
        user_id: &str,
        answer: Option<SubmittedAnswer>,
        now: Instant,
        timed_out: bool,
    ) {
        let Some(quiz) = self.quiz.as_ref() else {
            return;
        };
        let question_count = quiz.questions.len();
        let time_limit = self.time_limit_seconds;
        let Some(player) = self.players.get_mut(user_id) else {
            return;
        };
        let Some((question_index, started_at)) = player.answering() else {
            return;
        };
        let Some(question) = quiz.questions.get(question_index) else {
            return;
        };

        let elapsed = now
            .saturating_duration_since(started_at)
            .as_secs_f64()
            .min(f64::from(time_limit));
        let record = player.record_answer(question_index, question, answer, elapsed, time_limit);
        let feedback = AnswerFeedback {
            question_index,
            timed_out,
            is_correct: record.is_correct,
            points_awarded: record.points_awarded,
            correct_index: question.correct_index,
            explanation: question.explanation.clone(),
            score: player.score,
        };
        let advance = player.advance(question_count, now);
        let connection_id = player.connection_id.clone();
        let display_name = player.display_name.clone();
        let score = player.score;
        let tally = player.tally(question_count);

        self.events.push(RoomEvent::CancelDeadline {
            user_id: user_id.to_string(),
        });
        self.broadcast_leaderboard();

        match advance {
            Advance::Next(next) => {
                let after = Duration::from_secs(u64::from(time_limit));
                if let Some(question) = self.question_view(next, after) {
                    self.send_to(
                        &connection_id,
                        ServerMsg::PlayerNextQuestion {
                            question,
                            previous: Some(feedback),
                        },
                    );
                }
                self.events.push(RoomEvent::ArmDeadline {
                    user_id: user_id.to_string(),
                    question_index: next,
                    after,
                });
            }
            Advance::Done => {
                self.send_to(
                    &connection_id,
                    ServerMsg::PlayerFinished {
                        last: Some(feedback),
                        tally,
                    },
                );
                self.broadcast_except(
                    &connection_id,
                    ServerMsg::PlayerCompletedQuiz {
                        user_id: user_id.to_string(),
                        display_name,
                        score,
                    },
                );
                self.check_completion();
            }
        }
    }

    /// InProgress → Finished once every session is finished.
    fn check_completion(&mut self) {
        if self.state != RoomState::InProgress || !self.players.values().all(|p| p.finished) {
            return;
        }
        let Ok(next) = next_state(self.state, RoomTransition::Complete) else {
            return;
        };
        self.state = next;
        self.ended_at = Some(now_millis());

        let quiz = self.quiz.as_ref();
        let results = RoomResults {
            code: self.code.clone(),
            topic: quiz.map(|q| q.topic.clone()).unwrap_or_default(),
            difficulty: quiz.map(|q| q.difficulty.clone()).unwrap_or_default(),
            question_count: self.question_count(),
            time_limit_seconds: self.time_limit_seconds,
            started_at: self.started_at,
            ended_at: self.ended_at,
            ranking: self.leaderboard(),
        };
        self.results = Some(results.clone());
        self.broadcast(ServerMsg::GameFinished {
            results: results.clone(),
        });
        self.events.push(RoomEvent::Finished { results });
        tracing::info!(room = %self.code, "game finished");
    }

    /// Explicit leave. Removes the player in the lobby, forfeits mid-game.
    pub fn leave(&mut self, connection_id: &str) -> RoomResult<()> {
        let user_id = self.member_id(connection_id)?;
        let question_count = self.question_count();
        let forfeited = match self.state {
            RoomState::Lobby => {
                let Some(player) = self.players.shift_remove(&user_id) else {
                    return Err(RoomError::validation("You are not a member of this room"));
                };
                self.events.push(RoomEvent::Detach {
                    connection_id: connection_id.to_string(),
                });
                self.broadcast(ServerMsg::PlayerLeft {
                    user_id: user_id.clone(),
                    display_name: player.display_name,
                    forfeited: false,
                });
                false
            }
            RoomState::InProgress | RoomState::Finished => {
                let in_progress = self.state == RoomState::InProgress;
                let Some(player) = self.players.get_mut(&user_id) else {
                    return Err(RoomError::validation("You are not a member of this room"));
                };
                let forfeited = in_progress && !player.finished;
                if forfeited {
                    player.forfeit(question_count);
                }
                player.connected = false;
                let display_name = player.display_name.clone();
                self.events.push(RoomEvent::CancelDeadline {
                    user_id: user_id.clone(),
                });
                self.events.push(RoomEvent::Detach {
                    connection_id: connection_id.to_string(),
                });
                self.broadcast(ServerMsg::PlayerLeft {
                    user_id: user_id.clone(),
                    display_name,
                    forfeited,
                });
                forfeited
            }
        };
        tracing::info!(room = %self.code, user_id = %user_id, forfeited, "player left");

        if self.players.is_empty() {
            self.events.push(RoomEvent::Close {
                reason: "Everyone left".into(),
            });
            return Ok(());
        }
        if user_id == self.host_id {
            self.reassign_host();
        }
        if forfeited {
            self.broadcast_leaderboard();
            self.check_completion();
        }
        Ok(())
    }

    /// Transport loss. The session stays; only `connected` flips.
    pub fn disconnect(&mut self, connection_id: &str) {
        let Ok(user_id) = self.member_id(connection_id) else {
            return;
        };
        if let Some(player) = self.players.get_mut(&user_id) {
            player.connected = false;
        }
        self.broadcast(ServerMsg::PlayerConnectionUpdate {
            user_id: user_id.clone(),
            connected: false,
        });
        tracing::info!(room = %self.code, user_id = %user_id, "player disconnected");
        if user_id == self.host_id {
            self.reassign_host();
        }
    }

    /// Host-only: end the room for everyone.
    pub fn close(&mut self, connection_id: &str) -> RoomResult<()> {
        self.host_member(connection_id, "close the room")?;
        self.shutdown("Closed by host");
        Ok(())
    }

    /// Tell everyone the room is over and ask the actor to unregister it.
    pub fn shutdown(&mut self, reason: &str) {
        for user_id in self.players.keys() {
            self.events.push(RoomEvent::CancelDeadline {
                user_id: user_id.clone(),
            });
        }
        self.broadcast(ServerMsg::RoomClosed {
            room_code: self.code.clone(),
            reason: reason.to_string(),
        });
        self.events.push(RoomEvent::Close {
            reason: reason.to_string(),
        });
    }

    /// Hand host rights to the earliest-joined connected player.
    ///
    /// When the host is no longer on the roster and nobody is connected, the
    /// earliest remaining player takes over so the room always has a host.
    fn reassign_host(&mut self) {
        let host_present = self.players.contains_key(&self.host_id);
        let successor = self
            .players
            .values()
            .find(|p| p.connected && p.user_id != self.host_id)
            .or_else(|| {
                (!host_present)
                    .then(|| self.players.values().next())
                    .flatten()
            })
            .map(|p| (p.user_id.clone(), p.display_name.clone()));

        if let Some((host_id, display_name)) = successor {
            self.host_id = host_id.clone();
            tracing::info!(room = %self.code, host_id = %host_id, "host changed");
            self.broadcast(ServerMsg::HostChanged {
                host_id,
                display_name,
            });
        }
    }

    fn question_view(&self, question_index: usize, remaining: Duration) -> Option<QuestionView> {
        let quiz = self.quiz.as_ref()?;
        let question = quiz.questions.get(question_index)?;
        Some(QuestionView {
            question_index,
            question_count: quiz.questions.len(),
            question_type: quiz.question_type,
            text: question.text.clone(),
            options: question.options.clone(),
            time_limit_seconds: self.time_limit_seconds,
            remaining_ms: remaining.as_millis() as u64,
        })
    }

    fn broadcast_leaderboard(&mut self) {
        let leaderboard = self.leaderboard();
        self.broadcast(ServerMsg::RoomLeaderboardUpdate { leaderboard });
    }

    fn send_to(&mut self, connection_id: &str, msg: ServerMsg) {
        self.events.push(RoomEvent::SendTo {
            connection_id: connection_id.to_string(),
            msg,
        });
    }

    fn broadcast(&mut self, msg: ServerMsg) {
        self.events.push(RoomEvent::Broadcast { msg });
    }

    fn broadcast_except(&mut self, exclude: &str, msg: ServerMsg) {
        self.events.push(RoomEvent::BroadcastExcept {
            exclude: exclude.to_string(),
            msg,
        });
    }
}

fn check_time_limit(limit: u32, settings: &RoomSettings) -> RoomResult<()> {
    if limit < settings.min_time_limit || limit > settings.max_time_limit {
        return Err(RoomError::validation(format!(
            "Time limit must be between {} and {} seconds",
            settings.min_time_limit, settings.max_time_limit
        )));
    }
    Ok(())
}
