use tokio::time::Instant;

use crate::scoring;
use crate::types::{
    AnswerRecord, ConnectionId, PlayerSummary, PlayerTally, Question, SubmittedAnswer, UserId,
};

/// Where a player is in their own run through the quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerPhase {
    /// Lobby, before the game starts.
    Waiting,
    /// Shown `question_index`, deadline measured from `started_at`.
    Answering {
        question_index: usize,
        started_at: Instant,
    },
    /// Past the last question.
    Done,
}

/// Result of moving a player past a scored question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Next(usize),
    Done,
}

/// Authoritative record of one participant in a room.
#[derive(Debug, Clone)]
pub struct PlayerSession {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub display_name: String,
    pub ready: bool,
    pub connected: bool,
    pub current_question_index: usize,
    pub score: u32,
    pub answer_log: Vec<AnswerRecord>,
    pub finished: bool,
    phase: PlayerPhase,
}

impl PlayerSession {
    pub fn new(connection_id: ConnectionId, user_id: UserId, display_name: String) -> Self {
        Self {
            connection_id,
            user_id,
            display_name,
            ready: false,
            connected: true,
            current_question_index: 0,
            score: 0,
            answer_log: Vec::new(),
            finished: false,
            phase: PlayerPhase::Waiting,
        }
    }

    pub fn phase(&self) -> PlayerPhase {
        self.phase
    }

    /// Question currently awaiting an answer and when it was shown.
    pub fn answering(&self) -> Option<(usize, Instant)> {
        match self.phase {
            PlayerPhase::Answering {
                question_index,
                started_at,
            } => Some((question_index, started_at)),
            _ => None,
        }
    }

    /// Reset progress and show the first question.
    pub fn start(&mut self, now: Instant) {
        self.current_question_index = 0;
        self.score = 0;
        self.answer_log.clear();
        self.finished = false;
        self.phase = PlayerPhase::Answering {
            question_index: 0,
            started_at: now,
        };
    }

    /// Score the current question and append it to the log.
    ///
    /// Callers must have checked that the player is answering `question_index`.
    pub fn record_answer(
        &mut self,
        question_index: usize,
        question: &Question,
        submitted: Option<SubmittedAnswer>,
        elapsed_seconds: f64,
        time_limit_seconds: u32,
    ) -> AnswerRecord {
        debug_assert_eq!(self.answer_log.len(), question_index);
        let outcome = scoring::score(
            question.correct_index,
            &question.options,
            submitted.as_ref(),
            elapsed_seconds,
            time_limit_seconds,
        );
        let record = AnswerRecord {
            question_index,
            submitted_answer: submitted,
            is_correct: outcome.is_correct,
            points_awarded: outcome.points,
            elapsed_seconds,
        };
        self.score += record.points_awarded;
        self.answer_log.push(record.clone());
        record
    }

    /// Move past the question just recorded.
    pub fn advance(&mut self, question_count: usize, now: Instant) -> Advance {
        let next = self.answer_log.len();
        self.current_question_index = next;
        if next < question_count {
            self.phase = PlayerPhase::Answering {
                question_index: next,
                started_at: now,
            };
            Advance::Next(next)
        } else {
            self.phase = PlayerPhase::Done;
            self.finished = true;
            Advance::Done
        }
    }

    /// Record every question not yet answered as missed and finish.
    pub fn forfeit(&mut self, question_count: usize) {
        for question_index in self.answer_log.len()..question_count {
            self.answer_log.push(AnswerRecord {
                question_index,
                submitted_answer: None,
                is_correct: false,
                points_awarded: 0,
                elapsed_seconds: 0.0,
            });
        }
        self.current_question_index = question_count;
        self.phase = PlayerPhase::Done;
        self.finished = true;
    }

    pub fn correct_count(&self) -> usize {
        self.answer_log.iter().filter(|r| r.is_correct).count()
    }

    pub fn total_elapsed_seconds(&self) -> f64 {
        self.answer_log.iter().map(|r| r.elapsed_seconds).sum()
    }

    pub fn tally(&self, question_count: usize) -> PlayerTally {
        PlayerTally {
            score: self.score,
            correct_count: self.correct_count(),
            question_count,
            total_elapsed_seconds: self.total_elapsed_seconds(),
            answers: self.answer_log.clone(),
        }
    }

    pub fn summary(&self, is_host: bool) -> PlayerSummary {
        PlayerSummary {
            user_id: self.user_id.clone(),
            display_name: self.display_name.clone(),
            is_host,
            ready: self.ready || is_host,
            connected: self.connected,
            score: self.score,
            current_question_index: self.current_question_index,
            finished: self.finished,
        }
    }
}
