use serde::{Deserialize, Serialize};

/// Stable identity of a participant, supplied by the auth layer or generated for guests.
pub type UserId = String;
/// Transport identity of a single WebSocket connection.
pub type ConnectionId = String;

/// Shape of the questions in a quiz.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionType {
    #[default]
    MultipleChoice,
    TrueFalse,
}

impl QuestionType {
    /// Number of options every question of this type must carry.
    pub fn option_count(self) -> usize {
        match self {
            Self::MultipleChoice => 4,
            Self::TrueFalse => 2,
        }
    }
}

/// A single question in a quiz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub text: String,
    pub options: Vec<String>,
    pub correct_index: usize,
    #[serde(default)]
    pub explanation: Option<String>,
}

/// Quiz content attached to a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizConfig {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub question_type: QuestionType,
    pub questions: Vec<Question>,
}

impl QuizConfig {
    pub fn summary(&self) -> QuizSummary {
        QuizSummary {
            topic: self.topic.clone(),
            difficulty: self.difficulty.clone(),
            question_type: self.question_type,
            question_count: self.questions.len(),
        }
    }
}

/// A quiz from the on-disk library with its file-based id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizWithId {
    pub id: String,
    #[serde(flatten)]
    pub quiz: QuizConfig,
}

/// What a player picked: either the option index or the option text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubmittedAnswer {
    Index(usize),
    Text(String),
}

/// One entry of a player's answer log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub question_index: usize,
    /// `None` records a missed deadline or a forfeited question.
    pub submitted_answer: Option<SubmittedAnswer>,
    pub is_correct: bool,
    pub points_awarded: u32,
    pub elapsed_seconds: f64,
}

/// Lifecycle of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoomState {
    Lobby,
    InProgress,
    Finished,
}

impl std::fmt::Display for RoomState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lobby => write!(f, "lobby"),
            Self::InProgress => write!(f, "in-progress"),
            Self::Finished => write!(f, "finished"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSummary {
    pub topic: String,
    pub difficulty: String,
    pub question_type: QuestionType,
    pub question_count: usize,
}

/// Public view of a player inside a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSummary {
    pub user_id: UserId,
    pub display_name: String,
    pub is_host: bool,
    pub ready: bool,
    pub connected: bool,
    pub score: u32,
    pub current_question_index: usize,
    pub finished: bool,
}

/// Full room state sent on create and join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub code: String,
    pub host_id: UserId,
    pub state: RoomState,
    pub time_limit_seconds: u32,
    pub max_players: usize,
    pub quiz: Option<QuizSummary>,
    pub players: Vec<PlayerSummary>,
    pub started_at: Option<u64>,
    pub ended_at: Option<u64>,
}

/// A question as shown to a player; the solution is never included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub question_index: usize,
    pub question_count: usize,
    pub question_type: QuestionType,
    pub text: String,
    pub options: Vec<String>,
    pub time_limit_seconds: u32,
    /// Time left before the server scores the question as missed.
    pub remaining_ms: u64,
}

/// Immediate feedback on the question a player just left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerFeedback {
    pub question_index: usize,
    pub timed_out: bool,
    pub is_correct: bool,
    pub points_awarded: u32,
    pub correct_index: usize,
    pub explanation: Option<String>,
    pub score: u32,
}

/// A player's final tally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerTally {
    pub score: u32,
    pub correct_count: usize,
    pub question_count: usize,
    pub total_elapsed_seconds: f64,
    pub answers: Vec<AnswerRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub user_id: UserId,
    pub display_name: String,
    pub score: u32,
    pub answered: usize,
    pub correct_count: usize,
    pub total_elapsed_seconds: f64,
    pub finished: bool,
    pub connected: bool,
}

/// Final per-room results handed to the result store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomResults {
    pub code: String,
    pub topic: String,
    pub difficulty: String,
    pub question_count: usize,
    pub time_limit_seconds: u32,
    pub started_at: Option<u64>,
    pub ended_at: Option<u64>,
    pub ranking: Vec<LeaderboardEntry>,
}

/// Messages sent from server to clients via WebSocket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMsg {
    RoomCreated {
        room: RoomSnapshot,
        user_id: UserId,
    },
    RoomJoined {
        room: RoomSnapshot,
        user_id: UserId,
        rejoined: bool,
        current_question: Option<QuestionView>,
        tally: Option<PlayerTally>,
    },
    PlayerJoined {
        player: PlayerSummary,
    },
    PlayerLeft {
        user_id: UserId,
        display_name: String,
        forfeited: bool,
    },
    PlayerReadyUpdate {
        user_id: UserId,
        ready: bool,
        ready_count: usize,
        player_count: usize,
    },
    AllPlayersReady {
        room_code: String,
    },
    QuizUpdated {
        quiz: QuizSummary,
    },
    TimeLimitUpdated {
        time_limit_seconds: u32,
    },
    GameStarted {
        question_count: usize,
        time_limit_seconds: u32,
        started_at: Option<u64>,
    },
    PlayerNextQuestion {
        question: QuestionView,
        previous: Option<AnswerFeedback>,
    },
    PlayerFinished {
        last: Option<AnswerFeedback>,
        tally: PlayerTally,
    },
    PlayerCompletedQuiz {
        user_id: UserId,
        display_name: String,
        score: u32,
    },
    RoomLeaderboardUpdate {
        leaderboard: Vec<LeaderboardEntry>,
    },
    GameFinished {
        results: RoomResults,
    },
    RoomClosed {
        room_code: String,
        reason: String,
    },
    HostChanged {
        host_id: UserId,
        display_name: String,
    },
    PlayerConnectionUpdate {
        user_id: UserId,
        connected: bool,
    },
    Error {
        code: String,
        message: String,
    },
}

fn ready_default() -> bool {
    true
}

/// Messages sent from clients to server via WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMsg {
    CreateRoom {
        display_name: String,
        #[serde(default)]
        time_limit: Option<u32>,
        #[serde(default)]
        quiz_config: Option<QuizConfig>,
        #[serde(default)]
        quiz_id: Option<String>,
    },
    JoinRoom {
        room_code: String,
        display_name: String,
    },
    PlayerReady {
        room_code: String,
        #[serde(default = "ready_default")]
        ready: bool,
    },
    UpdateQuiz {
        room_code: String,
        #[serde(default)]
        quiz_config: Option<QuizConfig>,
        #[serde(default)]
        quiz_id: Option<String>,
        #[serde(default)]
        time_limit: Option<u32>,
    },
    StartGame {
        room_code: String,
    },
    SubmitAnswer {
        room_code: String,
        question_index: usize,
        #[serde(default)]
        answer: Option<SubmittedAnswer>,
        /// Client-side stopwatch; informational only.
        #[serde(default)]
        elapsed_seconds: Option<f64>,
    },
    LeaveRoom {
        room_code: String,
    },
    CloseRoom {
        room_code: String,
    },
}

impl ClientMsg {
    /// Room the intent is addressed to, if it targets an existing room.
    pub fn room_code(&self) -> Option<&str> {
        match self {
            Self::CreateRoom { .. } => None,
            Self::JoinRoom { room_code, .. }
            | Self::PlayerReady { room_code, .. }
            | Self::UpdateQuiz { room_code, .. }
            | Self::StartGame { room_code }
            | Self::SubmitAnswer { room_code, .. }
            | Self::LeaveRoom { room_code }
            | Self::CloseRoom { room_code } => Some(room_code),
        }
    }
}
