//! Server configuration and the on-disk quiz library.
//!
//! Settings come from `<CONFIG_PATH>/server.json` (all fields optional) and are
//! then overridden by environment variables.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::room::RoomSettings;
use crate::types::{QuizConfig, QuizWithId};

const CONFIG_PATH_ENV: &str = "CONFIG_PATH";
const DEFAULT_CONFIG_DIR: &str = "config";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value `{value}` for {name}")]
    InvalidEnv { name: &'static str, value: String },
    #[error("time limit bounds are inconsistent: {min}..={max} does not contain {default}")]
    TimeLimitBounds { min: u32, max: u32, default: u32 },
}

/// Runtime settings shared by the registry, room actors and the HTTP layer.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub max_players: usize,
    pub default_time_limit: u32,
    pub min_time_limit: u32,
    pub max_time_limit: u32,
    /// How long a room with nobody connected survives before it is closed.
    pub empty_room_grace: Duration,
    /// How long a finished room stays around so late reconnects see the results.
    pub finished_room_ttl: Duration,
    pub max_room_age: Duration,
    pub reaper_interval: Duration,
    /// Directory for JSON result files; results stay in memory when unset.
    pub results_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

impl ServerConfig {
    /// Read `server.json` and apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path("server.json");
        let raw = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    info!(path = %path.display(), "loaded server config");
                    raw
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to parse config; using defaults");
                    RawConfig::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "config file not found; using built-in defaults");
                RawConfig::default()
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read config; using defaults");
                RawConfig::default()
            }
        };
        let raw = apply_overrides(raw, |name| std::env::var(name).ok())?;
        raw.check()?;
        Ok(raw.into())
    }

    pub fn room_settings(&self) -> RoomSettings {
        RoomSettings {
            max_players: self.max_players,
            min_time_limit: self.min_time_limit,
            max_time_limit: self.max_time_limit,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawConfig {
    port: u16,
    max_players: usize,
    default_time_limit: u32,
    min_time_limit: u32,
    max_time_limit: u32,
    empty_room_grace_secs: u64,
    finished_room_ttl_secs: u64,
    max_room_age_secs: u64,
    reaper_interval_secs: u64,
    results_dir: Option<PathBuf>,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            max_players: 10,
            default_time_limit: 30,
            min_time_limit: 5,
            max_time_limit: 300,
            empty_room_grace_secs: 30,
            finished_room_ttl_secs: 120,
            max_room_age_secs: 4 * 60 * 60,
            reaper_interval_secs: 60,
            results_dir: None,
        }
    }
}

impl RawConfig {
    fn check(&self) -> Result<(), ConfigError> {
        let (min, max, default) = (self.min_time_limit, self.max_time_limit, self.default_time_limit);
        if min == 0 || min > max || default < min || default > max {
            return Err(ConfigError::TimeLimitBounds { min, max, default });
        }
        Ok(())
    }
}

impl From<RawConfig> for ServerConfig {
    fn from(raw: RawConfig) -> Self {
        Self {
            port: raw.port,
            max_players: raw.max_players.max(1),
            default_time_limit: raw.default_time_limit,
            min_time_limit: raw.min_time_limit,
            max_time_limit: raw.max_time_limit,
            empty_room_grace: Duration::from_secs(raw.empty_room_grace_secs),
            finished_room_ttl: Duration::from_secs(raw.finished_room_ttl_secs),
            max_room_age: Duration::from_secs(raw.max_room_age_secs),
            reaper_interval: Duration::from_secs(raw.reaper_interval_secs.max(1)),
            results_dir: raw.results_dir,
        }
    }
}

fn apply_overrides<F>(mut raw: RawConfig, lookup: F) -> Result<RawConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    fn parse<T: FromStr>(
        lookup: &impl Fn(&str) -> Option<String>,
        name: &'static str,
    ) -> Result<Option<T>, ConfigError> {
        match lookup(name) {
            None => Ok(None),
            Some(value) => value
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|_| ConfigError::InvalidEnv { name, value }),
        }
    }

    if let Some(port) = parse(&lookup, "PORT")? {
        raw.port = port;
    }
    if let Some(max_players) = parse(&lookup, "MAX_PLAYERS")? {
        raw.max_players = max_players;
    }
    if let Some(limit) = parse(&lookup, "DEFAULT_TIME_LIMIT")? {
        raw.default_time_limit = limit;
    }
    if let Some(secs) = parse(&lookup, "LOBBY_GRACE_SECS")? {
        raw.empty_room_grace_secs = secs;
    }
    if let Some(secs) = parse(&lookup, "FINISHED_ROOM_TTL_SECS")? {
        raw.finished_room_ttl_secs = secs;
    }
    if let Some(secs) = parse(&lookup, "MAX_ROOM_AGE_SECS")? {
        raw.max_room_age_secs = secs;
    }
    if let Some(dir) = lookup("RESULTS_DIR").filter(|dir| !dir.trim().is_empty()) {
        raw.results_dir = Some(PathBuf::from(dir));
    }
    Ok(raw)
}

/// Resolves a path relative to the config directory.
fn config_path(sub: &str) -> PathBuf {
    let base = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_DIR.to_string());
    Path::new(&base).join(sub)
}

/// Create the config directory and an example quiz when missing.
pub fn init() -> io::Result<()> {
    let quiz_dir = config_path("quizzes");
    if quiz_dir.exists() {
        return Ok(());
    }
    fs::create_dir_all(&quiz_dir)?;

    let example = serde_json::json!({
        "topic": "Example Quiz",
        "difficulty": "easy",
        "questionType": "multiple-choice",
        "questions": [
            {
                "text": "What is the correct answer?",
                "options": ["No", "Correct", "No", "No"],
                "correctIndex": 1,
                "explanation": "It says so."
            }
        ]
    });
    let pretty = serde_json::to_string_pretty(&example).map_err(io::Error::other)?;
    fs::write(quiz_dir.join("example.json"), pretty)?;
    info!(path = %quiz_dir.display(), "created quiz library with an example quiz");
    Ok(())
}

/// Load all quizzes from the library directory.
pub fn load_quizzes() -> Vec<QuizWithId> {
    load_quizzes_from(&config_path("quizzes"))
}

fn load_quizzes_from(quiz_dir: &Path) -> Vec<QuizWithId> {
    let entries = match fs::read_dir(quiz_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return vec![],
        Err(err) => {
            tracing::error!(path = %quiz_dir.display(), error = %err, "failed to read quiz library");
            return vec![];
        }
    };

    let mut quizzes = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();

        match fs::read_to_string(&path) {
            Ok(data) => match serde_json::from_str::<QuizConfig>(&data) {
                Ok(quiz) => quizzes.push(QuizWithId { id, quiz }),
                Err(err) => tracing::error!(path = %path.display(), error = %err, "failed to parse quiz"),
            },
            Err(err) => tracing::error!(path = %path.display(), error = %err, "failed to read quiz"),
        }
    }
    quizzes.sort_by(|a, b| a.id.cmp(&b.id));
    quizzes
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn file_fields_are_optional() {
        let raw: RawConfig = serde_json::from_str(r#"{"maxPlayers": 4}"#).unwrap();
        let config: ServerConfig = raw.into();
        assert_eq!(config.max_players, 4);
        assert_eq!(config.default_time_limit, 30);
        assert_eq!(config.empty_room_grace, Duration::from_secs(30));
    }

    #[test]
    fn environment_overrides_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("PORT", "8081"),
            ("MAX_PLAYERS", "6"),
            ("LOBBY_GRACE_SECS", "5"),
            ("RESULTS_DIR", "/tmp/results"),
        ]);
        let raw = apply_overrides(RawConfig::default(), |name| {
            env.get(name).map(|v| v.to_string())
        })
        .unwrap();
        let config: ServerConfig = raw.into();
        assert_eq!(config.port, 8081);
        assert_eq!(config.max_players, 6);
        assert_eq!(config.empty_room_grace, Duration::from_secs(5));
        assert_eq!(config.results_dir, Some(PathBuf::from("/tmp/results")));
    }

    #[test]
    fn invalid_environment_values_are_errors() {
        let err = apply_overrides(RawConfig::default(), |name| {
            (name == "PORT").then(|| "eighty".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { name: "PORT", .. }));
    }

    #[test]
    fn default_time_limit_must_fit_bounds() {
        let raw = RawConfig {
            default_time_limit: 600,
            ..RawConfig::default()
        };
        assert!(matches!(raw.check(), Err(ConfigError::TimeLimitBounds { .. })));
        assert!(RawConfig::default().check().is_ok());
    }

    #[test]
    fn quiz_library_skips_invalid_files() {
        let dir = std::env::temp_dir().join(format!("quizroom-lib-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("space.json"),
            r#"{"topic":"Space","questions":[{"text":"Sun?","options":["Star","Planet","Moon","Comet"],"correctIndex":0}]}"#,
        )
        .unwrap();
        fs::write(dir.join("broken.json"), "{ not json").unwrap();
        fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let quizzes = load_quizzes_from(&dir);
        assert_eq!(quizzes.len(), 1);
        assert_eq!(quizzes[0].id, "space");
        assert_eq!(quizzes[0].quiz.questions.len(), 1);

        fs::remove_dir_all(&dir).unwrap();
    }
}
