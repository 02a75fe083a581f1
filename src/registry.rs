//! Process-wide index of live rooms keyed by join code.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::{RoomError, RoomResult};
use crate::game::{self, NewPlayer, RoomContext, RoomHandle, RoomTiming};
use crate::store::ResultStore;
use crate::types::{QuizConfig, RoomSnapshot};

pub const CODE_LENGTH: usize = 6;
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const MAX_CODE_ATTEMPTS: usize = 64;

type CodeGenerator = Box<dyn Fn() -> String + Send + Sync>;

pub struct Registry {
    rooms: DashMap<String, RoomHandle>,
    config: ServerConfig,
    store: Arc<dyn ResultStore>,
    generate_code: CodeGenerator,
}

impl Registry {
    pub fn new(config: ServerConfig, store: Arc<dyn ResultStore>) -> Arc<Self> {
        Self::with_code_generator(config, store, Box::new(generate_code))
    }

    pub fn with_code_generator(
        config: ServerConfig,
        store: Arc<dyn ResultStore>,
        generate_code: CodeGenerator,
    ) -> Arc<Self> {
        Arc::new(Self {
            rooms: DashMap::new(),
            config,
            store,
            generate_code,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ResultStore> {
        &self.store
    }

    /// Reserve a fresh code and start a room hosted by `host`.
    ///
    /// The code is claimed through the map entry, so two concurrent creations
    /// can never end up with the same code.
    pub fn create_room(
        self: &Arc<Self>,
        host: NewPlayer,
        quiz: Option<QuizConfig>,
        time_limit_seconds: Option<u32>,
    ) -> RoomResult<RoomHandle> {
        let time_limit = time_limit_seconds.unwrap_or(self.config.default_time_limit);
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = (self.generate_code)();
            match self.rooms.entry(code.clone()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => {
                    let handle = game::spawn_room(code, host, quiz, time_limit, self.context())?;
                    slot.insert(handle.clone());
                    return Ok(handle);
                }
            }
        }
        warn!(attempts = MAX_CODE_ATTEMPTS, "could not find a free room code");
        Err(RoomError::conflict("Could not allocate a room code, try again"))
    }

    /// Enter an existing room, or re-attach to it with a known user id.
    pub async fn join_room(
        &self,
        code: &str,
        player: NewPlayer,
    ) -> RoomResult<(RoomHandle, RoomSnapshot)> {
        let handle = self.get_room(code)?;
        let snapshot = handle.join(player).await?;
        Ok((handle, snapshot))
    }

    pub fn get_room(&self, code: &str) -> RoomResult<RoomHandle> {
        let code = normalize_code(code);
        self.rooms
            .get(&code)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RoomError::not_found(format!("Room {code} not found")))
    }

    pub fn remove_room(&self, code: &str) {
        if self.rooms.remove(code).is_some() {
            info!(room = %code, rooms = self.rooms.len(), "room unregistered");
        }
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn codes(&self) -> Vec<String> {
        self.rooms.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Periodically drop rooms whose task is gone and close rooms past their max age.
    pub fn spawn_reaper(self: &Arc<Self>) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(registry.config.reaper_interval);
            loop {
                ticker.tick().await;
                registry.reap().await;
            }
        })
    }

    async fn reap(&self) {
        let mut expired = Vec::new();
        let mut dead = Vec::new();
        for entry in self.rooms.iter() {
            let handle = entry.value();
            if handle.is_closed() {
                dead.push(handle.code.clone());
            } else if handle.created_at.elapsed() >= self.config.max_room_age {
                expired.push(handle.clone());
            }
        }
        for code in dead {
            warn!(room = %code, "removing room whose task has stopped");
            self.remove_room(&code);
        }
        for handle in expired {
            info!(room = %handle.code, "room reached its maximum age");
            handle.shutdown("Room expired").await;
        }
    }

    fn context(self: &Arc<Self>) -> RoomContext {
        RoomContext {
            registry: Arc::clone(self),
            store: Arc::clone(&self.store),
            settings: self.config.room_settings(),
            timing: RoomTiming {
                empty_room_grace: self.config.empty_room_grace,
                finished_room_ttl: self.config.finished_room_ttl,
            },
        }
    }
}

/// Codes are matched case-insensitively and ignore surrounding whitespace.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

pub fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use tokio::sync::mpsc;

    use super::*;
    use crate::store::MemoryResultStore;
    use crate::types::ServerMsg;

    fn registry() -> Arc<Registry> {
        Registry::new(ServerConfig::default(), Arc::new(MemoryResultStore::new()))
    }

    fn player(user: &str) -> (NewPlayer, mpsc::UnboundedReceiver<ServerMsg>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let player = NewPlayer {
            connection_id: format!("conn-{user}"),
            user_id: user.to_string(),
            display_name: user.to_string(),
            outbound,
        };
        (player, rx)
    }

    #[test]
    fn generated_codes_use_the_code_alphabet() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creations_get_distinct_codes() {
        let registry = registry();
        let mut tasks = Vec::new();
        for i in 0..200 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                let (host, _rx) = player(&format!("host{i}"));
                registry.create_room(host, None, None).unwrap().code
            }));
        }
        let mut codes = HashSet::new();
        for task in tasks {
            assert!(codes.insert(task.await.unwrap()));
        }
        assert_eq!(registry.len(), 200);
    }

    #[tokio::test]
    async fn colliding_codes_are_retried() {
        let sequence = Mutex::new(vec!["BBBBBB", "AAAAAA", "AAAAAA"]);
        let registry = Registry::with_code_generator(
            ServerConfig::default(),
            Arc::new(MemoryResultStore::new()),
            Box::new(move || sequence.lock().unwrap().pop().unwrap_or("CCCCCC").to_string()),
        );

        let (first, _rx1) = player("ada");
        let (second, _rx2) = player("grace");
        assert_eq!(registry.create_room(first, None, None).unwrap().code, "AAAAAA");
        assert_eq!(registry.create_room(second, None, None).unwrap().code, "BBBBBB");
    }

    #[tokio::test]
    async fn exhausted_code_space_is_a_conflict() {
        let registry = Registry::with_code_generator(
            ServerConfig::default(),
            Arc::new(MemoryResultStore::new()),
            Box::new(|| "AAAAAA".to_string()),
        );
        let (first, _rx1) = player("ada");
        let (second, _rx2) = player("grace");
        registry.create_room(first, None, None).unwrap();
        let err = registry.create_room(second, None, None).unwrap_err();
        assert_eq!(err.code(), "conflict");
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn invalid_room_settings_do_not_claim_a_code() {
        let registry = registry();
        let (host, _rx) = player("ada");
        let err = registry.create_room(host, None, Some(1)).unwrap_err();
        assert_eq!(err.code(), "validation");
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn lookup_ignores_case_and_whitespace() {
        let registry = registry();
        let (host, _rx) = player("ada");
        let code = registry.create_room(host, None, None).unwrap().code;

        let (guest, _guest_rx) = player("grace");
        let lookup = format!("  {}  ", code.to_lowercase());
        let (handle, snapshot) = registry.join_room(&lookup, guest).await.unwrap();
        assert_eq!(handle.code, code);
        assert_eq!(snapshot.players.len(), 2);
    }

    #[tokio::test]
    async fn unknown_code_is_not_found() {
        let registry = registry();
        let (guest, _rx) = player("grace");
        let err = registry.join_room("ZZZZZZ", guest).await.unwrap_err();
        assert_eq!(err.code(), "not-found");
    }

    #[tokio::test]
    async fn full_room_rejects_new_players() {
        let config = ServerConfig {
            max_players: 2,
            ..ServerConfig::default()
        };
        let registry = Registry::new(config, Arc::new(MemoryResultStore::new()));
        let (host, _rx) = player("ada");
        let code = registry.create_room(host, None, None).unwrap().code;

        let (second, _rx2) = player("grace");
        registry.join_room(&code, second).await.unwrap();
        let (third, _rx3) = player("linus");
        let err = registry.join_room(&code, third).await.unwrap_err();
        assert_eq!(err.code(), "conflict");
    }

    #[tokio::test]
    async fn host_closing_the_room_unregisters_it() {
        let registry = registry();
        let (host, mut host_rx) = player("ada");
        let handle = registry.create_room(host, None, None).unwrap();

        handle
            .intent("conn-ada", game::Intent::Close)
            .await
            .unwrap();

        let mut saw_closed = false;
        while let Some(msg) = host_rx.recv().await {
            if matches!(msg, ServerMsg::RoomClosed { .. }) {
                saw_closed = true;
            }
        }
        assert!(saw_closed);
        tokio::task::yield_now().await;
        assert!(registry.get_room(&handle.code).is_err());
    }
}
