//! Hand-off of final room results to persistent storage.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use thiserror::Error;

use crate::types::RoomResults;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("result storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl StoreError {
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StoreError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}

/// Write-only sink for finished rooms, plus lookup by room code.
pub trait ResultStore: Send + Sync {
    fn save(&self, results: RoomResults) -> BoxFuture<'static, StoreResult<()>>;
    fn get(&self, code: &str) -> BoxFuture<'static, StoreResult<Option<RoomResults>>>;
}

/// Keeps results in process memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryResultStore {
    results: Arc<DashMap<String, RoomResults>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultStore for MemoryResultStore {
    fn save(&self, results: RoomResults) -> BoxFuture<'static, StoreResult<()>> {
        let map = self.results.clone();
        Box::pin(async move {
            map.insert(results.code.clone(), results);
            Ok(())
        })
    }

    fn get(&self, code: &str) -> BoxFuture<'static, StoreResult<Option<RoomResults>>> {
        let found = self.results.get(code).map(|entry| entry.value().clone());
        Box::pin(async move { Ok(found) })
    }
}

/// One `<code>-<endedAt>.json` file per finished room.
///
/// Codes are reused once a room is gone, so the end timestamp keeps files apart;
/// `get` returns the most recent file for a code.
#[derive(Debug, Clone)]
pub struct JsonDirResultStore {
    dir: PathBuf,
}

impl JsonDirResultStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ResultStore for JsonDirResultStore {
    fn save(&self, results: RoomResults) -> BoxFuture<'static, StoreResult<()>> {
        let dir = self.dir.clone();
        Box::pin(async move {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|err| StoreError::unavailable(format!("creating {}", dir.display()), err))?;
            let payload = serde_json::to_vec_pretty(&results)
                .map_err(|err| StoreError::unavailable("serializing results".into(), err))?;
            let path = dir.join(format!(
                "{}-{}.json",
                results.code,
                results.ended_at.unwrap_or_default()
            ));
            tokio::fs::write(&path, payload)
                .await
                .map_err(|err| StoreError::unavailable(format!("writing {}", path.display()), err))
        })
    }

    fn get(&self, code: &str) -> BoxFuture<'static, StoreResult<Option<RoomResults>>> {
        let dir = self.dir.clone();
        let prefix = format!("{code}-");
        Box::pin(async move {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(err) => {
                    return Err(StoreError::unavailable(format!("reading {}", dir.display()), err));
                }
            };
            let mut latest: Option<(String, PathBuf)> = None;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|err| StoreError::unavailable(format!("reading {}", dir.display()), err))?
            {
                let name = entry.file_name().to_string_lossy().into_owned();
                if !name.starts_with(&prefix) || !name.ends_with(".json") {
                    continue;
                }
                if latest.as_ref().is_none_or(|(best, _)| stamp(&name) > stamp(best)) {
                    latest = Some((name, entry.path()));
                }
            }
            let Some((_, path)) = latest else {
                return Ok(None);
            };
            let data = tokio::fs::read(&path)
                .await
                .map_err(|err| StoreError::unavailable(format!("reading {}", path.display()), err))?;
            serde_json::from_slice(&data)
                .map(Some)
                .map_err(|err| StoreError::unavailable(format!("parsing {}", path.display()), err))
        })
    }
}

/// End timestamp encoded in a result file name.
fn stamp(file_name: &str) -> u64 {
    file_name
        .trim_end_matches(".json")
        .rsplit('-')
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results(code: &str, ended_at: u64) -> RoomResults {
        RoomResults {
            code: code.into(),
            topic: "Space".into(),
            difficulty: "easy".into(),
            question_count: 3,
            time_limit_seconds: 30,
            started_at: Some(ended_at - 60_000),
            ended_at: Some(ended_at),
            ranking: vec![],
        }
    }

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemoryResultStore::new();
        store.save(results("K3F9QZ", 100_000)).await.unwrap();
        let found = store.get("K3F9QZ").await.unwrap();
        assert_eq!(found, Some(results("K3F9QZ", 100_000)));
        assert_eq!(store.get("NOPE00").await.unwrap(), None);
    }

    #[tokio::test]
    async fn json_store_returns_latest_run_for_a_code() {
        let dir = std::env::temp_dir().join(format!("quizroom-results-{}", uuid::Uuid::new_v4()));
        let store = JsonDirResultStore::new(&dir);
        assert_eq!(store.get("K3F9QZ").await.unwrap(), None);

        store.save(results("K3F9QZ", 100_000)).await.unwrap();
        store.save(results("K3F9QZ", 900_000)).await.unwrap();
        store.save(results("ZZZ999", 500_000)).await.unwrap();

        let found = store.get("K3F9QZ").await.unwrap().unwrap();
        assert_eq!(found.ended_at, Some(900_000));

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
