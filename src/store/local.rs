//! Device-local store: one JSON file per record

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tracing::debug;

use super::{StoreError, TimerStore};
use crate::state::{StoredConfig, StoredTimerState, TimerConfig, TimerState};

const CONFIG_JSON: &str = "config.json";
const TIMER_STATE_JSON: &str = "timer-state.json";

#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    async fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, StoreError> {
        let path = self.dir.join(name);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("{} does not exist yet", path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        if raw.trim().is_empty() || raw.trim() == "null" {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&raw)?))
    }

    async fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(name);
        let formatted = serde_json::to_string_pretty(value)?;

        // Staged write then rename: readers never see a partial record.
        let staging = self.dir.join(format!("{name}.tmp"));
        fs::write(&staging, format!("{formatted}\n")).await?;
        fs::rename(&staging, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl TimerStore for LocalStore {
    fn describe(&self) -> String {
        format!("local store at {}", self.dir.display())
    }

    async fn load_config(&self) -> Result<Option<StoredConfig>, StoreError> {
        self.read_json(CONFIG_JSON).await
    }

    async fn save_config(&self, config: &TimerConfig) -> Result<(), StoreError> {
        self.write_json(CONFIG_JSON, config).await
    }

    async fn load_timer_state(&self) -> Result<Option<StoredTimerState>, StoreError> {
        self.read_json(TIMER_STATE_JSON).await
    }

    async fn save_timer_state(&self, state: &TimerState) -> Result<(), StoreError> {
        self.write_json(TIMER_STATE_JSON, state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Phase;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_files_read_as_absent() {
        let dir = tempdir().expect("temp dir");
        let store = LocalStore::new(dir.path().join("records"));
        assert!(store.load_config().await.expect("load config").is_none());
        assert!(store.load_timer_state().await.expect("load state").is_none());
    }

    #[tokio::test]
    async fn saved_records_are_read_back() {
        let dir = tempdir().expect("temp dir");
        // Nested so the first save has to create the directory.
        let store = LocalStore::new(dir.path().join("records"));

        let config = TimerConfig {
            focus_minutes: 50,
            ..TimerConfig::default()
        };
        store.save_config(&config).await.expect("save config");
        let loaded = store.load_config().await.expect("load config").expect("config exists");
        assert_eq!(loaded.resolve(&TimerConfig::default()), config);

        let state = TimerState {
            phase: Phase::ShortBreak,
            running: true,
            seconds_remaining: 300,
            end_timestamp: Some(1_700_000_300_000),
            cycle_count: 1,
            revision: 3,
        };
        store.save_timer_state(&state).await.expect("save state");
        let loaded = store.load_timer_state().await.expect("load state").expect("state exists");
        assert_eq!(loaded.phase(), Some(Phase::ShortBreak));
        assert_eq!(loaded.end_timestamp(), Some(1_700_000_300_000));
        assert_eq!(loaded.revision(), 3);
        assert!(!dir.path().join("records").join("timer-state.json.tmp").exists());
    }

    #[tokio::test]
    async fn malformed_json_is_an_error() {
        let dir = tempdir().expect("temp dir");
        std::fs::write(dir.path().join(TIMER_STATE_JSON), "{ not json").expect("write file");

        let store = LocalStore::new(dir.path());
        assert!(matches!(store.load_timer_state().await, Err(StoreError::Json(_))));
    }
}
