//! Persistence adapter
//!
//! The timer core reads and writes two records per identity, a
//! configuration and a timer snapshot, through [`TimerStore`]. Which backend
//! holds them is decided by the caller through [`StoreSelector`].

pub mod error;
pub mod local;
pub mod memory;
pub mod remote;

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::state::{StoredConfig, StoredTimerState, TimerConfig, TimerState};

pub use error::StoreError;
pub use local::LocalStore;
pub use memory::MemoryStore;
pub use remote::RemoteStore;

#[async_trait]
pub trait TimerStore: Send + Sync {
    /// Human-readable description for logs
    fn describe(&self) -> String;

    async fn load_config(&self) -> Result<Option<StoredConfig>, StoreError>;
    async fn save_config(&self, config: &TimerConfig) -> Result<(), StoreError>;
    async fn load_timer_state(&self) -> Result<Option<StoredTimerState>, StoreError>;
    async fn save_timer_state(&self, state: &TimerState) -> Result<(), StoreError>;
}

/// Who the active records belong to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Identity {
    Anonymous,
    User {
        uid: String,
        #[serde(skip_serializing)]
        token: Option<String>,
    },
}

impl Identity {
    /// Build from optional request or CLI fields; a blank uid means anonymous
    pub fn from_parts(uid: Option<String>, token: Option<String>) -> Self {
        match uid.map(|uid| uid.trim().to_string()).filter(|uid| !uid.is_empty()) {
            Some(uid) => Self::User {
                uid,
                token: token.filter(|token| !token.trim().is_empty()),
            },
            None => Self::Anonymous,
        }
    }

    pub fn uid(&self) -> Option<&str> {
        match self {
            Self::Anonymous => None,
            Self::User { uid, .. } => Some(uid),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::User { .. })
    }

    /// Same owner, ignoring credentials
    pub fn same_owner(&self, other: &Identity) -> bool {
        self.uid() == other.uid()
    }
}

/// Maps an identity to the store that holds its records
#[derive(Debug, Clone)]
pub struct StoreSelector {
    data_dir: PathBuf,
    remote_url: Option<String>,
}

impl StoreSelector {
    pub fn new(data_dir: impl Into<PathBuf>, remote_url: Option<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            remote_url,
        }
    }

    pub fn for_identity(&self, identity: &Identity) -> Result<Arc<dyn TimerStore>, StoreError> {
        match identity {
            Identity::Anonymous => Ok(Arc::new(LocalStore::new(&self.data_dir))),
            Identity::User { uid, token } => {
                let base = self
                    .remote_url
                    .as_deref()
                    .ok_or_else(|| StoreError::RemoteNotConfigured(uid.clone()))?;
                Ok(Arc::new(RemoteStore::new(base, uid, token.clone())?))
            }
        }
    }
}
