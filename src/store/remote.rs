//! Per-user document store reached over HTTP
//!
//! Records live at `{base}/pomodoroConfig/{uid}` and
//! `{base}/pomodoroTimerState/{uid}`. `GET` answers 404 when the document
//! does not exist yet; `PUT` replaces the whole document.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;
use url::Url;

use super::{StoreError, TimerStore};
use crate::state::{StoredConfig, StoredTimerState, TimerConfig, TimerState};

const CONFIG_COLLECTION: &str = "pomodoroConfig";
const TIMER_STATE_COLLECTION: &str = "pomodoroTimerState";
/// Upper bound for one request, so a stalled server cannot hold the writer queue
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct RemoteStore {
    client: Client,
    base: Url,
    uid: String,
    token: Option<String>,
}

impl RemoteStore {
    pub fn new(base: &str, uid: &str, token: Option<String>) -> Result<Self, StoreError> {
        let uid = uid.trim();
        if uid.is_empty() {
            return Err(StoreError::Url("user id must not be empty".to_string()));
        }

        let base = Url::parse(base).map_err(|e| StoreError::Url(format!("{base}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(StoreError::Url(format!("{base} cannot be a base URL")));
        }

        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            base,
            uid: uid.to_string(),
            token,
        })
    }

    /// `{base}/{collection}/{uid}` with each segment percent-encoded
    pub fn document_url(&self, collection: &str) -> Result<Url, StoreError> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StoreError::Url(format!("{} cannot be a base URL", self.base)))?;
            segments.pop_if_empty();
            segments.push(collection);
            segments.push(&self.uid);
        }
        Ok(url)
    }

    async fn get_document<T: DeserializeOwned>(&self, collection: &str) -> Result<Option<T>, StoreError> {
        let url = self.document_url(collection)?;
        let mut request = self.client.get(url.clone());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("No document at {}", url);
            return Ok(None);
        }

        let body = response.text().await?;
        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }
        if body.trim().is_empty() || body.trim() == "null" {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&body)?))
    }

    async fn put_document<T: Serialize + ?Sized>(&self, collection: &str, value: &T) -> Result<(), StoreError> {
        let url = self.document_url(collection)?;
        let mut request = self.client.put(url).json(value);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl TimerStore for RemoteStore {
    fn describe(&self) -> String {
        format!("remote store for user {} at {}", self.uid, self.base)
    }

    async fn load_config(&self) -> Result<Option<StoredConfig>, StoreError> {
        self.get_document(CONFIG_COLLECTION).await
    }

    async fn save_config(&self, config: &TimerConfig) -> Result<(), StoreError> {
        self.put_document(CONFIG_COLLECTION, config).await
    }

    async fn load_timer_state(&self) -> Result<Option<StoredTimerState>, StoreError> {
        self.get_document(TIMER_STATE_COLLECTION).await
    }

    async fn save_timer_state(&self, state: &TimerState) -> Result<(), StoreError> {
        self.put_document(TIMER_STATE_COLLECTION, state).await
    }
}
