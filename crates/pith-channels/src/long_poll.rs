use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pith_store::Store;
use serde::Deserialize;
use tracing::debug;

use crate::channel::{Channel, IncomingMessage, OutgoingMessage};
use crate::error::ChannelError;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct PollResponse {
    #[serde(default)]
    messages: Vec<PolledMessage>,
}

#[derive(Debug, Deserialize)]
struct PolledMessage {
    cursor: String,
    text: String,
}

/// Reference channel implementation: polls a remote HTTP endpoint for new
/// messages and posts turn outcomes back to it. The endpoint is expected
/// to accept `GET {url}?cursor={cursor}` returning `{"messages": [{"cursor","text"}, ...]}`
/// and `POST {url}` with `{"text": ...}` for outbound replies.
///
/// The cursor is the id of the last message this channel has consumed; it
/// is persisted in `AppState` under `channel_cursor_{name}` after every
/// successfully delivered message so a restart resumes from where it left
/// off instead of replaying history.
pub struct LongPollChannel {
    name: String,
    http: reqwest::Client,
    url: String,
    poll_interval: Duration,
    store: Arc<Store>,
    cursor: Option<String>,
    buffered: VecDeque<PolledMessage>,
}

impl LongPollChannel {
    pub fn new(name: impl Into<String>, url: impl Into<String>, poll_interval: Option<Duration>, store: Arc<Store>) -> Self {
        Self {
            name: name.into(),
            http: reqwest::Client::new(),
            url: url.into(),
            poll_interval: poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL),
            store,
            cursor: None,
            buffered: VecDeque::new(),
        }
    }

    fn cursor_key(&self) -> String {
        format!("channel_cursor_{}", self.name)
    }

    async fn persist_cursor(&self, cursor: &str) -> Result<(), ChannelError> {
        self.store.set_app_state(&self.cursor_key(), cursor).await?;
        Ok(())
    }

    async fn poll_once(&self) -> Result<PollResponse, ChannelError> {
        let mut req = self.http.get(&self.url);
        if let Some(cursor) = &self.cursor {
            req = req.query(&[("cursor", cursor.as_str())]);
        }
        let response = req
            .send()
            .await
            .map_err(|e| ChannelError::Recv { channel: self.name.clone(), source: e.into() })?;
        response
            .json::<PollResponse>()
            .await
            .map_err(|e| ChannelError::Recv { channel: self.name.clone(), source: e.into() })
    }
}

#[async_trait]
impl Channel for LongPollChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&mut self) -> Result<(), ChannelError> {
        self.cursor = self.store.get_app_state(&self.cursor_key()).await?;
        debug!(channel = %self.name, cursor = ?self.cursor, "long-poll channel connected");
        Ok(())
    }

    async fn recv(&mut self) -> Result<IncomingMessage, ChannelError> {
        loop {
            if let Some(message) = self.buffered.pop_front() {
                self.cursor = Some(message.cursor.clone());
                self.persist_cursor(&message.cursor).await?;
                return Ok(IncomingMessage { text: message.text });
            }

            let response = self.poll_once().await?;
            if response.messages.is_empty() {
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }
            self.buffered.extend(response.messages);
        }
    }

    async fn send(&mut self, outgoing: OutgoingMessage) -> Result<(), ChannelError> {
        self.http
            .post(&self.url)
            .json(&serde_json::json!({"text": outgoing.text}))
            .send()
            .await
            .map_err(|e| ChannelError::Send { channel: self.name.clone(), source: e.into() })?;
        Ok(())
    }
}
