//! Read-only view of the chat workspace used by the export pipeline.
//!
//! The pipeline only talks to [`ChatDirectory`]; the Slack-backed
//! implementation lives in [`crate::slack`], tests use in-memory fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Public,
    Private,
    MultiParty,
    Direct,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 4] = [
        ChannelKind::Public,
        ChannelKind::Private,
        ChannelKind::MultiParty,
        ChannelKind::Direct,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub kind: ChannelKind,
}

/// A message as returned by the history API, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub user: String,
    pub text: String,
    /// Fixed-point seconds since epoch, e.g. `1700000000.123456`
    pub ts: String,
}

/// One `conversations.history` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub channel_id: String,
    pub limit: u16,
    pub oldest: Option<String>,
    pub latest: Option<String>,
    pub cursor: Option<String>,
    pub inclusive: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryPage {
    pub messages: Vec<RawMessage>,
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait ChatDirectory: Send + Sync {
    /// Reloads the user list, returning how many users are known.
    async fn refresh_users(&mut self) -> Result<usize>;

    /// Reloads the conversation list, returning how many channels are known.
    async fn refresh_channels(&mut self) -> Result<usize>;

    /// Channels of the given kinds, in directory order.
    async fn list_channels(&self, kinds: &[ChannelKind]) -> Result<Vec<Channel>>;

    async fn history_page(&self, request: &HistoryRequest) -> Result<HistoryPage>;
}
