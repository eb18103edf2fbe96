use async_trait::async_trait;
use slack_morphism::prelude::*;

use crate::config::SlackCredentials;
use crate::directory::{
    Channel, ChannelKind, ChatDirectory, HistoryPage, HistoryRequest, RawMessage,
};
use crate::{AppError, Result};

const LIST_PAGE_SIZE: u16 = 200;

/// [`ChatDirectory`] backed by the Slack Web API.
///
/// Channels are cached by `refresh_channels`; history is always read live.
pub struct SlackDirectory {
    client: SlackHyperClient,
    token: SlackApiToken,
    channels: Vec<Channel>,
}

impl SlackDirectory {
    pub fn new(credentials: &SlackCredentials) -> Result<Self> {
        let connector =
            SlackClientHyperConnector::new().map_err(|e| AppError::SlackApi(e.to_string()))?;
        let client = SlackClient::new(connector);

        let mut token = SlackApiToken::new(SlackApiTokenValue(credentials.token.clone()));
        if let Some(cookie) = &credentials.cookie {
            token = token.with_cookie(SlackApiCookieValue(format!("d={}", cookie)));
        }

        Ok(Self {
            client,
            token,
            channels: Vec::new(),
        })
    }
}

#[async_trait]
impl ChatDirectory for SlackDirectory {
    async fn refresh_users(&mut self) -> Result<usize> {
        let session = self.client.open_session(&self.token);

        let mut users = 0;
        let mut cursor: Option<SlackCursorId> = None;

        loop {
            let request = SlackApiUsersListRequest::new()
                .with_limit(LIST_PAGE_SIZE)
                .opt_cursor(cursor);

            let response = session
                .users_list(&request)
                .await
                .map_err(|e| AppError::SlackApi(e.to_string()))?;

            users += response.members.len();

            match next_cursor(response.response_metadata) {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(users)
    }

    async fn refresh_channels(&mut self) -> Result<usize> {
        let session = self.client.open_session(&self.token);

        let mut channels = Vec::new();
        let mut cursor: Option<SlackCursorId> = None;

        loop {
            let request = SlackApiConversationsListRequest::new()
                .with_limit(LIST_PAGE_SIZE)
                .with_types(vec![
                    SlackConversationType::Public,
                    SlackConversationType::Private,
                    SlackConversationType::Mpim,
                    SlackConversationType::Im,
                ])
                .opt_cursor(cursor);

            let response = session
                .conversations_list(&request)
                .await
                .map_err(|e| AppError::SlackApi(e.to_string()))?;

            channels.extend(response.channels.into_iter().map(|info| Channel {
                kind: channel_kind(&info.flags),
                name: info.name.unwrap_or_else(|| info.id.0.clone()),
                id: info.id.0,
            }));

            match next_cursor(response.response_metadata) {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        self.channels = channels;
        Ok(self.channels.len())
    }

    async fn list_channels(&self, kinds: &[ChannelKind]) -> Result<Vec<Channel>> {
        Ok(self
            .channels
            .iter()
            .filter(|c| kinds.contains(&c.kind))
            .cloned()
            .collect())
    }

    async fn history_page(&self, request: &HistoryRequest) -> Result<HistoryPage> {
        let session = self.client.open_session(&self.token);

        let api_request = SlackApiConversationsHistoryRequest::new()
            .with_channel(SlackChannelId(request.channel_id.clone()))
            .with_limit(request.limit)
            .with_inclusive(request.inclusive)
            .opt_oldest(request.oldest.clone().map(SlackTs))
            .opt_latest(request.latest.clone().map(SlackTs))
            .opt_cursor(request.cursor.clone().map(SlackCursorId));

        let response = session
            .conversations_history(&api_request)
            .await
            .map_err(|e| AppError::SlackApi(e.to_string()))?;

        Ok(HistoryPage {
            messages: response.messages.into_iter().map(raw_message).collect(),
            next_cursor: next_cursor(response.response_metadata).map(|c| c.0),
        })
    }
}

fn next_cursor(meta: Option<SlackResponseMetadata>) -> Option<SlackCursorId> {
    meta.and_then(|m| m.next_cursor)
        .filter(|cursor| !cursor.0.is_empty())
}

fn channel_kind(flags: &SlackChannelFlags) -> ChannelKind {
    if flags.is_im == Some(true) {
        ChannelKind::Direct
    } else if flags.is_mpim == Some(true) {
        ChannelKind::MultiParty
    } else if flags.is_private == Some(true) {
        ChannelKind::Private
    } else {
        ChannelKind::Public
    }
}

fn raw_message(message: SlackHistoryMessage) -> RawMessage {
    let user = message
        .sender
        .user
        .map(|u| u.0)
        .or_else(|| message.sender.bot_id.map(|b| b.0))
        .unwrap_or_default();

    RawMessage {
        user,
        text: message.content.text.unwrap_or_default(),
        ts: message.origin.ts.0,
    }
}
