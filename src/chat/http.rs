use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::config::ChatConfig;

use super::{ChannelKind, ChannelRef, ChatBackend, ChatError, ChatMessage, ChatUser};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Discourse-style REST adapter. Authenticates with an admin API key and
/// acts as the given `Api-Username` unless a call overrides it.
pub struct HttpChatBackend {
    client: Client,
    base_url: String,
    api_key: String,
    api_username: String,
}

#[derive(Debug, Deserialize)]
struct MessageEnvelope {
    id: i64,
    chat_channel_id: i64,
    username: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ChannelEnvelope {
    id: i64,
    #[serde(default)]
    chatable_type: String,
}

impl HttpChatBackend {
    pub fn new(config: &ChatConfig) -> anyhow::Result<Self> {
        let base = url::Url::parse(&config.base_url)?;
        let client = Client::builder()
            .connect_timeout(REQUEST_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base.as_str().trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_username: config.api_username.clone(),
        })
    }

    fn request(
        &self,
        builder: reqwest::RequestBuilder,
        acting_username: &str,
    ) -> reqwest::RequestBuilder {
        builder
            .header("Api-Key", self.api_key.trim())
            .header("Api-Username", acting_username)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<Option<T>, ChatError> {
        let response = self
            .request(self.client.get(url), &self.api_username)
            .send()
            .await
            .map_err(|e| ChatError::Request(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json::<T>()
                .await
                .map(Some)
                .map_err(|e| ChatError::Request(e.to_string())),
            status => Err(ChatError::Rejected {
                status: status.as_u16(),
                detail: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn post_as(
        &self,
        url: &str,
        acting_username: &str,
        payload: &serde_json::Value,
    ) -> Result<(), ChatError> {
        let response = self
            .request(self.client.post(url).json(payload), acting_username)
            .send()
            .await
            .map_err(|e| ChatError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ChatError::Rejected {
                status: status.as_u16(),
                detail: response.text().await.unwrap_or_default(),
            })
        }
    }

    fn channel_kind(chatable_type: &str) -> ChannelKind {
        match chatable_type {
            "Category" => ChannelKind::Category,
            "DirectMessage" => ChannelKind::DirectMessage,
            _ => ChannelKind::Other,
        }
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn message(&self, id: i64) -> Result<Option<ChatMessage>, ChatError> {
        let url = format!("{}/chat/message/{}.json", self.base_url, id);
        let envelope: Option<MessageEnvelope> = self.get_json(&url).await?;
        Ok(envelope.map(|m| ChatMessage {
            id: m.id,
            channel_id: m.chat_channel_id,
            username: m.username,
            text: m.message,
        }))
    }

    async fn channel(&self, id: i64) -> Result<Option<ChannelRef>, ChatError> {
        let url = format!("{}/chat/api/channels/{}.json", self.base_url, id);
        let envelope: Option<ChannelEnvelope> = self.get_json(&url).await?;
        Ok(envelope.map(|c| ChannelRef {
            id: c.id,
            kind: Self::channel_kind(&c.chatable_type),
        }))
    }

    async fn user(&self, username: &str) -> Result<Option<ChatUser>, ChatError> {
        let url = format!("{}/u/{}.json", self.base_url, username);
        let envelope: Option<serde_json::Value> = self.get_json(&url).await?;
        Ok(envelope.map(|_| ChatUser {
            username: username.to_string(),
        }))
    }

    async fn follow_channel(&self, channel_id: i64, username: &str) -> Result<(), ChatError> {
        let url = format!(
            "{}/chat/api/channels/{}/memberships/me/follows.json",
            self.base_url, channel_id
        );
        debug!("following channel {} as {}", channel_id, username);
        self.post_as(&url, username, &serde_json::json!({})).await
    }

    async fn add_member(&self, channel_id: i64, username: &str) -> Result<(), ChatError> {
        let url = format!(
            "{}/chat/api/channels/{}/memberships.json",
            self.base_url, channel_id
        );
        debug!("adding {} to channel {}", username, channel_id);
        self.post_as(
            &url,
            &self.api_username,
            &serde_json::json!({ "usernames": [username] }),
        )
        .await
    }

    async fn create_message(
        &self,
        channel_id: i64,
        username: &str,
        body: &str,
    ) -> Result<(), ChatError> {
        let url = format!("{}/chat/{}.json", self.base_url, channel_id);
        self.post_as(&url, username, &serde_json::json!({ "message": body }))
            .await
            .map_err(|e| ChatError::CreateFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::HttpChatBackend;
    use crate::chat::ChannelKind;

    #[test]
    fn channel_kind_normalizes_chatable_types() {
        assert_eq!(
            HttpChatBackend::channel_kind("Category"),
            ChannelKind::Category
        );
        assert_eq!(
            HttpChatBackend::channel_kind("DirectMessage"),
            ChannelKind::DirectMessage
        );
        assert_eq!(HttpChatBackend::channel_kind(""), ChannelKind::Other);
        assert_eq!(HttpChatBackend::channel_kind("Group"), ChannelKind::Other);
    }
}
