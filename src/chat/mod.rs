use async_trait::async_trait;

pub mod http;
#[cfg(test)]
pub mod memory;

pub use self::http::HttpChatBackend;
#[cfg(test)]
pub use self::memory::MemoryChatBackend;

/// Normalized channel kinds. Produced once at the adapter boundary; the
/// bridge core never inspects backend-specific channel shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Public category-backed channel; membership is modeled as following.
    Category,
    DirectMessage,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRef {
    pub id: i64,
    pub kind: ChannelKind,
}

impl ChannelRef {
    pub fn is_followable(&self) -> bool {
        matches!(self.kind, ChannelKind::Category)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: i64,
    pub channel_id: i64,
    pub username: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatUser {
    pub username: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("chat backend request failed: {0}")]
    Request(String),
    #[error("chat backend returned {status}: {detail}")]
    Rejected { status: u16, detail: String },
    #[error("message creation failed: {0}")]
    CreateFailed(String),
}

/// The local chat backend, consumed at this boundary only. Every lookup
/// returns `Ok(None)` for a missing reference; `Err` is reserved for the
/// backend itself misbehaving.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn message(&self, id: i64) -> Result<Option<ChatMessage>, ChatError>;
    async fn channel(&self, id: i64) -> Result<Option<ChannelRef>, ChatError>;
    async fn user(&self, username: &str) -> Result<Option<ChatUser>, ChatError>;
    /// Category/public membership: mark the user as following the channel.
    async fn follow_channel(&self, channel_id: i64, username: &str) -> Result<(), ChatError>;
    /// Explicit membership add for non-followable channel kinds.
    async fn add_member(&self, channel_id: i64, username: &str) -> Result<(), ChatError>;
    async fn create_message(
        &self,
        channel_id: i64,
        username: &str,
        body: &str,
    ) -> Result<(), ChatError>;
}
