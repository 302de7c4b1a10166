use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ChannelRef, ChatBackend, ChatError, ChatMessage, ChatUser};

/// In-memory chat backend used by tests in place of a live REST backend.
#[derive(Default)]
pub struct MemoryChatBackend {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    channels: HashMap<i64, ChannelRef>,
    messages: HashMap<i64, ChatMessage>,
    users: HashSet<String>,
    memberships: HashSet<(i64, String)>,
    follows: HashSet<(i64, String)>,
    created: Vec<ChatMessage>,
    next_message_id: i64,
    fail_creates: bool,
}

impl MemoryChatBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_channel(&self, channel: ChannelRef) {
        self.inner.lock().channels.insert(channel.id, channel);
    }

    pub fn add_user(&self, username: &str) {
        self.inner.lock().users.insert(username.to_string());
    }

    pub fn add_message(&self, message: ChatMessage) {
        self.inner.lock().messages.insert(message.id, message);
    }

    pub fn fail_creates(&self, fail: bool) {
        self.inner.lock().fail_creates = fail;
    }

    pub fn created_messages(&self) -> Vec<ChatMessage> {
        self.inner.lock().created.clone()
    }

    pub fn is_following(&self, channel_id: i64, username: &str) -> bool {
        self.inner
            .lock()
            .follows
            .contains(&(channel_id, username.to_string()))
    }

    pub fn is_member(&self, channel_id: i64, username: &str) -> bool {
        self.inner
            .lock()
            .memberships
            .contains(&(channel_id, username.to_string()))
    }
}

#[async_trait]
impl ChatBackend for MemoryChatBackend {
    async fn message(&self, id: i64) -> Result<Option<ChatMessage>, ChatError> {
        Ok(self.inner.lock().messages.get(&id).cloned())
    }

    async fn channel(&self, id: i64) -> Result<Option<ChannelRef>, ChatError> {
        Ok(self.inner.lock().channels.get(&id).cloned())
    }

    async fn user(&self, username: &str) -> Result<Option<ChatUser>, ChatError> {
        let inner = self.inner.lock();
        Ok(inner.users.contains(username).then(|| ChatUser {
            username: username.to_string(),
        }))
    }

    async fn follow_channel(&self, channel_id: i64, username: &str) -> Result<(), ChatError> {
        self.inner
            .lock()
            .follows
            .insert((channel_id, username.to_string()));
        Ok(())
    }

    async fn add_member(&self, channel_id: i64, username: &str) -> Result<(), ChatError> {
        self.inner
            .lock()
            .memberships
            .insert((channel_id, username.to_string()));
        Ok(())
    }

    async fn create_message(
        &self,
        channel_id: i64,
        username: &str,
        body: &str,
    ) -> Result<(), ChatError> {
        let mut inner = self.inner.lock();
        if inner.fail_creates {
            return Err(ChatError::CreateFailed("create disabled by test".to_string()));
        }
        inner.next_message_id += 1;
        let message = ChatMessage {
            id: inner.next_message_id,
            channel_id,
            username: username.to_string(),
            text: body.to_string(),
        };
        inner.created.push(message.clone());
        inner.messages.insert(message.id, message);
        Ok(())
    }
}
