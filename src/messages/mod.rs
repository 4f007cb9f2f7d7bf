use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::models::{self, ReadStatus, SenderType, UserMessage};
use crate::task_stack::TaskStackStore;
use crate::{Result, SpiralError};

struct MessageStoreInner {
    messages: HashMap<String, UserMessage>,
    counter: u64,
}

/// Map of user/director/subagent messages with independent read flags per
/// reader class. Grounded on spec.md §4.2; no direct Python counterpart was
/// retrieved, so semantics follow the spec text exactly.
pub struct MessageStore {
    inner: Mutex<MessageStoreInner>,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MessageStoreInner {
                messages: HashMap::new(),
                counter: 0,
            }),
        }
    }

    pub async fn create_user_message(
        &self,
        content: String,
        sender_type: SenderType,
        task_id: Option<String>,
    ) -> UserMessage {
        let mut inner = self.inner.lock().await;
        inner.counter += 1;
        let message = UserMessage {
            id: models::ids::next("msg", inner.counter),
            content,
            timestamp: chrono::Utc::now(),
            sender_type,
            director_read_status: ReadStatus::Unread,
            user_read_status: ReadStatus::Unread,
            task_id,
        };
        inner.messages.insert(message.id.clone(), message.clone());
        message
    }

    pub async fn get_message(&self, id: &str) -> Option<UserMessage> {
        self.inner.lock().await.messages.get(id).cloned()
    }

    pub async fn get_all_messages(&self) -> Vec<UserMessage> {
        self.inner.lock().await.messages.values().cloned().collect()
    }

    pub async fn update_read_status(
        &self,
        id: &str,
        director: Option<bool>,
        user: Option<bool>,
    ) -> Result<UserMessage> {
        let mut inner = self.inner.lock().await;
        let message = inner
            .messages
            .get_mut(id)
            .ok_or_else(|| SpiralError::NotFound(format!("message {id} not found")))?;
        if let Some(read) = director {
            message.director_read_status = if read {
                ReadStatus::Read
            } else {
                ReadStatus::Unread
            };
        }
        if let Some(read) = user {
            message.user_read_status = if read {
                ReadStatus::Read
            } else {
                ReadStatus::Unread
            };
        }
        Ok(message.clone())
    }

    /// Returns messages where at least one selected flag is UNREAD, after
    /// optional sender filtering. When neither flag is requested, defaults
    /// to director-only per spec.md §9's preserved open question.
    pub async fn list_unread(
        &self,
        sender_type: Option<SenderType>,
        check_director: bool,
        check_user: bool,
    ) -> Vec<UserMessage> {
        let (check_director, check_user) = if !check_director && !check_user {
            (true, false)
        } else {
            (check_director, check_user)
        };

        let inner = self.inner.lock().await;
        inner
            .messages
            .values()
            .filter(|m| sender_type.map_or(true, |s| m.sender_type == s))
            .filter(|m| {
                (check_director && m.director_read_status == ReadStatus::Unread)
                    || (check_user && m.user_read_status == ReadStatus::Unread)
            })
            .cloned()
            .collect()
    }

    /// True iff the message references a task currently PENDING.
    pub async fn is_new_task(&self, msg_id: &str, task_stack: &TaskStackStore) -> bool {
        let task_id = {
            let inner = self.inner.lock().await;
            match inner.messages.get(msg_id).and_then(|m| m.task_id.clone()) {
                Some(id) => id,
                None => return false,
            }
        };
        match task_stack.get_task(&task_id).await {
            Some(task) => task.status == crate::models::TaskStatus::Pending,
            None => false,
        }
    }
}
