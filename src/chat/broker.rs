use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::{AppError, AppResult};
use crate::groups::store::GroupStore;
use crate::storage::Storage;

/// Room fan-out capacity; a subscriber that lags this far behind starts
/// dropping messages rather than blocking the publisher.
const ROOM_CAPACITY: usize = 64;

/// Ids are sequential within a group, not globally unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: u64,
    pub user: String,
    pub message: String,
    pub timestamp: String,
}

type History = BTreeMap<String, Vec<ChatMessage>>;

/// Per-group message history plus the live fan-out channels. Membership is
/// checked against the group store before any read, write, or room join;
/// both the REST and the websocket path post through [`post_message`], so a
/// group sees a single id sequence.
///
/// [`post_message`]: ChatRoomBroker::post_message
#[derive(Clone)]
pub struct ChatRoomBroker {
    history: Arc<Mutex<History>>,
    rooms: Arc<Mutex<HashMap<u64, broadcast::Sender<ChatMessage>>>>,
    groups: GroupStore,
    storage: Storage,
}

impl ChatRoomBroker {
    pub fn open(storage: Storage, groups: GroupStore) -> anyhow::Result<Self> {
        let history: History = storage.load_or_default("chat_messages")?;
        Ok(Self {
            history: Arc::new(Mutex::new(history)),
            rooms: Arc::new(Mutex::new(HashMap::new())),
            groups,
            storage,
        })
    }

    fn lock_history(&self) -> MutexGuard<'_, History> {
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn require_membership(&self, group_id: u64, user: &str, denial: &str) -> AppResult<()> {
        let group = self
            .groups
            .get(group_id)
            .ok_or_else(|| AppError::not_found("Group not found"))?;
        if !group.members.iter().any(|m| m == user) {
            return Err(AppError::forbidden(denial));
        }
        Ok(())
    }

    pub fn list_messages(&self, group_id: u64, user: &str) -> AppResult<Vec<ChatMessage>> {
        self.require_membership(group_id, user, "Only group members can access chat")?;
        Ok(self
            .lock_history()
            .get(&group_id.to_string())
            .cloned()
            .unwrap_or_default())
    }

    /// Appends to the group's history, persists, and fans the message out to
    /// everyone currently in the room. Fire-and-forget on the fan-out side.
    pub fn post_message(
        &self,
        group_id: u64,
        user: String,
        message: &str,
        timestamp: Option<String>,
    ) -> AppResult<ChatMessage> {
        let message = message.trim();
        if message.is_empty() {
            return Err(AppError::validation("Message cannot be empty"));
        }
        self.require_membership(group_id, &user, "Only group members can send messages")?;

        let mut history = self.lock_history();
        let messages = history.entry(group_id.to_string()).or_default();
        let chat_message = ChatMessage {
            id: messages.len() as u64 + 1,
            user,
            message: message.to_owned(),
            timestamp: timestamp.unwrap_or_else(|| Utc::now().to_rfc3339()),
        };
        messages.push(chat_message.clone());
        self.storage.save("chat_messages", &*history)?;
        drop(history);

        tracing::debug!(group = group_id, user = %chat_message.user, "chat message posted");
        if let Some(tx) = self.rooms.lock().unwrap_or_else(|e| e.into_inner()).get(&group_id) {
            let _ = tx.send(chat_message.clone());
        }
        Ok(chat_message)
    }

    /// Associates a caller with the group's room, creating the room lazily.
    /// Returns the live message feed plus the group name for the join ack.
    pub fn join_room(
        &self,
        group_id: u64,
        user: &str,
    ) -> AppResult<(broadcast::Receiver<ChatMessage>, String)> {
        let group = self
            .groups
            .get(group_id)
            .filter(|g| g.members.iter().any(|m| m == user))
            .ok_or_else(|| AppError::forbidden("Not authorized to join this group chat"))?;

        let mut rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
        let tx = rooms
            .entry(group_id)
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0);
        tracing::info!(group = group_id, user, "joined chat room");
        Ok((tx.subscribe(), group.name))
    }

    /// The caller detaches by dropping its receiver; this only garbage
    /// collects a room channel nobody is listening to. No membership
    /// re-check on the way out.
    pub fn leave_room(&self, group_id: u64, user: &str) {
        let mut rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
        if rooms
            .get(&group_id)
            .is_some_and(|tx| tx.receiver_count() == 0)
        {
            rooms.remove(&group_id);
        }
        tracing::info!(group = group_id, user, "left chat room");
    }
}
