use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::TurnError;
use crate::event::{Event, EventLog, ToolCallSegment};

/// An Event as persisted, with the storage-level ordering key.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    pub conversation_id: String,
    pub ordering_key: u64,
    pub event: Event,
}

/// Persistence collaborator. Implementations allocate ordering keys and
/// must return Events of a conversation in key order.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist `event`. `ordering_hint` is its position in the Event Log.
    async fn append(
        &self,
        conversation_id: &str,
        event: Event,
        ordering_hint: u64,
    ) -> Result<StoredEvent, TurnError>;

    async fn list_by_conversation(&self, conversation_id: &str) -> Result<Vec<Event>, TurnError>;

    async fn unresolved_tool_calls(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<ToolCallSegment>, TurnError> {
        let log = EventLog::from_events(self.list_by_conversation(conversation_id).await?);
        Ok(log.unresolved_tool_calls().into_iter().cloned().collect())
    }
}

/// In-process store keyed by conversation id.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    conversations: RwLock<FxHashMap<String, Vec<StoredEvent>>>,
}

impl MemoryEventStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn conversation_count(&self) -> usize {
        self.conversations.read().len()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(
        &self,
        conversation_id: &str,
        event: Event,
        ordering_hint: u64,
    ) -> Result<StoredEvent, TurnError> {
        let mut conversations = self.conversations.write();
        let stored = conversations.entry(conversation_id.to_string()).or_default();
        if stored.iter().any(|existing| existing.event.id == event.id) {
            return Err(TurnError::Store(format!(
                "event {} already stored in conversation {conversation_id}",
                event.id
            )));
        }
        // keys stay strictly increasing even if a caller reuses a hint
        let ordering_key = stored
            .last()
            .map_or(ordering_hint, |last| ordering_hint.max(last.ordering_key + 1));
        let record = StoredEvent {
            conversation_id: conversation_id.to_string(),
            ordering_key,
            event,
        };
        stored.push(record.clone());
        Ok(record)
    }

    async fn list_by_conversation(&self, conversation_id: &str) -> Result<Vec<Event>, TurnError> {
        let conversations = self.conversations.read();
        let mut stored: Vec<&StoredEvent> = conversations
            .get(conversation_id)
            .map(|events| events.iter().collect())
            .unwrap_or_default();
        stored.sort_by_key(|record| record.ordering_key);
        Ok(stored.into_iter().map(|record| record.event.clone()).collect())
    }
}
