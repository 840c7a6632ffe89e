use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures_util::Stream;
use parking_lot::Mutex;

use crate::error::TurnError;
use crate::event::EventLog;
use crate::protocol::StreamDelta;

/// Canonical deltas of one model turn.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<StreamDelta, TurnError>> + Send>>;

/// A model backend that streams one assistant turn for an Event Log.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// # Errors
    ///
    /// Returns an error when the request cannot be sent or is rejected
    /// before streaming starts.
    async fn stream_turn(&self, log: &EventLog) -> Result<DeltaStream, TurnError>;
}

type TurnScript = Box<dyn Fn(usize) -> Option<Vec<Result<StreamDelta, TurnError>>> + Send + Sync>;

/// Provider that replays canned turns, for tests and offline runs.
pub struct ScriptedProvider {
    script: TurnScript,
    turn: AtomicUsize,
    seen: Mutex<Vec<EventLog>>,
}

impl std::fmt::Debug for ScriptedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedProvider")
            .field("turn", &self.turn)
            .finish_non_exhaustive()
    }
}

impl ScriptedProvider {
    /// Replay `turns` in order; requests past the end fail.
    #[must_use]
    pub fn new(turns: Vec<Vec<StreamDelta>>) -> Self {
        Self::from_fn(move |index| {
            turns
                .get(index)
                .map(|deltas| deltas.iter().cloned().map(Ok).collect())
        })
    }

    /// Build each turn from its zero-based index. `None` ends the script.
    #[must_use]
    pub fn from_fn(
        script: impl Fn(usize) -> Option<Vec<Result<StreamDelta, TurnError>>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            turn: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Number of turns requested so far.
    #[must_use]
    pub fn turns_requested(&self) -> usize {
        self.turn.load(Ordering::SeqCst)
    }

    /// Event Logs the provider was asked to continue, oldest first.
    #[must_use]
    pub fn seen_logs(&self) -> Vec<EventLog> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream_turn(&self, log: &EventLog) -> Result<DeltaStream, TurnError> {
        let index = self.turn.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(log.clone());
        let deltas = (self.script)(index)
            .ok_or_else(|| TurnError::Internal(format!("script has no turn {index}")))?;
        Ok(Box::pin(futures_util::stream::iter(deltas)))
    }
}
