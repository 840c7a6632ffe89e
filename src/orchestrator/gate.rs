use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::{watch, OwnedMutexGuard};

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Owner side of a cancellation flag.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

/// Observer side, checked at every provider-stream read and tool phase.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelHandle {
    #[must_use]
    pub fn new() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx: Arc::new(tx) }, CancelSignal { rx })
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl CancelSignal {
    /// A signal that never fires.
    #[must_use]
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the owning handle cancels. Pends forever if the handle
    /// is dropped without cancelling.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Turn gate
// ---------------------------------------------------------------------------

/// What a new turn does when another turn of the same conversation is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnPolicy {
    /// Queue behind the in-flight turn.
    #[default]
    Wait,
    /// Cancel the in-flight turn, then take over once it has wound down.
    Supersede,
}

#[derive(Debug, Default)]
struct SlotState {
    current: Option<(u64, CancelHandle)>,
    /// Tickets below this were queued before a later `Supersede` arrived.
    superseded_below: u64,
}

#[derive(Debug, Default)]
struct Slot {
    lock: Arc<tokio::sync::Mutex<()>>,
    state: Mutex<SlotState>,
}

type SlotMap = Mutex<FxHashMap<String, Arc<Slot>>>;

/// A claim on a conversation's slot; the slot leaves the map once the last
/// claim is gone.
#[derive(Debug)]
struct SlotRef {
    slots: Arc<SlotMap>,
    conversation_id: String,
    slot: Arc<Slot>,
}

impl Drop for SlotRef {
    fn drop(&mut self) {
        let mut slots = self.slots.lock();
        // One reference in the map, one here.
        if Arc::strong_count(&self.slot) == 2
            && slots
                .get(&self.conversation_id)
                .is_some_and(|slot| Arc::ptr_eq(slot, &self.slot))
        {
            slots.remove(&self.conversation_id);
        }
    }
}

/// Serializes turns per conversation so only one orchestrator appends to a
/// given Event Log at a time.
///
/// Waiters are admitted in arrival order. A `Supersede` request cancels the
/// running turn and marks every turn queued ahead of it as superseded, so
/// the newest superseding turn is the one that runs.
#[derive(Debug, Default)]
pub struct TurnGate {
    slots: Arc<SlotMap>,
    tickets: AtomicU64,
}

/// Exclusive right to run one turn. Dropping it admits the next turn.
#[derive(Debug)]
pub struct TurnPermit {
    generation: u64,
    superseded: bool,
    cancel: CancelSignal,
    _guard: OwnedMutexGuard<()>,
    slot: SlotRef,
}

impl TurnPermit {
    #[must_use]
    pub fn conversation_id(&self) -> &str {
        &self.slot.conversation_id
    }

    /// Fires when a later turn supersedes this one.
    #[must_use]
    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    /// True when a `Supersede` request arrived while this turn was still
    /// queued. The turn should not run; its signal is already cancelled.
    #[must_use]
    pub fn is_superseded(&self) -> bool {
        self.superseded
    }
}

impl Drop for TurnPermit {
    fn drop(&mut self) {
        let mut state = self.slot.slot.state.lock();
        if state.current.as_ref().is_some_and(|(generation, _)| *generation == self.generation) {
            state.current = None;
        }
    }
}

impl TurnGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, conversation_id: &str) -> SlotRef {
        let mut slots = self.slots.lock();
        let slot = Arc::clone(slots.entry(conversation_id.to_string()).or_default());
        SlotRef {
            slots: Arc::clone(&self.slots),
            conversation_id: conversation_id.to_string(),
            slot,
        }
    }

    /// Wait for the conversation to be free and claim it.
    ///
    /// The returned permit may be [superseded](TurnPermit::is_superseded)
    /// if a `Supersede` request arrived while this one was queued.
    pub async fn acquire(&self, conversation_id: &str, policy: TurnPolicy) -> TurnPermit {
        let slot = self.slot(conversation_id);
        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed) + 1;
        if policy == TurnPolicy::Supersede {
            let mut state = slot.slot.state.lock();
            state.superseded_below = state.superseded_below.max(ticket);
            if let Some((generation, handle)) = state.current.as_ref() {
                tracing::info!(conversation_id, generation, "superseding in-flight turn");
                handle.cancel();
            }
        }

        let guard = Arc::clone(&slot.slot.lock).lock_owned().await;
        let (handle, cancel) = CancelHandle::new();
        let superseded = {
            let mut state = slot.slot.state.lock();
            let superseded = ticket < state.superseded_below;
            if superseded {
                handle.cancel();
            }
            state.current = Some((ticket, handle));
            superseded
        };
        if superseded {
            tracing::info!(conversation_id, generation = ticket, "queued turn superseded");
        } else {
            tracing::debug!(conversation_id, generation = ticket, ?policy, "turn admitted");
        }

        TurnPermit {
            generation: ticket,
            superseded,
            cancel,
            _guard: guard,
            slot,
        }
    }

    /// Whether a turn is currently running for `conversation_id`.
    #[must_use]
    pub fn is_busy(&self, conversation_id: &str) -> bool {
        self.slots
            .lock()
            .get(conversation_id)
            .is_some_and(|slot| slot.state.lock().current.is_some())
    }

    /// Conversations with a running or queued turn.
    #[must_use]
    pub fn tracked_conversations(&self) -> usize {
        self.slots.lock().len()
    }
}
