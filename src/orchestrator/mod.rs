pub mod executor;
pub mod gate;
pub mod provider;
pub mod store;

pub use executor::{execute_all, ToolContext, ToolExecutor, ToolInvocation, ToolOutcome};
pub use gate::{CancelHandle, CancelSignal, TurnGate, TurnPermit, TurnPolicy};
pub use provider::{DeltaStream, ModelProvider, ScriptedProvider};
pub use store::{EventStore, MemoryEventStore, StoredEvent};

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;

use crate::builder::{BuilderConfig, EventBuilder};
use crate::error::TurnError;
use crate::event::{Event, EventLog, ResponseMetadata, ResponseStatus, Role, Segment, ToolResultSegment};
use crate::observability;
use crate::observability::token_counter::estimate_event_tokens;
use crate::protocol::StreamDelta;
use crate::stream::{Envelope, EnvelopeProjector};

// ---------------------------------------------------------------------------
// Envelope sink
// ---------------------------------------------------------------------------

/// Destination of the envelopes produced during a turn.
#[async_trait]
pub trait EnvelopeSink: Send {
    /// # Errors
    ///
    /// Returns [`TurnError::Sink`] when the receiving side is gone.
    async fn send(&mut self, envelope: Envelope) -> Result<(), TurnError>;
}

#[async_trait]
impl EnvelopeSink for mpsc::Sender<Envelope> {
    async fn send(&mut self, envelope: Envelope) -> Result<(), TurnError> {
        mpsc::Sender::send(self, envelope)
            .await
            .map_err(|_| TurnError::Sink("envelope receiver dropped".to_string()))
    }
}

#[async_trait]
impl EnvelopeSink for mpsc::UnboundedSender<Envelope> {
    async fn send(&mut self, envelope: Envelope) -> Result<(), TurnError> {
        mpsc::UnboundedSender::send(self, envelope)
            .map_err(|_| TurnError::Sink("envelope receiver dropped".to_string()))
    }
}

#[async_trait]
impl EnvelopeSink for Vec<Envelope> {
    async fn send(&mut self, envelope: Envelope) -> Result<(), TurnError> {
        self.push(envelope);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Configuration and outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Model requests allowed per turn before the loop is forced to stop.
    pub max_iterations: u32,
    pub tool_timeout: Duration,
    pub builder: BuilderConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            tool_timeout: Duration::from_secs(30),
            builder: BuilderConfig::default(),
        }
    }
}

/// Loop state of one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    AwaitingModel,
    ModelResponded,
    ExecutingTools,
    Done,
}

/// Why the loop reached `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStop {
    /// The last model response left no unresolved tool calls.
    Resolved,
    /// The iteration cap was hit with calls still unresolved.
    IterationCap,
    Cancelled,
}

impl TurnStop {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TurnStop::Resolved => "resolved",
            TurnStop::IterationCap => "iteration_cap",
            TurnStop::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub stop: TurnStop,
    /// Model requests made.
    pub iterations: u32,
    /// Events appended to the log by this turn.
    pub appended: usize,
}

/// How one streamed model response ended.
enum ModelResponse {
    Finished,
    Cancelled,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives `AWAITING_MODEL → MODEL_RESPONDED → EXECUTING_TOOLS → …` until the
/// model stops calling tools or the iteration cap is reached.
pub struct Orchestrator {
    provider: Arc<dyn ModelProvider>,
    executor: Arc<dyn ToolExecutor>,
    store: Option<Arc<dyn EventStore>>,
    config: OrchestratorConfig,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("provider", &self.provider.name())
            .field("has_store", &self.store.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Per-turn bookkeeping shared by the phases.
struct TurnState<'a> {
    conversation_id: &'a str,
    log: &'a mut EventLog,
    appended: usize,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        executor: Arc<dyn ToolExecutor>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            provider,
            executor,
            store: None,
            config,
        }
    }

    /// Persist every appended Event through `store`.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Claim the conversation, load its log from the store, append `user`
    /// and run the turn.
    ///
    /// A turn superseded while queued appends nothing and ends with
    /// `complete` and [`TurnStop::Cancelled`].
    ///
    /// # Errors
    ///
    /// Fails if no store is configured, the store fails, or the turn fails.
    pub async fn respond<S: EnvelopeSink>(
        &self,
        gate: &TurnGate,
        conversation_id: &str,
        user: Event,
        policy: TurnPolicy,
        sink: &mut S,
    ) -> Result<(EventLog, TurnOutcome), TurnError> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| TurnError::Config("respond requires an event store".to_string()))?;
        let permit = gate.acquire(conversation_id, policy).await;
        let mut log = EventLog::from_events(store.list_by_conversation(conversation_id).await?);
        if permit.is_superseded() {
            sink.send(Envelope::complete()).await?;
            return Ok((
                log,
                TurnOutcome {
                    stop: TurnStop::Cancelled,
                    iterations: 0,
                    appended: 0,
                },
            ));
        }

        store
            .append(conversation_id, user.clone(), log.len() as u64)
            .await?;
        log.push(user);
        let mut cancel = permit.cancel_signal();
        let mut outcome = self.run_turn(conversation_id, &mut log, sink, &mut cancel).await?;
        outcome.appended += 1;
        drop(permit);
        Ok((log, outcome))
    }

    /// Run the tool-call loop on `log` until it settles.
    ///
    /// Tool failures and timeouts become `tool_result.error` and never end
    /// the loop. A provider failure appends whatever partial Event exists,
    /// sends one `error` envelope and returns the error. Cancellation keeps
    /// the partial Event (status `incomplete`) and ends with `complete`.
    ///
    /// # Errors
    ///
    /// Returns the provider, store or sink error that ended the turn.
    pub async fn run_turn<S: EnvelopeSink>(
        &self,
        conversation_id: &str,
        log: &mut EventLog,
        sink: &mut S,
        cancel: &mut CancelSignal,
    ) -> Result<TurnOutcome, TurnError> {
        let started = Instant::now();
        let mut state = TurnState {
            conversation_id,
            log,
            appended: 0,
        };
        let mut iterations = 0u32;
        let mut phase = TurnPhase::AwaitingModel;

        let stop = loop {
            if iterations >= self.config.max_iterations {
                tracing::warn!(
                    conversation_id,
                    max_iterations = self.config.max_iterations,
                    "iteration cap reached, stopping tool loop"
                );
                break TurnStop::IterationCap;
            }
            iterations += 1;
            transition(&mut phase, TurnPhase::AwaitingModel, iterations);

            match self.model_turn(&mut state, sink, cancel).await {
                Ok(ModelResponse::Finished) => {}
                Ok(ModelResponse::Cancelled) => break TurnStop::Cancelled,
                Err(err) => {
                    tracing::error!(conversation_id, iteration = iterations, error = %err, "model turn failed");
                    sink.send(Envelope::error(err.code(), err.client_message())).await?;
                    observability::log_turn_complete(conversation_id, iterations, state.appended, "failed", started);
                    return Err(err);
                }
            }
            transition(&mut phase, TurnPhase::ModelResponded, iterations);

            let calls: Vec<ToolInvocation> = state
                .log
                .unresolved_tool_calls()
                .into_iter()
                .map(ToolInvocation::from)
                .collect();
            if calls.is_empty() {
                break TurnStop::Resolved;
            }

            transition(&mut phase, TurnPhase::ExecutingTools, iterations);
            let context = ToolContext {
                conversation_id: conversation_id.to_string(),
                iteration: iterations,
            };
            let outcomes = tokio::select! {
                biased;
                () = cancel.cancelled() => break TurnStop::Cancelled,
                outcomes = execute_all(self.executor.as_ref(), calls, &context, self.config.tool_timeout) => outcomes,
            };
            self.append_tool_results(&mut state, sink, outcomes).await?;
        };

        transition(&mut phase, TurnPhase::Done, iterations);
        sink.send(Envelope::complete()).await?;
        observability::log_turn_complete(conversation_id, iterations, state.appended, stop.as_str(), started);
        Ok(TurnOutcome {
            stop,
            iterations,
            appended: state.appended,
        })
    }

    /// Stream one assistant response into a builder, forwarding envelopes
    /// as snapshots change, and append the finalized Event.
    async fn model_turn<S: EnvelopeSink>(
        &self,
        state: &mut TurnState<'_>,
        sink: &mut S,
        cancel: &mut CancelSignal,
    ) -> Result<ModelResponse, TurnError> {
        let started = Instant::now();
        let (update_tx, mut update_rx) = mpsc::unbounded_channel::<Event>();
        let mut builder = EventBuilder::new(Role::Assistant, self.config.builder.clone())
            .on_update(move |snapshot| {
                let _ = update_tx.send(snapshot);
            });
        let mut projector = EnvelopeProjector::new();
        let mut pending = Vec::new();

        let connected = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            connected = self.provider.stream_turn(state.log) => Some(connected),
        };
        let mut stream = match connected {
            Some(Ok(stream)) => stream,
            Some(Err(err)) => {
                builder.dispose();
                return Err(err);
            }
            None => {
                tracing::info!(event_id = %builder.id(), "turn cancelled before the provider answered");
                builder.dispose();
                return Ok(ModelResponse::Cancelled);
            }
        };

        let mut failure: Option<TurnError> = None;
        let mut cancelled = false;
        let mut ended = false;
        while !(cancelled || ended || failure.is_some()) {
            let deadline = builder.next_flush_deadline();
            let flush_at = tokio::time::Instant::from_std(deadline.unwrap_or_else(Instant::now));
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::info!(event_id = %builder.id(), "turn cancelled mid-stream");
                    builder.dispose();
                    cancelled = true;
                }
                () = tokio::time::sleep_until(flush_at), if deadline.is_some() => builder.flush_text(),
                item = stream.next() => match item {
                    Some(Ok(StreamDelta::Done)) | None => ended = true,
                    Some(Ok(StreamDelta::Error { status, message })) => {
                        failure = Some(TurnError::Provider { status, message });
                    }
                    Some(Ok(delta)) => builder.apply(delta),
                    Some(Err(err)) => failure = Some(err),
                },
            }
            drain_updates(&mut update_rx, &mut projector, &mut pending);
            flush_envelopes(sink, &mut pending).await?;
        }
        drop(stream);

        let Some(mut event) = builder.finalize() else {
            return Err(TurnError::Internal("builder finalized twice".to_string()));
        };
        drain_updates(&mut update_rx, &mut projector, &mut pending);
        if cancelled {
            mark_status(&mut event, ResponseStatus::Incomplete);
        } else if failure.is_some() {
            mark_status(&mut event, ResponseStatus::Failed);
        }

        if event.is_empty() && projector.current_event_id().is_none() {
            tracing::debug!(event_id = %event.id, "empty model response discarded");
            pending.clear();
        } else {
            projector.complete_into(&event, &mut pending);
            flush_envelopes(sink, &mut pending).await?;
            observability::log_usage(
                event
                    .response_metadata
                    .as_ref()
                    .and_then(|meta| meta.model.as_deref())
                    .unwrap_or(self.provider.name()),
                event.response_metadata.as_ref().and_then(|meta| meta.usage.as_ref()),
                state.log,
                estimate_event_tokens(&event),
                started,
            );
            if !event.is_empty() {
                self.append(state, event).await?;
            }
        }

        match failure {
            Some(err) => Err(err),
            None if cancelled => Ok(ModelResponse::Cancelled),
            None => Ok(ModelResponse::Finished),
        }
    }

    /// One `tool` Event holding every result of the phase, in call order.
    async fn append_tool_results<S: EnvelopeSink>(
        &self,
        state: &mut TurnState<'_>,
        sink: &mut S,
        outcomes: Vec<ToolOutcome>,
    ) -> Result<(), TurnError> {
        let mut event = Event::with_id(crate::util::next_id("evt"), Role::Tool, state.log.next_ts());
        event.segments = outcomes
            .into_iter()
            .map(|outcome| Segment::ToolResult(ToolResultSegment::from(outcome)))
            .collect();

        let mut pending = Vec::with_capacity(2);
        EnvelopeProjector::new().complete_into(&event, &mut pending);
        flush_envelopes(sink, &mut pending).await?;
        self.append(state, event).await
    }

    async fn append(&self, state: &mut TurnState<'_>, event: Event) -> Result<(), TurnError> {
        let ordering_hint = state.log.len() as u64;
        if let Some(store) = &self.store {
            store
                .append(state.conversation_id, event.clone(), ordering_hint)
                .await?;
        }
        tracing::debug!(
            conversation_id = state.conversation_id,
            event_id = %event.id,
            role = ?event.role,
            segments = event.segments.len(),
            "event appended"
        );
        state.log.push(event);
        state.appended += 1;
        Ok(())
    }
}

fn transition(phase: &mut TurnPhase, next: TurnPhase, iteration: u32) {
    tracing::debug!(from = ?*phase, to = ?next, iteration, "turn phase");
    *phase = next;
}

fn mark_status(event: &mut Event, status: ResponseStatus) {
    event
        .response_metadata
        .get_or_insert_with(ResponseMetadata::default)
        .status = Some(status);
}

fn drain_updates(
    updates: &mut mpsc::UnboundedReceiver<Event>,
    projector: &mut EnvelopeProjector,
    out: &mut Vec<Envelope>,
) {
    while let Ok(snapshot) = updates.try_recv() {
        projector.project_into(&snapshot, out);
    }
}

async fn flush_envelopes<S: EnvelopeSink>(sink: &mut S, pending: &mut Vec<Envelope>) -> Result<(), TurnError> {
    for envelope in pending.drain(..) {
        sink.send(envelope).await?;
    }
    Ok(())
}
