use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use turnloom::error::TurnError;
use turnloom::event::{
    Event, EventLog, ResponseMetadata, ResponseStatus, Role, Segment, StopReason,
};
use turnloom::orchestrator::{
    CancelHandle, CancelSignal, DeltaStream, EventStore, MemoryEventStore, ModelProvider,
    Orchestrator, OrchestratorConfig, ScriptedProvider, ToolContext, ToolExecutor,
    ToolInvocation, ToolOutcome, TurnGate, TurnOutcome, TurnPolicy, TurnStop,
};
use turnloom::protocol::{StreamDelta, ToolArgs};
use turnloom::stream::{Envelope, EnvelopeKind, ErrorCode};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn args(value: Value) -> ToolArgs {
    match value {
        Value::Object(map) => ToolArgs::Parsed(map),
        other => panic!("expected object, got {other}"),
    }
}

fn call(id: &str, name: &str, value: Value) -> Vec<StreamDelta> {
    vec![
        StreamDelta::ToolCallStart {
            id: id.to_string(),
            name: name.to_string(),
            server_label: None,
        },
        StreamDelta::ToolCallArgs {
            id: id.to_string(),
            args: args(value),
        },
    ]
}

fn stop(reason: StopReason) -> StreamDelta {
    StreamDelta::Metadata(ResponseMetadata {
        stop_reason: Some(reason),
        ..ResponseMetadata::default()
    })
}

/// Answers `get_weather` and `get_time`, fails everything else.
#[derive(Default)]
struct RecordingExecutor {
    seen: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

#[async_trait]
impl ToolExecutor for RecordingExecutor {
    async fn execute(&self, call: ToolInvocation, _context: &ToolContext) -> ToolOutcome {
        self.seen.lock().push(call.id.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match call.name.as_str() {
            "get_weather" => ToolOutcome::ok(call.id, json!({"city": call.args["city"], "temp_c": 21})),
            "get_time" => ToolOutcome::ok(call.id, json!({"time": "15:00"})),
            other => ToolOutcome::failed(call.id, format!("unknown tool {other}")),
        }
    }
}

fn orchestrator(provider: Arc<dyn ModelProvider>, executor: Arc<dyn ToolExecutor>) -> Orchestrator {
    Orchestrator::new(provider, executor, OrchestratorConfig::default())
}

fn user_log(text: &str) -> EventLog {
    let mut log = EventLog::new();
    log.push(Event::text(Role::System, "You are terse."));
    log.push(Event::text(Role::User, text));
    log
}

fn kinds(envelopes: &[Envelope]) -> Vec<&'static str> {
    envelopes.iter().map(Envelope::kind_name).collect()
}

fn completed_events(envelopes: &[Envelope]) -> Vec<Event> {
    envelopes
        .iter()
        .filter_map(|envelope| match &envelope.kind {
            EnvelopeKind::EventComplete { event } => Some(event.clone()),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tool-call loop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_two_parallel_calls_then_answer() {
    let mut first = vec![StreamDelta::Text("Let me check.".into())];
    first.extend(call("call_a", "get_weather", json!({"city": "Paris"})));
    first.extend(call("call_b", "get_time", json!({"tz": "Europe/Paris"})));
    first.push(stop(StopReason::ToolCalls));
    first.push(StreamDelta::Done);
    let second = vec![
        StreamDelta::Text("It is 21°C in Paris at 15:00.".into()),
        stop(StopReason::EndTurn),
        StreamDelta::Done,
    ];
    let provider = Arc::new(ScriptedProvider::new(vec![first, second]));
    let executor = Arc::new(RecordingExecutor::default());
    let orchestrator = orchestrator(provider.clone(), executor.clone());

    let mut log = user_log("Weather and time in Paris?");
    let mut envelopes: Vec<Envelope> = Vec::new();
    let outcome = orchestrator
        .run_turn("conv-1", &mut log, &mut envelopes, &mut CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(outcome.stop, TurnStop::Resolved);
    assert_eq!(outcome.iterations, 2);
    assert_eq!(outcome.appended, 3);
    assert_eq!(provider.turns_requested(), 2);
    assert_eq!(*executor.seen.lock(), vec!["call_a", "call_b"]);

    let roles: Vec<Role> = log.iter().map(|event| event.role).collect();
    assert_eq!(
        roles,
        vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );

    let assistant = &log.events()[2];
    assert_eq!(assistant.text_content(), "Let me check.");
    let calls: Vec<_> = assistant.tool_calls().map(|call| call.id.as_str()).collect();
    assert_eq!(calls, vec!["call_a", "call_b"]);
    assert_eq!(
        assistant.response_metadata.as_ref().and_then(|meta| meta.stop_reason),
        Some(StopReason::ToolCalls)
    );

    let results: Vec<_> = log.events()[3].tool_results().collect();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].id, "call_a");
    assert_eq!(results[0].output, json!({"city": "Paris", "temp_c": 21}));
    assert_eq!(results[1].id, "call_b");
    assert!(results.iter().all(|result| result.error.is_none()));

    assert_eq!(log.events()[4].text_content(), "It is 21°C in Paris at 15:00.");
    assert!(log.unresolved_tool_calls().is_empty());

    // The second request carries the results of the first.
    let second_request = &provider.seen_logs()[1];
    assert_eq!(second_request.len(), 4);
    assert_eq!(second_request.last().map(|event| event.role), Some(Role::Tool));

    let kinds = kinds(&envelopes);
    assert_eq!(kinds.first(), Some(&"event_start"));
    assert_eq!(kinds.last(), Some(&"complete"));
    assert_eq!(kinds.iter().filter(|kind| **kind == "complete").count(), 1);
    assert!(!kinds.contains(&"error"));
    let completed = completed_events(&envelopes);
    assert_eq!(completed.len(), 3);
    assert_eq!(completed, log.events()[2..].to_vec());
}

#[tokio::test]
async fn test_plain_answer_makes_one_request() {
    let provider = Arc::new(ScriptedProvider::new(vec![vec![
        StreamDelta::Text("Hello".into()),
        StreamDelta::Text(" there".into()),
        StreamDelta::Done,
    ]]));
    let orchestrator = orchestrator(provider.clone(), Arc::new(RecordingExecutor::default()));

    let mut log = user_log("hi");
    let mut envelopes: Vec<Envelope> = Vec::new();
    let outcome = orchestrator
        .run_turn("conv-plain", &mut log, &mut envelopes, &mut CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(outcome.stop, TurnStop::Resolved);
    assert_eq!(outcome.iterations, 1);
    assert_eq!(log.last().unwrap().text_content(), "Hello there");
    assert_eq!(kinds(&envelopes).last(), Some(&"complete"));
}

#[tokio::test]
async fn test_empty_model_response_is_discarded() {
    let provider = Arc::new(ScriptedProvider::new(vec![vec![StreamDelta::Done]]));
    let orchestrator = orchestrator(provider, Arc::new(RecordingExecutor::default()));

    let mut log = user_log("hi");
    let mut envelopes: Vec<Envelope> = Vec::new();
    let outcome = orchestrator
        .run_turn("conv-empty", &mut log, &mut envelopes, &mut CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(outcome.appended, 0);
    assert_eq!(log.len(), 2);
    assert_eq!(kinds(&envelopes), vec!["complete"]);
}

#[tokio::test]
async fn test_iteration_cap_stops_the_loop() {
    let provider = Arc::new(ScriptedProvider::from_fn(|turn| {
        Some(
            call(&format!("call_{turn}"), "get_time", json!({}))
                .into_iter()
                .chain([StreamDelta::Done])
                .map(Ok)
                .collect(),
        )
    }));
    let orchestrator = Orchestrator::new(
        provider.clone(),
        Arc::new(RecordingExecutor::default()),
        OrchestratorConfig {
            max_iterations: 2,
            ..OrchestratorConfig::default()
        },
    );

    let mut log = user_log("loop forever");
    let mut envelopes: Vec<Envelope> = Vec::new();
    let outcome = orchestrator
        .run_turn("conv-cap", &mut log, &mut envelopes, &mut CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(outcome.stop, TurnStop::IterationCap);
    assert_eq!(outcome.iterations, 2);
    assert_eq!(provider.turns_requested(), 2);
    // user + system, then (assistant, tool) twice
    assert_eq!(log.len(), 6);
    assert_eq!(kinds(&envelopes).last(), Some(&"complete"));
}

#[tokio::test]
async fn test_tool_failure_is_reported_to_the_model() {
    let mut first = call("call_x", "launch_rocket", json!({"target": "moon"}));
    first.push(StreamDelta::Done);
    let provider = Arc::new(ScriptedProvider::new(vec![
        first,
        vec![StreamDelta::Text("That tool is unavailable.".into()), StreamDelta::Done],
    ]));
    let orchestrator = orchestrator(provider.clone(), Arc::new(RecordingExecutor::default()));

    let mut log = user_log("launch");
    let mut envelopes: Vec<Envelope> = Vec::new();
    let outcome = orchestrator
        .run_turn("conv-fail", &mut log, &mut envelopes, &mut CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(outcome.stop, TurnStop::Resolved);
    let seen = provider.seen_logs();
    let result = seen[1].last().unwrap().tool_results().next().unwrap().clone();
    assert_eq!(result.id, "call_x");
    assert_eq!(result.error.as_deref(), Some("unknown tool launch_rocket"));
    assert!(!kinds(&envelopes).contains(&"error"));
}

#[tokio::test]
async fn test_unparseable_arguments_are_not_executed() {
    let first = vec![
        StreamDelta::ToolCallStart {
            id: "call_bad".into(),
            name: "get_weather".into(),
            server_label: None,
        },
        StreamDelta::ToolCallArgs {
            id: "call_bad".into(),
            args: ToolArgs::Failed {
                raw: "{\"city\":".into(),
                message: "EOF while parsing".into(),
            },
        },
        StreamDelta::Done,
    ];
    let provider = Arc::new(ScriptedProvider::new(vec![
        first,
        vec![StreamDelta::Text("Sorry.".into()), StreamDelta::Done],
    ]));
    let executor = Arc::new(RecordingExecutor::default());
    let orchestrator = orchestrator(provider, executor.clone());

    let mut log = user_log("weather?");
    let mut envelopes: Vec<Envelope> = Vec::new();
    orchestrator
        .run_turn("conv-bad-args", &mut log, &mut envelopes, &mut CancelSignal::never())
        .await
        .unwrap();

    assert!(executor.seen.lock().is_empty());
    let call = log.events()[2].tool_calls().next().unwrap().clone();
    assert_eq!(call.args_parse_error(), Some("EOF while parsing"));
    assert_eq!(call.raw_args(), Some("{\"city\":"));
    let result = log.events()[3].tool_results().next().unwrap().clone();
    assert!(result
        .error
        .as_deref()
        .is_some_and(|error| error.starts_with("invalid tool arguments")));
}

#[tokio::test(start_paused = true)]
async fn test_tool_timeout_becomes_error_result() {
    let mut first = call("call_slow", "get_weather", json!({"city": "Oslo"}));
    first.push(StreamDelta::Done);
    let provider = Arc::new(ScriptedProvider::new(vec![
        first,
        vec![StreamDelta::Text("Timed out.".into()), StreamDelta::Done],
    ]));
    let executor = Arc::new(RecordingExecutor {
        seen: Mutex::new(Vec::new()),
        delay: Some(Duration::from_secs(60)),
    });
    let orchestrator = Orchestrator::new(
        provider,
        executor,
        OrchestratorConfig {
            tool_timeout: Duration::from_secs(1),
            ..OrchestratorConfig::default()
        },
    );

    let mut log = user_log("weather in Oslo");
    let mut envelopes: Vec<Envelope> = Vec::new();
    let outcome = orchestrator
        .run_turn("conv-timeout", &mut log, &mut envelopes, &mut CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(outcome.stop, TurnStop::Resolved);
    let result = log.events()[3].tool_results().next().unwrap().clone();
    assert_eq!(result.error.as_deref(), Some("tool call timed out after 1000ms"));
}

// ---------------------------------------------------------------------------
// Failure and cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_provider_error_mid_stream() {
    let provider = Arc::new(ScriptedProvider::new(vec![vec![
        StreamDelta::Text("Partial answ".into()),
        StreamDelta::Error {
            status: 503,
            message: "overloaded".into(),
        },
        StreamDelta::Text("never seen".into()),
    ]]));
    let orchestrator = orchestrator(provider, Arc::new(RecordingExecutor::default()));

    let mut log = user_log("hi");
    let mut envelopes: Vec<Envelope> = Vec::new();
    let err = orchestrator
        .run_turn("conv-err", &mut log, &mut envelopes, &mut CancelSignal::never())
        .await
        .unwrap_err();

    assert!(matches!(err, TurnError::Provider { status: 503, .. }));
    let partial = log.last().unwrap();
    assert_eq!(partial.role, Role::Assistant);
    assert_eq!(partial.text_content(), "Partial answ");
    assert_eq!(
        partial.response_metadata.as_ref().and_then(|meta| meta.status),
        Some(ResponseStatus::Failed)
    );

    let kinds = kinds(&envelopes);
    assert_eq!(kinds.last(), Some(&"error"));
    assert!(!kinds.contains(&"complete"));
    match &envelopes.last().unwrap().kind {
        EnvelopeKind::Error { code, message } => {
            assert_eq!(*code, ErrorCode::ProviderUnavailable);
            assert_eq!(message, "overloaded");
        }
        other => panic!("unexpected envelope {other:?}"),
    }
}

#[tokio::test]
async fn test_provider_refusing_the_request() {
    let provider = Arc::new(ScriptedProvider::new(Vec::new()));
    let orchestrator = orchestrator(provider, Arc::new(RecordingExecutor::default()));

    let mut log = user_log("hi");
    let mut envelopes: Vec<Envelope> = Vec::new();
    let err = orchestrator
        .run_turn("conv-refused", &mut log, &mut envelopes, &mut CancelSignal::never())
        .await
        .unwrap_err();

    assert!(matches!(err, TurnError::Internal(_)));
    assert_eq!(log.len(), 2);
    assert_eq!(kinds(&envelopes), vec!["error"]);
}

/// Streams `text` and then never finishes.
struct HangingProvider {
    text: String,
}

#[async_trait]
impl ModelProvider for HangingProvider {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn stream_turn(&self, _log: &EventLog) -> Result<DeltaStream, TurnError> {
        let head = futures_util::stream::iter(vec![Ok(StreamDelta::Text(self.text.clone()))]);
        Ok(Box::pin(head.chain(futures_util::stream::pending())))
    }
}

#[tokio::test]
async fn test_cancel_keeps_partial_event() {
    let provider = Arc::new(HangingProvider {
        text: "Thinking about".into(),
    });
    let orchestrator = orchestrator(provider, Arc::new(RecordingExecutor::default()));
    let (handle, mut signal) = CancelHandle::new();

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.cancel();
    });

    let mut log = user_log("long question");
    let mut envelopes: Vec<Envelope> = Vec::new();
    let outcome = orchestrator
        .run_turn("conv-cancel", &mut log, &mut envelopes, &mut signal)
        .await
        .unwrap();
    canceller.await.unwrap();

    assert_eq!(outcome.stop, TurnStop::Cancelled);
    let partial = log.last().unwrap();
    assert_eq!(partial.text_content(), "Thinking about");
    assert_eq!(
        partial.response_metadata.as_ref().and_then(|meta| meta.status),
        Some(ResponseStatus::Incomplete)
    );
    let kinds = kinds(&envelopes);
    assert_eq!(&kinds[kinds.len() - 2..], &["event_complete", "complete"]);
}

/// Takes `connect` to hand back its stream.
struct SlowConnectProvider {
    connect: Duration,
}

#[async_trait]
impl ModelProvider for SlowConnectProvider {
    fn name(&self) -> &str {
        "slow-connect"
    }

    async fn stream_turn(&self, _log: &EventLog) -> Result<DeltaStream, TurnError> {
        tokio::time::sleep(self.connect).await;
        Ok(Box::pin(futures_util::stream::iter(vec![
            Ok(StreamDelta::Text("too late".into())),
            Ok(StreamDelta::Done),
        ])))
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_connecting_returns_promptly() {
    let provider = Arc::new(SlowConnectProvider {
        connect: Duration::from_secs(30),
    });
    let orchestrator = orchestrator(provider, Arc::new(RecordingExecutor::default()));
    let (handle, mut signal) = CancelHandle::new();

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();
    });

    let started = tokio::time::Instant::now();
    let mut log = user_log("slow provider");
    let mut envelopes: Vec<Envelope> = Vec::new();
    let outcome = orchestrator
        .run_turn("conv-connect", &mut log, &mut envelopes, &mut signal)
        .await
        .unwrap();
    canceller.await.unwrap();

    assert_eq!(outcome.stop, TurnStop::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(outcome.appended, 0);
    assert_eq!(log.len(), 2);
    assert_eq!(kinds(&envelopes), vec!["complete"]);
}

// ---------------------------------------------------------------------------
// Store and gate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_respond_persists_every_appended_event() {
    let mut first = call("call_a", "get_weather", json!({"city": "Rome"}));
    first.push(StreamDelta::Done);
    let provider = Arc::new(ScriptedProvider::new(vec![
        first,
        vec![StreamDelta::Text("Sunny in Rome.".into()), StreamDelta::Done],
        vec![StreamDelta::Text("You're welcome.".into()), StreamDelta::Done],
    ]));
    let store = Arc::new(MemoryEventStore::new());
    let orchestrator = orchestrator(provider.clone(), Arc::new(RecordingExecutor::default()))
        .with_store(store.clone());
    let gate = TurnGate::new();

    let mut envelopes: Vec<Envelope> = Vec::new();
    let (log, outcome) = orchestrator
        .respond(
            &gate,
            "conv-store",
            Event::text(Role::User, "Weather in Rome?"),
            TurnPolicy::Wait,
            &mut envelopes,
        )
        .await
        .unwrap();

    assert_eq!(outcome.appended, 4);
    let stored = store.list_by_conversation("conv-store").await.unwrap();
    assert_eq!(stored, log.events().to_vec());
    assert!(store.unresolved_tool_calls("conv-store").await.unwrap().is_empty());
    assert!(!gate.is_busy("conv-store"));

    // A follow-up turn starts from the stored history.
    let (log, _) = orchestrator
        .respond(
            &gate,
            "conv-store",
            Event::text(Role::User, "Thanks"),
            TurnPolicy::Wait,
            &mut envelopes,
        )
        .await
        .unwrap();
    assert_eq!(log.len(), 6);
    assert_eq!(provider.seen_logs()[2].len(), 5);
    assert_eq!(store.conversation_count(), 1);
}

/// Hangs mid-answer on the first request, answers every later one.
#[derive(Default)]
struct FirstTurnHangs {
    calls: std::sync::atomic::AtomicUsize,
}

#[async_trait]
impl ModelProvider for FirstTurnHangs {
    fn name(&self) -> &str {
        "first-turn-hangs"
    }

    async fn stream_turn(&self, _log: &EventLog) -> Result<DeltaStream, TurnError> {
        let call = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if call == 0 {
            let head = futures_util::stream::iter(vec![Ok(StreamDelta::Text("Thinking".into()))]);
            return Ok(Box::pin(head.chain(futures_util::stream::pending())));
        }
        Ok(Box::pin(futures_util::stream::iter(vec![
            Ok(StreamDelta::Text("Answer".into())),
            Ok(StreamDelta::Done),
        ])))
    }
}

async fn respond_after(
    orchestrator: &Orchestrator,
    gate: &TurnGate,
    delay: Duration,
    text: &str,
    policy: TurnPolicy,
) -> (Result<(EventLog, TurnOutcome), TurnError>, Vec<Envelope>) {
    tokio::time::sleep(delay).await;
    let mut envelopes = Vec::new();
    let result = orchestrator
        .respond(gate, "conv-race", Event::text(Role::User, text), policy, &mut envelopes)
        .await;
    (result, envelopes)
}

#[tokio::test(start_paused = true)]
async fn test_supersede_wins_over_queued_turn() {
    let provider = Arc::new(FirstTurnHangs::default());
    let store = Arc::new(MemoryEventStore::new());
    let orchestrator = orchestrator(provider.clone(), Arc::new(RecordingExecutor::default()))
        .with_store(store.clone());
    let gate = TurnGate::new();

    let (first, queued, newest) = tokio::join!(
        respond_after(&orchestrator, &gate, Duration::ZERO, "first", TurnPolicy::Wait),
        respond_after(&orchestrator, &gate, Duration::from_millis(20), "second", TurnPolicy::Wait),
        respond_after(&orchestrator, &gate, Duration::from_millis(40), "third", TurnPolicy::Supersede),
    );

    let (_, first_outcome) = first.0.unwrap();
    assert_eq!(first_outcome.stop, TurnStop::Cancelled);

    let (_, queued_outcome) = queued.0.unwrap();
    assert_eq!(queued_outcome.stop, TurnStop::Cancelled);
    assert_eq!(queued_outcome.appended, 0);
    assert_eq!(kinds(&queued.1), vec!["complete"]);

    let (log, newest_outcome) = newest.0.unwrap();
    assert_eq!(newest_outcome.stop, TurnStop::Resolved);
    assert_eq!(log.last().unwrap().text_content(), "Answer");

    assert_eq!(provider.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    let texts: Vec<String> = store
        .list_by_conversation("conv-race")
        .await
        .unwrap()
        .iter()
        .map(Event::text_content)
        .collect();
    assert_eq!(texts, vec!["first", "Thinking", "third", "Answer"]);
    assert_eq!(gate.tracked_conversations(), 0);
}

#[tokio::test]
async fn test_respond_without_store_is_rejected() {
    let provider = Arc::new(ScriptedProvider::new(Vec::new()));
    let orchestrator = orchestrator(provider, Arc::new(RecordingExecutor::default()));
    let mut envelopes: Vec<Envelope> = Vec::new();
    let err = orchestrator
        .respond(
            &TurnGate::new(),
            "conv",
            Event::text(Role::User, "hi"),
            TurnPolicy::Wait,
            &mut envelopes,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TurnError::Config(_)));
}

#[tokio::test]
async fn test_orphan_tool_result_does_not_stop_turn() {
    let mut log = user_log("hi");
    let mut orphan = Event::new(Role::Tool);
    orphan.segments.push(Segment::ToolResult(turnloom::event::ToolResultSegment {
        id: "nobody".into(),
        output: Value::Object(Map::new()),
        error: None,
    }));
    log.push(orphan);
    assert_eq!(log.orphan_tool_results().len(), 1);

    let provider = Arc::new(ScriptedProvider::new(vec![vec![
        StreamDelta::Text("ok".into()),
        StreamDelta::Done,
    ]]));
    let orchestrator = orchestrator(provider, Arc::new(RecordingExecutor::default()));
    let mut envelopes: Vec<Envelope> = Vec::new();
    let outcome = orchestrator
        .run_turn("conv-orphan", &mut log, &mut envelopes, &mut CancelSignal::never())
        .await
        .unwrap();
    assert_eq!(outcome.stop, TurnStop::Resolved);
}
