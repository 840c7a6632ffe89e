use std::io::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use turnloom::builder::{BuilderConfig, EventBuilder};
use turnloom::config::{load_config, AppConfig, ProviderConfig};
use turnloom::event::{Event, EventLog, Role};
use turnloom::export::{export_script, ExportFormat};
use turnloom::observability::init_tracing;
use turnloom::orchestrator::{
    EventStore, MemoryEventStore, Orchestrator, ToolContext, ToolExecutor, ToolInvocation,
    ToolOutcome, TurnGate, TurnPolicy,
};
use turnloom::protocol::{stream_decoder, ProviderKind};
use turnloom::stream::{encode_envelope, Envelope, SseParser};
use turnloom::transport::HttpModelProvider;

#[derive(Debug, Parser)]
#[command(name = "turnloom", version, about = "Multi-provider chat turns with tool calling")]
struct Cli {
    /// Path to the YAML configuration.
    #[arg(long, short, global = true, default_value = "config.yaml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send one user message and stream the envelopes to stdout.
    Request {
        /// Provider name from the config; the default provider when omitted.
        #[arg(long, short)]
        provider: Option<String>,
        #[arg(long)]
        system: Option<String>,
        #[arg(long, default_value = "cli")]
        conversation: String,
        message: String,
    },
    /// Render a saved Event Log (JSON array) as a replay script.
    Export {
        #[arg(long, short, default_value = "anthropic-python-sdk")]
        format: ExportFormat,
        #[arg(long, short)]
        provider: Option<String>,
        log: String,
    },
    /// Assemble a captured provider SSE stream into a single Event.
    Replay {
        #[arg(long, short)]
        kind: ProviderKind,
        capture: String,
    },
    /// Validate the configuration and print a summary.
    Check,
}

/// Config-declared tools have no local implementation; the model is told so.
struct UnimplementedTools;

#[async_trait]
impl ToolExecutor for UnimplementedTools {
    async fn execute(&self, call: ToolInvocation, _context: &ToolContext) -> ToolOutcome {
        let message = format!("tool '{}' is not available in this client", call.name);
        ToolOutcome::failed(call.id, message)
    }
}

fn main() {
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Failed to initialize Tokio runtime: {e}");
            std::process::exit(1);
        });

    let result = runtime.block_on(run(cli));
    if let Err(message) = result {
        eprintln!("{message}");
        std::process::exit(1);
    }
}

fn load_or_exit(path: &str) -> AppConfig {
    let config = load_config(path).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        eprintln!("Please copy 'config.example.yaml' to 'config.yaml' and modify as needed.");
        std::process::exit(1);
    });
    init_tracing(&config.features.log_level, config.features.log_json);
    config
}

fn select_provider<'a>(config: &'a AppConfig, name: Option<&str>) -> Result<&'a ProviderConfig, String> {
    config
        .provider(name)
        .ok_or_else(|| format!("Unknown provider '{}'", name.unwrap_or_default()))
}

async fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Command::Request {
            provider,
            system,
            conversation,
            message,
        } => {
            let config = load_or_exit(&cli.config);
            request(&config, provider.as_deref(), system, &conversation, message).await
        }
        Command::Export {
            format,
            provider,
            log,
        } => {
            let config = load_or_exit(&cli.config);
            let provider = select_provider(&config, provider.as_deref())?;
            let contents = tokio::fs::read_to_string(&log)
                .await
                .map_err(|e| format!("Failed to read {log}: {e}"))?;
            let log: EventLog =
                serde_json::from_str(&contents).map_err(|e| format!("Invalid event log: {e}"))?;
            let script = export_script(format, &log, &config.request_options(provider))
                .map_err(|e| e.to_string())?;
            print!("{script}");
            Ok(())
        }
        Command::Replay { kind, capture } => {
            let contents = tokio::fs::read_to_string(&capture)
                .await
                .map_err(|e| format!("Failed to read {capture}: {e}"))?;
            let event = replay_capture(kind, &contents).ok_or("capture produced no event")?;
            let json = serde_json::to_string_pretty(&event).map_err(|e| e.to_string())?;
            println!("{json}");
            Ok(())
        }
        Command::Check => {
            let config = load_config(&cli.config).map_err(|e| e.to_string())?;
            println!("configuration OK");
            for provider in &config.providers {
                let default = if provider.is_default { " (default)" } else { "" };
                println!("  provider {} [{}] model={}{default}", provider.name, provider.kind, provider.model);
            }
            for server in &config.remote_servers {
                println!("  remote server {} -> {}", server.label, server.url);
            }
            println!("  tools: {}", config.tools.len());
            Ok(())
        }
    }
}

async fn request(
    config: &AppConfig,
    provider: Option<&str>,
    system: Option<String>,
    conversation: &str,
    message: String,
) -> Result<(), String> {
    let provider_config = select_provider(config, provider)?;
    let provider = HttpModelProvider::new(provider_config, config.request_options(provider_config))
        .map_err(|e| e.to_string())?;
    let store = Arc::new(MemoryEventStore::new());
    if let Some(system) = system {
        store
            .append(conversation, Event::text(Role::System, system), 0)
            .await
            .map_err(|e| e.to_string())?;
    }
    let orchestrator = Orchestrator::new(
        Arc::new(provider),
        Arc::new(UnimplementedTools),
        config.orchestrator_config(),
    )
    .with_store(store);

    let (tx, mut rx) = mpsc::channel::<Envelope>(64);
    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(envelope) = rx.recv().await {
            match encode_envelope(&envelope) {
                Ok(frame) => {
                    let _ = stdout.write_all(frame.as_bytes());
                    let _ = stdout.flush();
                }
                Err(err) => tracing::warn!(error = %err, "failed to encode envelope"),
            }
        }
    });

    let gate = TurnGate::new();
    let mut sink = tx;
    let result = orchestrator
        .respond(
            &gate,
            conversation,
            Event::text(Role::User, message),
            TurnPolicy::Wait,
            &mut sink,
        )
        .await;
    drop(sink);
    let _ = printer.await;

    let (_, outcome) = result.map_err(|e| e.to_string())?;
    tracing::info!(
        stop = outcome.stop.as_str(),
        iterations = outcome.iterations,
        appended = outcome.appended,
        "request finished"
    );
    Ok(())
}

fn replay_capture(kind: ProviderKind, contents: &str) -> Option<Event> {
    let mut parser = SseParser::new();
    let mut frames = Vec::new();
    parser.feed_into(contents, &mut frames);
    parser.finish_into(&mut frames);

    let mut decoder = stream_decoder(kind);
    let mut deltas = Vec::new();
    for frame in &frames {
        decoder.decode_frame(frame, &mut deltas);
    }
    decoder.finish(&mut deltas);

    let mut builder = EventBuilder::new(Role::Assistant, BuilderConfig::default());
    for delta in deltas {
        builder.apply(delta);
    }
    builder.finalize()
}
