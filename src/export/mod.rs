//! Conversation export: render an Event Log as a runnable replay script.

mod literal;

pub use literal::python_literal;

use std::fmt::Write as _;

use serde_json::Value;

use crate::error::TurnError;
use crate::event::{EventLog, Role};
use crate::protocol::anthropic::encoder::encode_messages_request;
use crate::protocol::openai_responses::encoder::encode_responses_request;
use crate::protocol::RequestOptions;

const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const HTTP_MAX_TOKENS: u64 = 4096;
const RESPONSES_MAX_OUTPUT_TOKENS: u64 = 8000;
const RESPONSES_REASONING_EFFORT: &str = "low";

/// Script flavour produced by [`export_script`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Content-block API through the Python SDK, one call per assistant turn.
    AnthropicPythonSdk,
    /// Content-block API through `requests`.
    AnthropicPythonHttp,
    /// Responses API through the Python SDK.
    OpenAiResponsesPythonSdk,
}

impl ExportFormat {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ExportFormat::AnthropicPythonSdk => "anthropic-python-sdk",
            ExportFormat::AnthropicPythonHttp => "anthropic-python-http",
            ExportFormat::OpenAiResponsesPythonSdk => "openai-python-sdk",
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "anthropic-python-sdk" => Ok(ExportFormat::AnthropicPythonSdk),
            "anthropic-python-http" => Ok(ExportFormat::AnthropicPythonHttp),
            "openai-python-sdk" | "openai-responses-python-sdk" => {
                Ok(ExportFormat::OpenAiResponsesPythonSdk)
            }
            other => Err(format!("unknown export format: {other}")),
        }
    }
}

/// Render `log` as a Python script that replays it against a provider.
///
/// # Errors
///
/// Returns [`TurnError::Translation`] if a request body cannot be serialized.
pub fn export_script(
    format: ExportFormat,
    log: &EventLog,
    options: &RequestOptions,
) -> Result<String, TurnError> {
    match format {
        ExportFormat::AnthropicPythonSdk => anthropic_sdk_script(log, options),
        ExportFormat::AnthropicPythonHttp => anthropic_http_script(log, options),
        ExportFormat::OpenAiResponsesPythonSdk => responses_sdk_script(log, options),
    }
}

fn to_value(body: impl serde::Serialize) -> Result<Value, TurnError> {
    serde_json::to_value(body).map_err(|err| TurnError::Translation(format!("export body: {err}")))
}

/// Replays are one-shot requests.
fn strip_stream(mut body: Value) -> Value {
    if let Some(map) = body.as_object_mut() {
        map.remove("stream");
    }
    body
}

/// The events before the last assistant Event, or the whole log if there is none.
fn prefix_before_last_assistant(log: &EventLog) -> EventLog {
    let end = log
        .events()
        .iter()
        .rposition(|event| event.role == Role::Assistant)
        .unwrap_or(log.len());
    EventLog::from_events(log.events()[..end].to_vec())
}

fn anthropic_sdk_script(log: &EventLog, options: &RequestOptions) -> Result<String, TurnError> {
    let mut out = String::with_capacity(1024);
    out.push_str("import os\nimport anthropic\n\n");
    out.push_str("client = anthropic.Anthropic(api_key=os.environ[\"ANTHROPIC_API_KEY\"])\n\n");
    out.push_str("def run():\n");

    let assistant_positions: Vec<usize> = log
        .events()
        .iter()
        .enumerate()
        .filter(|(_, event)| event.role == Role::Assistant)
        .map(|(index, _)| index)
        .collect();

    if assistant_positions.is_empty() {
        let body = strip_stream(to_value(encode_messages_request(log, options))?);
        out.push_str("    # Step 1: Send the recorded conversation\n");
        let _ = writeln!(
            out,
            "    response_1 = client.messages.create(**{})",
            python_literal(&body, 1)
        );
        out.push_str("    print(\"assistant 1:\", response_1)\n");
    }

    for (step, &position) in assistant_positions.iter().enumerate() {
        let step = step + 1;
        let prefix = EventLog::from_events(log.events()[..position].to_vec());
        let body = strip_stream(to_value(encode_messages_request(&prefix, options))?);
        let _ = writeln!(
            out,
            "    # Step {step}: Recreate assistant turn {}",
            log.events()[position].id
        );
        let _ = writeln!(
            out,
            "    response_{step} = client.messages.create(**{})",
            python_literal(&body, 1)
        );
        let _ = writeln!(out, "    print(\"assistant {step}:\", response_{step})");
    }

    out.push_str("\nif __name__ == \"__main__\":\n    run()\n");
    Ok(out)
}

fn anthropic_http_script(log: &EventLog, options: &RequestOptions) -> Result<String, TurnError> {
    let prefix = prefix_before_last_assistant(log);
    let options = RequestOptions {
        max_tokens: Some(options.max_tokens.unwrap_or(HTTP_MAX_TOKENS)),
        ..options.clone()
    };
    let body = strip_stream(to_value(encode_messages_request(&prefix, &options))?);

    let mut out = String::with_capacity(1024);
    out.push_str("import os\nimport json\nimport requests\n\n");
    out.push_str("ANTHROPIC_API_KEY = os.environ.get(\"ANTHROPIC_API_KEY\")\n\n");
    out.push_str("def run():\n");
    out.push_str("    if not ANTHROPIC_API_KEY:\n");
    out.push_str("        raise RuntimeError(\"Set the ANTHROPIC_API_KEY environment variable before running this script.\")\n\n");
    out.push_str("    headers = {\n");
    out.push_str("        \"Content-Type\": \"application/json\",\n");
    out.push_str("        \"x-api-key\": ANTHROPIC_API_KEY,\n");
    let _ = writeln!(out, "        \"anthropic-version\": \"{ANTHROPIC_VERSION}\",");
    out.push_str("    }\n\n");
    out.push_str("    # Replay the recorded assistant turn\n");
    let _ = writeln!(out, "    body = {}", python_literal(&body, 1));
    out.push_str("    response = requests.post(\n");
    let _ = writeln!(out, "        '{ANTHROPIC_MESSAGES_URL}',");
    out.push_str("        headers=headers,\n        json=body,\n    )\n");
    out.push_str("    response.raise_for_status()\n");
    out.push_str("    data = response.json()\n");
    out.push_str("    print(json.dumps(data, indent=2))\n");
    out.push_str("\nif __name__ == \"__main__\":\n    run()\n");
    Ok(out)
}

fn responses_sdk_script(log: &EventLog, options: &RequestOptions) -> Result<String, TurnError> {
    let options = RequestOptions {
        max_tokens: Some(options.max_tokens.unwrap_or(RESPONSES_MAX_OUTPUT_TOKENS)),
        reasoning_effort: Some(
            options
                .reasoning_effort
                .clone()
                .unwrap_or_else(|| RESPONSES_REASONING_EFFORT.to_string()),
        ),
        ..options.clone()
    };
    let payload = strip_stream(to_value(encode_responses_request(log, &options))?);

    let mut out = String::with_capacity(1024);
    out.push_str("import os\nimport json\nfrom openai import OpenAI\n\n");
    out.push_str("client = OpenAI(api_key=os.environ.get(\"OPENAI_API_KEY\"))\n\n");
    out.push_str("def run():\n");
    out.push_str("    # Replay the recorded assistant turn\n");
    let _ = writeln!(out, "    payload = {}", python_literal(&payload, 1));
    out.push_str("    response = client.responses.create(**payload)\n");
    out.push_str("    print(json.dumps(response.model_dump(), indent=2))\n");
    out.push_str("\nif __name__ == \"__main__\":\n    run()\n");
    Ok(out)
}
