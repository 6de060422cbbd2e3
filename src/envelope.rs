use rmcp::model::{CallToolResult, Content};
use serde::Serialize;
use serde_json::Value;

/// Normalized result of one outbound HTTP exchange. Non-2xx statuses are data
/// here, not errors: the caller gets the raw diagnostic back as tool output.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiOutcome {
    Success(Value),
    Failure { status: u16, body: String },
}

pub fn text_result(text: impl Into<String>) -> CallToolResult {
    CallToolResult::success(vec![Content::text(text.into())])
}

pub fn error_result(text: impl Into<String>) -> CallToolResult {
    CallToolResult::error(vec![Content::text(text.into())])
}

/// Wraps any serializable payload as a single JSON text block.
pub fn json_result<T: Serialize>(payload: &T) -> CallToolResult {
    match serde_json::to_string(payload) {
        Ok(body) => text_result(body),
        Err(err) => error_result(format!("Failed to serialize response: {err}")),
    }
}

/// Success envelope from the parsed body, or an error envelope carrying the
/// status code and raw response text.
pub fn outcome_result(context: &str, outcome: ApiOutcome) -> CallToolResult {
    match outcome {
        ApiOutcome::Success(body) => json_result(&body),
        ApiOutcome::Failure { status, body } => {
            error_result(format!("{context} failed with HTTP {status}: {body}"))
        }
    }
}

/// Same split as [`outcome_result`] but with a caller-supplied success line
/// for endpoints whose reply bodies are empty.
pub fn outcome_message(success: String, context: &str, outcome: ApiOutcome) -> CallToolResult {
    match outcome {
        ApiOutcome::Success(_) => text_result(success),
        ApiOutcome::Failure { status, body } => {
            error_result(format!("{context} failed with HTTP {status}: {body}"))
        }
    }
}

#[cfg(test)]
pub(crate) fn first_text(result: &CallToolResult) -> String {
    let value = serde_json::to_value(result).expect("serializable result");
    value["content"][0]["text"]
        .as_str()
        .expect("text content block")
        .to_string()
}
