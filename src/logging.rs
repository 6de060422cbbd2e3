use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::env;
use std::sync::Arc;

const VALUE_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

/// Threshold is re-read on every call so that changing LOG_LEVEL mid-process
/// takes effect on the next line.
fn threshold() -> LogLevel {
    env::var("LOG_LEVEL")
        .ok()
        .and_then(|v| LogLevel::parse(&v))
        .unwrap_or(LogLevel::Info)
}

/// Destination for finished log lines. Production writes to stderr; stdout
/// carries the MCP framing and must stay clean.
pub trait LogSink: Send + Sync {
    fn write_line(&self, line: String);
}

pub struct StderrSink;

impl LogSink for StderrSink {
    fn write_line(&self, line: String) {
        eprintln!("{line}");
    }
}

#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn LogSink>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(Arc::new(StderrSink))
    }
}

impl Logger {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    pub fn debug(&self, tag: &str, message: &str, data: Option<&Value>) {
        self.log(LogLevel::Debug, tag, message, data);
    }

    pub fn info(&self, tag: &str, message: &str, data: Option<&Value>) {
        self.log(LogLevel::Info, tag, message, data);
    }

    pub fn warn(&self, tag: &str, message: &str, data: Option<&Value>) {
        self.log(LogLevel::Warn, tag, message, data);
    }

    pub fn error(&self, tag: &str, message: &str, data: Option<&Value>) {
        self.log(LogLevel::Error, tag, message, data);
    }

    /// Logs an inbound tool invocation with oversized payload fields redacted.
    pub fn tool_call(&self, name: &str, params: Option<&Value>) {
        let redacted = params.map(redact_params);
        self.log(
            LogLevel::Info,
            "tool",
            &format!("Tool call: {name}"),
            redacted.as_ref(),
        );
    }

    pub fn api_response(&self, endpoint: &str, status: u16, duration_ms: u128) {
        self.log(
            LogLevel::Debug,
            "api",
            &format!("{endpoint} -> {status} ({duration_ms} ms)"),
            None,
        );
    }

    fn log(&self, level: LogLevel, tag: &str, message: &str, data: Option<&Value>) {
        if level < threshold() {
            return;
        }
        let ts = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut line = format!("[{ts}] [{}] [{tag}] {message}", level.label());
        if let Some(data) = data {
            line.push(' ');
            line.push_str(&data.to_string());
        }
        self.sink.write_line(line);
    }
}

/// Shallow pass over the argument object: base64 uploads are replaced by a
/// length placeholder, long datastore values are previewed.
fn redact_params(params: &Value) -> Value {
    let Value::Object(fields) = params else {
        return params.clone();
    };
    let mut out = Map::new();
    for (key, value) in fields {
        let replacement = match (key.as_str(), value) {
            ("fileContent", Value::String(content)) => {
                Value::String(format!("[base64 {} chars]", content.chars().count()))
            }
            ("value", Value::String(text)) if text.chars().count() > VALUE_PREVIEW_CHARS => {
                let mut preview: String = text.chars().take(VALUE_PREVIEW_CHARS).collect();
                preview.push_str("...");
                Value::String(preview)
            }
            _ => value.clone(),
        };
        out.insert(key.clone(), replacement);
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    struct CaptureSink(Mutex<Vec<String>>);

    impl LogSink for CaptureSink {
        fn write_line(&self, line: String) {
            self.0.lock().unwrap().push(line);
        }
    }

    fn capture_logger() -> (Logger, Arc<CaptureSink>) {
        let sink = Arc::new(CaptureSink(Mutex::new(Vec::new())));
        (Logger::new(sink.clone()), sink)
    }

    fn lines(sink: &CaptureSink) -> Vec<String> {
        sink.0.lock().unwrap().clone()
    }

    #[test]
    fn emits_iff_call_level_at_or_above_threshold() {
        let levels = ["debug", "info", "warn", "error"];
        for (threshold_idx, threshold_name) in levels.iter().enumerate() {
            temp_env::with_var("LOG_LEVEL", Some(*threshold_name), || {
                let (logger, sink) = capture_logger();
                logger.debug("t", "m", None);
                logger.info("t", "m", None);
                logger.warn("t", "m", None);
                logger.error("t", "m", None);
                assert_eq!(
                    lines(&sink).len(),
                    levels.len() - threshold_idx,
                    "threshold {threshold_name}"
                );
            });
        }
    }

    #[test]
    fn unset_or_unrecognized_threshold_behaves_as_info() {
        for level in [None, Some("verbose")] {
            temp_env::with_var("LOG_LEVEL", level, || {
                let (logger, sink) = capture_logger();
                logger.debug("t", "hidden", None);
                logger.info("t", "shown", None);
                let lines = lines(&sink);
                assert_eq!(lines.len(), 1);
                assert!(lines[0].contains("shown"));
            });
        }
    }

    #[test]
    fn line_format_carries_level_tag_and_data() {
        temp_env::with_var("LOG_LEVEL", Some("info"), || {
            let (logger, sink) = capture_logger();
            logger.warn("cloud", "slow response", Some(&json!({"ms": 1200})));
            let line = &lines(&sink)[0];
            assert!(line.contains("[WARN] [cloud] slow response"));
            assert!(line.ends_with(r#"{"ms":1200}"#));
        });
    }

    #[test]
    fn tool_call_replaces_file_content_with_length_placeholder() {
        temp_env::with_var("LOG_LEVEL", Some("info"), || {
            let (logger, sink) = capture_logger();
            let payload = "A".repeat(512);
            logger.tool_call("asset_upload", Some(&json!({"fileContent": payload})));
            let line = &lines(&sink)[0];
            assert!(!line.contains(&"A".repeat(512)));
            assert!(line.contains("[base64 512 chars]"));
        });
    }

    #[test]
    fn tool_call_keeps_short_value_fields_verbatim() {
        temp_env::with_var("LOG_LEVEL", Some("info"), || {
            let (logger, sink) = capture_logger();
            let short = "x".repeat(200);
            logger.tool_call("datastore_set_entry", Some(&json!({"value": short})));
            assert!(lines(&sink)[0].contains(&format!(r#""value":"{}""#, "x".repeat(200))));
        });
    }

    #[test]
    fn tool_call_truncates_long_value_fields() {
        temp_env::with_var("LOG_LEVEL", Some("info"), || {
            let (logger, sink) = capture_logger();
            let long = "y".repeat(201);
            logger.tool_call("datastore_set_entry", Some(&json!({"value": long})));
            let line = &lines(&sink)[0];
            let expected = format!("{}...", "y".repeat(200));
            assert!(line.contains(&expected));
            assert!(!line.contains(&"y".repeat(201)));
        });
    }

    #[test]
    fn api_response_is_debug_only() {
        temp_env::with_var("LOG_LEVEL", Some("info"), || {
            let (logger, sink) = capture_logger();
            logger.api_response("/v1/assets", 200, 35);
            assert!(lines(&sink).is_empty());
        });
        temp_env::with_var("LOG_LEVEL", Some("debug"), || {
            let (logger, sink) = capture_logger();
            logger.api_response("/v1/assets", 200, 35);
            assert!(lines(&sink)[0].contains("/v1/assets -> 200 (35 ms)"));
        });
    }
}
