use async_trait::async_trait;
use crate::config::OpenAiConfig;
use crate::error::{CloudError, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;

pub const DEFAULT_TEXT_MODEL: &str = "gpt-4o";
pub const DEFAULT_IMAGE_MODEL: &str = "gpt-image-1";
const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Default)]
pub struct TextRequest {
    pub prompt: String,
    pub model: Option<String>,
    pub instructions: Option<String>,
    pub temperature: Option<f64>,
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct ImageRequest {
    pub prompt: String,
    pub model: Option<String>,
    pub size: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AnalyzeRequest {
    pub image_url: String,
    pub prompt: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TextOutput {
    pub text: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImageOutput {
    /// Base64-encoded image payloads (or URLs when the API returns those).
    pub images: Vec<String>,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
}

/// Uniform session surface over the generative-AI provider. Tool handlers
/// depend on this trait so tests can substitute a canned session.
#[async_trait]
pub trait AiSession: Send + Sync {
    async fn generate_text(&self, request: TextRequest) -> Result<TextOutput>;
    async fn generate_image(&self, request: ImageRequest) -> Result<ImageOutput>;
    async fn analyze_image(&self, request: AnalyzeRequest) -> Result<TextOutput>;
}

/// Knobs for the OpenAI-backed session. Transient-error retry lives here, not
/// in the tool layer.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_millis(60_000),
            max_retries: 2,
        }
    }
}

#[derive(Debug)]
pub struct OpenAiSession {
    http: Client,
    base_url: String,
    max_retries: u32,
}

impl OpenAiSession {
    pub fn from_env() -> Result<Self> {
        Self::new(OpenAiConfig::from_env()?)
    }

    pub fn new(config: OpenAiConfig) -> Result<Self> {
        Self::with_options(config, SessionOptions::default())
    }

    pub fn with_options(config: OpenAiConfig, options: SessionOptions) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key)).map_err(|_| {
            CloudError::configuration("OPENAI_API_KEY", "Value contains invalid header characters.")
        })?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let http = Client::builder()
            .timeout(options.timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            http,
            base_url: options.base_url,
            max_retries: options.max_retries,
        })
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        let mut attempt = 0u32;
        loop {
            match self.http.post(&url).json(body).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response.json().await?);
                    }
                    let retriable = status.as_u16() == 429 || status.is_server_error();
                    let text = response.text().await.unwrap_or_default();
                    if retriable && attempt < self.max_retries {
                        attempt += 1;
                        tracing::debug!("Retrying {path} after HTTP {status} (attempt {attempt})");
                        sleep(RETRY_DELAY).await;
                        continue;
                    }
                    return Err(CloudError::HttpStatus {
                        status: status.as_u16(),
                        body: text,
                    });
                }
                Err(err) if (err.is_connect() || err.is_timeout()) && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::debug!("Retrying {path} after transport error (attempt {attempt})");
                    sleep(RETRY_DELAY).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

#[async_trait]
impl AiSession for OpenAiSession {
    async fn generate_text(&self, request: TextRequest) -> Result<TextOutput> {
        let model = request.model.unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string());
        let mut body = json!({
            "model": model,
            "input": request.prompt,
        });
        if let Some(instructions) = request.instructions {
            body["instructions"] = json!(instructions);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_output_tokens) = request.max_output_tokens {
            body["max_output_tokens"] = json!(max_output_tokens);
        }
        let response = self.post_json("/v1/responses", &body).await?;
        Ok(TextOutput {
            text: extract_response_text(&response)?,
            model: response_model(&response, &model),
            usage: response.get("usage").cloned(),
        })
    }

    async fn generate_image(&self, request: ImageRequest) -> Result<ImageOutput> {
        let model = request
            .model
            .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string());
        let mut body = json!({
            "model": model,
            "prompt": request.prompt,
        });
        if let Some(size) = request.size {
            body["size"] = json!(size);
        }
        let response = self.post_json("/v1/images/generations", &body).await?;
        let images = response
            .get("data")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        item.get("b64_json")
                            .or_else(|| item.get("url"))
                            .and_then(Value::as_str)
                            .map(str::to_string)
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        if images.is_empty() {
            return Err(CloudError::Payload(
                "image generation returned no image data".to_string(),
            ));
        }
        Ok(ImageOutput {
            images,
            model: response_model(&response, &model),
            usage: response.get("usage").cloned(),
        })
    }

    async fn analyze_image(&self, request: AnalyzeRequest) -> Result<TextOutput> {
        let model = request.model.unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string());
        let prompt = request
            .prompt
            .unwrap_or_else(|| "Describe this image.".to_string());
        let body = json!({
            "model": model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    { "type": "image_url", "image_url": { "url": request.image_url } }
                ]
            }]
        });
        let response = self.post_json("/v1/chat/completions", &body).await?;
        let text = response["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                CloudError::Payload("chat completion carried no message content".to_string())
            })?
            .to_string();
        Ok(TextOutput {
            text,
            model: response_model(&response, &model),
            usage: response.get("usage").cloned(),
        })
    }
}

fn response_model(response: &Value, requested: &str) -> String {
    response
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or(requested)
        .to_string()
}

/// Collects every output_text fragment of a Responses API reply, in order.
fn extract_response_text(response: &Value) -> Result<String> {
    let mut out = String::new();
    if let Some(items) = response.get("output").and_then(Value::as_array) {
        for item in items {
            if let Some(parts) = item.get("content").and_then(Value::as_array) {
                for part in parts {
                    if part.get("type").and_then(Value::as_str) == Some("output_text") {
                        if let Some(text) = part.get("text").and_then(Value::as_str) {
                            out.push_str(text);
                        }
                    }
                }
            }
        }
    }
    if out.is_empty() {
        return Err(CloudError::Payload(
            "response carried no output_text content".to_string(),
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn extracts_concatenated_output_text() {
        let response = json!({
            "output": [{
                "type": "message",
                "content": [
                    { "type": "output_text", "text": "Hello " },
                    { "type": "reasoning_summary", "text": "ignored" },
                    { "type": "output_text", "text": "world" }
                ]
            }]
        });
        assert_eq!(extract_response_text(&response).unwrap(), "Hello world");
    }

    #[test]
    fn missing_output_text_is_a_payload_error() {
        let response = json!({ "output": [] });
        assert!(matches!(
            extract_response_text(&response),
            Err(CloudError::Payload(_))
        ));
    }

    #[test]
    fn from_env_requires_api_key() {
        temp_env::with_var_unset("OPENAI_API_KEY", || {
            let err = OpenAiSession::from_env().unwrap_err();
            assert!(err.to_string().contains("OPENAI_API_KEY"));
        });
    }

    async fn spawn_stub(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub");
        let addr = listener.local_addr().expect("stub addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });
        format!("http://{addr}")
    }

    fn session_for(base_url: String) -> OpenAiSession {
        OpenAiSession::with_options(
            OpenAiConfig {
                api_key: "test-key".to_string(),
            },
            SessionOptions {
                base_url,
                timeout: Duration::from_secs(5),
                max_retries: 2,
            },
        )
        .expect("session")
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn retries_server_errors_then_succeeds() {
        let hits = Arc::new(AtomicU32::new(0));
        let hits_clone = hits.clone();
        let router = Router::new().route(
            "/v1/responses",
            post(move || {
                let hits = hits_clone.clone();
                async move {
                    if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(axum::http::StatusCode::INTERNAL_SERVER_ERROR)
                    } else {
                        Ok(Json(json!({
                            "model": "gpt-4o",
                            "output": [{
                                "type": "message",
                                "content": [{ "type": "output_text", "text": "ok" }]
                            }],
                            "usage": { "total_tokens": 3 }
                        })))
                    }
                }
            }),
        );
        let base = spawn_stub(router).await;
        let session = session_for(base);
        let output = session
            .generate_text(TextRequest {
                prompt: "hi".to_string(),
                ..Default::default()
            })
            .await
            .expect("text output");
        assert_eq!(output.text, "ok");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(logs_contain("Retrying /v1/responses"));
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let hits = Arc::new(AtomicU32::new(0));
        let hits_clone = hits.clone();
        let router = Router::new().route(
            "/v1/responses",
            post(move || {
                let hits = hits_clone.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    (axum::http::StatusCode::BAD_REQUEST, "bad prompt")
                }
            }),
        );
        let base = spawn_stub(router).await;
        let session = session_for(base);
        let err = session
            .generate_text(TextRequest {
                prompt: "hi".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        match err {
            CloudError::HttpStatus { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "bad prompt");
            }
            other => panic!("expected HttpStatus, got {other:?}"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
