use crate::config::RobloxCloudConfig;
use crate::envelope::ApiOutcome;
use crate::error::Result;
use crate::logging::Logger;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Url};
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::time::sleep;

pub const OPEN_CLOUD_BASE: &str = "https://apis.roblox.com";
pub const THUMBNAILS_BASE: &str = "https://thumbnails.roblox.com";
const THUMBNAIL_POLL_DELAY: Duration = Duration::from_millis(2000);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Thin client over the Roblox Open Cloud REST surface plus the public
/// thumbnails host. Authenticated calls resolve the API key per call so a
/// partially-configured server still serves the public endpoints.
#[derive(Clone)]
pub struct OpenCloudClient {
    http: Client,
    cloud_base: Url,
    thumbnails_base: Url,
    api_key_override: Option<String>,
    poll_delay: Duration,
    logger: Logger,
}

impl OpenCloudClient {
    pub fn new(logger: Logger) -> Self {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("default reqwest client");
        Self {
            http,
            cloud_base: Url::parse(OPEN_CLOUD_BASE).expect("static base URL"),
            thumbnails_base: Url::parse(THUMBNAILS_BASE).expect("static thumbnails URL"),
            api_key_override: None,
            poll_delay: THUMBNAIL_POLL_DELAY,
            logger,
        }
    }

    /// Points both hosts somewhere else, e.g. a local stub.
    pub fn with_bases(mut self, cloud: &str, thumbnails: &str) -> Result<Self> {
        self.cloud_base = Url::parse(cloud).map_err(|e| {
            crate::error::CloudError::Payload(format!("invalid Open Cloud base URL: {e}"))
        })?;
        self.thumbnails_base = Url::parse(thumbnails).map_err(|e| {
            crate::error::CloudError::Payload(format!("invalid thumbnails base URL: {e}"))
        })?;
        Ok(self)
    }

    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key_override = Some(key.to_string());
        self
    }

    pub fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }

    fn api_key(&self) -> Result<String> {
        match &self.api_key_override {
            Some(key) => Ok(key.clone()),
            None => Ok(RobloxCloudConfig::from_env()?.api_key),
        }
    }

    fn url(base: &Url, segments: &[&str]) -> Url {
        let mut url = base.clone();
        url.path_segments_mut()
            .expect("base URL is absolute")
            .extend(segments);
        url
    }

    fn cloud_url(&self, segments: &[&str]) -> Url {
        Self::url(&self.cloud_base, segments)
    }

    async fn execute(&self, builder: RequestBuilder, endpoint: &str) -> Result<ApiOutcome> {
        let started = Instant::now();
        let response = builder.send().await?;
        let status = response.status();
        self.logger
            .api_response(endpoint, status.as_u16(), started.elapsed().as_millis());
        let text = response.text().await?;
        if status.is_success() {
            let body = if text.trim().is_empty() {
                Value::Null
            } else {
                serde_json::from_str(&text).unwrap_or(Value::String(text))
            };
            Ok(ApiOutcome::Success(body))
        } else {
            Ok(ApiOutcome::Failure {
                status: status.as_u16(),
                body: text,
            })
        }
    }

    async fn get_authed(&self, url: Url) -> Result<ApiOutcome> {
        let endpoint = url.path().to_string();
        let builder = self.http.get(url).header("x-api-key", self.api_key()?);
        self.execute(builder, &endpoint).await
    }

    pub async fn list_datastores(
        &self,
        universe_id: u64,
        prefix: Option<&str>,
        limit: Option<u32>,
        cursor: Option<&str>,
    ) -> Result<ApiOutcome> {
        let universe = universe_id.to_string();
        let mut url = self.cloud_url(&["datastores", "v1", "universes", &universe, "standard-datastores"]);
        append_query(&mut url, "prefix", prefix);
        append_query(&mut url, "limit", limit.map(|l| l.to_string()).as_deref());
        append_query(&mut url, "cursor", cursor);
        self.get_authed(url).await
    }

    pub async fn list_datastore_entries(
        &self,
        universe_id: u64,
        datastore_name: &str,
        prefix: Option<&str>,
        limit: Option<u32>,
        cursor: Option<&str>,
    ) -> Result<ApiOutcome> {
        let universe = universe_id.to_string();
        let mut url = self.cloud_url(&[
            "datastores",
            "v1",
            "universes",
            &universe,
            "standard-datastores",
            "datastore",
            "entries",
        ]);
        append_query(&mut url, "datastoreName", Some(datastore_name));
        append_query(&mut url, "prefix", prefix);
        append_query(&mut url, "limit", limit.map(|l| l.to_string()).as_deref());
        append_query(&mut url, "cursor", cursor);
        self.get_authed(url).await
    }

    fn datastore_entry_url(
        &self,
        universe_id: u64,
        datastore_name: &str,
        entry_key: &str,
        scope: Option<&str>,
    ) -> Url {
        let universe = universe_id.to_string();
        let mut url = self.cloud_url(&[
            "datastores",
            "v1",
            "universes",
            &universe,
            "standard-datastores",
            "datastore",
            "entries",
            "entry",
        ]);
        append_query(&mut url, "datastoreName", Some(datastore_name));
        append_query(&mut url, "entryKey", Some(entry_key));
        append_query(&mut url, "scope", scope);
        url
    }

    pub async fn get_datastore_entry(
        &self,
        universe_id: u64,
        datastore_name: &str,
        entry_key: &str,
        scope: Option<&str>,
    ) -> Result<ApiOutcome> {
        let url = self.datastore_entry_url(universe_id, datastore_name, entry_key, scope);
        self.get_authed(url).await
    }

    pub async fn set_datastore_entry(
        &self,
        universe_id: u64,
        datastore_name: &str,
        entry_key: &str,
        scope: Option<&str>,
        value: &Value,
    ) -> Result<ApiOutcome> {
        let url = self.datastore_entry_url(universe_id, datastore_name, entry_key, scope);
        let endpoint = url.path().to_string();
        let builder = self
            .http
            .post(url)
            .header("x-api-key", self.api_key()?)
            .json(value);
        self.execute(builder, &endpoint).await
    }

    pub async fn delete_datastore_entry(
        &self,
        universe_id: u64,
        datastore_name: &str,
        entry_key: &str,
        scope: Option<&str>,
    ) -> Result<ApiOutcome> {
        let url = self.datastore_entry_url(universe_id, datastore_name, entry_key, scope);
        let endpoint = url.path().to_string();
        let builder = self.http.delete(url).header("x-api-key", self.api_key()?);
        self.execute(builder, &endpoint).await
    }

    pub async fn publish_message(
        &self,
        universe_id: u64,
        topic: &str,
        message: &str,
    ) -> Result<ApiOutcome> {
        let universe = universe_id.to_string();
        let url = self.cloud_url(&["messaging-service", "v1", "universes", &universe, "topics", topic]);
        let endpoint = url.path().to_string();
        let builder = self
            .http
            .post(url)
            .header("x-api-key", self.api_key()?)
            .json(&serde_json::json!({ "message": message }));
        self.execute(builder, &endpoint).await
    }

    pub async fn get_asset(&self, asset_id: u64) -> Result<ApiOutcome> {
        let asset = asset_id.to_string();
        let url = self.cloud_url(&["assets", "v1", "assets", &asset]);
        self.get_authed(url).await
    }

    pub async fn get_asset_operation(&self, operation_id: &str) -> Result<ApiOutcome> {
        let url = self.cloud_url(&["assets", "v1", "operations", operation_id]);
        self.get_authed(url).await
    }

    /// Asset creation is a multipart upload: a JSON `request` part describing
    /// the asset and a binary `fileContent` part.
    pub async fn upload_asset(
        &self,
        request: &Value,
        bytes: Vec<u8>,
        file_name: &str,
        content_type: &str,
    ) -> Result<ApiOutcome> {
        let url = self.cloud_url(&["assets", "v1", "assets"]);
        let endpoint = url.path().to_string();
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(content_type)?;
        let form = Form::new()
            .text("request", request.to_string())
            .part("fileContent", part);
        let builder = self
            .http
            .post(url)
            .header("x-api-key", self.api_key()?)
            .multipart(form);
        self.execute(builder, &endpoint).await
    }

    fn instance_url(&self, universe_id: u64, place_id: u64, tail: &str) -> Url {
        let universe = universe_id.to_string();
        let place = place_id.to_string();
        self.cloud_url(&[
            "cloud",
            "v2",
            "universes",
            &universe,
            "places",
            &place,
            "instances",
            tail,
        ])
    }

    pub async fn get_instance(
        &self,
        universe_id: u64,
        place_id: u64,
        instance_id: &str,
    ) -> Result<ApiOutcome> {
        let url = self.instance_url(universe_id, place_id, instance_id);
        self.get_authed(url).await
    }

    pub async fn list_instance_children(
        &self,
        universe_id: u64,
        place_id: u64,
        instance_id: &str,
        page_token: Option<&str>,
    ) -> Result<ApiOutcome> {
        let tail = format!("{instance_id}:listChildren");
        let mut url = self.instance_url(universe_id, place_id, &tail);
        append_query(&mut url, "pageToken", page_token);
        self.get_authed(url).await
    }

    pub async fn update_instance(
        &self,
        universe_id: u64,
        place_id: u64,
        instance_id: &str,
        engine_instance: &Value,
    ) -> Result<ApiOutcome> {
        let url = self.instance_url(universe_id, place_id, instance_id);
        let endpoint = url.path().to_string();
        let builder = self
            .http
            .patch(url)
            .header("x-api-key", self.api_key()?)
            .json(&serde_json::json!({ "engineInstance": engine_instance }));
        self.execute(builder, &endpoint).await
    }

    pub async fn list_inventory(
        &self,
        user_id: u64,
        max_page_size: Option<u32>,
        filter: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<ApiOutcome> {
        let user = user_id.to_string();
        let mut url = self.cloud_url(&["cloud", "v2", "users", &user, "inventory-items"]);
        append_query(
            &mut url,
            "maxPageSize",
            max_page_size.map(|n| n.to_string()).as_deref(),
        );
        append_query(&mut url, "filter", filter);
        append_query(&mut url, "pageToken", page_token);
        self.get_authed(url).await
    }

    /// Fetches thumbnail records for a batch of assets. The endpoint is
    /// asynchronous upstream: when every record of a non-empty first reply is
    /// still `Pending`, one identical follow-up request is issued after the
    /// poll delay and its reply is returned as-is. Exactly one retry, ever.
    pub async fn get_asset_thumbnails(
        &self,
        asset_ids: &[u64],
        size: &str,
        format: &str,
    ) -> Result<ApiOutcome> {
        let first = self.fetch_thumbnails(asset_ids, size, format).await?;
        if !all_pending(&first) {
            return Ok(first);
        }
        self.logger.debug(
            "thumbnails",
            "All thumbnails pending; polling once more",
            None,
        );
        sleep(self.poll_delay).await;
        self.fetch_thumbnails(asset_ids, size, format).await
    }

    async fn fetch_thumbnails(
        &self,
        asset_ids: &[u64],
        size: &str,
        format: &str,
    ) -> Result<ApiOutcome> {
        let ids = asset_ids
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let mut url = Self::url(&self.thumbnails_base, &["v1", "assets"]);
        append_query(&mut url, "assetIds", Some(&ids));
        append_query(&mut url, "size", Some(size));
        append_query(&mut url, "format", Some(format));
        let endpoint = url.path().to_string();
        // Public endpoint: no auth header.
        self.execute(self.http.get(url), &endpoint).await
    }
}

fn append_query(url: &mut Url, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        url.query_pairs_mut().append_pair(key, value);
    }
}

fn all_pending(outcome: &ApiOutcome) -> bool {
    let ApiOutcome::Success(body) = outcome else {
        return false;
    };
    let Some(items) = body.get("data").and_then(Value::as_array) else {
        return false;
    };
    !items.is_empty()
        && items
            .iter()
            .all(|item| item.get("state").and_then(Value::as_str) == Some("Pending"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::HeaderMap;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

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

    fn stub_client(base: &str) -> OpenCloudClient {
        OpenCloudClient::new(Logger::default())
            .with_bases(base, base)
            .expect("stub bases")
            .with_api_key("test-key")
            .with_poll_delay(Duration::from_millis(10))
    }

    fn pending_item(id: u64) -> Value {
        json!({ "targetId": id, "state": "Pending", "imageUrl": "" })
    }

    fn completed_item(id: u64) -> Value {
        json!({ "targetId": id, "state": "Completed", "imageUrl": "https://cdn/1.png" })
    }

    #[derive(Clone)]
    struct ThumbState {
        hits: Arc<AtomicU32>,
        responses: Arc<Vec<Value>>,
    }

    fn thumb_router(state: ThumbState) -> Router {
        Router::new()
            .route(
                "/v1/assets",
                get(|State(state): State<ThumbState>| async move {
                    let n = state.hits.fetch_add(1, Ordering::SeqCst) as usize;
                    let idx = n.min(state.responses.len() - 1);
                    Json(state.responses[idx].clone())
                }),
            )
            .with_state(state)
    }

    #[tokio::test]
    async fn all_pending_first_response_triggers_exactly_one_retry() {
        let hits = Arc::new(AtomicU32::new(0));
        let state = ThumbState {
            hits: hits.clone(),
            responses: Arc::new(vec![
                json!({ "data": [pending_item(1), pending_item(2)] }),
                json!({ "data": [completed_item(1), completed_item(2)] }),
            ]),
        };
        let base = spawn_stub(thumb_router(state)).await;
        let outcome = stub_client(&base)
            .get_asset_thumbnails(&[1, 2], "420x420", "Png")
            .await
            .expect("outcome");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        match outcome {
            ApiOutcome::Success(body) => {
                assert_eq!(body["data"][0]["state"], "Completed");
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn second_response_is_returned_even_if_still_pending() {
        let hits = Arc::new(AtomicU32::new(0));
        let state = ThumbState {
            hits: hits.clone(),
            responses: Arc::new(vec![json!({ "data": [pending_item(1)] })]),
        };
        let base = spawn_stub(thumb_router(state)).await;
        let outcome = stub_client(&base)
            .get_asset_thumbnails(&[1], "420x420", "Png")
            .await
            .expect("outcome");
        // Two requests total; the still-pending second reply comes back as-is.
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        match outcome {
            ApiOutcome::Success(body) => assert_eq!(body["data"][0]["state"], "Pending"),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_result_set_is_not_retried() {
        let hits = Arc::new(AtomicU32::new(0));
        let state = ThumbState {
            hits: hits.clone(),
            responses: Arc::new(vec![json!({ "data": [] })]),
        };
        let base = spawn_stub(thumb_router(state)).await;
        stub_client(&base)
            .get_asset_thumbnails(&[9], "420x420", "Png")
            .await
            .expect("outcome");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn mixed_states_are_not_retried() {
        let hits = Arc::new(AtomicU32::new(0));
        let state = ThumbState {
            hits: hits.clone(),
            responses: Arc::new(vec![
                json!({ "data": [pending_item(1), completed_item(2)] }),
            ]),
        };
        let base = spawn_stub(thumb_router(state)).await;
        stub_client(&base)
            .get_asset_thumbnails(&[1, 2], "420x420", "Png")
            .await
            .expect("outcome");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn authed_calls_attach_api_key_header() {
        let router = Router::new().route(
            "/messaging-service/v1/universes/77/topics/events",
            post(|headers: HeaderMap| async move {
                match headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
                    Some("test-key") => (axum::http::StatusCode::OK, "{}"),
                    _ => (axum::http::StatusCode::UNAUTHORIZED, "missing key"),
                }
            }),
        );
        let base = spawn_stub(router).await;
        let outcome = stub_client(&base)
            .publish_message(77, "events", "ping")
            .await
            .expect("outcome");
        assert!(matches!(outcome, ApiOutcome::Success(_)));
    }

    #[tokio::test]
    async fn non_2xx_is_a_failure_outcome_not_an_error() {
        let router = Router::new().route(
            "/messaging-service/v1/universes/77/topics/events",
            post(|| async { (axum::http::StatusCode::FORBIDDEN, "forbidden") }),
        );
        let base = spawn_stub(router).await;
        let outcome = stub_client(&base)
            .publish_message(77, "events", "ping")
            .await
            .expect("transport ok");
        assert_eq!(
            outcome,
            ApiOutcome::Failure {
                status: 403,
                body: "forbidden".to_string()
            }
        );
    }

    #[test]
    fn missing_api_key_is_a_configuration_error() {
        temp_env::with_var_unset("ROBLOX_CLOUD_API_KEY", || {
            let client = OpenCloudClient::new(Logger::default());
            let err = client.api_key().unwrap_err();
            assert!(err.to_string().contains("ROBLOX_CLOUD_API_KEY"));
        });
    }

    #[test]
    fn url_segments_are_escaped() {
        let client = OpenCloudClient::new(Logger::default());
        let url = client.cloud_url(&["messaging-service", "v1", "topics", "has space/slash"]);
        assert!(url.as_str().ends_with("/topics/has%20space%2Fslash"));
    }
}
