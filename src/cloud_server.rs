use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use crate::config;
use crate::envelope::{error_result, json_result, outcome_message, outcome_result};
use crate::error::CloudError;
use crate::logging::Logger;
use crate::open_cloud::OpenCloudClient;
use crate::openai::{AiSession, AnalyzeRequest, ImageRequest, OpenAiSession, TextRequest};
use rmcp::{
    handler::server::tool::Parameters,
    model::{CallToolResult, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ErrorData, ServerHandler,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::future::Future;
use std::sync::Arc;

const DEFAULT_THUMBNAIL_SIZE: &str = "420x420";
const DEFAULT_THUMBNAIL_FORMAT: &str = "Png";

/// MCP server mediating between tool callers and the OpenAI / Roblox Open
/// Cloud APIs. Handlers hold no mutable state; concurrent calls interleave
/// freely on the runtime.
#[derive(Clone)]
pub struct CloudServer {
    ai: Option<Arc<dyn AiSession>>,
    cloud: OpenCloudClient,
    logger: Logger,
    tool_router: rmcp::handler::server::tool::ToolRouter<Self>,
}

#[tool_handler]
impl ServerHandler for CloudServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Use the generate_* tools for OpenAI text and image work, the datastore_*, \
                 messaging_*, asset_*, instance_*, inventory_* and thumbnail_* tools for \
                 Roblox Open Cloud operations, and server_info to inspect the catalog."
                    .to_string(),
            ),
        }
    }
}

fn json_params<T: Serialize>(args: &T) -> JsonValue {
    serde_json::to_value(args).unwrap_or(JsonValue::Null)
}

/// Non-2xx replies from the AI provider go back to the caller as tool output;
/// configuration and connectivity problems are execution failures.
fn shape_ai_error(context: &str, err: CloudError) -> Result<CallToolResult, ErrorData> {
    match err {
        CloudError::HttpStatus { status, body } => Ok(error_result(format!(
            "{context} failed with HTTP {status}: {body}"
        ))),
        other => Err(other.into()),
    }
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema, Clone)]
#[serde(rename_all = "camelCase")]
struct GenerateTextArgs {
    #[schemars(description = "Prompt forwarded to the text model")]
    prompt: String,
    #[serde(default)]
    #[schemars(description = "Model override; defaults to the configured text model")]
    model: Option<String>,
    #[serde(default)]
    #[schemars(description = "System-style instructions applied to the generation")]
    instructions: Option<String>,
    #[serde(default)]
    #[schemars(description = "Sampling temperature between 0 and 2")]
    #[schemars(range(min = 0.0, max = 2.0))]
    temperature: Option<f64>,
    #[serde(default)]
    #[schemars(description = "Upper bound on generated output tokens")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema, Clone)]
#[serde(rename_all = "camelCase")]
struct GenerateImageArgs {
    #[schemars(description = "Prompt describing the image to generate")]
    prompt: String,
    #[serde(default)]
    #[schemars(description = "Model override; defaults to the configured image model")]
    model: Option<String>,
    #[serde(default)]
    #[schemars(description = "Image size such as 1024x1024")]
    size: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema, Clone)]
#[serde(rename_all = "camelCase")]
struct AnalyzeImageArgs {
    #[schemars(description = "URL of the image to analyze")]
    image_url: String,
    #[serde(default)]
    #[schemars(description = "Question to ask about the image; defaults to a description request")]
    prompt: Option<String>,
    #[serde(default)]
    #[schemars(description = "Model override for the vision request")]
    model: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema, Clone)]
#[serde(rename_all = "camelCase")]
struct AssetImagePipelineArgs {
    #[schemars(description = "Prompt describing the image to generate and upload")]
    prompt: String,
    #[schemars(description = "Display name for the uploaded asset")]
    display_name: String,
    #[serde(default)]
    #[schemars(description = "Description attached to the uploaded asset")]
    description: Option<String>,
    #[serde(default)]
    #[schemars(description = "Image size such as 1024x1024")]
    size: Option<String>,
    #[serde(default)]
    #[schemars(description = "Model override for the image generation step")]
    model: Option<String>,
    #[serde(default)]
    #[schemars(description = "Creator user ID; defaults from the environment")]
    creator_id: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema, Clone)]
#[serde(rename_all = "camelCase")]
struct GenerateImageLocalArgs {
    #[schemars(description = "Prompt describing the image to generate")]
    prompt: String,
    #[serde(default)]
    #[schemars(description = "Output file name; defaults to a timestamped PNG")]
    file_name: Option<String>,
    #[serde(default)]
    #[schemars(description = "Image size such as 1024x1024")]
    size: Option<String>,
    #[serde(default)]
    #[schemars(description = "Model override for the image generation step")]
    model: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema, Clone)]
#[serde(rename_all = "camelCase")]
struct DatastoreListStoresArgs {
    #[serde(default)]
    #[schemars(description = "Universe ID; defaults from the environment")]
    universe_id: Option<u64>,
    #[serde(default)]
    #[schemars(description = "Return only datastores whose names start with this prefix")]
    prefix: Option<String>,
    #[serde(default)]
    #[schemars(description = "Maximum number of datastores to return")]
    limit: Option<u32>,
    #[serde(default)]
    #[schemars(description = "Pagination cursor from a previous page")]
    cursor: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema, Clone)]
#[serde(rename_all = "camelCase")]
struct DatastoreListEntriesArgs {
    #[schemars(description = "Name of the datastore to enumerate")]
    datastore_name: String,
    #[serde(default)]
    #[schemars(description = "Universe ID; defaults from the environment")]
    universe_id: Option<u64>,
    #[serde(default)]
    #[schemars(description = "Return only keys starting with this prefix")]
    prefix: Option<String>,
    #[serde(default)]
    #[schemars(description = "Maximum number of keys to return")]
    limit: Option<u32>,
    #[serde(default)]
    #[schemars(description = "Pagination cursor from a previous page")]
    cursor: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema, Clone)]
#[serde(rename_all = "camelCase")]
struct DatastoreEntryArgs {
    #[schemars(description = "Name of the datastore holding the entry")]
    datastore_name: String,
    #[schemars(description = "Key of the entry")]
    entry_key: String,
    #[serde(default)]
    #[schemars(description = "Universe ID; defaults from the environment")]
    universe_id: Option<u64>,
    #[serde(default)]
    #[schemars(description = "Datastore scope; defaults to global")]
    scope: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema, Clone)]
#[serde(rename_all = "camelCase")]
struct DatastoreSetEntryArgs {
    #[schemars(description = "Name of the datastore holding the entry")]
    datastore_name: String,
    #[schemars(description = "Key of the entry")]
    entry_key: String,
    #[schemars(description = "Value to store, as a JSON document or plain string")]
    value: String,
    #[serde(default)]
    #[schemars(description = "Universe ID; defaults from the environment")]
    universe_id: Option<u64>,
    #[serde(default)]
    #[schemars(description = "Datastore scope; defaults to global")]
    scope: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema, Clone)]
#[serde(rename_all = "camelCase")]
struct MessagingPublishArgs {
    #[schemars(description = "MessagingService topic to publish on")]
    topic: String,
    #[schemars(description = "Message payload delivered to live game servers")]
    message: String,
    #[serde(default)]
    #[schemars(description = "Universe ID; defaults from the environment")]
    universe_id: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema, Clone)]
#[serde(rename_all = "camelCase")]
struct AssetGetArgs {
    #[schemars(description = "Asset ID to look up")]
    asset_id: u64,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema, Clone)]
#[serde(rename_all = "camelCase")]
struct AssetUploadArgs {
    #[schemars(description = "Base64-encoded file content to upload")]
    file_content: String,
    #[schemars(description = "File name including extension, e.g. decal.png")]
    file_name: String,
    #[schemars(description = "Display name for the new asset")]
    display_name: String,
    #[serde(default)]
    #[schemars(description = "Description attached to the new asset")]
    description: Option<String>,
    #[serde(default)]
    #[schemars(description = "Open Cloud asset type; defaults to Decal")]
    asset_type: Option<String>,
    #[serde(default)]
    #[schemars(description = "MIME type of the file content; defaults to image/png")]
    content_type: Option<String>,
    #[serde(default)]
    #[schemars(description = "Creator user ID; defaults from the environment")]
    creator_id: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema, Clone)]
#[serde(rename_all = "camelCase")]
struct AssetOperationArgs {
    #[schemars(description = "Operation ID returned by an asset upload")]
    operation_id: String,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema, Clone)]
#[serde(rename_all = "camelCase")]
struct InstanceGetArgs {
    #[serde(default)]
    #[schemars(description = "Engine instance ID; defaults to the place root")]
    instance_id: Option<String>,
    #[serde(default)]
    #[schemars(description = "Universe ID; defaults from the environment")]
    universe_id: Option<u64>,
    #[serde(default)]
    #[schemars(description = "Place ID; defaults from the environment")]
    place_id: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema, Clone)]
#[serde(rename_all = "camelCase")]
struct InstanceListChildrenArgs {
    #[serde(default)]
    #[schemars(description = "Engine instance ID; defaults to the place root")]
    instance_id: Option<String>,
    #[serde(default)]
    #[schemars(description = "Universe ID; defaults from the environment")]
    universe_id: Option<u64>,
    #[serde(default)]
    #[schemars(description = "Place ID; defaults from the environment")]
    place_id: Option<u64>,
    #[serde(default)]
    #[schemars(description = "Pagination token from a previous page")]
    page_token: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema, Clone)]
#[serde(rename_all = "camelCase")]
struct InstanceUpdateArgs {
    #[schemars(description = "Engine instance ID to update")]
    instance_id: String,
    #[schemars(description = "Engine instance fields to apply, e.g. Name or Details")]
    engine_instance: JsonValue,
    #[serde(default)]
    #[schemars(description = "Universe ID; defaults from the environment")]
    universe_id: Option<u64>,
    #[serde(default)]
    #[schemars(description = "Place ID; defaults from the environment")]
    place_id: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema, Clone)]
#[serde(rename_all = "camelCase")]
struct InventoryListArgs {
    #[serde(default)]
    #[schemars(description = "User ID whose inventory to list; defaults from the environment")]
    user_id: Option<u64>,
    #[serde(default)]
    #[schemars(description = "Maximum number of items per page")]
    max_page_size: Option<u32>,
    #[serde(default)]
    #[schemars(description = "Open Cloud filter expression, e.g. inventoryItemAssetTypes=DECAL")]
    filter: Option<String>,
    #[serde(default)]
    #[schemars(description = "Pagination token from a previous page")]
    page_token: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema, Clone)]
#[serde(rename_all = "camelCase")]
struct ThumbnailGetAssetsArgs {
    #[schemars(description = "Asset IDs to fetch thumbnails for")]
    asset_ids: Vec<u64>,
    #[serde(default)]
    #[schemars(description = "Thumbnail size such as 420x420")]
    size: Option<String>,
    #[serde(default)]
    #[schemars(description = "Image format, Png or Jpeg")]
    format: Option<String>,
}

impl CloudServer {
    pub fn new(cloud: OpenCloudClient, logger: Logger) -> Self {
        Self::with_session(None, cloud, logger)
    }

    pub fn with_session(
        ai: Option<Arc<dyn AiSession>>,
        cloud: OpenCloudClient,
        logger: Logger,
    ) -> Self {
        Self {
            ai,
            cloud,
            logger,
            tool_router: Self::tool_router(),
        }
    }

    /// One registration call per tool family; names must stay unique across
    /// the composed catalog.
    pub fn tool_router() -> rmcp::handler::server::tool::ToolRouter<Self> {
        Self::ai_tools_router()
            + Self::pipeline_tools_router()
            + Self::datastore_tools_router()
            + Self::messaging_tools_router()
            + Self::asset_tools_router()
            + Self::instance_tools_router()
            + Self::inventory_tools_router()
            + Self::thumbnail_tools_router()
            + Self::introspection_tools_router()
    }

    pub fn tool_count(&self) -> usize {
        self.tool_router.list_all().len()
    }

    fn ai_session(&self) -> Result<Arc<dyn AiSession>, ErrorData> {
        match &self.ai {
            Some(session) => Ok(session.clone()),
            None => Ok(Arc::new(OpenAiSession::from_env()?)),
        }
    }

    async fn run_image_generation(
        &self,
        prompt: String,
        model: Option<String>,
        size: Option<String>,
    ) -> Result<Result<(crate::openai::ImageOutput, Vec<u8>), CallToolResult>, ErrorData> {
        let session = self.ai_session()?;
        let output = match session
            .generate_image(ImageRequest {
                prompt,
                model,
                size,
            })
            .await
        {
            Ok(output) => output,
            Err(err) => return shape_ai_error("Image generation", err).map(Err),
        };
        match BASE64.decode(output.images[0].as_bytes()) {
            Ok(bytes) => Ok(Ok((output, bytes))),
            Err(_) => Ok(Err(error_result(
                "Image generation returned a URL payload; base64 content is required here",
            ))),
        }
    }
}

#[tool_router(router = ai_tools_router)]
impl CloudServer {
    #[tool(
        description = "Generates text with the configured OpenAI model. Supports instructions, temperature, and an output token cap."
    )]
    async fn generate_text(
        &self,
        Parameters(args): Parameters<GenerateTextArgs>,
    ) -> Result<CallToolResult, ErrorData> {
        self.logger.tool_call("generate_text", Some(&json_params(&args)));
        let session = self.ai_session()?;
        let request = TextRequest {
            prompt: args.prompt,
            model: args.model,
            instructions: args.instructions,
            temperature: args.temperature,
            max_output_tokens: args.max_output_tokens,
        };
        match session.generate_text(request).await {
            Ok(output) => Ok(json_result(&output)),
            Err(err) => shape_ai_error("Text generation", err),
        }
    }

    #[tool(
        description = "Generates an image with the configured OpenAI image model and returns it base64-encoded."
    )]
    async fn generate_image(
        &self,
        Parameters(args): Parameters<GenerateImageArgs>,
    ) -> Result<CallToolResult, ErrorData> {
        self.logger
            .tool_call("generate_image", Some(&json_params(&args)));
        let session = self.ai_session()?;
        let request = ImageRequest {
            prompt: args.prompt,
            model: args.model,
            size: args.size,
        };
        match session.generate_image(request).await {
            Ok(output) => Ok(json_result(&output)),
            Err(err) => shape_ai_error("Image generation", err),
        }
    }

    #[tool(description = "Analyzes an image URL with a vision model and returns the description.")]
    async fn analyze_image(
        &self,
        Parameters(args): Parameters<AnalyzeImageArgs>,
    ) -> Result<CallToolResult, ErrorData> {
        self.logger
            .tool_call("analyze_image", Some(&json_params(&args)));
        let session = self.ai_session()?;
        let request = AnalyzeRequest {
            image_url: args.image_url,
            prompt: args.prompt,
            model: args.model,
        };
        match session.analyze_image(request).await {
            Ok(output) => Ok(json_result(&output)),
            Err(err) => shape_ai_error("Image analysis", err),
        }
    }
}

#[tool_router(router = pipeline_tools_router)]
impl CloudServer {
    #[tool(
        description = "Generates an image from a prompt and uploads it to Roblox as a new asset in one step."
    )]
    async fn asset_image_pipeline(
        &self,
        Parameters(args): Parameters<AssetImagePipelineArgs>,
    ) -> Result<CallToolResult, ErrorData> {
        self.logger
            .tool_call("asset_image_pipeline", Some(&json_params(&args)));
        let (output, bytes) = match self
            .run_image_generation(args.prompt, args.model, args.size)
            .await?
        {
            Ok(generated) => generated,
            Err(result) => return Ok(result),
        };
        let creator_id = args.creator_id.unwrap_or_else(config::default_creator_id);
        let request = json!({
            "assetType": "Decal",
            "displayName": args.display_name,
            "description": args.description.unwrap_or_default(),
            "creationContext": { "creator": { "userId": creator_id } }
        });
        let outcome = self
            .cloud
            .upload_asset(&request, bytes, "generated.png", "image/png")
            .await?;
        match outcome {
            crate::envelope::ApiOutcome::Success(body) => Ok(json_result(&json!({
                "generated": { "model": output.model, "usage": output.usage },
                "upload": body,
            }))),
            failure => Ok(outcome_result("Asset upload", failure)),
        }
    }

    #[tool(
        description = "Generates an image from a prompt and writes it as a PNG under the local assets directory."
    )]
    async fn generate_image_local(
        &self,
        Parameters(args): Parameters<GenerateImageLocalArgs>,
    ) -> Result<CallToolResult, ErrorData> {
        self.logger
            .tool_call("generate_image_local", Some(&json_params(&args)));
        let (output, bytes) = match self
            .run_image_generation(args.prompt, args.model, args.size)
            .await?
        {
            Ok(generated) => generated,
            Err(result) => return Ok(result),
        };
        let dir = config::local_assets_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(CloudError::from)?;
        let file_name = args
            .file_name
            .unwrap_or_else(|| format!("image-{}.png", Utc::now().format("%Y%m%d-%H%M%S")));
        let path = dir.join(file_name);
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(CloudError::from)?;
        Ok(json_result(&json!({
            "path": path.display().to_string(),
            "bytes": bytes.len(),
            "model": output.model,
        })))
    }
}

#[tool_router(router = datastore_tools_router)]
impl CloudServer {
    #[tool(description = "Lists the standard datastores of a universe.")]
    async fn datastore_list_stores(
        &self,
        Parameters(args): Parameters<DatastoreListStoresArgs>,
    ) -> Result<CallToolResult, ErrorData> {
        self.logger
            .tool_call("datastore_list_stores", Some(&json_params(&args)));
        let universe_id = args.universe_id.unwrap_or_else(config::default_universe_id);
        let outcome = self
            .cloud
            .list_datastores(
                universe_id,
                args.prefix.as_deref(),
                args.limit,
                args.cursor.as_deref(),
            )
            .await?;
        Ok(outcome_result("Datastore listing", outcome))
    }

    #[tool(description = "Lists entry keys in a standard datastore.")]
    async fn datastore_list_entries(
        &self,
        Parameters(args): Parameters<DatastoreListEntriesArgs>,
    ) -> Result<CallToolResult, ErrorData> {
        self.logger
            .tool_call("datastore_list_entries", Some(&json_params(&args)));
        let universe_id = args.universe_id.unwrap_or_else(config::default_universe_id);
        let outcome = self
            .cloud
            .list_datastore_entries(
                universe_id,
                &args.datastore_name,
                args.prefix.as_deref(),
                args.limit,
                args.cursor.as_deref(),
            )
            .await?;
        Ok(outcome_result("Datastore entry listing", outcome))
    }

    #[tool(description = "Reads a single entry from a standard datastore.")]
    async fn datastore_get_entry(
        &self,
        Parameters(args): Parameters<DatastoreEntryArgs>,
    ) -> Result<CallToolResult, ErrorData> {
        self.logger
            .tool_call("datastore_get_entry", Some(&json_params(&args)));
        let universe_id = args.universe_id.unwrap_or_else(config::default_universe_id);
        let outcome = self
            .cloud
            .get_datastore_entry(
                universe_id,
                &args.datastore_name,
                &args.entry_key,
                args.scope.as_deref(),
            )
            .await?;
        Ok(outcome_result("Datastore entry fetch", outcome))
    }

    #[tool(description = "Writes a single entry to a standard datastore.")]
    async fn datastore_set_entry(
        &self,
        Parameters(args): Parameters<DatastoreSetEntryArgs>,
    ) -> Result<CallToolResult, ErrorData> {
        self.logger
            .tool_call("datastore_set_entry", Some(&json_params(&args)));
        let universe_id = args.universe_id.unwrap_or_else(config::default_universe_id);
        let value = serde_json::from_str(&args.value).unwrap_or(JsonValue::String(args.value));
        let outcome = self
            .cloud
            .set_datastore_entry(
                universe_id,
                &args.datastore_name,
                &args.entry_key,
                args.scope.as_deref(),
                &value,
            )
            .await?;
        Ok(outcome_result("Datastore entry write", outcome))
    }

    #[tool(description = "Deletes a single entry from a standard datastore.")]
    async fn datastore_delete_entry(
        &self,
        Parameters(args): Parameters<DatastoreEntryArgs>,
    ) -> Result<CallToolResult, ErrorData> {
        self.logger
            .tool_call("datastore_delete_entry", Some(&json_params(&args)));
        let universe_id = args.universe_id.unwrap_or_else(config::default_universe_id);
        let outcome = self
            .cloud
            .delete_datastore_entry(
                universe_id,
                &args.datastore_name,
                &args.entry_key,
                args.scope.as_deref(),
            )
            .await?;
        Ok(outcome_result("Datastore entry delete", outcome))
    }
}

#[tool_router(router = messaging_tools_router)]
impl CloudServer {
    #[tool(
        description = "Publishes a message to a MessagingService topic so live game servers receive it."
    )]
    async fn messaging_publish(
        &self,
        Parameters(args): Parameters<MessagingPublishArgs>,
    ) -> Result<CallToolResult, ErrorData> {
        self.logger
            .tool_call("messaging_publish", Some(&json_params(&args)));
        let universe_id = args.universe_id.unwrap_or_else(config::default_universe_id);
        let outcome = self
            .cloud
            .publish_message(universe_id, &args.topic, &args.message)
            .await?;
        Ok(outcome_message(
            format!(
                "Published message to topic \"{}\" for universe {universe_id}",
                args.topic
            ),
            "Message publish",
            outcome,
        ))
    }
}

#[tool_router(router = asset_tools_router)]
impl CloudServer {
    #[tool(description = "Fetches the Open Cloud metadata of an asset.")]
    async fn asset_get(
        &self,
        Parameters(args): Parameters<AssetGetArgs>,
    ) -> Result<CallToolResult, ErrorData> {
        self.logger.tool_call("asset_get", Some(&json_params(&args)));
        let outcome = self.cloud.get_asset(args.asset_id).await?;
        Ok(outcome_result("Asset fetch", outcome))
    }

    #[tool(
        description = "Uploads base64 file content as a new Roblox asset and returns the pending operation."
    )]
    async fn asset_upload(
        &self,
        Parameters(args): Parameters<AssetUploadArgs>,
    ) -> Result<CallToolResult, ErrorData> {
        self.logger
            .tool_call("asset_upload", Some(&json_params(&args)));
        let bytes = match BASE64.decode(args.file_content.as_bytes()) {
            Ok(bytes) => bytes,
            Err(err) => {
                return Ok(error_result(format!(
                    "fileContent is not valid base64: {err}"
                )))
            }
        };
        let creator_id = args.creator_id.unwrap_or_else(config::default_creator_id);
        let request = json!({
            "assetType": args.asset_type.as_deref().unwrap_or("Decal"),
            "displayName": args.display_name,
            "description": args.description.unwrap_or_default(),
            "creationContext": { "creator": { "userId": creator_id } }
        });
        let outcome = self
            .cloud
            .upload_asset(
                &request,
                bytes,
                &args.file_name,
                args.content_type.as_deref().unwrap_or("image/png"),
            )
            .await?;
        Ok(outcome_result("Asset upload", outcome))
    }

    #[tool(description = "Polls the status of an asynchronous asset operation.")]
    async fn asset_operation_get(
        &self,
        Parameters(args): Parameters<AssetOperationArgs>,
    ) -> Result<CallToolResult, ErrorData> {
        self.logger
            .tool_call("asset_operation_get", Some(&json_params(&args)));
        let outcome = self.cloud.get_asset_operation(&args.operation_id).await?;
        Ok(outcome_result("Asset operation fetch", outcome))
    }
}

#[tool_router(router = instance_tools_router)]
impl CloudServer {
    #[tool(description = "Fetches an engine instance from a place via Open Cloud.")]
    async fn instance_get(
        &self,
        Parameters(args): Parameters<InstanceGetArgs>,
    ) -> Result<CallToolResult, ErrorData> {
        self.logger
            .tool_call("instance_get", Some(&json_params(&args)));
        let universe_id = args.universe_id.unwrap_or_else(config::default_universe_id);
        let place_id = args.place_id.unwrap_or_else(config::default_place_id);
        let instance_id = args.instance_id.as_deref().unwrap_or("root");
        let outcome = self
            .cloud
            .get_instance(universe_id, place_id, instance_id)
            .await?;
        Ok(outcome_result("Instance fetch", outcome))
    }

    #[tool(description = "Lists the children of an engine instance.")]
    async fn instance_list_children(
        &self,
        Parameters(args): Parameters<InstanceListChildrenArgs>,
    ) -> Result<CallToolResult, ErrorData> {
        self.logger
            .tool_call("instance_list_children", Some(&json_params(&args)));
        let universe_id = args.universe_id.unwrap_or_else(config::default_universe_id);
        let place_id = args.place_id.unwrap_or_else(config::default_place_id);
        let instance_id = args.instance_id.as_deref().unwrap_or("root");
        let outcome = self
            .cloud
            .list_instance_children(
                universe_id,
                place_id,
                instance_id,
                args.page_token.as_deref(),
            )
            .await?;
        Ok(outcome_result("Instance children listing", outcome))
    }

    #[tool(description = "Applies partial updates to an engine instance.")]
    async fn instance_update(
        &self,
        Parameters(args): Parameters<InstanceUpdateArgs>,
    ) -> Result<CallToolResult, ErrorData> {
        self.logger
            .tool_call("instance_update", Some(&json_params(&args)));
        let universe_id = args.universe_id.unwrap_or_else(config::default_universe_id);
        let place_id = args.place_id.unwrap_or_else(config::default_place_id);
        let outcome = self
            .cloud
            .update_instance(universe_id, place_id, &args.instance_id, &args.engine_instance)
            .await?;
        Ok(outcome_result("Instance update", outcome))
    }
}

#[tool_router(router = inventory_tools_router)]
impl CloudServer {
    #[tool(description = "Lists a user's inventory items via Open Cloud.")]
    async fn inventory_list(
        &self,
        Parameters(args): Parameters<InventoryListArgs>,
    ) -> Result<CallToolResult, ErrorData> {
        self.logger
            .tool_call("inventory_list", Some(&json_params(&args)));
        let user_id = args.user_id.unwrap_or_else(config::default_user_id);
        let outcome = self
            .cloud
            .list_inventory(
                user_id,
                args.max_page_size,
                args.filter.as_deref(),
                args.page_token.as_deref(),
            )
            .await?;
        Ok(outcome_result("Inventory listing", outcome))
    }
}

#[tool_router(router = thumbnail_tools_router)]
impl CloudServer {
    #[tool(
        description = "Fetches thumbnail URLs for a batch of assets, polling once when generation is still pending."
    )]
    async fn thumbnail_get_assets(
        &self,
        Parameters(args): Parameters<ThumbnailGetAssetsArgs>,
    ) -> Result<CallToolResult, ErrorData> {
        self.logger
            .tool_call("thumbnail_get_assets", Some(&json_params(&args)));
        let size = args.size.as_deref().unwrap_or(DEFAULT_THUMBNAIL_SIZE);
        let format = args.format.as_deref().unwrap_or(DEFAULT_THUMBNAIL_FORMAT);
        let outcome = self
            .cloud
            .get_asset_thumbnails(&args.asset_ids, size, format)
            .await?;
        Ok(outcome_result("Thumbnail lookup", outcome))
    }
}

#[tool_router(router = introspection_tools_router)]
impl CloudServer {
    #[tool(description = "Reports the server package name, version, and declared tool catalog.")]
    async fn server_info(&self) -> Result<CallToolResult, ErrorData> {
        self.logger.tool_call("server_info", None);
        let tools: Vec<String> = self
            .tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        Ok(json_result(&json!({
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "description": env!("CARGO_PKG_DESCRIPTION"),
            "tools": tools,
        })))
    }
}
