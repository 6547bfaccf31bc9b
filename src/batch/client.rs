//! Remote inference service: asynchronous batch jobs and single chat completions

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder as HttpRequest, Response};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::batch::request::ChatBody;
use crate::error::{BatchError, ConfigError};

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const PROXY_ENV: &str = "INFERENCE_PROXY_URL";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Batch job as reported by the service, status not yet interpreted
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RemoteJob {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub output_file_id: Option<String>,
    #[serde(default)]
    pub error_file_id: Option<String>,
    #[serde(default)]
    pub errors: Option<Value>,
}

#[async_trait]
pub trait BatchService: Send + Sync {
    /// Upload a request file, returning its file id
    async fn upload_file(&self, path: &Path) -> Result<String, BatchError>;

    /// Start a job over an uploaded file, returning the job id
    async fn create_batch_job(
        &self,
        input_file_id: &str,
        endpoint: &str,
        completion_window: &str,
    ) -> Result<String, BatchError>;

    async fn retrieve_job(&self, job_id: &str) -> Result<RemoteJob, BatchError>;

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, BatchError>;
}

#[async_trait]
pub trait ChatService: Send + Sync {
    /// Content of the first choice
    async fn complete(&self, body: &ChatBody) -> Result<String, BatchError>;
}

/// Validated, immutable settings of the inference client
#[derive(Clone)]
pub struct ApiConfig {
    pub api_key: String,
    pub base_url: String,
    /// Applied to this client only, never to the process environment
    pub proxy: Option<String>,
    pub timeout: Duration,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("api_key", &"***")
            .field("base_url", &self.base_url)
            .field("proxy", &self.proxy)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ApiConfig {
    /// Both the api key and the proxy are required on the batch path
    pub fn new(
        api_key: Option<String>,
        proxy: Option<String>,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let api_key = api_key.filter(|k| !k.is_empty()).ok_or(ConfigError::MissingEnv(API_KEY_ENV))?;
        let proxy = proxy.filter(|p| !p.is_empty()).ok_or(ConfigError::MissingEnv(PROXY_ENV))?;
        reqwest::Proxy::all(&proxy)
            .map_err(|e| ConfigError::InvalidProxy { url: proxy.clone(), reason: e.to_string() })?;
        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            proxy: Some(proxy),
            timeout,
        })
    }
}

#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    config: ApiConfig,
}

#[derive(Deserialize)]
struct FileObject {
    id: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(config: ApiConfig) -> Result<Self, ConfigError> {
        let mut builder = Client::builder().timeout(config.timeout);
        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| ConfigError::InvalidProxy { url: proxy.clone(), reason: e.to_string() })?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| ConfigError::InvalidProxy { url: config.base_url.clone(), reason: e.to_string() })?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    async fn send(&self, request: HttpRequest) -> Result<Response, BatchError> {
        let response = request.bearer_auth(&self.config.api_key).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(BatchError::Service(format!("{}: {}", status, text)));
        }
        Ok(response)
    }
}

#[async_trait]
impl BatchService for OpenAiClient {
    async fn upload_file(&self, path: &Path) -> Result<String, BatchError> {
        info!("uploading {}", path.display());
        let data = tokio::fs::read(path).await?;
        let name = path.file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let form = Form::new()
            .text("purpose", "batch")
            .part("file", Part::bytes(data).file_name(name));
        let file: FileObject =
            self.send(self.client.post(self.url("/v1/files")).multipart(form)).await?.json().await?;
        info!("uploaded {} as {}", path.display(), file.id);
        Ok(file.id)
    }

    async fn create_batch_job(
        &self,
        input_file_id: &str,
        endpoint: &str,
        completion_window: &str,
    ) -> Result<String, BatchError> {
        let body = json!({
            "input_file_id": input_file_id,
            "endpoint": endpoint,
            "completion_window": completion_window,
        });
        let job: RemoteJob =
            self.send(self.client.post(self.url("/v1/batches")).json(&body)).await?.json().await?;
        info!("created batch job {} for {}", job.id, input_file_id);
        Ok(job.id)
    }

    async fn retrieve_job(&self, job_id: &str) -> Result<RemoteJob, BatchError> {
        let job: RemoteJob = self
            .send(self.client.get(self.url(&format!("/v1/batches/{}", job_id))))
            .await?
            .json()
            .await?;
        debug!("batch job {} is {}", job.id, job.status);
        Ok(job)
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, BatchError> {
        let response =
            self.send(self.client.get(self.url(&format!("/v1/files/{}/content", file_id)))).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl ChatService for OpenAiClient {
    async fn complete(&self, body: &ChatBody) -> Result<String, BatchError> {
        let response: ChatResponse = self
            .send(self.client.post(self.url("/v1/chat/completions")).json(body))
            .await?
            .json()
            .await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| BatchError::Service("no content in chat response".to_string()))
    }
}
