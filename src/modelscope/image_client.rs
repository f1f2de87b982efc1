use crate::{
    config::ModelScopeConfig,
    error::{Result, ZImageError},
    models::{
        provider_message, GenerationRequest, GenerationTask, ImageReference, ModelInfo,
        SubmitResponse, TaskStatus, TaskStatusResponse, IMAGE_MODELS,
    },
    transport::{HttpRequest, HttpTransport},
};
use std::sync::Arc;

const GENERATIONS_PATH: &str = "v1/images/generations";
const TASKS_PATH: &str = "v1/tasks";
const ASYNC_MODE_HEADER: &str = "X-ModelScope-Async-Mode";
const TASK_TYPE_HEADER: &str = "X-ModelScope-Task-Type";
const TASK_TYPE_IMAGE: &str = "image_generation";

/// Text-to-image over the asynchronous task API: submit, poll until the task
/// is terminal, then hand back the first output.
#[derive(Clone)]
pub struct ImageClient {
    transport: Arc<dyn HttpTransport>,
    config: ModelScopeConfig,
}

impl ImageClient {
    pub fn new(transport: Arc<dyn HttpTransport>, config: ModelScopeConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &ModelScopeConfig {
        &self.config
    }

    pub fn supported_models() -> &'static [ModelInfo] {
        IMAGE_MODELS
    }

    /// Request for `prompt` with the configured default model.
    pub fn request(&self, prompt: impl Into<String>) -> GenerationRequest {
        GenerationRequest::new(prompt, self.config.image_model.clone())
    }

    pub async fn generate(&self, request: &GenerationRequest) -> Result<ImageReference> {
        let task_id = self.submit(request).await?;
        let task = self.wait_for_task(&task_id).await?;

        match task.status {
            TaskStatus::Succeeded => task.outputs.into_iter().next().ok_or_else(|| {
                log::error!("Task {} succeeded without output images", task_id);
                ZImageError::ProtocolError("no output".into())
            }),
            _ => {
                let message = task
                    .failure_message
                    .unwrap_or_else(|| "Unknown error".to_string());
                log::error!("Task {} failed: {}", task_id, message);
                Err(ZImageError::GenerationFailed(message))
            }
        }
    }

    /// `generate`, then resolve the reference to image bytes.
    pub async fn generate_bytes(&self, request: &GenerationRequest) -> Result<Vec<u8>> {
        let reference = self.generate(request).await?;
        self.fetch_image(&reference).await
    }

    pub async fn submit(&self, request: &GenerationRequest) -> Result<String> {
        request.validate()?;
        let api_key = self.config.api_key()?;

        log::info!(
            "Submitting image generation with model: {} ({}, n={})",
            request.model,
            request.size,
            request.count
        );

        let http_request =
            HttpRequest::post_json(self.config.endpoint(GENERATIONS_PATH), &request.to_payload())?
                .bearer(api_key)
                .header(ASYNC_MODE_HEADER, "true");

        let response = self.transport.send(http_request).await?;
        let status = response.status;
        let success = response.is_success();
        let body = response.into_bytes().await?;

        if !success {
            let message = serde_json::from_slice(&body)
                .ok()
                .and_then(|json| provider_message(&json))
                .unwrap_or_else(|| format!("Initial request failed with status {}", status));
            log::error!("Image submission rejected ({}): {}", status, message);
            return Err(ZImageError::SubmissionFailed { status, message });
        }

        let submitted: SubmitResponse = serde_json::from_slice(&body)
            .map_err(|e| ZImageError::ProtocolError(format!("invalid submit response: {}", e)))?;

        let task_id = submitted
            .task_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ZImageError::ProtocolError("missing task id".into()))?;

        log::info!(
            "Image task submitted: {} (request {})",
            task_id,
            submitted.request_id.as_deref().unwrap_or("-")
        );
        Ok(task_id)
    }

    /// One status request for `task_id`.
    pub async fn fetch_task(&self, task_id: &str) -> Result<GenerationTask> {
        let mut task = GenerationTask::pending(task_id);
        self.refresh(&mut task).await?;
        Ok(task)
    }

    /// Polls until the task reports a terminal status.
    ///
    /// There is no attempt cap: any non-terminal status waits one poll
    /// interval and asks again. A failing status request ends the loop.
    pub async fn wait_for_task(&self, task_id: &str) -> Result<GenerationTask> {
        let mut task = GenerationTask::pending(task_id);
        let mut attempts: u64 = 0;

        loop {
            attempts += 1;
            self.refresh(&mut task).await?;
            log::debug!("Task {} poll #{}: {:?}", task_id, attempts, task.status);

            if task.status.is_terminal() {
                log::info!(
                    "Task {} finished as {:?} after {} poll(s)",
                    task_id,
                    task.status,
                    attempts
                );
                return Ok(task);
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    async fn refresh(&self, task: &mut GenerationTask) -> Result<()> {
        let api_key = self.config.api_key()?;
        let url = self.config.endpoint(&format!("{}/{}", TASKS_PATH, task.id));
        let request = HttpRequest::get(url)
            .bearer(api_key)
            .header(TASK_TYPE_HEADER, TASK_TYPE_IMAGE);

        let response = self.transport.send(request).await?;
        if !response.is_success() {
            log::error!("Polling task {} failed with status {}", task.id, response.status);
            return Err(ZImageError::PollingFailed {
                status: response.status,
            });
        }

        let body = response.into_bytes().await?;
        let status: TaskStatusResponse = serde_json::from_slice(&body)
            .map_err(|e| ZImageError::ProtocolError(format!("invalid task response: {}", e)))?;
        task.apply(status);
        Ok(())
    }

    /// Image bytes for a reference: downloaded for URLs, decoded for inline data.
    pub async fn fetch_image(&self, reference: &ImageReference) -> Result<Vec<u8>> {
        let Some(url) = reference.as_url() else {
            return reference.decode_inline();
        };
        let url = self.config.resolve_url(url);

        log::debug!("Downloading image from {}", url);
        let response = self.transport.send(HttpRequest::get(url.as_str())).await?;
        if !response.is_success() {
            log::error!("Image download from {} failed with status {}", url, response.status);
            return Err(ZImageError::DownloadFailed {
                status: response.status,
            });
        }

        let bytes = response.into_bytes().await?;
        log::info!("Downloaded image ({} bytes)", bytes.len());
        Ok(bytes)
    }
}
