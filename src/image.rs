use crate::batch::{SlotJob, SlotOutput};
use crate::llm::{build_image_prompt, LlmClient};
use crate::remote::{extract_asset_url, provider_error, CancelToken, GenerateError};
use crate::scene::Scene;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;

/// Per-call-site image generation settings, passed by value so two wizard
/// flows never share mutable configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSettings {
    pub aspect_ratio: String,
    pub rendering_speed: String,
    pub style_type: String,
    /// Free-text visual style fed into the prompt-synthesis stage.
    pub style: String,
    pub prompt_max_tokens: u32,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            aspect_ratio: "16:9".to_string(),
            rendering_speed: "DEFAULT".to_string(),
            style_type: "GENERAL".to_string(),
            style: "cinematic photo".to_string(),
            prompt_max_tokens: 300,
        }
    }
}

#[async_trait]
pub trait ImageGenerator: Send + Sync + Debug {
    /// Turns a prompt into a hosted image URL.
    async fn generate(
        &self,
        prompt: &str,
        settings: &ImageSettings,
        cancel: &CancelToken,
    ) -> Result<String, GenerateError>;
}

#[derive(Debug)]
pub struct HttpImageClient {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageRequest<'a> {
    prompt: &'a str,
    aspect_ratio: &'a str,
    rendering_speed: &'a str,
    style_type: &'a str,
}

impl HttpImageClient {
    pub fn new(endpoint: &str, api_key: Option<&str>) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.map(str::to_string),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ImageGenerator for HttpImageClient {
    async fn generate(
        &self,
        prompt: &str,
        settings: &ImageSettings,
        cancel: &CancelToken,
    ) -> Result<String, GenerateError> {
        let body = ImageRequest {
            prompt,
            aspect_ratio: &settings.aspect_ratio,
            rendering_speed: &settings.rendering_speed,
            style_type: &settings.style_type,
        };
        let request = async {
            let mut req = self.client.post(&self.endpoint).json(&body);
            if let Some(key) = &self.api_key {
                req = req.bearer_auth(key);
            }
            let resp = req.send().await?;
            if !resp.status().is_success() {
                return Err(provider_error(resp).await);
            }
            let value: Value = resp.json().await?;
            extract_asset_url(&value)
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(GenerateError::Cancelled),
            result = request => result,
        }
    }
}

/// The image slot job: prompt synthesis from the scene text, then asset
/// generation from that prompt. Both stages run sequentially inside the one
/// outstanding call the batch loop allows; either stage failing fails the
/// slot, never the batch.
pub struct ImageJob {
    llm: Arc<dyn LlmClient>,
    images: Arc<dyn ImageGenerator>,
    settings: ImageSettings,
}

impl ImageJob {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        images: Arc<dyn ImageGenerator>,
        settings: ImageSettings,
    ) -> Self {
        Self {
            llm,
            images,
            settings,
        }
    }
}

#[async_trait]
impl SlotJob for ImageJob {
    async fn generate(
        &self,
        scene: &Scene,
        cancel: &CancelToken,
    ) -> Result<SlotOutput, GenerateError> {
        let prompt_request = build_image_prompt(&scene.text, &self.settings.style);
        let prompt = self
            .llm
            .complete(&prompt_request, self.settings.prompt_max_tokens, cancel)
            .await?;

        let url = self
            .images
            .generate(prompt.trim(), &self.settings, cancel)
            .await?;

        Ok(SlotOutput {
            url,
            prompt: Some(prompt.trim().to_string()),
        })
    }
}
