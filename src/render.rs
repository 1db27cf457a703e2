use crate::batch::GenerationSlot;
use crate::remote::{extract_asset_url, provider_error, GenerateError};
use crate::scene::Scene;
use anyhow::{bail, Result};
use log::info;
use serde::Serialize;
use serde_json::Value;

/// Submits the assembled scenes and assets to the backend renderer and
/// returns the final video URL. Encoding itself happens entirely on the
/// backend.
#[derive(Debug)]
pub struct RenderClient {
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
pub struct RenderRequest {
    pub scenes: Vec<RenderScene>,
    pub audio_url: Option<String>,
}

#[derive(Serialize)]
pub struct RenderScene {
    pub index: usize,
    pub text: String,
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub image_url: String,
}

impl RenderRequest {
    /// Pairs each scene with its completed image slot. Every slot must be
    /// terminal-completed (or uploaded) before a render is attempted.
    pub fn assemble(
        scenes: &[Scene],
        image_slots: &[GenerationSlot],
        audio_url: Option<String>,
    ) -> Result<Self> {
        if scenes.len() != image_slots.len() {
            bail!(
                "Scene/slot mismatch: {} scenes, {} slots",
                scenes.len(),
                image_slots.len()
            );
        }
        let mut out = Vec::with_capacity(scenes.len());
        for (scene, slot) in scenes.iter().zip(image_slots) {
            let image_url = match &slot.url {
                Some(url) => url.clone(),
                None => bail!("Scene {} has no image yet", scene.index),
            };
            out.push(RenderScene {
                index: scene.index,
                text: scene.text.clone(),
                start_seconds: scene.start_seconds,
                end_seconds: scene.end_seconds,
                image_url,
            });
        }
        Ok(Self {
            scenes: out,
            audio_url,
        })
    }
}

impl RenderClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub async fn render(&self, request: &RenderRequest) -> Result<String, GenerateError> {
        info!("Submitting render request ({} scenes)", request.scenes.len());
        let resp = self.client.post(&self.endpoint).json(request).send().await?;
        if !resp.status().is_success() {
            return Err(provider_error(resp).await);
        }
        let value: Value = resp.json().await?;
        extract_asset_url(&value)
    }
}
