use crate::remote::{extract_text, provider_error, CancelToken, GenerateError};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Debug;

/// Text completion against a remote LLM endpoint. The image flow uses this
/// for per-scene prompt synthesis; the wizard uses it for full-script
/// generation.
#[async_trait]
pub trait LlmClient: Send + Sync + Debug {
    async fn complete(
        &self,
        prompt: &str,
        max_tokens: u32,
        cancel: &CancelToken,
    ) -> Result<String, GenerateError>;
}

#[derive(Debug)]
pub struct HttpLlmClient {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    max_tokens: u32,
}

impl HttpLlmClient {
    pub fn new(endpoint: &str, api_key: Option<&str>) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.map(str::to_string),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(
        &self,
        prompt: &str,
        max_tokens: u32,
        cancel: &CancelToken,
    ) -> Result<String, GenerateError> {
        let body = CompletionRequest { prompt, max_tokens };
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
            extract_text(&value)
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(GenerateError::Cancelled),
            result = request => result,
        }
    }
}

/// Prompt for generating the narration script from a topic.
pub fn build_script_prompt(topic: &str, scene_count: usize) -> String {
    format!(
        "Write a short narration script for a video about the following topic. \
        The script will be split into {} scenes, so structure it as {} short, \
        self-contained sentences or sentence pairs. Use plain spoken language, \
        no stage directions, no scene numbers, no markdown. \
        \n\nTopic: {}",
        scene_count, scene_count, topic
    )
}

/// Prompt for synthesizing an image-generation prompt from one scene's text.
pub fn build_image_prompt(scene_text: &str, style: &str) -> String {
    format!(
        "Describe a single still image illustrating the following narration \
        segment. Answer with one concise image-generation prompt, no \
        commentary. Visual style: {}. \
        \n\nNarration: {}",
        style,
        scene_text.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_prompt_mentions_topic_and_count() {
        let p = build_script_prompt("the history of lighthouses", 5);
        assert!(p.contains("the history of lighthouses"));
        assert!(p.contains("5 scenes"));
    }

    #[test]
    fn test_image_prompt_carries_style_and_text() {
        let p = build_image_prompt("  Waves crash against the rocks.  ", "watercolor");
        assert!(p.contains("watercolor"));
        assert!(p.contains("Waves crash against the rocks."));
        assert!(!p.contains("  Waves"));
    }

    #[test]
    fn test_completion_request_shape() {
        let body = CompletionRequest {
            prompt: "hello",
            max_tokens: 300,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["prompt"], "hello");
        assert_eq!(json["max_tokens"], 300);
    }
}
