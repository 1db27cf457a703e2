use crate::batch::{SlotJob, SlotOutput};
use crate::remote::{extract_asset_url, provider_error, CancelToken, GenerateError};
use crate::scene::Scene;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub voice_id: String,
    pub stability: f64,
    pub similarity_boost: f64,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            voice_id: "narrator".to_string(),
            stability: 0.5,
            similarity_boost: 0.75,
        }
    }
}

#[async_trait]
pub trait VoiceGenerator: Send + Sync + Debug {
    /// Synthesizes the full text into one audio asset and returns its URL.
    /// Cancellable at the network boundary.
    async fn synthesize(
        &self,
        text: &str,
        settings: &VoiceSettings,
        cancel: &CancelToken,
    ) -> Result<String, GenerateError>;
}

#[derive(Debug)]
pub struct HttpVoiceClient {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct VoiceRequest<'a> {
    text: &'a str,
    voice_id: &'a str,
    voice_settings: VoiceTuning,
}

#[derive(Serialize)]
struct VoiceTuning {
    stability: f64,
    similarity_boost: f64,
}

impl HttpVoiceClient {
    pub fn new(endpoint: &str, api_key: Option<&str>) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.map(str::to_string),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl VoiceGenerator for HttpVoiceClient {
    async fn synthesize(
        &self,
        text: &str,
        settings: &VoiceSettings,
        cancel: &CancelToken,
    ) -> Result<String, GenerateError> {
        let body = VoiceRequest {
            text,
            voice_id: &settings.voice_id,
            voice_settings: VoiceTuning {
                stability: settings.stability,
                similarity_boost: settings.similarity_boost,
            },
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

/// The voiceover slot job. One call covers the whole script rather than one
/// scene, so it runs as a single-slot batch: the job is atomic and
/// cancellation leaves no partial voice slots behind.
pub struct VoiceJob {
    voices: Arc<dyn VoiceGenerator>,
    script: String,
    settings: VoiceSettings,
}

impl VoiceJob {
    pub fn new(voices: Arc<dyn VoiceGenerator>, script: &str, settings: VoiceSettings) -> Self {
        Self {
            voices,
            script: script.to_string(),
            settings,
        }
    }
}

#[async_trait]
impl SlotJob for VoiceJob {
    async fn generate(
        &self,
        _scene: &Scene,
        cancel: &CancelToken,
    ) -> Result<SlotOutput, GenerateError> {
        let url = self
            .voices
            .synthesize(&self.script, &self.settings, cancel)
            .await?;
        Ok(SlotOutput { url, prompt: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct RecordingVoices {
        texts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl VoiceGenerator for RecordingVoices {
        async fn synthesize(
            &self,
            text: &str,
            _settings: &VoiceSettings,
            cancel: &CancelToken,
        ) -> Result<String, GenerateError> {
            if cancel.is_cancelled() {
                return Err(GenerateError::Cancelled);
            }
            self.texts.lock().unwrap().push(text.to_string());
            Ok("https://cdn.example.com/voiceover.mp3".to_string())
        }
    }

    #[tokio::test]
    async fn test_voice_job_uses_full_script_not_scene_text() {
        let voices = Arc::new(RecordingVoices {
            texts: Mutex::new(Vec::new()),
        });
        let job = VoiceJob::new(
            voices.clone(),
            "The whole narration, start to finish.",
            VoiceSettings::default(),
        );
        let scene = Scene {
            index: 0,
            text: "only the first scene".to_string(),
            start_seconds: 0.0,
            end_seconds: 3.0,
        };

        let out = job.generate(&scene, &CancelToken::new()).await.unwrap();
        assert_eq!(out.url, "https://cdn.example.com/voiceover.mp3");
        assert!(out.prompt.is_none());
        assert_eq!(
            voices.texts.lock().unwrap().as_slice(),
            &["The whole narration, start to finish.".to_string()]
        );
    }

    #[tokio::test]
    async fn test_cancelled_token_propagates() {
        let voices = Arc::new(RecordingVoices {
            texts: Mutex::new(Vec::new()),
        });
        let job = VoiceJob::new(voices, "text", VoiceSettings::default());
        let scene = Scene {
            index: 0,
            text: "x".to_string(),
            start_seconds: 0.0,
            end_seconds: 1.0,
        };
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = job.generate(&scene, &cancel).await.unwrap_err();
        assert!(matches!(err, GenerateError::Cancelled));
    }

    #[test]
    fn test_voice_request_shape() {
        let body = VoiceRequest {
            text: "hello",
            voice_id: "narrator",
            voice_settings: VoiceTuning {
                stability: 0.5,
                similarity_boost: 0.75,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["text"], "hello");
        assert_eq!(json["voice_id"], "narrator");
        assert_eq!(json["voice_settings"]["stability"], 0.5);
    }
}
