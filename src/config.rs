use crate::image::ImageSettings;
use crate::voice::VoiceSettings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_build")]
    pub build_folder: String,

    #[serde(default = "default_output")]
    pub output_folder: String,

    pub llm: LlmConfig,

    pub image: ImageConfig,

    pub voice: VoiceConfig,

    pub render: RenderConfig,

    #[serde(default)]
    pub defaults: Defaults,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LlmConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    #[serde(default = "default_script_max_tokens")]
    pub script_max_tokens: u32,
    #[serde(default = "default_prompt_max_tokens")]
    pub prompt_max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ImageConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,
    #[serde(default = "default_rendering_speed")]
    pub rendering_speed: String,
    #[serde(default = "default_style_type")]
    pub style_type: String,
    #[serde(default = "default_style")]
    pub style: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VoiceConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    #[serde(default = "default_voice_id")]
    pub voice_id: String,
    #[serde(default = "default_stability")]
    pub stability: f64,
    #[serde(default = "default_similarity_boost")]
    pub similarity_boost: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RenderConfig {
    pub endpoint: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Defaults {
    #[serde(default = "default_scene_count")]
    pub scene_count: usize,
    /// Known voiceover length in seconds; 0 means unknown and lets the
    /// allocator fall back to placeholder pacing.
    #[serde(default)]
    pub audio_duration_seconds: f64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            scene_count: default_scene_count(),
            audio_duration_seconds: 0.0,
        }
    }
}

fn default_build() -> String {
    "build".to_string()
}
fn default_output() -> String {
    "output".to_string()
}
fn default_script_max_tokens() -> u32 {
    1200
}
fn default_prompt_max_tokens() -> u32 {
    300
}
fn default_aspect_ratio() -> String {
    "16:9".to_string()
}
fn default_rendering_speed() -> String {
    "DEFAULT".to_string()
}
fn default_style_type() -> String {
    "GENERAL".to_string()
}
fn default_style() -> String {
    "cinematic photo".to_string()
}
fn default_voice_id() -> String {
    "narrator".to_string()
}
fn default_stability() -> f64 {
    0.5
}
fn default_similarity_boost() -> f64 {
    0.75
}
fn default_scene_count() -> usize {
    5
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Path::new("config.yml");
        if !path.exists() {
            anyhow::bail!("config.yml not found. Please create one.");
        }

        let content = fs::read_to_string(path).context("Failed to read config.yml")?;
        let config: Config =
            serde_yaml_ng::from_str(&content).context("Failed to parse config.yml")?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let content = serde_yaml_ng::to_string(self)?;
        fs::write("config.yml", content).context("Failed to write config.yml")?;
        Ok(())
    }

    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.build_folder)?;
        fs::create_dir_all(&self.output_folder)?;
        Ok(())
    }

    pub fn image_settings(&self) -> ImageSettings {
        ImageSettings {
            aspect_ratio: self.image.aspect_ratio.clone(),
            rendering_speed: self.image.rendering_speed.clone(),
            style_type: self.image.style_type.clone(),
            style: self.image.style.clone(),
            prompt_max_tokens: self.llm.prompt_max_tokens,
        }
    }

    pub fn voice_settings(&self) -> VoiceSettings {
        VoiceSettings {
            voice_id: self.voice.voice_id.clone(),
            stability: self.voice.stability,
            similarity_boost: self.voice.similarity_boost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_yaml_fills_defaults() {
        let yaml = r#"
llm:
  endpoint: "https://llm.example.com/complete"
image:
  endpoint: "https://img.example.com/generate"
voice:
  endpoint: "https://tts.example.com/synthesize"
render:
  endpoint: "https://render.example.com/jobs"
"#;
        let config: Config = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(config.build_folder, "build");
        assert_eq!(config.defaults.scene_count, 5);
        assert_eq!(config.defaults.audio_duration_seconds, 0.0);
        assert_eq!(config.image.aspect_ratio, "16:9");
        assert_eq!(config.voice.stability, 0.5);
        assert!(config.llm.api_key.is_none());
    }

    #[test]
    fn test_settings_value_objects_are_independent_copies() {
        let yaml = r#"
llm:
  endpoint: "https://llm.example.com"
image:
  endpoint: "https://img.example.com"
  style: "oil painting"
voice:
  endpoint: "https://tts.example.com"
  voice_id: "deep_male"
render:
  endpoint: "https://render.example.com"
"#;
        let mut config: Config = serde_yaml_ng::from_str(yaml).unwrap();
        let settings = config.image_settings();
        config.image.style = "pixel art".to_string();
        // The value object taken earlier is unaffected by later edits.
        assert_eq!(settings.style, "oil painting");
        assert_eq!(config.voice_settings().voice_id, "deep_male");
    }
}
