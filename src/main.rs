use anyhow::Result;
use script2video::config::Config;
use script2video::image::HttpImageClient;
use script2video::llm::HttpLlmClient;
use script2video::render::RenderClient;
use script2video::voice::HttpVoiceClient;
use script2video::workflow::WizardManager;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            eprintln!("Please ensure 'config.yml' exists with valid endpoint settings.");
            return Err(e);
        }
    };

    config.ensure_directories()?;

    let llm = Arc::new(HttpLlmClient::new(
        &config.llm.endpoint,
        config.llm.api_key.as_deref(),
    ));
    let images = Arc::new(HttpImageClient::new(
        &config.image.endpoint,
        config.image.api_key.as_deref(),
    ));
    let voices = Arc::new(HttpVoiceClient::new(
        &config.voice.endpoint,
        config.voice.api_key.as_deref(),
    ));
    let render = RenderClient::new(&config.render.endpoint);

    let mut wizard = WizardManager::new(config, llm, images, voices, render)?;
    wizard.run().await?;

    Ok(())
}
