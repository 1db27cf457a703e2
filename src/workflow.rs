use crate::batch::{
    BatchController, BatchOutcome, BatchSnapshot, GenerationSlot, SlotStatus, MAX_BATCH,
};
use crate::config::Config;
use crate::image::{ImageGenerator, ImageJob};
use crate::llm::{build_script_prompt, LlmClient};
use crate::remote::CancelToken;
use crate::render::{RenderClient, RenderRequest};
use crate::scene::{allocate, Scene};
use crate::upload::slot_from_file;
use crate::voice::{VoiceGenerator, VoiceJob};
use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Confirm, Editor, Text};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Everything the wizard has produced so far, persisted to the build folder
/// after each step so an interrupted session resumes where it left off.
#[derive(Serialize, Deserialize, Default, Clone, Debug)]
pub struct WizardState {
    pub script: Option<String>,
    pub scene_count: usize,
    pub image_slots: Vec<GenerationSlot>,
    pub voice_url: Option<String>,
    pub video_url: Option<String>,
}

impl WizardState {
    pub fn load(build_dir: &str) -> Result<Self> {
        let path = Path::new(build_dir).join("state.json");
        if path.exists() {
            let content = fs::read_to_string(path)?;
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(WizardState::default())
        }
    }

    pub fn save(&self, build_dir: &str) -> Result<()> {
        fs::create_dir_all(build_dir)?;
        let path = Path::new(build_dir).join("state.json");
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// Drives the wizard steps: script, scenes, images, voiceover, render. Each
/// step checks saved state first, so completed work is never redone.
pub struct WizardManager {
    config: Config,
    llm: Arc<dyn LlmClient>,
    images: Arc<dyn ImageGenerator>,
    voices: Arc<dyn VoiceGenerator>,
    render: RenderClient,
    state: WizardState,
}

impl WizardManager {
    pub fn new(
        config: Config,
        llm: Arc<dyn LlmClient>,
        images: Arc<dyn ImageGenerator>,
        voices: Arc<dyn VoiceGenerator>,
        render: RenderClient,
    ) -> Result<Self> {
        let state = WizardState::load(&config.build_folder)?;
        Ok(Self {
            config,
            llm,
            images,
            voices,
            render,
            state,
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        let script = self.step_script().await?;
        let scene_count = self.step_scene_count()?;

        let scenes = allocate(
            &script,
            scene_count,
            self.config.defaults.audio_duration_seconds,
        );
        if scenes.is_empty() {
            bail!("Script is empty, nothing to generate");
        }
        println!("Split into {} scenes:", scenes.len());
        for scene in &scenes {
            println!(
                "  [{:>5.1}s - {:>5.1}s] {}",
                scene.start_seconds,
                scene.end_seconds,
                preview(&scene.text)
            );
        }

        self.step_images(&scenes).await?;
        if self.step_voice(&script, &scenes).await? == BatchOutcome::Cancelled {
            println!("Voiceover cancelled. Run again to resume.");
            return Ok(());
        }
        self.step_render(&scenes).await?;
        Ok(())
    }

    async fn step_script(&mut self) -> Result<String> {
        if let Some(script) = self.state.script.clone() {
            let reuse = Confirm::new("A script from a previous session exists. Keep it?")
                .with_default(true)
                .prompt()?;
            if reuse {
                return Ok(script);
            }
            // Starting over invalidates everything derived from the script.
            self.state = WizardState::default();
        }

        let topic = Text::new("What should the video be about?").prompt()?;
        if topic.trim().is_empty() {
            bail!("Topic must not be empty");
        }

        println!("Generating script...");
        let prompt = build_script_prompt(&topic, self.config.defaults.scene_count);
        let mut script = self
            .llm
            .complete(&prompt, self.config.llm.script_max_tokens, &CancelToken::new())
            .await
            .context("Script generation failed")?;

        let edit = Confirm::new("Edit the generated script?")
            .with_default(false)
            .prompt()?;
        if edit {
            script = Editor::new("Script:")
                .with_predefined_text(&script)
                .prompt()?;
        }
        if script.trim().is_empty() {
            bail!("Script must not be empty");
        }

        self.state.script = Some(script.clone());
        self.state.save(&self.config.build_folder)?;
        Ok(script)
    }

    fn step_scene_count(&mut self) -> Result<usize> {
        if self.state.scene_count > 0 {
            return Ok(self.state.scene_count);
        }
        let default = self.config.defaults.scene_count.clamp(1, MAX_BATCH);
        let answer = Text::new("How many scenes?")
            .with_default(&default.to_string())
            .prompt()?;
        let count: usize = answer
            .trim()
            .parse()
            .context("Scene count must be a number")?;
        if count == 0 || count > MAX_BATCH {
            bail!("Scene count must be between 1 and {}", MAX_BATCH);
        }
        self.state.scene_count = count;
        self.state.save(&self.config.build_folder)?;
        Ok(count)
    }

    async fn step_images(&mut self, scenes: &[Scene]) -> Result<()> {
        let job = Arc::new(ImageJob::new(
            self.llm.clone(),
            self.images.clone(),
            self.config.image_settings(),
        ));
        let mut controller = BatchController::new(
            scenes.to_vec(),
            scenes.len(),
            job,
            Some(&self.state.image_slots),
        )?;

        if controller
            .slots()
            .iter()
            .all(|s| s.status == SlotStatus::Completed)
        {
            println!("All scene images already generated.");
            self.state.image_slots = controller.slots().to_vec();
            return Ok(());
        }

        println!("Generating scene images (ctrl-c to stop)...");
        let (pb, pb_task) = progress_bar(controller.subscribe());
        let cancel = CancelToken::new();
        let ctrlc = cancel_on_ctrl_c(cancel.clone());
        let outcome = controller.run(&cancel).await?;
        ctrlc.abort();
        pb_task.abort();
        pb.finish_and_clear();

        self.state.image_slots = controller.slots().to_vec();
        self.state.save(&self.config.build_folder)?;

        if outcome == BatchOutcome::Cancelled {
            bail!("Image generation cancelled. Run again to resume.");
        }

        loop {
            let failed = failed_indices(controller.slots());
            if failed.is_empty() {
                break;
            }
            for index in &failed {
                let message = controller.slots()[*index]
                    .error
                    .clone()
                    .unwrap_or_default();
                println!("Scene {} failed: {}", index, message);
            }
            let retry = Confirm::new("Retry the failed scenes?")
                .with_default(true)
                .prompt()?;
            if !retry {
                let upload = Confirm::new("Supply image files for them instead?")
                    .with_default(false)
                    .prompt()?;
                if !upload {
                    bail!("Cannot render with missing scene images");
                }
                for index in failed {
                    let answer = Text::new(&format!("Image file for scene {}:", index)).prompt()?;
                    let slot = slot_from_file(index, &PathBuf::from(answer.trim()))?;
                    self.state.image_slots[index] = slot;
                }
                self.state.save(&self.config.build_folder)?;
                return Ok(());
            }
            for index in failed {
                println!("Regenerating scene {}...", index);
                controller.regenerate(index, &CancelToken::new()).await?;
            }
            self.state.image_slots = controller.slots().to_vec();
            self.state.save(&self.config.build_folder)?;
        }
        Ok(())
    }

    async fn step_voice(&mut self, script: &str, scenes: &[Scene]) -> Result<BatchOutcome> {
        if self.state.voice_url.is_some() {
            println!("Voiceover already generated.");
            return Ok(BatchOutcome::Completed);
        }

        println!("Generating voiceover (ctrl-c to cancel)...");
        let job = Arc::new(VoiceJob::new(
            self.voices.clone(),
            script,
            self.config.voice_settings(),
        ));
        // The voiceover covers the whole script as one atomic job, so it runs
        // as a single-slot batch.
        let mut controller = BatchController::new(scenes.to_vec(), 1, job, None)?;

        let cancel = CancelToken::new();
        let ctrlc = cancel_on_ctrl_c(cancel.clone());
        let outcome = controller.run(&cancel).await?;
        ctrlc.abort();

        if outcome == BatchOutcome::Cancelled {
            return Ok(BatchOutcome::Cancelled);
        }

        let slot = &controller.slots()[0];
        match slot.status {
            SlotStatus::Completed => {
                self.state.voice_url = slot.url.clone();
                self.state.save(&self.config.build_folder)?;
                info!("Voiceover ready: {:?}", self.state.voice_url);
                Ok(BatchOutcome::Completed)
            }
            _ => bail!(
                "Voiceover generation failed: {}",
                slot.error.clone().unwrap_or_default()
            ),
        }
    }

    async fn step_render(&mut self, scenes: &[Scene]) -> Result<()> {
        if let Some(url) = &self.state.video_url {
            println!("Video already rendered: {}", url);
            return Ok(());
        }

        println!("Submitting render job...");
        let request =
            RenderRequest::assemble(scenes, &self.state.image_slots, self.state.voice_url.clone())?;
        let video_url = self
            .render
            .render(&request)
            .await
            .context("Render request failed")?;

        self.state.video_url = Some(video_url.clone());
        self.state.save(&self.config.build_folder)?;
        println!("Video ready: {}", video_url);
        Ok(())
    }
}

/// Indices of slots that ended the batch in the error state.
pub fn failed_indices(slots: &[GenerationSlot]) -> Vec<usize> {
    slots
        .iter()
        .filter(|s| s.status == SlotStatus::Error)
        .map(|s| s.index)
        .collect()
}

fn preview(text: &str) -> String {
    let trimmed = text.trim();
    let mut out: String = trimmed.chars().take(60).collect();
    if trimmed.chars().count() > 60 {
        out.push_str("...");
    }
    out
}

fn progress_bar(mut rx: watch::Receiver<BatchSnapshot>) -> (ProgressBar, JoinHandle<()>) {
    let pb = ProgressBar::new(100);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}%")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    let pb_clone = pb.clone();
    let task = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let snap = rx.borrow_and_update().clone();
            pb_clone.set_position(snap.progress as u64);
            if snap.done {
                break;
            }
        }
    });
    (pb, task)
}

fn cancel_on_ctrl_c(cancel: CancelToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    })
}
