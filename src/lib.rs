pub mod batch;
pub mod config;
pub mod image;
pub mod llm;
pub mod remote;
pub mod render;
pub mod scene;
pub mod upload;
pub mod voice;
pub mod workflow;
