pub mod config;
pub mod manager;


pub use config::{EngineSettings, PlaybackBackend, PlaybackSettings, Settings};
pub use manager::SettingsManager;
