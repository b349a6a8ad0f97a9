//! HTTP client for VOICEVOX-compatible synthesis engines

pub mod client;
pub mod provider;
pub mod types;
