//! Application configuration
//!
//! Loaded from a TOML file with every field optional; missing values
//! fall back to the defaults below. The default location is
//! `~/.config/sotto/config.toml`.

use crate::error::{Result, SottoError};
use crate::events::TurnDetection;
use crate::mode::{AdvisorSettings, InterviewSettings};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Backend endpoints
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the backend serving /token, /api/chat-completions and
    /// /api/analyze-image
    pub base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
        }
    }
}

/// Cost and response throttling limits
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Session cost ceiling in USD
    pub cost_limit_usd: f64,
    /// Automatic responses allowed per session
    pub max_responses: u32,
    /// Output token cap for automatic voice-triggered responses
    pub max_response_tokens: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            cost_limit_usd: 5.0,
            max_responses: 50,
            max_response_tokens: 500,
        }
    }
}

/// Server-side voice activity detection parameters
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    pub threshold: f64,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 500,
        }
    }
}

impl VadConfig {
    pub fn to_turn_detection(&self) -> TurnDetection {
        TurnDetection {
            kind: "server_vad".to_string(),
            threshold: self.threshold,
            prefix_padding_ms: self.prefix_padding_ms,
            silence_duration_ms: self.silence_duration_ms,
        }
    }
}

/// Delays for scheduled triggers
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Pause lift after a response completes with auto-resume armed
    pub auto_resume_ms: u64,
    /// Settle time between a finalized transcription and its response
    pub response_delay_ms: u64,
    /// Natural-feeling delay before an interview-mode response
    pub interview_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            auto_resume_ms: 500,
            response_delay_ms: 100,
            interview_delay_ms: 1000,
        }
    }
}

/// Top-level configuration
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub limits: LimitsConfig,
    pub vad: VadConfig,
    pub timing: TimingConfig,
    pub interview: InterviewSettings,
    pub advisor: AdvisorSettings,
}

impl Config {
    /// Load a configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            SottoError::ConfigError(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            SottoError::ConfigError(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Default config file location under the user config directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sotto").join("config.toml"))
    }

    /// Load from the default location, falling back to defaults when the
    /// file does not exist. A file that exists but fails to parse is an
    /// error rather than a silent fallback.
    pub fn load_or_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }
}
