//! Interaction modes and their session instructions
//!
//! Exactly one mode is active at a time. Activating interview mode turns
//! advisor mode off and vice versa; returning to normal clears both. The
//! base instructions always demand text-only responses and English-only
//! transcription, whatever the mode.

use crate::config::VadConfig;
use crate::events::{SessionConfig, TranscriptionConfig, TRANSCRIPTION_MODEL};
use serde::{Deserialize, Serialize};

const BASE_INSTRUCTIONS: &str = "You are a helpful assistant. You must ALWAYS respond in text \
format only, never generate audio. The user speaks ONLY in English - treat all voice input as \
English language only, never detect other languages.";

const INTERVIEW_INSTRUCTIONS: &str = "\n\n**INTERVIEW MODE**: You are conducting an interview. \
Ask thoughtful follow-up questions and engage naturally with the conversation. Keep responses \
concise and focused.";

const ADVISOR_INSTRUCTIONS: &str = "\n\n**CRITICAL THIRD PERSON ADVISOR MODE INSTRUCTIONS**: \n\
- You are ONLY an advisor listening to a conversation between two people\n\
- DO NOT respond to any voice input automatically - IGNORE ALL VOICE INPUT\n\
- DO NOT interrupt the conversation under any circumstances\n\
- DO NOT generate any responses unless explicitly asked via text message\n\
- ONLY respond when someone sends you a direct text message asking for advice\n\
- When responding, be brief and concise to minimize cost\n\
- Your role is to LISTEN SILENTLY and provide advice ONLY when requested via text\n\
- Treat all voice input as conversation you are observing, not directed at you\n\
- NEVER respond to voice input - only to text messages asking for advice";

/// Interaction mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Normal,
    Interview,
    Advisor,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Normal => "normal",
            Mode::Interview => "interview",
            Mode::Advisor => "advisor",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interview style, shaping the synthesized response prompt
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterviewType {
    #[default]
    General,
    Technical,
    Behavioral,
    Panel,
}

/// Settings for interview mode auto-response
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct InterviewSettings {
    /// Minimum analyzer confidence before auto-responding
    pub response_threshold: f64,
    pub auto_respond: bool,
    pub interview_type: InterviewType,
}

impl Default for InterviewSettings {
    fn default() -> Self {
        Self {
            response_threshold: 0.7,
            auto_respond: true,
            interview_type: InterviewType::General,
        }
    }
}

/// Settings for third-person advisor mode
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorSettings {
    /// Output cap for advice responses
    pub max_advice_tokens: u32,
}

impl Default for AdvisorSettings {
    fn default() -> Self {
        Self {
            max_advice_tokens: 300,
        }
    }
}

/// Tracks the active mode and derives per-mode session instructions
#[derive(Clone, Debug, Default)]
pub struct ModeController {
    current: Mode,
    pub interview: InterviewSettings,
    pub advisor: AdvisorSettings,
}

impl ModeController {
    pub fn new(interview: InterviewSettings, advisor: AdvisorSettings) -> Self {
        Self {
            current: Mode::Normal,
            interview,
            advisor,
        }
    }

    pub fn current(&self) -> Mode {
        self.current
    }

    pub fn is_interview(&self) -> bool {
        self.current == Mode::Interview
    }

    pub fn is_advisor(&self) -> bool {
        self.current == Mode::Advisor
    }

    /// Switch modes; returns true if the mode actually changed.
    ///
    /// Activating one specialized mode implicitly deactivates the other,
    /// since `current` can hold only one value.
    pub fn set_mode(&mut self, target: Mode) -> bool {
        if self.current == target {
            return false;
        }
        self.current = target;
        true
    }

    /// Instruction text for the active mode
    pub fn instructions(&self) -> String {
        self.instructions_for(self.current)
    }

    /// Instruction text for a given mode
    pub fn instructions_for(&self, mode: Mode) -> String {
        match mode {
            Mode::Normal => BASE_INSTRUCTIONS.to_string(),
            Mode::Interview => format!("{}{}", BASE_INSTRUCTIONS, INTERVIEW_INSTRUCTIONS),
            Mode::Advisor => format!("{}{}", BASE_INSTRUCTIONS, ADVISOR_INSTRUCTIONS),
        }
    }

    /// Full `session.update` payload for the active mode
    pub fn session_config(&self, vad: &VadConfig) -> SessionConfig {
        SessionConfig {
            instructions: self.instructions(),
            modalities: vec!["text".to_string(), "audio".to_string()],
            input_audio_transcription: TranscriptionConfig {
                model: TRANSCRIPTION_MODEL.to_string(),
            },
            turn_detection: vad.to_turn_detection(),
        }
    }
}
