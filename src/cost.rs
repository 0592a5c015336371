//! API cost estimation and session cost tracking
//!
//! Unit prices are USD per 1000 tokens (realtime and chat completion) or
//! per minute (transcription). Streaming text is costed provisionally at
//! four characters per token; those provisional amounts are tracked
//! separately from authoritative usage records and are never reconciled
//! against them once the final usage arrives.

use crate::events::RealtimeUsage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unit prices, USD
pub mod pricing {
    /// Realtime API, per 1K tokens
    pub const REALTIME_INPUT_TEXT: f64 = 0.005;
    pub const REALTIME_OUTPUT_TEXT: f64 = 0.02;
    pub const REALTIME_INPUT_AUDIO: f64 = 0.10;
    pub const REALTIME_OUTPUT_AUDIO: f64 = 0.20;

    /// Chat Completions API, per 1K tokens
    pub const CHAT_INPUT: f64 = 0.003;
    pub const CHAT_OUTPUT: f64 = 0.012;
    pub const CHAT_REASONING: f64 = 0.003;

    /// Transcription, per minute of audio
    pub const TRANSCRIPTION_PER_MINUTE: f64 = 0.006;

    /// Rough audio pacing used to convert audio tokens to minutes
    pub const AUDIO_TOKENS_PER_MINUTE: f64 = 1500.0;
}

/// Token usage reported by the chat completions API
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ChatUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub reasoning_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Per-category cost of one realtime response
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RealtimeCost {
    pub input_text: f64,
    pub output_text: f64,
    pub input_audio: f64,
    pub output_audio: f64,
    pub total: f64,
}

/// Cost of a realtime response from its authoritative usage
pub fn realtime_cost(usage: &RealtimeUsage) -> RealtimeCost {
    let input_text = usage.input_text_tokens as f64 * pricing::REALTIME_INPUT_TEXT / 1000.0;
    let output_text = usage.output_text_tokens as f64 * pricing::REALTIME_OUTPUT_TEXT / 1000.0;
    let input_audio = usage.input_audio_tokens as f64 * pricing::REALTIME_INPUT_AUDIO / 1000.0;
    let output_audio = usage.output_audio_tokens as f64 * pricing::REALTIME_OUTPUT_AUDIO / 1000.0;
    RealtimeCost {
        input_text,
        output_text,
        input_audio,
        output_audio,
        total: input_text + output_text + input_audio + output_audio,
    }
}

/// Per-category cost of one chat completion
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ChatCost {
    pub input: f64,
    pub output: f64,
    pub reasoning: f64,
    pub total: f64,
}

/// Cost of a chat completion from its reported usage
pub fn chat_completion_cost(usage: &ChatUsage) -> ChatCost {
    let input = usage.prompt_tokens as f64 * pricing::CHAT_INPUT / 1000.0;
    let output = usage.completion_tokens as f64 * pricing::CHAT_OUTPUT / 1000.0;
    let reasoning = usage.reasoning_tokens as f64 * pricing::CHAT_REASONING / 1000.0;
    ChatCost {
        input,
        output,
        reasoning,
        total: input + output + reasoning,
    }
}

/// Cost of audio transcription by duration
pub fn transcription_cost(duration_minutes: f64) -> f64 {
    duration_minutes * pricing::TRANSCRIPTION_PER_MINUTE
}

/// Rough token estimate while authoritative counts are unavailable
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64).div_ceil(4)
}

/// Approximate audio duration from an audio token count
pub fn estimate_audio_minutes(audio_tokens: u64) -> f64 {
    audio_tokens as f64 / pricing::AUDIO_TOKENS_PER_MINUTE
}

/// Provisional cost of a streamed output-text delta
pub fn estimate_output_delta_cost(delta: &str) -> f64 {
    estimate_tokens(delta) as f64 * pricing::REALTIME_OUTPUT_TEXT / 1000.0
}

/// Provisional cost of a completed voice transcription
pub fn estimate_transcript_cost(transcript: &str) -> f64 {
    estimate_tokens(transcript) as f64 * pricing::REALTIME_INPUT_AUDIO / 1000.0
}

/// Format a USD amount, keeping sub-cent precision for small values
pub fn format_usd(cost: f64) -> String {
    if cost < 0.01 {
        format!("${:.4}", cost)
    } else {
        format!("${:.2}", cost)
    }
}

/// What a cost record accounts for
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CostKind {
    RealtimeResponse,
    ImageAnalysis,
    /// Provisional estimate made before authoritative usage exists
    AudioTranscription,
}

/// One immutable cost entry
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CostRecord {
    pub kind: CostKind,
    pub token_breakdown: BTreeMap<String, u64>,
    pub total_cost: f64,
    pub timestamp: DateTime<Utc>,
}

impl CostRecord {
    pub fn new(kind: CostKind, token_breakdown: BTreeMap<String, u64>, total_cost: f64) -> Self {
        Self {
            kind,
            token_breakdown,
            total_cost,
            timestamp: Utc::now(),
        }
    }

    /// Record for a completed realtime response
    pub fn realtime(usage: &RealtimeUsage) -> Self {
        let cost = realtime_cost(usage);
        let mut breakdown = BTreeMap::new();
        breakdown.insert("input_text_tokens".to_string(), usage.input_text_tokens);
        breakdown.insert("output_text_tokens".to_string(), usage.output_text_tokens);
        breakdown.insert("input_audio_tokens".to_string(), usage.input_audio_tokens);
        breakdown.insert("output_audio_tokens".to_string(), usage.output_audio_tokens);
        Self::new(CostKind::RealtimeResponse, breakdown, cost.total)
    }

    /// Record for one image analysis round-trip
    pub fn image_analysis(total_cost: f64, usage: Option<&ChatUsage>) -> Self {
        let mut breakdown = BTreeMap::new();
        if let Some(usage) = usage {
            breakdown.insert("prompt_tokens".to_string(), usage.prompt_tokens);
            breakdown.insert("completion_tokens".to_string(), usage.completion_tokens);
            breakdown.insert("reasoning_tokens".to_string(), usage.reasoning_tokens);
        }
        Self::new(CostKind::ImageAnalysis, breakdown, total_cost)
    }

    /// Provisional record for a finalized voice transcription
    pub fn transcription_estimate(transcript: &str) -> Self {
        let tokens = estimate_tokens(transcript);
        let mut breakdown = BTreeMap::new();
        breakdown.insert("input_audio_tokens".to_string(), tokens);
        Self::new(
            CostKind::AudioTranscription,
            breakdown,
            estimate_transcript_cost(transcript),
        )
    }
}

/// Running cost and response-count state for one session
///
/// `blocked` latches on when the running total reaches the cost limit or
/// the response count reaches its cap; it stays on until explicitly
/// cleared or the session restarts.
#[derive(Clone, Debug)]
pub struct CostTracker {
    records: Vec<CostRecord>,
    records_total: f64,
    provisional_total: f64,
    limit: f64,
    response_count: u32,
    max_responses: u32,
    blocked: bool,
}

impl CostTracker {
    pub fn new(limit: f64, max_responses: u32) -> Self {
        Self {
            records: Vec::new(),
            records_total: 0.0,
            provisional_total: 0.0,
            limit,
            response_count: 0,
            max_responses,
            blocked: false,
        }
    }

    pub fn records(&self) -> &[CostRecord] {
        &self.records
    }

    /// Total of all recorded costs plus streaming estimates
    pub fn running_total(&self) -> f64 {
        self.records_total + self.provisional_total
    }

    /// Sum of authoritative and provisional records only
    pub fn records_total(&self) -> f64 {
        self.records_total
    }

    pub fn limit(&self) -> f64 {
        self.limit
    }

    pub fn response_count(&self) -> u32 {
        self.response_count
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    pub fn limit_reached(&self) -> bool {
        self.running_total() >= self.limit
    }

    pub fn responses_exhausted(&self) -> bool {
        self.response_count >= self.max_responses
    }

    /// True when an automatic response may be triggered
    pub fn can_auto_respond(&self) -> bool {
        !self.blocked && !self.limit_reached() && !self.responses_exhausted()
    }

    /// Append a cost record and latch `blocked` if a threshold is crossed
    pub fn record(&mut self, record: CostRecord) {
        self.records_total += record.total_cost;
        self.records.push(record);
        if self.limit_reached() {
            self.blocked = true;
        }
    }

    /// Add a provisional streaming estimate to the running total
    pub fn add_streaming_estimate(&mut self, cost: f64) {
        self.provisional_total += cost;
    }

    /// Count one triggered response; latches `blocked` at the cap
    pub fn note_response(&mut self) {
        self.response_count += 1;
        if self.responses_exhausted() {
            self.blocked = true;
        }
    }

    pub fn block(&mut self) {
        self.blocked = true;
    }

    /// Manual unblock; thresholds will latch it again on the next crossing
    pub fn unblock(&mut self) {
        self.blocked = false;
    }

    /// Reset all counters for a fresh session
    pub fn reset(&mut self) {
        self.records.clear();
        self.records_total = 0.0;
        self.provisional_total = 0.0;
        self.response_count = 0;
        self.blocked = false;
    }

    /// Sum recorded costs per kind
    pub fn totals_by_kind(&self) -> BTreeMap<CostKind, f64> {
        let mut totals = BTreeMap::new();
        for record in &self.records {
            *totals.entry(record.kind).or_insert(0.0) += record.total_cost;
        }
        totals
    }
}
