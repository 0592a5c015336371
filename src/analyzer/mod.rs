//! Conversation transcript analysis for interview mode
//!
//! Classifies each finalized voice transcript as a question and/or
//! interviewer speech, derives flow signals from recent history, and
//! decides whether an automatic candidate response is warranted. The
//! analyzer keeps a bounded history per session; reactivating interview
//! mode resets it.

pub mod prompt;

use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::VecDeque;

/// Entries of history retained for flow analysis
const HISTORY_LIMIT: usize = 20;
/// Entries considered for conversation-flow signals
const FLOW_WINDOW: usize = 3;
/// Entries considered for recent-activity and context checks
const RECENT_WINDOW: usize = 5;

/// How a question was recognized
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuestionKind {
    /// Trailing question mark
    Punctuation,
    /// Matched a question phrase pattern
    Phrase,
    /// Trailing confirmation word suggesting rising intonation
    Intonation,
    None,
}

/// Question classification of a single transcript
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuestionSignal {
    pub detected: bool,
    pub kind: QuestionKind,
    pub confidence: f64,
}

impl QuestionSignal {
    fn none() -> Self {
        Self {
            detected: false,
            kind: QuestionKind::None,
            confidence: 0.0,
        }
    }
}

/// Interviewer-speech classification of a single transcript
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpeakerSignal {
    pub detected: bool,
    pub confidence: f64,
}

/// Conversation pace bucket
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pace {
    Fast,
    Normal,
    Slow,
    Unknown,
}

/// Signals derived from the recent conversation flow
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlowSignals {
    pub recent_questions: usize,
    pub speaker_changes: usize,
    pub pace: Pace,
    pub topic_shift: bool,
}

/// Tone the synthesized response should take
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseStyle {
    Experience,
    Technical,
    Example,
    Motivation,
    General,
}

/// Context handed to the prompt builder when a response is warranted
#[derive(Clone, Debug, PartialEq)]
pub struct ResponseContext {
    pub question: String,
    /// Recent transcripts joined as conversational context
    pub context: String,
    pub question_kind: QuestionKind,
    pub interviewer_confidence: f64,
    pub style: ResponseStyle,
}

/// Outcome of analyzing one transcript
#[derive(Clone, Debug)]
pub struct TranscriptAnalysis {
    pub transcript: String,
    pub question: QuestionSignal,
    pub interviewer: SpeakerSignal,
    pub flow: FlowSignals,
    pub should_respond: bool,
    pub confidence: f64,
    pub reason: &'static str,
    pub response: Option<ResponseContext>,
}

impl TranscriptAnalysis {
    fn declined(transcript: &str, reason: &'static str) -> Self {
        Self {
            transcript: transcript.to_string(),
            question: QuestionSignal::none(),
            interviewer: SpeakerSignal {
                detected: false,
                confidence: 0.0,
            },
            flow: FlowSignals {
                recent_questions: 0,
                speaker_changes: 0,
                pace: Pace::Unknown,
                topic_shift: false,
            },
            should_respond: false,
            confidence: 0.0,
            reason,
            response: None,
        }
    }
}

/// Aggregate view of the analyzed conversation so far
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ConversationSummary {
    pub total_entries: usize,
    pub total_questions: usize,
    pub interviewer_statements: usize,
    pub average_question_confidence: f64,
    pub duration_ms: i64,
}

#[derive(Clone, Debug)]
struct HistoryEntry {
    transcript: String,
    timestamp: DateTime<Utc>,
    question: QuestionSignal,
    interviewer: SpeakerSignal,
}

/// Stateful per-session transcript analyzer
pub struct ConversationAnalyzer {
    history: VecDeque<HistoryEntry>,
    question_patterns: Vec<Regex>,
    interviewer_patterns: Vec<Regex>,
    formal_patterns: Vec<Regex>,
}

impl Default for ConversationAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationAnalyzer {
    pub fn new() -> Self {
        Self {
            history: VecDeque::new(),
            question_patterns: compile_set(&[
                // Direct question words
                r"(?i)\b(what|how|why|when|where|who|which|whose|whom)\b",
                // Question phrases
                r"(?i)\b(can you|could you|would you|will you|do you|did you|have you|are you|is it|was it)\b",
                // Interview-specific questions
                r"(?i)\b(tell me about|describe|explain|walk me through|give me an example)\b",
                // Opinion/experience questions
                r"(?i)\b(what's your|how do you|what would you|how would you)\b",
                // Clarification questions
                r"(?i)\b(could you clarify|what do you mean|can you elaborate)\b",
            ]),
            interviewer_patterns: compile_set(&[
                r"(?i)\b(next question|moving on|let's talk about|another question)\b",
                r"(?i)\b(thank you|thanks|okay|alright|good|great|excellent)\b.*\b(now|next|so)\b",
                r"(?i)\b(final question|last question|one more thing)\b",
            ]),
            formal_patterns: compile_set(&[
                r"(?i)\b(we're looking for|we need|the role requires|this position)\b",
                r"(?i)\b(our company|our team|we offer|we provide)\b",
                r"(?i)\b(interview|position|role|candidate|experience|qualifications)\b",
            ]),
        }
    }

    /// Analyze one finalized transcript and record it in history
    pub fn analyze(&mut self, transcript: &str, timestamp: DateTime<Utc>) -> TranscriptAnalysis {
        let trimmed = transcript.trim();
        if trimmed.is_empty() {
            return TranscriptAnalysis::declined(transcript, "empty_transcript");
        }

        let question = self.detect_question(trimmed);
        let interviewer = self.detect_interviewer(trimmed);
        // Flow is computed over entries seen before this one
        let flow = self.conversation_flow(trimmed);

        self.push_history(HistoryEntry {
            transcript: trimmed.to_string(),
            timestamp,
            question,
            interviewer,
        });

        let (should_respond, confidence, reason) = self.decide(question, interviewer, flow);
        let response = if should_respond {
            Some(self.response_context(trimmed, question, interviewer))
        } else {
            None
        };

        TranscriptAnalysis {
            transcript: trimmed.to_string(),
            question,
            interviewer,
            flow,
            should_respond,
            confidence,
            reason,
            response,
        }
    }

    /// Clear state for a fresh interview
    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Aggregate view of the analyzed history
    pub fn summary(&self) -> ConversationSummary {
        let questions: Vec<_> = self.history.iter().filter(|e| e.question.detected).collect();
        let average = if questions.is_empty() {
            0.0
        } else {
            questions.iter().map(|e| e.question.confidence).sum::<f64>() / questions.len() as f64
        };
        let duration_ms = match (self.history.front(), self.history.back()) {
            (Some(first), Some(last)) => (last.timestamp - first.timestamp).num_milliseconds(),
            _ => 0,
        };
        ConversationSummary {
            total_entries: self.history.len(),
            total_questions: questions.len(),
            interviewer_statements: self
                .history
                .iter()
                .filter(|e| e.interviewer.detected)
                .count(),
            average_question_confidence: average,
            duration_ms,
        }
    }

    fn detect_question(&self, text: &str) -> QuestionSignal {
        let lowered = text.to_lowercase();

        if lowered.ends_with('?') {
            return QuestionSignal {
                detected: true,
                kind: QuestionKind::Punctuation,
                confidence: 0.9,
            };
        }

        if self.question_patterns.iter().any(|p| p.is_match(&lowered)) {
            return QuestionSignal {
                detected: true,
                kind: QuestionKind::Phrase,
                confidence: 0.8,
            };
        }

        // Trailing confirmation words hint at rising intonation
        const RISING_WORDS: &[&str] = &["right", "okay", "yes", "no", "correct", "true", "false"];
        if RISING_WORDS.iter().any(|word| lowered.ends_with(word)) {
            return QuestionSignal {
                detected: true,
                kind: QuestionKind::Intonation,
                confidence: 0.6,
            };
        }

        QuestionSignal::none()
    }

    fn detect_interviewer(&self, text: &str) -> SpeakerSignal {
        if self.interviewer_patterns.iter().any(|p| p.is_match(text)) {
            return SpeakerSignal {
                detected: true,
                confidence: 0.9,
            };
        }
        if self.formal_patterns.iter().any(|p| p.is_match(text)) {
            return SpeakerSignal {
                detected: true,
                confidence: 0.7,
            };
        }
        SpeakerSignal {
            detected: false,
            confidence: 0.3,
        }
    }

    fn conversation_flow(&self, current: &str) -> FlowSignals {
        let recent: Vec<&HistoryEntry> = self
            .history
            .iter()
            .rev()
            .take(FLOW_WINDOW)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();

        let recent_questions = recent.iter().filter(|e| e.question.detected).count();
        let speaker_changes = recent
            .windows(2)
            .filter(|pair| pair[0].interviewer.detected != pair[1].interviewer.detected)
            .count();
        let pace = Self::pace(&recent);
        let topic_shift = Self::topic_shift(current, &recent);

        FlowSignals {
            recent_questions,
            speaker_changes,
            pace,
            topic_shift,
        }
    }

    fn pace(recent: &[&HistoryEntry]) -> Pace {
        if recent.len() < 2 {
            return Pace::Unknown;
        }
        let span_ms = (recent[recent.len() - 1].timestamp - recent[0].timestamp)
            .num_milliseconds()
            .max(1) as f64;
        let entries_per_minute = recent.len() as f64 / span_ms * 60_000.0;
        if entries_per_minute > 10.0 {
            Pace::Fast
        } else if entries_per_minute > 5.0 {
            Pace::Normal
        } else {
            Pace::Slow
        }
    }

    fn topic_shift(current: &str, recent: &[&HistoryEntry]) -> bool {
        if recent.is_empty() {
            return false;
        }
        const TOPIC_KEYWORDS: &[&str] = &[
            "experience",
            "background",
            "technical",
            "project",
            "team",
            "challenge",
            "achievement",
            "goal",
            "skill",
            "technology",
            "role",
            "responsibility",
        ];

        let current_lower = current.to_lowercase();
        let current_topics: Vec<&str> = TOPIC_KEYWORDS
            .iter()
            .copied()
            .filter(|k| current_lower.contains(k))
            .collect();

        let tail = recent.len().saturating_sub(2);
        let recent_topics: Vec<&str> = recent[tail..]
            .iter()
            .flat_map(|entry| {
                let lowered = entry.transcript.to_lowercase();
                TOPIC_KEYWORDS
                    .iter()
                    .copied()
                    .filter(move |k| lowered.contains(k))
                    .collect::<Vec<_>>()
            })
            .collect();

        let common = current_topics
            .iter()
            .filter(|t| recent_topics.contains(t))
            .count();
        (common as f64) < current_topics.len() as f64 * 0.5
    }

    /// Priority-ordered response decision
    fn decide(
        &self,
        question: QuestionSignal,
        interviewer: SpeakerSignal,
        flow: FlowSignals,
    ) -> (bool, f64, &'static str) {
        if !question.detected {
            return (false, 0.0, "no_question_detected");
        }
        if question.confidence > 0.8 && interviewer.detected {
            return (true, 0.9, "clear_interviewer_question");
        }
        if question.confidence > 0.7 && flow.recent_questions > 0 {
            return (true, 0.7, "likely_question_in_interview_context");
        }
        if question.confidence > 0.5 && self.has_recent_interview_activity() {
            return (true, 0.5, "possible_question_in_interview");
        }
        (false, 0.0, "insufficient_confidence")
    }

    fn has_recent_interview_activity(&self) -> bool {
        self.history
            .iter()
            .rev()
            .take(RECENT_WINDOW)
            .any(|e| e.question.detected || e.interviewer.detected)
    }

    fn response_context(
        &self,
        transcript: &str,
        question: QuestionSignal,
        interviewer: SpeakerSignal,
    ) -> ResponseContext {
        let context = self
            .history
            .iter()
            .rev()
            .take(RECENT_WINDOW)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .map(|e| e.transcript.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        ResponseContext {
            question: transcript.to_string(),
            context,
            question_kind: question.kind,
            interviewer_confidence: interviewer.confidence,
            style: Self::response_style(transcript),
        }
    }

    fn response_style(transcript: &str) -> ResponseStyle {
        let text = transcript.to_lowercase();
        if text.contains("experience") || text.contains("background") {
            ResponseStyle::Experience
        } else if text.contains("technical") || text.contains("how do you") {
            ResponseStyle::Technical
        } else if text.contains("example") || text.contains("tell me about") {
            ResponseStyle::Example
        } else if text.contains("why") || text.contains("what motivates") {
            ResponseStyle::Motivation
        } else {
            ResponseStyle::General
        }
    }

    fn push_history(&mut self, entry: HistoryEntry) {
        self.history.push_back(entry);
        while self.history.len() > HISTORY_LIMIT {
            self.history.pop_front();
        }
    }
}

fn compile_set(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("static pattern compiles"))
        .collect()
}
