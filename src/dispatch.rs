//! Inbound event dispatch and response throttling
//!
//! The dispatcher consumes protocol events strictly in arrival order and
//! returns the side effects to perform as [`Action`] values; it never
//! sends or sleeps itself, which keeps every policy decision synchronous
//! and testable. Delayed triggers (auto-resume, transcription settle,
//! interview prompts) come back as [`Action::Schedule`] entries for the
//! runtime's scheduler.
//!
//! Policy invariants:
//! - at most one response-request is outstanding at a time
//! - no automatic response while listening is paused
//! - no automatic response in advisor mode
//! - once blocked by cost or response-count limits, no automatic response
//!   until explicitly unblocked or the session restarts
//! - per transcript, at most one of {interview trigger, generic trigger}
//!   is scheduled

use crate::analyzer::prompt::build_interview_prompt;
use crate::analyzer::ConversationAnalyzer;
use crate::config::{Config, LimitsConfig, TimingConfig, VadConfig};
use crate::conversation::{Conversation, ConversationEntry, EntryFlags, Role};
use crate::cost::{self, CostRecord, CostTracker};
use crate::events::{ClientEvent, ConversationItem, ResponseParams, ServerEvent, SessionConfig};
use crate::mode::{Mode, ModeController};
use crate::state::{GenerationState, ListeningState, SessionStatus, StatusSnapshot};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Voice transcripts of context attached to an advice request
const ADVICE_CONTEXT_ENTRIES: usize = 10;

/// A side effect requested by the dispatcher
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// Send an event over the realtime channel
    Send(ClientEvent),
    /// Run a delayed trigger unless the session restarts first
    Schedule {
        delay: Duration,
        action: DelayedAction,
    },
    /// Enable or disable the local capture track
    SetCaptureEnabled(bool),
    /// Show an error to the user
    SurfaceError(String),
}

/// Work performed when a scheduled trigger fires
#[derive(Clone, Debug, PartialEq)]
pub enum DelayedAction {
    /// Lift a pause that was armed during response generation
    AutoResume,
    /// Request a response for a settled transcription
    TriggerResponse,
    /// Send a synthesized interview prompt and request a response
    TriggerInterviewPrompt { prompt: String },
}

/// Event dispatcher and response-throttle state machine
pub struct Dispatcher {
    conversation: Conversation,
    costs: CostTracker,
    listening: ListeningState,
    generation: GenerationState,
    modes: ModeController,
    analyzer: ConversationAnalyzer,
    speech_active: bool,
    limits: LimitsConfig,
    timing: TimingConfig,
    vad: VadConfig,
}

impl Dispatcher {
    pub fn new(config: &Config) -> Self {
        Self {
            conversation: Conversation::new(),
            costs: CostTracker::new(config.limits.cost_limit_usd, config.limits.max_responses),
            listening: ListeningState::new(),
            generation: GenerationState::new(),
            modes: ModeController::new(config.interview, config.advisor),
            analyzer: ConversationAnalyzer::new(),
            speech_active: false,
            limits: config.limits,
            timing: config.timing,
            vad: config.vad,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn costs(&self) -> &CostTracker {
        &self.costs
    }

    pub fn mode(&self) -> Mode {
        self.modes.current()
    }

    pub fn listening(&self) -> ListeningState {
        self.listening
    }

    pub fn generation(&self) -> GenerationState {
        self.generation
    }

    /// Full `session.update` payload for the active mode
    pub fn session_config(&self) -> SessionConfig {
        self.modes.session_config(&self.vad)
    }

    /// Prepare for a fresh session: clear the transcript and reset all
    /// per-session counters and state machines.
    pub fn begin_session(&mut self) {
        self.conversation.clear();
        self.costs.reset();
        self.listening.reset();
        self.generation.reset();
        self.speech_active = false;
    }

    /// The session stopped: reset per-session state, keep the transcript
    /// on screen.
    pub fn end_session(&mut self) {
        self.costs.reset();
        self.listening.reset();
        self.generation.reset();
        self.speech_active = false;
        self.conversation.finish_stream();
        self.conversation.close_partial();
    }

    /// Manually clear a cost/response block
    pub fn unblock(&mut self) {
        self.costs.unblock();
    }

    /// Process one inbound protocol event
    pub fn handle_event(&mut self, event: ServerEvent, now: DateTime<Utc>) -> Vec<Action> {
        match event {
            ServerEvent::TextDelta { delta } | ServerEvent::AudioTranscriptDelta { delta } => {
                self.on_stream_delta(&delta)
            }
            ServerEvent::TextDone | ServerEvent::AudioTranscriptDone => {
                self.conversation.finish_stream();
                Vec::new()
            }
            ServerEvent::ResponseCreated => {
                debug!("Response generation started");
                self.generation.begin();
                Vec::new()
            }
            ServerEvent::ResponseDone { response } => self.on_response_done(response),
            ServerEvent::TranscriptionCompleted { transcript } => {
                self.on_transcription_completed(&transcript, now)
            }
            ServerEvent::TranscriptionPartial { transcript } => {
                if !transcript.is_empty() {
                    self.conversation.upsert_partial(&transcript);
                }
                Vec::new()
            }
            ServerEvent::TranscriptionFailed => {
                warn!("Voice transcription failed");
                Vec::new()
            }
            ServerEvent::SpeechStarted => {
                self.speech_active = true;
                Vec::new()
            }
            ServerEvent::SpeechStopped => {
                self.speech_active = false;
                Vec::new()
            }
            ServerEvent::Error { error } => {
                self.generation.clear();
                if error.is_benign_conflict() {
                    debug!("Swallowing benign response conflict: {}", error.describe());
                    Vec::new()
                } else {
                    vec![Action::SurfaceError(format!(
                        "API error - {}",
                        error.describe()
                    ))]
                }
            }
            ServerEvent::Other => Vec::new(),
        }
    }

    /// Run a delayed trigger that survived until its deadline
    pub fn fire_delayed(&mut self, action: DelayedAction) -> Vec<Action> {
        match action {
            DelayedAction::AutoResume => {
                if self.listening.auto_resume() {
                    info!("Voice listening automatically resumed after response completion");
                    vec![Action::SetCaptureEnabled(true)]
                } else {
                    Vec::new()
                }
            }
            DelayedAction::TriggerResponse => {
                debug!("Triggering text-only response for settled transcription");
                self.generation.begin();
                vec![Action::Send(ClientEvent::response_create(
                    ResponseParams::text(Some(self.limits.max_response_tokens)),
                ))]
            }
            DelayedAction::TriggerInterviewPrompt { prompt } => {
                self.conversation
                    .push(ConversationEntry::new(Role::User, prompt.as_str()));
                self.generation.begin();
                vec![
                    Action::Send(ClientEvent::item_create(ConversationItem::user_text(
                        prompt,
                    ))),
                    Action::Send(ClientEvent::response_create(ResponseParams::text(None))),
                ]
            }
        }
    }

    fn on_stream_delta(&mut self, delta: &str) -> Vec<Action> {
        if delta.is_empty() {
            return Vec::new();
        }
        self.costs
            .add_streaming_estimate(cost::estimate_output_delta_cost(delta));
        self.conversation.append_stream_delta(delta, true);
        Vec::new()
    }

    fn on_response_done(&mut self, response: crate::events::ResponseSummary) -> Vec<Action> {
        self.generation.clear();
        let mut actions = Vec::new();

        if self.listening.should_auto_resume() {
            debug!("Scheduling auto-resume after response completion");
            actions.push(Action::Schedule {
                delay: Duration::from_millis(self.timing.auto_resume_ms),
                action: DelayedAction::AutoResume,
            });
        }

        if let Some(usage) = &response.usage {
            let record = CostRecord::realtime(usage);
            info!(
                "Realtime response cost: {}",
                cost::format_usd(record.total_cost)
            );
            self.costs.record(record);
            if self.costs.is_blocked() {
                info!(
                    "Cost limit reached ({}), automatic responses blocked",
                    cost::format_usd(self.costs.limit())
                );
            }
        } else {
            debug!("No usage data in completed response");
        }

        for text in response.output_texts() {
            self.conversation.absorb_final_text(text);
        }
        actions
    }

    fn on_transcription_completed(
        &mut self,
        transcript: &str,
        now: DateTime<Utc>,
    ) -> Vec<Action> {
        if self.listening.is_paused() {
            debug!("Listening paused, dropping transcription");
            return Vec::new();
        }
        let trimmed = transcript.trim();
        if trimmed.is_empty() {
            debug!("Empty transcription, ignoring");
            return Vec::new();
        }

        self.conversation.close_partial();
        self.conversation.push(ConversationEntry::voice_user(trimmed));
        self.costs
            .record(CostRecord::transcription_estimate(trimmed));

        if self.modes.is_advisor() {
            debug!("Advisor mode: transcript stored, no auto-response");
            return Vec::new();
        }

        if !self.costs.can_auto_respond() {
            self.costs.block();
            info!(
                "Automatic responses blocked: {} spent of {} limit, {} responses",
                cost::format_usd(self.costs.running_total()),
                cost::format_usd(self.costs.limit()),
                self.costs.response_count()
            );
            return Vec::new();
        }

        if self.modes.is_interview() {
            let analysis = self.analyzer.analyze(trimmed, now);
            debug!(
                "Interview analysis: respond={} confidence={:.2} reason={}",
                analysis.should_respond, analysis.confidence, analysis.reason
            );
            if analysis.should_respond {
                // The analyzer owns this transcript; whatever happens
                // below, the generic trigger must not also fire.
                if let Some(context) = &analysis.response {
                    if analysis.confidence >= self.modes.interview.response_threshold
                        && self.modes.interview.auto_respond
                        && !self.generation.is_in_flight()
                    {
                        let prompt = build_interview_prompt(
                            context,
                            self.modes.interview.interview_type,
                        );
                        self.generation.begin();
                        return vec![Action::Schedule {
                            delay: Duration::from_millis(self.timing.interview_delay_ms),
                            action: DelayedAction::TriggerInterviewPrompt { prompt },
                        }];
                    }
                }
                return Vec::new();
            }
            // Analyzer declined: the generic trigger takes over
        }

        if self.generation.is_in_flight() {
            debug!("Response already being generated, skipping new trigger");
            return Vec::new();
        }
        self.costs.note_response();
        self.generation.begin();
        vec![Action::Schedule {
            delay: Duration::from_millis(self.timing.response_delay_ms),
            action: DelayedAction::TriggerResponse,
        }]
    }

    /// Send a text message over the active session
    pub fn send_text_message(&mut self, text: &str, clipboard: bool) -> Vec<Action> {
        self.conversation.push(
            ConversationEntry::new(Role::User, text).with_flags(EntryFlags {
                is_clipboard: clipboard,
                ..EntryFlags::default()
            }),
        );
        let mut actions = vec![Action::Send(ClientEvent::item_create(
            ConversationItem::user_text(text),
        ))];
        if !self.generation.is_in_flight() {
            self.generation.begin();
            actions.push(Action::Send(ClientEvent::response_create(
                ResponseParams::text(None),
            )));
        }
        actions
    }

    /// Send an advice request with recent conversation context attached
    pub fn request_advice(&mut self, request: &str) -> Vec<Action> {
        let recent = self
            .conversation
            .recent_voice_transcripts(ADVICE_CONTEXT_ENTRIES)
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join("\n");
        let contextual = format!(
            "Based on the conversation I've been listening to:\n\n\
             RECENT CONVERSATION:\n{}\n\n\
             ADVICE REQUEST: {}\n\n\
             Please provide thoughtful advice based on the conversation context above.",
            recent, request
        );

        self.conversation.push(
            ConversationEntry::new(Role::User, request).with_flags(EntryFlags {
                is_advice_request: true,
                ..EntryFlags::default()
            }),
        );
        let mut actions = vec![Action::Send(ClientEvent::item_create(
            ConversationItem::user_text(contextual),
        ))];
        if !self.generation.is_in_flight() {
            self.generation.begin();
            actions.push(Action::Send(ClientEvent::response_create(
                ResponseParams::text(Some(self.modes.advisor.max_advice_tokens)),
            )));
        }
        actions
    }

    /// Toggle the listening pause; pausing mid-generation arms auto-resume
    pub fn toggle_pause(&mut self) -> Vec<Action> {
        if self.listening.is_paused() {
            self.listening.resume_manual();
            info!("Voice listening resumed");
            vec![Action::SetCaptureEnabled(true)]
        } else {
            let generating = self.generation.is_in_flight();
            self.listening.pause(generating);
            info!(
                "Voice listening paused{}",
                if generating {
                    " during generation, will auto-resume"
                } else {
                    ""
                }
            );
            vec![Action::SetCaptureEnabled(false)]
        }
    }

    /// Switch interaction mode
    ///
    /// Activating interview mode resets the analyzer; while a session is
    /// active the rebuilt instructions are re-sent.
    pub fn set_mode(&mut self, target: Mode, session_active: bool) -> Vec<Action> {
        if !self.modes.set_mode(target) {
            return Vec::new();
        }
        info!("Mode switched to {}", target);
        if target == Mode::Interview {
            self.analyzer.reset();
        }
        if session_active {
            vec![Action::Send(ClientEvent::session_update(
                self.session_config(),
            ))]
        } else {
            Vec::new()
        }
    }

    // === Sessionless API exchanges ===

    /// Open a sessionless chat exchange; returns the id of the assistant
    /// entry the streamed reply accumulates into.
    pub fn begin_sessionless_chat(&mut self, text: &str, clipboard: bool) -> Uuid {
        self.conversation.push(
            ConversationEntry::new(Role::User, text).with_flags(EntryFlags {
                is_clipboard: clipboard,
                ..EntryFlags::default()
            }),
        );
        self.conversation
            .push(ConversationEntry::new(Role::Assistant, "").with_flags(EntryFlags {
                is_streaming: true,
                ..EntryFlags::default()
            }))
    }

    /// Open an image-analysis exchange
    pub fn begin_image_analysis(&mut self, text: &str, system_prompt: &str) -> Uuid {
        self.conversation.push(
            ConversationEntry::new(Role::User, text).with_flags(EntryFlags {
                has_image: true,
                ..EntryFlags::default()
            }),
        );
        self.conversation
            .push(ConversationEntry::new(Role::System, system_prompt));
        self.conversation
            .push(ConversationEntry::new(Role::Assistant, "").with_flags(EntryFlags {
                is_streaming: true,
                has_image: true,
                ..EntryFlags::default()
            }))
    }

    /// Append a streamed chunk to an API exchange entry
    pub fn apply_api_chunk(&mut self, entry: Uuid, chunk: &str) {
        self.conversation.append_content(entry, chunk);
    }

    /// Complete an API exchange, optionally replacing the streamed text
    /// with the final result and recording its cost.
    pub fn complete_api_entry(
        &mut self,
        entry: Uuid,
        final_text: Option<&str>,
        cost_record: Option<CostRecord>,
    ) {
        if let Some(text) = final_text {
            self.conversation.set_content(entry, text);
        }
        self.conversation.finish_entry(entry);
        if let Some(record) = cost_record {
            info!(
                "API exchange cost: {}",
                cost::format_usd(record.total_cost)
            );
            self.costs.record(record);
        }
    }

    /// Fail an API exchange: keep any partial content already streamed,
    /// otherwise replace the pending entry with the error message.
    pub fn fail_api_entry(&mut self, entry: Uuid, message: &str) {
        let has_partial = self
            .conversation
            .get(entry)
            .map(|e| !e.content.is_empty())
            .unwrap_or(false);
        if has_partial {
            warn!("API stream failed, keeping partial content: {}", message);
            self.conversation.finish_entry(entry);
        } else {
            self.conversation.mark_error(entry, message);
        }
    }

    /// Build the status snapshot published to the UI
    pub fn status_snapshot(
        &self,
        session: SessionStatus,
        last_error: Option<String>,
    ) -> StatusSnapshot {
        StatusSnapshot {
            session,
            mode: self.modes.current(),
            speech_active: self.speech_active,
            paused: self.listening.is_paused(),
            generating: self.generation.is_in_flight(),
            blocked: self.costs.is_blocked(),
            running_cost: self.costs.running_total(),
            response_count: self.costs.response_count(),
            last_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ApiError, RealtimeUsage, ResponseSummary};

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(&Config::default())
    }

    fn transcription(text: &str) -> ServerEvent {
        ServerEvent::TranscriptionCompleted {
            transcript: text.to_string(),
        }
    }

    fn scheduled(actions: &[Action]) -> Vec<&DelayedAction> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Schedule { action, .. } => Some(action),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_deltas_then_done_yields_one_frozen_entry() {
        let mut d = dispatcher();
        let now = Utc::now();
        d.handle_event(
            ServerEvent::TextDelta {
                delta: "Hel".into(),
            },
            now,
        );
        d.handle_event(ServerEvent::TextDelta { delta: "lo".into() }, now);
        d.handle_event(ServerEvent::TextDone, now);

        let entries = d.conversation().entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].content, "Hello");
        assert!(!entries[0].flags.is_streaming);
    }

    #[test]
    fn test_transcription_triggers_delayed_response() {
        let mut d = dispatcher();
        let actions = d.handle_event(transcription("Hello there"), Utc::now());

        assert_eq!(scheduled(&actions), vec![&DelayedAction::TriggerResponse]);
        assert!(d.generation().is_in_flight());
        assert_eq!(d.costs().response_count(), 1);

        let fired = d.fire_delayed(DelayedAction::TriggerResponse);
        assert!(matches!(
            &fired[0],
            Action::Send(ClientEvent::ResponseCreate { response, .. })
                if response.max_output_tokens == Some(500)
        ));
    }

    #[test]
    fn test_second_transcription_coalesces_while_in_flight() {
        let mut d = dispatcher();
        let now = Utc::now();
        let first = d.handle_event(transcription("first question"), now);
        assert_eq!(scheduled(&first).len(), 1);

        let second = d.handle_event(transcription("second question"), now);
        assert!(scheduled(&second).is_empty());
        assert_eq!(d.costs().response_count(), 1);
    }

    #[test]
    fn test_paused_transcription_is_dropped_entirely() {
        let mut d = dispatcher();
        d.toggle_pause();

        let actions = d.handle_event(transcription("should vanish"), Utc::now());
        assert!(actions.is_empty());
        assert!(d.conversation().is_empty());
        assert_eq!(d.costs().records().len(), 0);
    }

    #[test]
    fn test_advisor_mode_stores_without_responding() {
        let mut d = dispatcher();
        d.set_mode(Mode::Advisor, false);

        let actions = d.handle_event(transcription("What do you think?"), Utc::now());
        assert!(actions.is_empty());
        assert_eq!(d.conversation().len(), 1);
        assert!(d.conversation().entries()[0].flags.is_voice);
        assert!(!d.generation().is_in_flight());
    }

    #[test]
    fn test_blocked_tracker_suppresses_triggers() {
        let mut d = dispatcher();
        d.costs.block();

        let actions = d.handle_event(transcription("anyone home?"), Utc::now());
        assert!(scheduled(&actions).is_empty());
        assert!(!d.generation().is_in_flight());

        // Unblocking restores the trigger path
        d.unblock();
        let actions = d.handle_event(transcription("now?"), Utc::now());
        assert_eq!(scheduled(&actions).len(), 1);
    }

    #[test]
    fn test_response_done_cost_crossing_limit_blocks() {
        let mut d = dispatcher();
        d.costs.add_streaming_estimate(4.99);

        let usage = RealtimeUsage {
            output_text_tokens: 1000, // $0.02
            ..RealtimeUsage::default()
        };
        d.handle_event(
            ServerEvent::ResponseDone {
                response: ResponseSummary {
                    usage: Some(usage),
                    output: Vec::new(),
                },
            },
            Utc::now(),
        );
        assert!(d.costs().is_blocked());
        assert!((d.costs().running_total() - 5.01).abs() < 1e-9);
    }

    #[test]
    fn test_auto_resume_scheduled_only_when_armed() {
        let mut d = dispatcher();

        // Pause while idle: no auto-resume on completion
        d.toggle_pause();
        let actions = d.handle_event(
            ServerEvent::ResponseDone {
                response: ResponseSummary::default(),
            },
            Utc::now(),
        );
        assert!(scheduled(&actions).is_empty());
        d.toggle_pause();

        // Pause during generation: auto-resume scheduled and fires once
        d.handle_event(ServerEvent::ResponseCreated, Utc::now());
        d.toggle_pause();
        let actions = d.handle_event(
            ServerEvent::ResponseDone {
                response: ResponseSummary::default(),
            },
            Utc::now(),
        );
        assert_eq!(scheduled(&actions), vec![&DelayedAction::AutoResume]);

        let fired = d.fire_delayed(DelayedAction::AutoResume);
        assert_eq!(fired, vec![Action::SetCaptureEnabled(true)]);
        assert!(!d.listening().is_paused());

        // A second firing is a no-op
        assert!(d.fire_delayed(DelayedAction::AutoResume).is_empty());
    }

    #[test]
    fn test_manual_resume_defuses_scheduled_auto_resume() {
        let mut d = dispatcher();
        d.handle_event(ServerEvent::ResponseCreated, Utc::now());
        d.toggle_pause();
        d.handle_event(
            ServerEvent::ResponseDone {
                response: ResponseSummary::default(),
            },
            Utc::now(),
        );

        // User resumes manually before the delayed trigger fires
        d.toggle_pause();
        assert!(d.fire_delayed(DelayedAction::AutoResume).is_empty());
    }

    #[test]
    fn test_interview_question_schedules_prompt_not_generic_trigger() {
        let mut d = dispatcher();
        d.set_mode(Mode::Interview, false);

        let actions = d.handle_event(
            transcription("Next question: tell me about your experience?"),
            Utc::now(),
        );
        let triggers = scheduled(&actions);
        assert_eq!(triggers.len(), 1);
        assert!(matches!(
            triggers[0],
            DelayedAction::TriggerInterviewPrompt { .. }
        ));
        // The generic path did not also run
        assert_eq!(d.costs().response_count(), 0);
    }

    #[test]
    fn test_interview_non_question_falls_back_to_generic_trigger() {
        let mut d = dispatcher();
        d.set_mode(Mode::Interview, false);

        let actions = d.handle_event(transcription("I worked there for a while."), Utc::now());
        assert_eq!(scheduled(&actions), vec![&DelayedAction::TriggerResponse]);
        assert_eq!(d.costs().response_count(), 1);
    }

    #[test]
    fn test_interview_prompt_fires_item_then_response() {
        let mut d = dispatcher();
        d.set_mode(Mode::Interview, false);
        d.handle_event(
            transcription("Next question: tell me about your experience?"),
            Utc::now(),
        );

        let fired = d.fire_delayed(DelayedAction::TriggerInterviewPrompt {
            prompt: "answer well".into(),
        });
        assert_eq!(fired.len(), 2);
        assert!(matches!(
            &fired[0],
            Action::Send(ClientEvent::ConversationItemCreate { .. })
        ));
        assert!(matches!(
            &fired[1],
            Action::Send(ClientEvent::ResponseCreate { response, .. })
                if response.max_output_tokens.is_none()
        ));
    }

    #[test]
    fn test_error_event_clears_in_flight_and_surfaces() {
        let mut d = dispatcher();
        d.handle_event(ServerEvent::ResponseCreated, Utc::now());
        assert!(d.generation().is_in_flight());

        let actions = d.handle_event(
            ServerEvent::Error {
                error: ApiError {
                    kind: Some("server_error".into()),
                    message: Some("boom".into()),
                },
            },
            Utc::now(),
        );
        assert!(!d.generation().is_in_flight());
        assert!(matches!(&actions[0], Action::SurfaceError(msg) if msg.contains("boom")));
    }

    #[test]
    fn test_benign_conflict_is_swallowed() {
        let mut d = dispatcher();
        let actions = d.handle_event(
            ServerEvent::Error {
                error: ApiError {
                    kind: Some("invalid_request_error".into()),
                    message: Some("Conversation already has an active response".into()),
                },
            },
            Utc::now(),
        );
        assert!(actions.is_empty());
    }

    #[test]
    fn test_final_text_absorbed_into_streaming_entry() {
        let mut d = dispatcher();
        let now = Utc::now();
        d.handle_event(
            ServerEvent::TextDelta {
                delta: "Hel".into(),
            },
            now,
        );
        d.handle_event(
            ServerEvent::ResponseDone {
                response: ResponseSummary {
                    usage: None,
                    output: vec![crate::events::OutputItem {
                        kind: "message".into(),
                        content: vec![crate::events::OutputContent {
                            kind: "text".into(),
                            text: "Hello world".into(),
                        }],
                    }],
                },
            },
            now,
        );

        assert_eq!(d.conversation().len(), 1);
        let entry = &d.conversation().entries()[0];
        assert_eq!(entry.content, "Hello world");
        assert!(!entry.flags.is_streaming);
    }

    #[test]
    fn test_send_text_message_coalesces_response_request() {
        let mut d = dispatcher();
        let first = d.send_text_message("hello", false);
        assert_eq!(first.len(), 2);

        let second = d.send_text_message("again", false);
        assert_eq!(second.len(), 1);
        assert!(matches!(
            &second[0],
            Action::Send(ClientEvent::ConversationItemCreate { .. })
        ));
    }

    #[test]
    fn test_advice_request_includes_voice_context_and_token_cap() {
        let mut d = dispatcher();
        d.set_mode(Mode::Advisor, false);
        d.handle_event(transcription("we should ship friday"), Utc::now());
        d.handle_event(transcription("marketing wants monday"), Utc::now());

        let actions = d.request_advice("who is right?");
        match &actions[0] {
            Action::Send(ClientEvent::ConversationItemCreate { item, .. }) => {
                let text = &item.content[0].text;
                assert!(text.contains("\"we should ship friday\""));
                assert!(text.contains("\"marketing wants monday\""));
                assert!(text.contains("ADVICE REQUEST: who is right?"));
            }
            other => panic!("Expected item create, got {:?}", other),
        }
        assert!(matches!(
            &actions[1],
            Action::Send(ClientEvent::ResponseCreate { response, .. })
                if response.max_output_tokens == Some(300)
        ));
    }

    #[test]
    fn test_mode_switch_resends_instructions_when_active() {
        let mut d = dispatcher();
        let actions = d.set_mode(Mode::Advisor, true);
        assert!(matches!(
            &actions[0],
            Action::Send(ClientEvent::SessionUpdate { session, .. })
                if session.instructions.contains("ADVISOR")
        ));

        // No-op switch produces nothing
        assert!(d.set_mode(Mode::Advisor, true).is_empty());
    }

    #[test]
    fn test_speech_markers_only_toggle_indicator() {
        let mut d = dispatcher();
        let started = d.handle_event(ServerEvent::SpeechStarted, Utc::now());
        assert!(started.is_empty());
        assert!(d.status_snapshot(SessionStatus::Active, None).speech_active);

        let stopped = d.handle_event(ServerEvent::SpeechStopped, Utc::now());
        assert!(stopped.is_empty());
        assert!(!d.status_snapshot(SessionStatus::Active, None).speech_active);
    }

    #[test]
    fn test_api_entry_failure_keeps_partial_content() {
        let mut d = dispatcher();
        let entry = d.begin_sessionless_chat("hi", false);
        d.apply_api_chunk(entry, "partial answer");
        d.fail_api_entry(entry, "stream cut");

        let kept = d.conversation().get(entry).unwrap();
        assert_eq!(kept.content, "partial answer");
        assert!(!kept.flags.is_error);

        let empty = d.begin_sessionless_chat("hi again", false);
        d.fail_api_entry(empty, "nothing came back");
        let failed = d.conversation().get(empty).unwrap();
        assert!(failed.flags.is_error);
        assert_eq!(failed.content, "nothing came back");
    }

    #[test]
    fn test_begin_session_resets_everything() {
        let mut d = dispatcher();
        d.handle_event(transcription("hello"), Utc::now());
        d.toggle_pause();
        d.costs.block();

        d.begin_session();
        assert!(d.conversation().is_empty());
        assert!(!d.listening().is_paused());
        assert!(!d.generation().is_in_flight());
        assert!(d.costs().can_auto_respond());
        assert_eq!(d.costs().response_count(), 0);
    }
}
