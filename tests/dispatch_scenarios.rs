//! End-to-end scenarios for the event dispatcher and throttle policy
//!
//! These drive the dispatcher through inbound event sequences the way
//! the runtime does, asserting the conversation, cost and policy
//! outcomes the system guarantees.

use chrono::Utc;
use sotto::config::Config;
use sotto::cost::{CostRecord, CostTracker};
use sotto::dispatch::{Action, DelayedAction, Dispatcher};
use sotto::events::{
    ApiError, RealtimeUsage, ResponseSummary, ServerEvent,
};
use sotto::mode::Mode;
use sotto::Scheduler;
use std::time::{Duration, Instant};

fn dispatcher() -> Dispatcher {
    Dispatcher::new(&Config::default())
}

fn transcription(text: &str) -> ServerEvent {
    ServerEvent::TranscriptionCompleted {
        transcript: text.to_string(),
    }
}

fn response_done_with_usage(usage: RealtimeUsage) -> ServerEvent {
    ServerEvent::ResponseDone {
        response: ResponseSummary {
            usage: Some(usage),
            output: Vec::new(),
        },
    }
}

fn scheduled_actions(actions: &[Action]) -> Vec<DelayedAction> {
    actions
        .iter()
        .filter_map(|a| match a {
            Action::Schedule { action, .. } => Some(action.clone()),
            _ => None,
        })
        .collect()
}

fn has_response_request(actions: &[Action]) -> bool {
    scheduled_actions(actions)
        .iter()
        .any(|a| matches!(a, DelayedAction::TriggerResponse))
        || actions.iter().any(|a| {
            matches!(
                a,
                Action::Send(sotto::events::ClientEvent::ResponseCreate { .. })
            )
        })
}

#[test]
fn delta_sequences_concatenate_and_freeze() {
    let mut d = dispatcher();
    let now = Utc::now();

    // Arbitrary split points must concatenate in arrival order
    for split in ["H,ello", "Hel,lo", "Hell,o", "He,l,lo"] {
        let mut d = dispatcher();
        for piece in split.split(',') {
            d.handle_event(
                ServerEvent::TextDelta {
                    delta: piece.to_string(),
                },
                now,
            );
        }
        d.handle_event(ServerEvent::TextDone, now);
        assert_eq!(d.conversation().entries()[0].content, "Hello");
        assert!(!d.conversation().entries()[0].flags.is_streaming);
    }

    // Audio transcript deltas behave identically
    d.handle_event(
        ServerEvent::AudioTranscriptDelta {
            delta: "Spo".into(),
        },
        now,
    );
    d.handle_event(
        ServerEvent::AudioTranscriptDelta {
            delta: "ken".into(),
        },
        now,
    );
    d.handle_event(ServerEvent::AudioTranscriptDone, now);
    assert_eq!(d.conversation().entries()[0].content, "Spoken");
}

#[test]
fn cost_replay_matches_running_total() {
    let records = vec![
        CostRecord::realtime(&RealtimeUsage {
            input_text_tokens: 120,
            output_text_tokens: 450,
            input_audio_tokens: 900,
            output_audio_tokens: 0,
        }),
        CostRecord::image_analysis(0.0421, None),
        CostRecord::transcription_estimate("tell me about the project"),
        CostRecord::realtime(&RealtimeUsage {
            output_text_tokens: 2048,
            ..RealtimeUsage::default()
        }),
    ];
    let expected: f64 = records.iter().map(|r| r.total_cost).sum();

    let mut tracker = CostTracker::new(100.0, 100);
    for record in records {
        tracker.record(record);
        let sum: f64 = tracker.records().iter().map(|r| r.total_cost).sum();
        assert!((tracker.records_total() - sum).abs() < 1e-9);
    }
    assert!((tracker.running_total() - expected).abs() < 1e-9);
}

#[test]
fn paused_listening_drops_transcriptions_completely() {
    let mut d = dispatcher();
    d.toggle_pause();

    for _ in 0..3 {
        let actions = d.handle_event(transcription("are you hearing this?"), Utc::now());
        assert!(actions.is_empty());
    }
    assert!(d.conversation().is_empty());
    assert!(d.costs().records().is_empty());
    assert!(!d.generation().is_in_flight());
}

#[test]
fn advisor_mode_never_requests_responses() {
    let mut d = dispatcher();
    d.set_mode(Mode::Advisor, false);

    let transcripts = [
        "What do you think?",
        "Tell me about the budget",
        "Next question: should we hire?",
        "plain statement with no question",
    ];
    for text in transcripts {
        let actions = d.handle_event(transcription(text), Utc::now());
        assert!(
            !has_response_request(&actions),
            "advisor responded to {:?}",
            text
        );
    }
    // Every transcript was still stored
    assert_eq!(d.conversation().len(), transcripts.len());
}

#[test]
fn advisor_scenario_voice_question_stored_without_request() {
    let mut d = dispatcher();
    d.set_mode(Mode::Advisor, false);

    let actions = d.handle_event(transcription("What do you think?"), Utc::now());
    assert!(actions.is_empty());

    let entry = &d.conversation().entries()[0];
    assert_eq!(entry.content, "What do you think?");
    assert!(entry.flags.is_voice);
}

#[test]
fn at_most_one_outstanding_response_request() {
    let mut d = dispatcher();
    let now = Utc::now();

    // First transcription schedules a trigger and marks in-flight
    let first = d.handle_event(transcription("first question"), now);
    assert_eq!(scheduled_actions(&first).len(), 1);

    // response.created for the request; no matching response.done yet
    d.handle_event(ServerEvent::ResponseCreated, now);

    // A second transcription must not issue another request
    let second = d.handle_event(transcription("second question"), now);
    assert!(!has_response_request(&second));

    // After completion the path reopens
    d.handle_event(
        ServerEvent::ResponseDone {
            response: ResponseSummary::default(),
        },
        now,
    );
    let third = d.handle_event(transcription("third question"), now);
    assert!(has_response_request(&third));
}

#[test]
fn blocked_state_latches_until_cleared_or_restart() {
    let mut d = dispatcher();

    // Cross the $5 default limit with one large response
    d.handle_event(
        response_done_with_usage(RealtimeUsage {
            output_audio_tokens: 30_000, // $6.00
            ..RealtimeUsage::default()
        }),
        Utc::now(),
    );
    assert!(d.costs().is_blocked());

    // Subsequent transcriptions never trigger while blocked
    for _ in 0..3 {
        let actions = d.handle_event(transcription("hello?"), Utc::now());
        assert!(!has_response_request(&actions));
    }

    // Session restart resets counters and unblocks
    d.begin_session();
    assert!(!d.costs().is_blocked());
    let actions = d.handle_event(transcription("fresh start"), Utc::now());
    assert!(has_response_request(&actions));
}

#[test]
fn cost_limit_crossing_scenario() {
    let mut d = dispatcher();

    // Spend $4.98 in authoritative records, just under the $5 limit
    d.handle_event(
        response_done_with_usage(RealtimeUsage {
            output_audio_tokens: 24_900, // $4.98
            ..RealtimeUsage::default()
        }),
        Utc::now(),
    );
    assert!(!d.costs().is_blocked());

    // A $0.04 response crosses the limit
    d.handle_event(
        response_done_with_usage(RealtimeUsage {
            output_text_tokens: 2_000, // $0.04
            ..RealtimeUsage::default()
        }),
        Utc::now(),
    );
    assert!((d.costs().running_total() - 5.02).abs() < 1e-9);
    assert!(d.costs().is_blocked());
}

#[test]
fn interview_toggle_turns_advisor_off() {
    let mut d = dispatcher();
    d.set_mode(Mode::Advisor, false);
    assert_eq!(d.mode(), Mode::Advisor);

    d.set_mode(Mode::Interview, false);
    assert_eq!(d.mode(), Mode::Interview);

    d.set_mode(Mode::Normal, false);
    assert_eq!(d.mode(), Mode::Normal);
}

#[test]
fn pause_during_generation_auto_resumes_once() {
    let mut d = dispatcher();
    let now = Utc::now();

    d.handle_event(ServerEvent::ResponseCreated, now);
    let pause_actions = d.toggle_pause();
    assert_eq!(pause_actions, vec![Action::SetCaptureEnabled(false)]);
    assert!(d.listening().is_paused());

    let done_actions = d.handle_event(
        ServerEvent::ResponseDone {
            response: ResponseSummary::default(),
        },
        now,
    );
    assert_eq!(
        scheduled_actions(&done_actions),
        vec![DelayedAction::AutoResume]
    );

    // The delayed trigger lifts the pause exactly once
    let fired = d.fire_delayed(DelayedAction::AutoResume);
    assert_eq!(fired, vec![Action::SetCaptureEnabled(true)]);
    assert!(!d.listening().is_paused());
    assert!(d.fire_delayed(DelayedAction::AutoResume).is_empty());
}

#[test]
fn interview_and_generic_triggers_are_mutually_exclusive() {
    let mut d = dispatcher();
    d.set_mode(Mode::Interview, false);

    // A clear interviewer question: exactly one trigger, the interview one
    let question = d.handle_event(
        transcription("Next question: what is your experience?"),
        Utc::now(),
    );
    let triggers = scheduled_actions(&question);
    assert_eq!(triggers.len(), 1);
    assert!(matches!(
        triggers[0],
        DelayedAction::TriggerInterviewPrompt { .. }
    ));

    d.handle_event(
        ServerEvent::ResponseDone {
            response: ResponseSummary::default(),
        },
        Utc::now(),
    );

    // A declined transcript: exactly one trigger, the generic one
    let statement = d.handle_event(transcription("I see, thanks."), Utc::now());
    let triggers = scheduled_actions(&statement);
    assert_eq!(triggers, vec![DelayedAction::TriggerResponse]);
}

#[test]
fn protocol_error_surfaces_unless_benign() {
    let mut d = dispatcher();
    d.handle_event(ServerEvent::ResponseCreated, Utc::now());

    let benign = d.handle_event(
        ServerEvent::Error {
            error: ApiError {
                kind: Some("invalid_request_error".into()),
                message: Some("Conversation already has an active response".into()),
            },
        },
        Utc::now(),
    );
    assert!(benign.is_empty());
    assert!(!d.generation().is_in_flight());

    let surfaced = d.handle_event(
        ServerEvent::Error {
            error: ApiError {
                kind: Some("rate_limit_exceeded".into()),
                message: Some("slow down".into()),
            },
        },
        Utc::now(),
    );
    assert!(matches!(&surfaced[0], Action::SurfaceError(_)));
}

#[test]
fn scheduler_cancellation_prevents_cross_session_triggers() {
    let mut d = dispatcher();
    let mut scheduler = Scheduler::new();
    let now = Instant::now();

    // A transcription schedules a trigger into the session's scheduler
    let actions = d.handle_event(transcription("about to stop"), Utc::now());
    for action in scheduled_actions(&actions) {
        scheduler.schedule_at(now + Duration::from_millis(100), action);
    }
    assert!(!scheduler.is_empty());

    // The session stops before the deadline; the new session must not
    // observe the old trigger
    scheduler.cancel_all();
    d.begin_session();
    assert!(scheduler
        .take_due(now + Duration::from_secs(10))
        .is_empty());
}

#[test]
fn partial_transcriptions_mutate_in_place_until_finalized() {
    let mut d = dispatcher();
    let now = Utc::now();

    d.handle_event(
        ServerEvent::TranscriptionPartial {
            transcript: "tell me".into(),
        },
        now,
    );
    d.handle_event(
        ServerEvent::TranscriptionPartial {
            transcript: "tell me about".into(),
        },
        now,
    );
    assert_eq!(d.conversation().len(), 1);
    assert_eq!(d.conversation().entries()[0].content, "tell me about");
    assert!(d.conversation().entries()[0].flags.is_partial);

    // Finalization appends the completed entry separately
    d.handle_event(transcription("tell me about yourself"), now);
    assert_eq!(d.conversation().len(), 2);
    let last = d.conversation().last().unwrap();
    assert_eq!(last.content, "tell me about yourself");
    assert!(!last.flags.is_partial);
}

#[test]
fn speech_markers_do_not_trigger_responses() {
    let mut d = dispatcher();
    let started = d.handle_event(ServerEvent::SpeechStarted, Utc::now());
    let stopped = d.handle_event(ServerEvent::SpeechStopped, Utc::now());
    assert!(started.is_empty());
    assert!(stopped.is_empty());
    assert!(d.conversation().is_empty());
    assert!(!d.generation().is_in_flight());
}

#[test]
fn response_cap_blocks_after_limit() {
    let mut config = Config::default();
    config.limits.max_responses = 2;
    let mut d = Dispatcher::new(&config);
    let now = Utc::now();

    for i in 0..2 {
        let actions = d.handle_event(transcription(&format!("question {}", i)), now);
        assert!(has_response_request(&actions), "request {} suppressed", i);
        d.handle_event(
            ServerEvent::ResponseDone {
                response: ResponseSummary::default(),
            },
            now,
        );
    }

    // The cap is reached; further transcriptions are suppressed
    assert!(d.costs().is_blocked());
    let actions = d.handle_event(transcription("one more?"), now);
    assert!(!has_response_request(&actions));
}
