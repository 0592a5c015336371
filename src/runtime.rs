//! Cooperative runtime loop
//!
//! One task multiplexes four sources: app commands, inbound channel
//! events, streamed API updates, and the deadline scheduler. All state
//! mutation happens here, in arrival order, so the dispatcher needs no
//! locking. Stopping a session clears the scheduler, which is how
//! delayed triggers from a dead session are prevented from firing into
//! a new one.

use crate::api::chat::{ChatClient, ChatMessage};
use crate::api::vision::{self, ImagePayload, VisionClient};
use crate::api::ApiUpdate;
use crate::config::Config;
use crate::dispatch::{Action, DelayedAction, Dispatcher};
use crate::error::{Result, SottoError};
use crate::events::ServerEvent;
use crate::mode::Mode;
use crate::session::{ChannelConnector, MediaSource, SessionManager, TokenProvider};
use crate::state::{SharedStatus, StatusSnapshot};
use chrono::Utc;
use crossbeam_channel as cb;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Commands accepted by the runtime
#[derive(Clone, Debug)]
pub enum AppCommand {
    StartSession,
    StopSession,
    ToggleSession,
    TogglePause,
    SetMode(Mode),
    SendText { text: String, clipboard: bool },
    RequestAdvice(String),
    AnalyzeImage { text: String, image: ImagePayload },
    /// Clear a cost/response block
    Unblock,
    Shutdown,
}

/// Notifications emitted for the UI
#[derive(Clone, Debug)]
pub enum AppEvent {
    /// State changed; query [`SharedStatus`] for details
    StateChanged,
    /// A user-facing error message
    Error(String),
    Shutdown,
}

/// Deadline queue for delayed dispatcher triggers
///
/// Entries are dropped wholesale when the owning session ends, so a
/// trigger can never fire against a session it was not scheduled for.
#[derive(Debug, Default)]
pub struct Scheduler {
    entries: Vec<(Instant, DelayedAction)>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule_at(&mut self, due: Instant, action: DelayedAction) {
        self.entries.push((due, action));
    }

    pub fn schedule(&mut self, delay: Duration, action: DelayedAction) {
        self.schedule_at(Instant::now() + delay, action);
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().map(|(due, _)| *due).min()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove and return the actions due by `now`, in deadline order
    pub fn take_due(&mut self, now: Instant) -> Vec<DelayedAction> {
        let mut due: Vec<(Instant, DelayedAction)> = Vec::new();
        let mut remaining = Vec::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            if entry.0 <= now {
                due.push(entry);
            } else {
                remaining.push(entry);
            }
        }
        self.entries = remaining;
        due.sort_by_key(|(at, _)| *at);
        due.into_iter().map(|(_, action)| action).collect()
    }

    /// Cancel everything scheduled by the current session
    pub fn cancel_all(&mut self) {
        self.entries.clear();
    }
}

/// Handle for controlling the runtime from the UI or OS integration
#[derive(Clone)]
pub struct RuntimeHandle {
    commands: UnboundedSender<AppCommand>,
    events: cb::Receiver<AppEvent>,
    status: SharedStatus,
}

impl RuntimeHandle {
    pub fn send_command(&self, command: AppCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|e| SottoError::ChannelError(format!("Failed to send command: {}", e)))
    }

    pub fn start_session(&self) -> Result<()> {
        self.send_command(AppCommand::StartSession)
    }

    pub fn stop_session(&self) -> Result<()> {
        self.send_command(AppCommand::StopSession)
    }

    pub fn toggle_pause(&self) -> Result<()> {
        self.send_command(AppCommand::TogglePause)
    }

    pub fn set_mode(&self, mode: Mode) -> Result<()> {
        self.send_command(AppCommand::SetMode(mode))
    }

    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.send_command(AppCommand::SendText {
            text: text.into(),
            clipboard: false,
        })
    }

    pub fn request_advice(&self, request: impl Into<String>) -> Result<()> {
        self.send_command(AppCommand::RequestAdvice(request.into()))
    }

    pub fn analyze_image(&self, text: impl Into<String>, image: ImagePayload) -> Result<()> {
        self.send_command(AppCommand::AnalyzeImage {
            text: text.into(),
            image,
        })
    }

    pub fn unblock(&self) -> Result<()> {
        self.send_command(AppCommand::Unblock)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send_command(AppCommand::Shutdown)
    }

    /// Clonable command sender, e.g. for the input bridge
    pub fn command_sender(&self) -> UnboundedSender<AppCommand> {
        self.commands.clone()
    }

    /// Receiver of UI notifications
    pub fn events(&self) -> cb::Receiver<AppEvent> {
        self.events.clone()
    }

    /// Try to receive an event (non-blocking)
    pub fn try_recv_event(&self) -> Option<AppEvent> {
        self.events.try_recv().ok()
    }

    /// Current published status
    pub fn status(&self) -> StatusSnapshot {
        self.status.snapshot()
    }

    pub fn shared_status(&self) -> SharedStatus {
        self.status.clone()
    }
}

/// The application runtime
pub struct Runtime {
    session: SessionManager,
    dispatcher: Dispatcher,
    scheduler: Scheduler,
    chat: ChatClient,
    vision: VisionClient,
    command_rx: UnboundedReceiver<AppCommand>,
    inbound: Option<UnboundedReceiver<ServerEvent>>,
    api_tx: UnboundedSender<(Uuid, ApiUpdate)>,
    api_rx: UnboundedReceiver<(Uuid, ApiUpdate)>,
    event_tx: cb::Sender<AppEvent>,
    status: SharedStatus,
    last_error: Option<String>,
}

impl Runtime {
    pub fn new(
        config: Config,
        tokens: Arc<dyn TokenProvider>,
        media: Arc<dyn MediaSource>,
        connector: Arc<dyn ChannelConnector>,
    ) -> (Self, RuntimeHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (api_tx, api_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = cb::unbounded();
        let status = SharedStatus::new();

        let handle = RuntimeHandle {
            commands: command_tx,
            events: event_rx,
            status: status.clone(),
        };

        let runtime = Self {
            session: SessionManager::new(tokens, media, connector),
            dispatcher: Dispatcher::new(&config),
            scheduler: Scheduler::new(),
            chat: ChatClient::new(config.api.base_url.clone()),
            vision: VisionClient::new(config.api.base_url.clone()),
            command_rx,
            inbound: None,
            api_tx,
            api_rx,
            event_tx,
            status,
            last_error: None,
        };
        (runtime, handle)
    }

    /// Run until shutdown
    pub async fn run(mut self) {
        info!("Runtime loop starting");
        loop {
            self.publish_status();
            let deadline = self.scheduler.next_deadline();

            tokio::select! {
                command = self.command_rx.recv() => {
                    match command {
                        None | Some(AppCommand::Shutdown) => break,
                        Some(command) => self.handle_command(command).await,
                    }
                }
                event = recv_inbound(&mut self.inbound) => {
                    match event {
                        Some(event) => {
                            let actions = self.dispatcher.handle_event(event, Utc::now());
                            self.execute(actions);
                        }
                        None => self.on_disconnect(),
                    }
                }
                update = self.api_rx.recv() => {
                    if let Some((entry, update)) = update {
                        self.apply_api_update(entry, update);
                    }
                }
                _ = wait_until(deadline) => {
                    for action in self.scheduler.take_due(Instant::now()) {
                        let actions = self.dispatcher.fire_delayed(action);
                        self.execute(actions);
                    }
                }
            }
        }

        self.session.stop();
        self.scheduler.cancel_all();
        self.publish_status();
        let _ = self.event_tx.send(AppEvent::Shutdown);
        info!("Runtime loop stopped");
    }

    async fn handle_command(&mut self, command: AppCommand) {
        match command {
            AppCommand::StartSession => self.start_session().await,
            AppCommand::StopSession => self.stop_session(),
            AppCommand::ToggleSession => {
                if self.session.is_active() {
                    self.stop_session();
                } else {
                    self.start_session().await;
                }
            }
            AppCommand::TogglePause => {
                if self.session.is_active() {
                    let actions = self.dispatcher.toggle_pause();
                    self.execute(actions);
                } else {
                    warn!("Pause toggled without an active session");
                }
            }
            AppCommand::SetMode(mode) => {
                let actions = self.dispatcher.set_mode(mode, self.session.is_active());
                self.execute(actions);
                self.emit(AppEvent::StateChanged);
            }
            AppCommand::SendText { text, clipboard } => self.send_text(text, clipboard),
            AppCommand::RequestAdvice(request) => {
                if self.session.is_active() {
                    let actions = self.dispatcher.request_advice(&request);
                    self.execute(actions);
                } else {
                    self.emit(AppEvent::Error(
                        "Advice requests need an active session".to_string(),
                    ));
                }
            }
            AppCommand::AnalyzeImage { text, image } => self.analyze_image(text, image),
            AppCommand::Unblock => {
                self.dispatcher.unblock();
                self.emit(AppEvent::StateChanged);
            }
            AppCommand::Shutdown => {}
        }
    }

    async fn start_session(&mut self) {
        if self.session.is_active() {
            return;
        }
        self.dispatcher.begin_session();
        self.scheduler.cancel_all();
        match self.session.start(self.dispatcher.session_config()).await {
            Ok(inbound) => {
                self.inbound = Some(inbound);
                self.last_error = None;
                self.emit(AppEvent::StateChanged);
            }
            Err(e) => {
                error!("Session start failed: {}", e);
                let message = e.user_message();
                self.last_error = Some(message.clone());
                self.emit(AppEvent::Error(message));
            }
        }
    }

    fn stop_session(&mut self) {
        self.session.stop();
        self.scheduler.cancel_all();
        self.dispatcher.end_session();
        self.inbound = None;
        self.emit(AppEvent::StateChanged);
    }

    fn on_disconnect(&mut self) {
        self.session.mark_disconnected();
        self.scheduler.cancel_all();
        self.dispatcher.end_session();
        self.inbound = None;
        let message = SottoError::TransportError("channel closed".into()).user_message();
        self.last_error = Some(message.clone());
        self.emit(AppEvent::Error(message));
    }

    fn send_text(&mut self, text: String, clipboard: bool) {
        if text.trim().is_empty() {
            return;
        }
        if clipboard && self.dispatcher.mode() != Mode::Normal {
            self.emit(AppEvent::Error(
                "Clipboard input is only sent to the AI in normal mode".to_string(),
            ));
            return;
        }

        if self.session.is_active() {
            let actions = self.dispatcher.send_text_message(&text, clipboard);
            self.execute(actions);
        } else {
            // Sessionless: stream through the chat completions endpoint
            let entry = self.dispatcher.begin_sessionless_chat(&text, clipboard);
            let client = self.chat.clone();
            let updates = self.api_tx.clone();
            let messages = vec![ChatMessage::user(text)];
            tokio::spawn(async move {
                client.run(messages, entry, updates).await;
            });
        }
        self.emit(AppEvent::StateChanged);
    }

    fn analyze_image(&mut self, text: String, image: ImagePayload) {
        let history = vision::history_from(self.dispatcher.conversation());
        let label = format!("{} [Image uploaded: {}]", text, image.label());
        let entry = self
            .dispatcher
            .begin_image_analysis(&label, vision::SYSTEM_PROMPT_IMAGE_ANALYSIS);

        let client = self.vision.clone();
        let updates = self.api_tx.clone();
        tokio::spawn(async move {
            client.run(text, image, history, entry, updates).await;
        });
        self.emit(AppEvent::StateChanged);
    }

    fn apply_api_update(&mut self, entry: Uuid, update: ApiUpdate) {
        match update {
            ApiUpdate::Chunk(content) => self.dispatcher.apply_api_chunk(entry, &content),
            ApiUpdate::Done { final_text, cost } => {
                self.dispatcher
                    .complete_api_entry(entry, final_text.as_deref(), cost);
                self.emit(AppEvent::StateChanged);
            }
            ApiUpdate::Failed(message) => {
                self.dispatcher.fail_api_entry(entry, &message);
                self.emit(AppEvent::Error(message));
            }
        }
    }

    fn execute(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Send(event) => {
                    self.session.send_event(event);
                }
                Action::Schedule { delay, action } => {
                    self.scheduler.schedule(delay, action);
                }
                Action::SetCaptureEnabled(enabled) => {
                    self.session.set_capture_enabled(enabled);
                }
                Action::SurfaceError(message) => {
                    warn!("{}", message);
                    self.last_error = Some(message.clone());
                    self.emit(AppEvent::Error(message));
                }
            }
        }
    }

    fn publish_status(&self) {
        self.status.publish(
            self.dispatcher
                .status_snapshot(self.session.status(), self.last_error.clone()),
        );
    }

    fn emit(&self, event: AppEvent) {
        let _ = self.event_tx.send(event);
    }
}

async fn recv_inbound(inbound: &mut Option<UnboundedReceiver<ServerEvent>>) -> Option<ServerEvent> {
    match inbound {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(due) => tokio::time::sleep_until(tokio::time::Instant::from_std(due)).await,
        None => std::future::pending::<()>().await,
    }
}
