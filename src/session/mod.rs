//! Realtime session lifecycle
//!
//! The session manager owns the Idle → Connecting → Active → Closed
//! lifecycle and the send primitive. The transport itself is external:
//! credential issuance, audio capture and channel negotiation are
//! consumed through the traits below, so the core never touches WebRTC
//! or codec details.

pub mod stdio;
pub mod token;

use crate::error::{Result, SottoError};
use crate::events::{ClientEvent, ServerEvent, SessionConfig};
use crate::state::SessionStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};

/// Issues the short-lived credential used to authenticate the channel
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch(&self) -> Result<String>;
}

/// Capture quality tiers tried in order during session start
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaConstraints {
    /// Tuned sample rate, mono, echo cancellation, noise suppression
    Optimal,
    /// Whatever the platform grants
    Basic,
}

/// A live local audio capture
pub trait CaptureHandle: Send + Sync {
    /// Enable or disable the capture track without releasing it
    fn set_enabled(&mut self, enabled: bool);
    /// Release the capture device
    fn stop(&mut self);
}

/// Acquires local audio capture from the platform
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn acquire(&self, constraints: MediaConstraints) -> Result<Box<dyn CaptureHandle>>;
}

/// The open bidirectional event channel
pub trait EventChannel: Send + Sync {
    fn send(&mut self, event: &ClientEvent) -> Result<()>;
    fn close(&mut self);
}

/// Negotiates the realtime channel against the vendor
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    /// Establish the channel; inbound events arrive on the returned
    /// receiver in arrival order.
    async fn connect(
        &self,
        credential: &str,
    ) -> Result<(Box<dyn EventChannel>, UnboundedReceiver<ServerEvent>)>;
}

/// Owns the realtime session lifecycle and the send primitive
pub struct SessionManager {
    status: SessionStatus,
    tokens: Arc<dyn TokenProvider>,
    media: Arc<dyn MediaSource>,
    connector: Arc<dyn ChannelConnector>,
    channel: Option<Box<dyn EventChannel>>,
    capture: Option<Box<dyn CaptureHandle>>,
    started_at: Option<DateTime<Utc>>,
    /// Bumped on every teardown; scheduled callbacks from an older epoch
    /// must never fire against a newer session.
    epoch: u64,
}

impl SessionManager {
    pub fn new(
        tokens: Arc<dyn TokenProvider>,
        media: Arc<dyn MediaSource>,
        connector: Arc<dyn ChannelConnector>,
    ) -> Self {
        Self {
            status: SessionStatus::Idle,
            tokens,
            media,
            connector,
            channel: None,
            capture: None,
            started_at: None,
            epoch: 0,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Start a session and send the initial configuration
    ///
    /// Any failure reverts to idle; the caller surfaces the categorized
    /// error and the user retries manually.
    pub async fn start(
        &mut self,
        initial: SessionConfig,
    ) -> Result<UnboundedReceiver<ServerEvent>> {
        if !self.status.is_idle() {
            return Err(SottoError::TransportError(format!(
                "cannot start session while {}",
                self.status
            )));
        }

        self.status = SessionStatus::Connecting;
        info!("Starting realtime session");

        match self.establish(initial).await {
            Ok(events) => Ok(events),
            Err(e) => {
                error!("Session start failed: {}", e);
                self.teardown();
                Err(e)
            }
        }
    }

    async fn establish(
        &mut self,
        initial: SessionConfig,
    ) -> Result<UnboundedReceiver<ServerEvent>> {
        let credential = self.tokens.fetch().await?;
        debug!("Ephemeral credential obtained");

        let capture = self.acquire_capture().await?;
        self.capture = Some(capture);

        let (channel, events) = self.connector.connect(&credential).await?;
        self.channel = Some(channel);
        self.status = SessionStatus::Active;
        self.started_at = Some(Utc::now());
        info!("Realtime channel open");

        if !self.send_event(ClientEvent::session_update(initial)) {
            return Err(SottoError::TransportError(
                "failed to send initial session configuration".into(),
            ));
        }
        Ok(events)
    }

    async fn acquire_capture(&self) -> Result<Box<dyn CaptureHandle>> {
        match self.media.acquire(MediaConstraints::Optimal).await {
            Ok(capture) => {
                debug!("Capture acquired with optimal constraints");
                Ok(capture)
            }
            Err(e) => {
                warn!("Optimal capture constraints failed ({}), trying basic", e);
                self.media.acquire(MediaConstraints::Basic).await
            }
        }
    }

    /// Send an event over the channel
    ///
    /// Stamps a unique event id when absent. Not being active is a
    /// logged no-op rather than an error: sends are fire-and-forget.
    pub fn send_event(&mut self, mut event: ClientEvent) -> bool {
        if !self.status.is_active() {
            error!(
                "Failed to send {} - no active session (status {})",
                event.kind(),
                self.status
            );
            return false;
        }
        event.ensure_event_id();
        debug!("Sending event: {}", event.kind());

        match self.channel.as_mut() {
            Some(channel) => match channel.send(&event) {
                Ok(()) => true,
                Err(e) => {
                    error!("Channel send failed for {}: {}", event.kind(), e);
                    false
                }
            },
            None => {
                error!("Failed to send {} - channel missing", event.kind());
                false
            }
        }
    }

    /// Enable or disable the capture track (listening pause control)
    pub fn set_capture_enabled(&mut self, enabled: bool) {
        if let Some(capture) = self.capture.as_mut() {
            capture.set_enabled(enabled);
            debug!(
                "Audio capture {}",
                if enabled { "enabled" } else { "disabled" }
            );
        }
    }

    /// Stop the session and release its resources
    pub fn stop(&mut self) {
        if self.status.is_idle() {
            return;
        }
        info!("Stopping realtime session");
        self.teardown();
    }

    /// The inbound event stream ended without a stop request
    pub fn mark_disconnected(&mut self) {
        if self.status.is_idle() {
            return;
        }
        warn!("Realtime channel closed unexpectedly");
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
        // Closed is transient; the manager is immediately reusable
        self.status = SessionStatus::Closed;
        self.started_at = None;
        self.epoch += 1;
        self.status = SessionStatus::Idle;
    }
}
