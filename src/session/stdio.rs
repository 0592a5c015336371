//! Headless development transport
//!
//! A loopback stand-in for the real negotiated channel: inbound server
//! events are read as JSON lines from stdin and outbound client events
//! are written as JSON lines to stdout. Useful for driving the core
//! end-to-end from scripts or recorded event logs, without a vendor
//! connection or a capture device.

use super::{CaptureHandle, ChannelConnector, EventChannel, MediaConstraints, MediaSource,
            TokenProvider};
use crate::error::{Result, SottoError};
use crate::events::{ClientEvent, ServerEvent};
use async_trait::async_trait;
use std::io::BufRead;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, warn};

/// Token provider returning a fixed credential, for transports that do
/// not authenticate.
pub struct StaticTokenProvider(pub String);

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn fetch(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Media source that grants a no-op capture handle
pub struct NullMediaSource;

struct NullCapture {
    enabled: bool,
}

impl CaptureHandle for NullCapture {
    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        debug!("Null capture enabled = {}", enabled);
    }

    fn stop(&mut self) {
        debug!("Null capture stopped");
    }
}

#[async_trait]
impl MediaSource for NullMediaSource {
    async fn acquire(&self, _constraints: MediaConstraints) -> Result<Box<dyn CaptureHandle>> {
        Ok(Box::new(NullCapture { enabled: true }))
    }
}

/// Connector binding the session to stdin/stdout
pub struct StdioConnector;

struct StdioChannel;

impl EventChannel for StdioChannel {
    fn send(&mut self, event: &ClientEvent) -> Result<()> {
        let line = serde_json::to_string(event)
            .map_err(|e| SottoError::ChannelError(e.to_string()))?;
        println!("{}", line);
        Ok(())
    }

    fn close(&mut self) {
        debug!("Stdio channel closed");
    }
}

#[async_trait]
impl ChannelConnector for StdioConnector {
    async fn connect(
        &self,
        _credential: &str,
    ) -> Result<(Box<dyn EventChannel>, UnboundedReceiver<ServerEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();

        // Dedicated reader thread; the sender drop on EOF closes the
        // inbound stream, which the runtime treats as a disconnect.
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("Stdin read failed: {}", e);
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<ServerEvent>(&line) {
                    Ok(event) => {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Ignoring unparseable inbound line: {}", e),
                }
            }
        });

        Ok((Box::new(StdioChannel), rx))
    }
}
