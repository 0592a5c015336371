//! Typed external input events
//!
//! Clipboard, screenshot and global-shortcut collaborators deliver their
//! payloads as [`ExternalInput`] values over a channel; the bridge maps
//! them onto the same app commands manual input uses. No ambient globals
//! are involved: an OS-integration layer simply owns a sender.

use crate::api::vision::{ImagePayload, DEFAULT_IMAGE_PROMPT};
use crate::runtime::AppCommand;
use crossbeam_channel::Receiver;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

/// Payloads produced by the OS integration collaborators
#[derive(Clone, Debug)]
pub enum ExternalInput {
    /// Text grabbed from the clipboard (global paste shortcut)
    ClipboardText(String),
    /// A captured screenshot to analyze
    Screenshot(ImagePayload),
    /// Global start/stop shortcut
    ToggleSession,
    /// Global pause/resume shortcut
    TogglePause,
}

impl ExternalInput {
    /// The app command this input maps to
    pub fn into_command(self) -> AppCommand {
        match self {
            ExternalInput::ClipboardText(text) => AppCommand::SendText {
                text,
                clipboard: true,
            },
            ExternalInput::Screenshot(image) => AppCommand::AnalyzeImage {
                text: DEFAULT_IMAGE_PROMPT.to_string(),
                image,
            },
            ExternalInput::ToggleSession => AppCommand::ToggleSession,
            ExternalInput::TogglePause => AppCommand::TogglePause,
        }
    }
}

/// Forward external inputs into the runtime command queue
///
/// Runs until either side of the bridge closes.
pub fn spawn_input_bridge(
    inputs: Receiver<ExternalInput>,
    commands: UnboundedSender<AppCommand>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        info!("Input bridge started");
        for input in inputs.iter() {
            debug!("External input: {:?}", input);
            if commands.send(input.into_command()).is_err() {
                break;
            }
        }
        info!("Input bridge stopped");
    })
}
