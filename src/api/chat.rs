//! Sessionless chat completions client
//!
//! When no realtime session is active, text messages go through the
//! backend chat-completions endpoint, which streams SSE payloads of
//! `{"type":"chunk","content":...}` followed by `{"type":"done"}`. A
//! stream that dies mid-flight falls back to whatever content already
//! arrived; with nothing received, one non-streaming retry is attempted
//! before the exchange is failed.

use super::sse::SseParser;
use super::ApiUpdate;
use crate::error::{Result, SottoError};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};
use uuid::Uuid;

/// One message of the chat request
#[derive(Clone, Debug, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ChatStreamPayload {
    Chunk {
        #[serde(default)]
        content: String,
    },
    Done,
    Error {
        #[serde(default)]
        error: String,
    },
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    content: String,
}

/// HTTP client for the backend chat-completions endpoint
#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/api/chat-completions",
            self.base_url.trim_end_matches('/')
        )
    }

    /// Run one exchange, reporting progress for `entry` over `updates`
    pub async fn run(
        &self,
        messages: Vec<ChatMessage>,
        entry: Uuid,
        updates: UnboundedSender<(Uuid, ApiUpdate)>,
    ) {
        let mut received_any = false;
        match self
            .try_stream(&messages, entry, &updates, &mut received_any)
            .await
        {
            Ok(true) => return,
            Ok(false) => {
                // Stream ended without a done marker
                if received_any {
                    let _ = updates.send((
                        entry,
                        ApiUpdate::Done {
                            final_text: None,
                            cost: None,
                        },
                    ));
                    return;
                }
            }
            Err(e) => {
                warn!("Chat stream failed: {}", e);
                if received_any {
                    // Fall back to the partial content already shown
                    let _ = updates.send((
                        entry,
                        ApiUpdate::Done {
                            final_text: None,
                            cost: None,
                        },
                    ));
                    return;
                }
            }
        }

        debug!("Retrying chat completion without streaming");
        match self.request_once(&messages).await {
            Ok(text) => {
                let _ = updates.send((
                    entry,
                    ApiUpdate::Done {
                        final_text: Some(text),
                        cost: None,
                    },
                ));
            }
            Err(e) => {
                let _ = updates.send((entry, ApiUpdate::Failed(e.user_message())));
            }
        }
    }

    /// Returns Ok(true) when the stream finished with a done marker
    async fn try_stream(
        &self,
        messages: &[ChatMessage],
        entry: Uuid,
        updates: &UnboundedSender<(Uuid, ApiUpdate)>,
        received_any: &mut bool,
    ) -> Result<bool> {
        let response = self
            .http
            .post(self.endpoint())
            .json(&ChatRequest {
                messages,
                stream: None,
            })
            .send()
            .await
            .map_err(|e| SottoError::RequestError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SottoError::RequestError(format!(
                "chat endpoint returned {}",
                response.status()
            )));
        }

        let mut parser = SseParser::new();
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let bytes = chunk.map_err(|e| SottoError::StreamingError(e.to_string()))?;
            for payload in parser.push(&String::from_utf8_lossy(&bytes)) {
                match serde_json::from_str::<ChatStreamPayload>(&payload) {
                    Ok(ChatStreamPayload::Chunk { content }) => {
                        if !content.is_empty() {
                            *received_any = true;
                            let _ = updates.send((entry, ApiUpdate::Chunk(content)));
                        }
                    }
                    Ok(ChatStreamPayload::Done) => {
                        let _ = updates.send((
                            entry,
                            ApiUpdate::Done {
                                final_text: None,
                                cost: None,
                            },
                        ));
                        return Ok(true);
                    }
                    Ok(ChatStreamPayload::Error { error }) => {
                        return Err(SottoError::StreamingError(error));
                    }
                    // Malformed payloads are skipped, not fatal
                    Err(e) => debug!("Skipping malformed SSE payload: {}", e),
                }
            }
        }
        Ok(false)
    }

    async fn request_once(&self, messages: &[ChatMessage]) -> Result<String> {
        let response = self
            .http
            .post(self.endpoint())
            .json(&ChatRequest {
                messages,
                stream: Some(false),
            })
            .send()
            .await
            .map_err(|e| SottoError::RequestError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SottoError::RequestError(format!(
                "chat endpoint returned {}",
                response.status()
            )));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| SottoError::RequestError(format!("malformed chat response: {}", e)))?;
        if body.content.is_empty() {
            return Err(SottoError::RequestError("empty chat response".into()));
        }
        Ok(body.content)
    }
}
