//! Image analysis client
//!
//! Screenshots and uploads go to the backend analyze-image endpoint with
//! the running conversation as context. The server answers either with a
//! plain JSON result or with an SSE stream of content chunks terminated
//! by a payload carrying the final analysis and its cost.

use super::sse::SseParser;
use super::ApiUpdate;
use crate::conversation::{Conversation, Role};
use crate::cost::{ChatUsage, CostRecord};
use crate::error::{Result, SottoError};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};
use uuid::Uuid;

/// Default user prompt attached to captured screenshots
pub const DEFAULT_IMAGE_PROMPT: &str = "Please wait, analyze this image";

/// System prompt framing every image analysis
pub const SYSTEM_PROMPT_IMAGE_ANALYSIS: &str = "Analyze this image and respond based on category:
CODING QUESTION: Provide JavaScript solution with:

 - Brute force approach (code + time/space complexity)
 - Optimized approach (code + time/space complexity + algorithm explanation)
 - How the optimal algorithm works conceptually
 - Sample input data walkthrough step-by-step
 - Example I/O demonstration

OTHER QUESTION: Answer comprehensively in relevant context
NO QUESTION: Describe image content + predict next logical step/progression if visible like case of system design
Be detailed, technical, and complete in explanations.";

/// An image handed in by the clipboard/screenshot collaborator
#[derive(Clone, Debug)]
pub struct ImagePayload {
    /// MIME type, e.g. `image/png`
    pub media_type: String,
    /// Raw image bytes
    pub data: Vec<u8>,
    pub file_name: Option<String>,
}

impl ImagePayload {
    pub fn new(media_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            media_type: media_type.into(),
            data,
            file_name: None,
        }
    }

    /// Display label for the transcript
    pub fn label(&self) -> &str {
        self.file_name.as_deref().unwrap_or(&self.media_type)
    }

    /// Encode as the data-URI the backend expects
    pub fn to_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.media_type,
            BASE64.encode(&self.data)
        )
    }
}

/// A conversation entry serialized as analysis context
#[derive(Clone, Debug, Serialize)]
pub struct HistoryMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
}

/// Build the context history: user and assistant text entries, with
/// previous image exchanges left out to bound the payload.
pub fn history_from(conversation: &Conversation) -> Vec<HistoryMessage> {
    conversation
        .entries()
        .iter()
        .filter(|entry| !entry.flags.has_image && !entry.flags.is_partial)
        .filter_map(|entry| {
            let kind = match entry.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => return None,
            };
            Some(HistoryMessage {
                kind: kind.to_string(),
                content: entry.content.clone(),
            })
        })
        .collect()
}

#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    text: &'a str,
    image: String,
    #[serde(rename = "conversationHistory")]
    conversation_history: &'a [HistoryMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

/// Cost summary computed server-side
#[derive(Debug, Default, Deserialize)]
pub struct ServerCost {
    #[serde(rename = "totalCost", default)]
    pub total_cost: f64,
}

#[derive(Debug, Default, Deserialize)]
struct AnalyzeResponse {
    #[serde(default)]
    analysis: Option<String>,
    #[serde(default)]
    usage: Option<ChatUsage>,
    #[serde(default)]
    cost: Option<ServerCost>,
}

/// One SSE payload of the streamed analysis; chunks carry `content`,
/// the terminal payload carries `analysis` (or an explicit complete
/// event) plus the cost.
#[derive(Debug, Default, Deserialize)]
struct VisionStreamPayload {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    analysis: Option<String>,
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    usage: Option<ChatUsage>,
    #[serde(default)]
    cost: Option<ServerCost>,
}

impl VisionStreamPayload {
    fn is_terminal(&self) -> bool {
        self.analysis.is_some() || self.event.as_deref() == Some("complete")
    }
}

fn cost_record(cost: Option<ServerCost>, usage: Option<ChatUsage>) -> Option<CostRecord> {
    cost.map(|c| CostRecord::image_analysis(c.total_cost, usage.as_ref()))
}

/// HTTP client for the backend analyze-image endpoint
#[derive(Clone)]
pub struct VisionClient {
    http: reqwest::Client,
    base_url: String,
}

impl VisionClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/analyze-image", self.base_url.trim_end_matches('/'))
    }

    /// Run one analysis, reporting progress for `entry` over `updates`
    pub async fn run(
        &self,
        text: String,
        image: ImagePayload,
        history: Vec<HistoryMessage>,
        entry: Uuid,
        updates: UnboundedSender<(Uuid, ApiUpdate)>,
    ) {
        let mut received_any = false;
        match self
            .try_request(&text, &image, &history, entry, &updates, &mut received_any)
            .await
        {
            Ok(true) => return,
            Ok(false) | Err(_) if received_any => {
                // Keep the partial analysis already streamed
                let _ = updates.send((
                    entry,
                    ApiUpdate::Done {
                        final_text: None,
                        cost: None,
                    },
                ));
                return;
            }
            Ok(false) => {}
            Err(e) => warn!("Image analysis stream failed: {}", e),
        }

        debug!("Retrying image analysis without streaming");
        match self.request_once(&text, &image, &history).await {
            Ok((analysis, cost)) => {
                let _ = updates.send((
                    entry,
                    ApiUpdate::Done {
                        final_text: Some(analysis),
                        cost,
                    },
                ));
            }
            Err(e) => {
                let _ = updates.send((entry, ApiUpdate::Failed(e.user_message())));
            }
        }
    }

    /// Returns Ok(true) when a terminal payload was delivered
    async fn try_request(
        &self,
        text: &str,
        image: &ImagePayload,
        history: &[HistoryMessage],
        entry: Uuid,
        updates: &UnboundedSender<(Uuid, ApiUpdate)>,
        received_any: &mut bool,
    ) -> Result<bool> {
        let response = self
            .http
            .post(self.endpoint())
            .json(&AnalyzeRequest {
                text,
                image: image.to_data_uri(),
                conversation_history: history,
                stream: None,
            })
            .send()
            .await
            .map_err(|e| SottoError::RequestError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SottoError::RequestError(format!(
                "analyze-image endpoint returned {}",
                response.status()
            )));
        }

        let streaming = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("text/event-stream"));

        if !streaming {
            let body: AnalyzeResponse = response
                .json()
                .await
                .map_err(|e| SottoError::RequestError(format!("malformed analysis: {}", e)))?;
            let analysis = body
                .analysis
                .ok_or_else(|| SottoError::RequestError("no analysis in response".into()))?;
            let _ = updates.send((
                entry,
                ApiUpdate::Done {
                    final_text: Some(analysis),
                    cost: cost_record(body.cost, body.usage),
                },
            ));
            return Ok(true);
        }

        let mut parser = SseParser::new();
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let bytes = chunk.map_err(|e| SottoError::StreamingError(e.to_string()))?;
            for payload in parser.push(&String::from_utf8_lossy(&bytes)) {
                let parsed = match serde_json::from_str::<VisionStreamPayload>(&payload) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        debug!("Skipping malformed SSE payload: {}", e);
                        continue;
                    }
                };

                if parsed.is_terminal() {
                    let final_text = parsed.analysis;
                    let record = cost_record(parsed.cost, parsed.usage);
                    let _ = updates.send((
                        entry,
                        ApiUpdate::Done {
                            final_text,
                            cost: record,
                        },
                    ));
                    return Ok(true);
                }

                if let Some(content) = parsed.content {
                    if !content.is_empty() {
                        *received_any = true;
                        let _ = updates.send((entry, ApiUpdate::Chunk(content)));
                    }
                }
            }
        }
        Ok(false)
    }

    async fn request_once(
        &self,
        text: &str,
        image: &ImagePayload,
        history: &[HistoryMessage],
    ) -> Result<(String, Option<CostRecord>)> {
        let response = self
            .http
            .post(self.endpoint())
            .json(&AnalyzeRequest {
                text,
                image: image.to_data_uri(),
                conversation_history: history,
                stream: Some(false),
            })
            .send()
            .await
            .map_err(|e| SottoError::RequestError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SottoError::RequestError(format!(
                "analyze-image endpoint returned {}",
                response.status()
            )));
        }

        let body: AnalyzeResponse = response
            .json()
            .await
            .map_err(|e| SottoError::RequestError(format!("malformed analysis: {}", e)))?;
        let analysis = body
            .analysis
            .ok_or_else(|| SottoError::RequestError("no analysis in response".into()))?;
        Ok((analysis, cost_record(body.cost, body.usage)))
    }
}
