//! Conversation transcript state
//!
//! Entries are appended in arrival order. A streaming assistant entry is
//! mutated in place until its stream completes, then frozen; partial user
//! transcriptions work the same way. Both are tracked through explicit id
//! handles rather than last-index inspection, so an unrelated append can
//! never redirect a stream into the wrong entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a conversation entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Presentation and provenance flags for an entry
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFlags {
    pub is_voice: bool,
    pub is_partial: bool,
    pub is_streaming: bool,
    pub is_clipboard: bool,
    pub is_advice_request: bool,
    pub has_image: bool,
    pub is_error: bool,
}

/// A single transcript entry
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub flags: EntryFlags,
}

impl ConversationEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            created_at: Utc::now(),
            flags: EntryFlags::default(),
        }
    }

    pub fn with_flags(mut self, flags: EntryFlags) -> Self {
        self.flags = flags;
        self
    }

    /// A finalized voice transcription from the user
    pub fn voice_user(transcript: impl Into<String>) -> Self {
        Self::new(Role::User, transcript).with_flags(EntryFlags {
            is_voice: true,
            ..EntryFlags::default()
        })
    }
}

/// The conversation transcript with explicit streaming handles
#[derive(Debug, Default)]
pub struct Conversation {
    entries: Vec<ConversationEntry>,
    /// Id of the assistant entry currently receiving stream deltas
    streaming_entry: Option<Uuid>,
    /// Id of the user entry currently receiving partial transcription
    partial_entry: Option<Uuid>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&ConversationEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn last(&self) -> Option<&ConversationEntry> {
        self.entries.last()
    }

    /// Id of the entry currently absorbing stream deltas, if any
    pub fn streaming_entry(&self) -> Option<Uuid> {
        self.streaming_entry
    }

    /// Append a finished entry
    pub fn push(&mut self, entry: ConversationEntry) -> Uuid {
        let id = entry.id;
        self.entries.push(entry);
        id
    }

    /// Append an assistant entry that will receive stream updates
    ///
    /// Any previous streaming handle is frozen first, so at most one
    /// entry is ever in streaming state.
    pub fn begin_stream(&mut self, flags: EntryFlags) -> Uuid {
        self.finish_stream();
        let entry = ConversationEntry::new(Role::Assistant, "").with_flags(EntryFlags {
            is_streaming: true,
            ..flags
        });
        let id = entry.id;
        self.entries.push(entry);
        self.streaming_entry = Some(id);
        id
    }

    /// Append a delta to the current streaming entry, creating one if no
    /// stream is open. Returns the id of the entry that was updated.
    pub fn append_stream_delta(&mut self, delta: &str, voice: bool) -> Uuid {
        let id = match self.streaming_entry {
            Some(id) => id,
            None => self.begin_stream(EntryFlags {
                is_voice: voice,
                ..EntryFlags::default()
            }),
        };
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry.content.push_str(delta);
        }
        id
    }

    /// Replace the content of an entry (used by sessionless API streams)
    pub fn set_content(&mut self, id: Uuid, content: impl Into<String>) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry.content = content.into();
        }
    }

    /// Append a chunk to an entry addressed by id
    pub fn append_content(&mut self, id: Uuid, chunk: &str) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry.content.push_str(chunk);
        }
    }

    /// Mark an entry as a surfaced error and freeze it
    pub fn mark_error(&mut self, id: Uuid, message: impl Into<String>) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry.content = message.into();
            entry.flags.is_error = true;
            entry.flags.is_streaming = false;
        }
        if self.streaming_entry == Some(id) {
            self.streaming_entry = None;
        }
    }

    /// Freeze the current streaming entry, if any
    pub fn finish_stream(&mut self) {
        if let Some(id) = self.streaming_entry.take() {
            if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
                entry.flags.is_streaming = false;
            }
        }
    }

    /// Freeze a specific entry by id, clearing the handle if it matches
    pub fn finish_entry(&mut self, id: Uuid) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry.flags.is_streaming = false;
        }
        if self.streaming_entry == Some(id) {
            self.streaming_entry = None;
        }
    }

    /// Absorb the final text of a completed response
    ///
    /// If a streaming entry is open it takes the authoritative text and
    /// is frozen; otherwise a fresh assistant entry is appended.
    pub fn absorb_final_text(&mut self, text: &str) -> Uuid {
        match self.streaming_entry.take() {
            Some(id) => {
                if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
                    entry.content = text.to_string();
                    entry.flags.is_streaming = false;
                }
                id
            }
            None => self.push(ConversationEntry::new(Role::Assistant, text).with_flags(
                EntryFlags {
                    is_voice: true,
                    ..EntryFlags::default()
                },
            )),
        }
    }

    /// Update the in-flight partial transcription entry, creating one if
    /// no partial is open.
    pub fn upsert_partial(&mut self, transcript: &str) -> Uuid {
        match self.partial_entry {
            Some(id) => {
                if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
                    entry.content = transcript.to_string();
                }
                id
            }
            None => {
                let entry =
                    ConversationEntry::new(Role::User, transcript).with_flags(EntryFlags {
                        is_voice: true,
                        is_partial: true,
                        ..EntryFlags::default()
                    });
                let id = entry.id;
                self.entries.push(entry);
                self.partial_entry = Some(id);
                id
            }
        }
    }

    /// Close the partial handle; the next partial starts a fresh entry
    pub fn close_partial(&mut self) {
        self.partial_entry = None;
    }

    /// Most recent finalized voice transcriptions, oldest first
    pub fn recent_voice_transcripts(&self, limit: usize) -> Vec<&str> {
        let mut recent: Vec<&str> = self
            .entries
            .iter()
            .rev()
            .filter(|e| e.role == Role::User && e.flags.is_voice && !e.flags.is_partial)
            .take(limit)
            .map(|e| e.content.as_str())
            .collect();
        recent.reverse();
        recent
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.streaming_entry = None;
        self.partial_entry = None;
    }
}
