//! # Call Session Management
//!
//! Tracks the in-memory state of one phone call: the transcript buffer
//! and the provider-assigned stream identifier. Sessions live in the
//! [`CallRegistry`], keyed by call id, from the moment the media-stream
//! socket is accepted until post-call processing finishes.
//!
//! ## Session Lifecycle:
//! 1. **Opened**: media-stream connection accepted, session inserted
//! 2. **Streaming**: `start` event recorded the stream id, audio flows
//! 3. **Closing**: caller disconnected, transcript handed to the extractor
//! 4. **Removed**: deleted from the registry exactly once, after extraction
//!
//! There is no TTL or size bound: a connection that never closes keeps
//! its one entry alive.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// In-memory state for a single phone call.
///
/// Interior mutability keeps the session shareable between the relay
/// actor and the spawned realtime-link task without either holding a
/// lock across an await point.
pub struct CallSession {
    /// Opaque call identifier (telephony header, or timestamp fallback)
    call_id: String,

    /// Stream leg identifier, assigned by the provider's `start` event.
    /// Write-once: later `start` events are ignored.
    stream_sid: RwLock<Option<String>>,

    /// Append-only transcript, lines of `User: ...` / `Agent: ...` in
    /// event arrival order.
    transcript: RwLock<String>,

    /// When the session was opened
    pub created_at: DateTime<Utc>,
}

impl CallSession {
    pub fn new(call_id: String) -> Self {
        Self {
            call_id,
            stream_sid: RwLock::new(None),
            transcript: RwLock::new(String::new()),
            created_at: Utc::now(),
        }
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    /// Record the stream identifier from the provider's `start` event.
    ///
    /// Returns `false` (and keeps the existing value) if a stream id
    /// was already recorded for this call.
    pub fn set_stream_sid(&self, sid: String) -> bool {
        let mut guard = self.stream_sid.write().unwrap();
        match guard.as_ref() {
            Some(existing) => {
                warn!(
                    call_id = %self.call_id,
                    existing = %existing,
                    ignored = %sid,
                    "Duplicate start event, keeping existing stream id"
                );
                false
            }
            None => {
                *guard = Some(sid);
                true
            }
        }
    }

    pub fn stream_sid(&self) -> Option<String> {
        self.stream_sid.read().unwrap().clone()
    }

    /// Append a caller utterance. The text is trimmed before appending.
    pub fn append_user(&self, text: &str) {
        let line = format!("User: {}\n", text.trim());
        self.transcript.write().unwrap().push_str(&line);
        debug!(call_id = %self.call_id, "User: {}", text.trim());
    }

    /// Append an agent utterance, untrimmed (already shaped upstream).
    pub fn append_agent(&self, text: &str) {
        let line = format!("Agent: {}\n", text);
        self.transcript.write().unwrap().push_str(&line);
        debug!(call_id = %self.call_id, "Agent: {}", text);
    }

    /// Snapshot of the accumulated transcript.
    pub fn transcript(&self) -> String {
        self.transcript.read().unwrap().clone()
    }
}

/// Registry of live call sessions, keyed by call id.
///
/// Owned by the application state rather than living in an ambient
/// global; handlers reach it through `AppState`. At most one live
/// session exists per call id.
pub struct CallRegistry {
    sessions: RwLock<HashMap<String, Arc<CallSession>>>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Look up the session for `call_id`, inserting a fresh one if none
    /// exists. Returns the live session either way.
    pub fn open(&self, call_id: &str) -> Arc<CallSession> {
        let mut sessions = self.sessions.write().unwrap();
        sessions
            .entry(call_id.to_string())
            .or_insert_with(|| Arc::new(CallSession::new(call_id.to_string())))
            .clone()
    }

    pub fn get(&self, call_id: &str) -> Option<Arc<CallSession>> {
        self.sessions.read().unwrap().get(call_id).cloned()
    }

    /// Remove a session. Returns whether an entry was actually present,
    /// so double-removal is observable in logs.
    pub fn remove(&self, call_id: &str) -> bool {
        self.sessions.write().unwrap().remove(call_id).is_some()
    }

    pub fn active_count(&self) -> usize {
        self.sessions.read().unwrap().len()
    }
}

impl Default for CallRegistry {
    fn default() -> Self {
        Self::new()
    }
}
