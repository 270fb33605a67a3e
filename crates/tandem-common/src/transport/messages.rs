//! Wire protocol for session synchronization messages.
//!
//! Field names are PascalCase JSON to match the session server. Every
//! payload carries full snapshots, never deltas, so a lost message is
//! repaired by the next one.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::identity::UserId;

/// One participant's caret and selection as seen by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserState {
    #[serde(rename = "ID")]
    pub id: UserId,
    /// Small, reused slot number; picks the display colour.
    #[serde(default)]
    pub index: u32,
    /// Caret offset in chars.
    #[serde(default)]
    pub position: usize,
    #[serde(default)]
    pub has_selection: bool,
    #[serde(default)]
    pub selection_start: usize,
    #[serde(default)]
    pub selection_end: usize,
}

impl UserState {
    /// A participant with a caret and no selection.
    pub fn caret(id: impl Into<UserId>, index: u32, position: usize) -> Self {
        Self {
            id: id.into(),
            index,
            position,
            has_selection: false,
            selection_start: 0,
            selection_end: 0,
        }
    }

    pub fn with_selection(mut self, range: Range<usize>) -> Self {
        self.has_selection = true;
        self.selection_start = range.start;
        self.selection_end = range.end;
        self
    }

    /// The selected range, if there is a non-empty one.
    pub fn selection(&self) -> Option<Range<usize>> {
        (self.has_selection && self.selection_start < self.selection_end)
            .then(|| self.selection_start..self.selection_end)
    }
}

/// Local state to report to the server, built by the document glue.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StateReport {
    /// Snapshot last reported (or received) before this one.
    pub base_text: String,
    /// Current snapshot.
    pub new_text: String,
    pub cursor: usize,
    pub selection: Option<Range<usize>>,
    /// This client's view of the other participants.
    pub users: Vec<UserState>,
}

/// Client -> server message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OutgoingMessage {
    pub ping: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_pos: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_selection: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_start: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_end: Option<usize>,
    #[serde(rename = "UserID", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<UserState>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_input_text: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_output_text: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_running_state: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running: Option<bool>,
}

impl OutgoingMessage {
    /// Heartbeat.
    pub fn ping() -> Self {
        Self {
            ping: true,
            ..Default::default()
        }
    }

    /// A state report. `language` is only set when the local choice should win.
    pub fn report(user_id: &UserId, report: StateReport, language: Option<String>) -> Self {
        let selection = report.selection.filter(|s| s.start < s.end);
        Self {
            base_text: Some(report.base_text),
            new_text: Some(report.new_text),
            cursor_pos: Some(report.cursor),
            has_selection: Some(selection.is_some()),
            selection_start: Some(selection.as_ref().map_or(0, |s| s.start)),
            selection_end: Some(selection.as_ref().map_or(0, |s| s.end)),
            user_id: Some(user_id.clone()),
            language,
            users: Some(report.users),
            ..Default::default()
        }
    }

    pub fn input_text(user_id: &UserId, text: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.clone()),
            update_input_text: Some(true),
            input_text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Clears the shared output and marks the program as running.
    pub fn execution_started(user_id: &UserId) -> Self {
        Self::execution_state(user_id, String::new(), String::new(), true)
    }

    pub fn execution_completed(
        user_id: &UserId,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::execution_state(user_id, stdout.into(), stderr.into(), false)
    }

    fn execution_state(user_id: &UserId, stdout: String, stderr: String, running: bool) -> Self {
        Self {
            user_id: Some(user_id.clone()),
            update_output_text: Some(true),
            stdout: Some(stdout),
            stderr: Some(stderr),
            update_running_state: Some(true),
            running: Some(running),
            ..Default::default()
        }
    }

    /// True for state reports (as opposed to heartbeats and auxiliary updates).
    pub fn is_report(&self) -> bool {
        !self.ping && self.new_text.is_some()
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(json).map_err(ProtocolError::Decode)
    }
}

/// Server -> client message.
///
/// The server serializes every field, using `null` for an empty user list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct IncomingMessage {
    pub ping: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<UserState>>,

    pub update_input_text: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_text: Option<String>,

    pub update_output_text: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,

    pub update_running_state: bool,
    pub running: bool,
}

impl IncomingMessage {
    /// Heartbeat answer.
    pub fn pong() -> Self {
        Self {
            ping: true,
            ..Default::default()
        }
    }

    /// A broadcast carrying the authoritative snapshot.
    pub fn snapshot(text: impl Into<String>, language: impl Into<String>, users: Vec<UserState>) -> Self {
        Self {
            new_text: Some(text.into()),
            language: Some(language.into()),
            users: Some(users),
            ..Default::default()
        }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(json).map_err(ProtocolError::Decode)
    }
}

/// Output of the last program run, shared by all participants.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecutionOutput {
    pub stdout: String,
    pub stderr: String,
}

/// A released inbound payload, with the "update" flags resolved.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RemoteUpdate {
    /// Authoritative document snapshot, if the payload carried one.
    pub text: Option<String>,
    /// Language asserted by the broadcast. Empty values are dropped.
    pub language: Option<String>,
    pub users: Vec<UserState>,
    pub input_text: Option<String>,
    pub output: Option<ExecutionOutput>,
    pub running: Option<bool>,
}

impl From<IncomingMessage> for RemoteUpdate {
    fn from(msg: IncomingMessage) -> Self {
        Self {
            text: msg.new_text,
            language: msg.language.filter(|l| !l.is_empty()),
            users: msg.users.unwrap_or_default(),
            input_text: msg
                .update_input_text
                .then(|| msg.input_text.unwrap_or_default()),
            output: msg.update_output_text.then(|| ExecutionOutput {
                stdout: msg.stdout.unwrap_or_default(),
                stderr: msg.stderr.unwrap_or_default(),
            }),
            running: msg.update_running_state.then_some(msg.running),
        }
    }
}
