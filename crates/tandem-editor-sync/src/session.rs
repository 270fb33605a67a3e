//! Glue between one document and one session channel.
//!
//! `SyncSession` holds the per-document state the channel does not: the base
//! text of the next report, the applier's record of what was sent, the
//! presence markers and the displayed language.

use tandem_common::{
    BootstrapError, InitialSession, RemoteUpdate, SessionBootstrap, SessionKey, StateReport,
    SyncConfig, UserId, UserState,
};
use tandem_editor_core::{EditorDocument, normalize_line_endings};

use crate::apply::{ApplyOutcome, RemoteApplier};
use crate::error::SyncError;
use crate::presence::{PresenceOutcome, PresenceTracker, Theme};

/// What one released payload did to the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteOutcome {
    /// `None` if the payload carried no snapshot.
    pub text: Option<ApplyOutcome>,
    pub presence: PresenceOutcome,
    /// The displayed language changed to this value.
    pub language: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SyncSession {
    applier: RemoteApplier,
    presence: PresenceTracker,
    base_text: String,
    language: Option<String>,
}

impl SyncSession {
    pub fn new(local_id: UserId, config: &SyncConfig) -> Self {
        Self {
            applier: RemoteApplier::new(),
            presence: PresenceTracker::new(local_id, config.color_buckets),
            base_text: String::new(),
            language: None,
        }
    }

    /// Fetch the initial session and seed `doc` with it.
    ///
    /// A fetch that fails after its retries makes the session invalid.
    pub async fn attach<B, D>(
        bootstrap: &B,
        key: &SessionKey,
        config: &SyncConfig,
        doc: &mut D,
    ) -> Result<(Self, InitialSession), SyncError>
    where
        B: SessionBootstrap,
        D: EditorDocument,
    {
        let initial = bootstrap.fetch(key).await.map_err(|e| match e {
            BootstrapError::SessionInvalid { session_id, .. } => {
                SyncError::SessionInvalid { session_id }
            }
            other => SyncError::Bootstrap(other),
        })?;
        let mut session = Self::new(key.user_id.clone(), config);
        session.seed(doc, &initial);
        Ok((session, initial))
    }

    /// Replace the document with the initial session state.
    pub fn seed<D: EditorDocument>(&mut self, doc: &mut D, initial: &InitialSession) {
        self.presence.clear(doc);
        doc.set_text(&initial.text);
        doc.set_cursor_offset(0);
        doc.set_selection(None);
        self.base_text = normalize_line_endings(&initial.text).into_owned();
        self.applier.clear();
        self.language = Some(initial.language.clone()).filter(|l| !l.is_empty());
        tracing::debug!(len = doc.len_chars(), language = ?self.language, "seeded session document");
    }

    /// Build the next report and remember its snapshot as sent.
    pub fn build_report<D: EditorDocument>(&mut self, doc: &D) -> StateReport {
        let new_text = doc.content_string();
        let base_text = std::mem::replace(&mut self.base_text, new_text.clone());
        self.applier.record_sent(new_text.clone());
        StateReport {
            base_text,
            new_text,
            cursor: doc.cursor_offset(),
            selection: doc
                .selection()
                .filter(|s| !s.is_collapsed())
                .map(|s| s.to_range()),
            users: self.presence.current_presence_for_broadcast(doc),
        }
    }

    /// Fold a released payload into the document: text, then presence, then
    /// language.
    pub fn handle_remote<D: EditorDocument>(
        &mut self,
        doc: &mut D,
        update: &RemoteUpdate,
    ) -> RemoteOutcome {
        let text = update.text.as_deref().map(|incoming| {
            let outcome = self.applier.apply(doc, incoming);
            metrics::counter!("tandem_remote_updates_total").increment(1);
            if matches!(outcome, ApplyOutcome::SuppressedEcho) {
                metrics::counter!("tandem_remote_updates_suppressed_total").increment(1);
            }
            // An echo leaves the buffer ahead of the server. The base stays at
            // our last report so the next one still carries the unsent typing.
            if outcome != ApplyOutcome::SuppressedEcho {
                self.base_text = normalize_line_endings(incoming).into_owned();
            }
            outcome
        });

        let presence = self.presence.update_presence(doc, &update.users);

        let language = update
            .language
            .as_ref()
            .filter(|l| self.language.as_ref() != Some(*l))
            .cloned();
        if let Some(language) = &language {
            tracing::debug!(%language, "remote language change");
            self.language = Some(language.clone());
        }

        RemoteOutcome {
            text,
            presence,
            language,
        }
    }

    /// Language currently shown for the document.
    pub fn displayed_language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// Record a language picked locally, before it is sent.
    pub fn set_displayed_language(&mut self, language: impl Into<String>) {
        self.language = Some(language.into());
    }

    pub fn base_text(&self) -> &str {
        &self.base_text
    }

    /// Remote participants as they sit in the document now.
    pub fn presence<D: EditorDocument>(&self, doc: &D) -> Vec<UserState> {
        self.presence.current_presence_for_broadcast(doc)
    }

    pub fn set_theme<D: EditorDocument>(&mut self, doc: &mut D, theme: Theme) {
        self.presence.set_theme(doc, theme);
    }
}
