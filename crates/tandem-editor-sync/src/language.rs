//! Arbitration of the shared language tag.
//!
//! The language is one scalar shared by every participant with no merge. A
//! local change wins for a short grace window: reports built inside it carry
//! the local value, and broadcasts arriving inside it cannot override it.
//! Outside the window reports carry no language and the latest broadcast
//! decides what is displayed.

use std::time::Duration;

use web_time::Instant;

use crate::clock::SessionClock;

/// Language an outgoing report should carry.
///
/// `Some` only if the local selection changed less than `grace` before `now`.
pub fn resolve_outgoing_language(
    local_selection: Option<&str>,
    last_local_change_at: Option<Instant>,
    now: Instant,
    grace: Duration,
) -> Option<String> {
    let changed_at = last_local_change_at?;
    if now.saturating_duration_since(changed_at) < grace {
        local_selection.map(str::to_owned)
    } else {
        None
    }
}

/// Local language selection, timed through the channel's [`SessionClock`].
#[derive(Debug, Clone)]
pub struct LanguageArbiter {
    selected: Option<String>,
    grace: Duration,
}

impl LanguageArbiter {
    pub fn new(grace: Duration) -> Self {
        Self {
            selected: None,
            grace,
        }
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// The local user picked a language.
    pub fn select_local(&mut self, language: impl Into<String>, clock: &mut SessionClock, now: Instant) {
        self.selected = Some(language.into());
        clock.record_language_change(now);
    }

    /// Language for a report built at `now`.
    pub fn resolve_outgoing(&self, clock: &SessionClock, now: Instant) -> Option<String> {
        resolve_outgoing_language(
            self.selected.as_deref(),
            clock.last_language_change_at(),
            now,
            self.grace,
        )
    }

    /// Filter the language asserted by a broadcast released at `now`.
    ///
    /// Inside the grace window the remote value is dropped (the local choice is
    /// still in flight). Otherwise an accepted remote value also becomes the
    /// local selection.
    pub fn observe_remote(
        &mut self,
        remote: Option<String>,
        clock: &SessionClock,
        now: Instant,
    ) -> Option<String> {
        let remote = remote.filter(|l| !l.is_empty())?;
        if self.resolve_outgoing(clock, now).is_some() {
            tracing::debug!(remote = %remote, "local language change still in grace window");
            return None;
        }
        self.selected = Some(remote.clone());
        Some(remote)
    }
}
