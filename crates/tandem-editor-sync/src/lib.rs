//! tandem-editor-sync: keeps a local document in step with a shared session.
//!
//! This crate provides:
//! - `RemoteApplier` - applies authoritative snapshots without losing the caret
//! - `PresenceTracker` - remote carets and selections as tracked ranges
//! - `LanguageArbiter` - local-precedence grace window for the shared language
//! - `SessionClock` - heartbeat, silence and language timestamps
//! - `SessionChannel` - throttled reports, held payloads, heartbeat and reconnect
//! - `SyncSession` - per-document glue between a document and its channel
//!
//! A consumer typically attaches a `SyncSession`, spawns a `SessionChannel`,
//! answers `ChannelEvent::ReportDue` with `build_report` and passes every
//! `ChannelEvent::Remote` to `handle_remote`.

pub mod apply;
pub mod channel;
pub mod clock;
pub mod coordinator;
pub mod error;
pub mod language;
pub mod presence;
pub mod session;

pub use apply::{ApplyOutcome, RemoteApplier};
pub use channel::{ChannelEvent, ChannelEvents, SessionChannel};
pub use clock::SessionClock;
pub use coordinator::ChannelState;
pub use error::SyncError;
pub use language::{LanguageArbiter, resolve_outgoing_language};
pub use presence::{PresenceOutcome, PresenceTracker, Theme, color_bucket};
pub use session::{RemoteOutcome, SyncSession};
