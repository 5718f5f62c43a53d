use std::sync::Arc;

use sv_domain::config::Config;
use sv_media::MediaLookup;
use sv_providers::LlmRouter;
use sv_sessions::{ConversationStore, InsightStore, SurveyStore, TranscriptWriter};

use crate::runtime::session_lock::SessionLockMap;

/// Shared application state passed to all API handlers.
///
/// Fields are grouped by concern:
/// - **Core services**: config, model router, media lookup
/// - **Stores**: surveys, conversations, insight snapshots, transcripts
/// - **Concurrency & security**: per-conversation locks, admin token hash
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub llm: Arc<LlmRouter>,
    pub media: MediaLookup,

    // ── Stores ────────────────────────────────────────────────────────
    pub surveys: Arc<SurveyStore>,
    pub conversations: Arc<ConversationStore>,
    pub insights: Arc<InsightStore>,
    /// Participant conversation transcripts, keyed by conversation id.
    pub transcripts: Arc<TranscriptWriter>,
    /// Admin analysis chat transcripts, keyed by survey id.
    pub analysis_transcripts: Arc<TranscriptWriter>,

    // ── Concurrency & security ────────────────────────────────────────
    pub session_locks: Arc<SessionLockMap>,
    /// SHA-256 hash of the admin bearer token (read once at startup).
    /// `None` = dev mode (admin endpoints accessible without auth).
    pub admin_token_hash: Option<Vec<u8>>,
}

impl AppState {
    /// Persist every JSON-backed store. Transcripts are append-only and
    /// already on disk.
    pub fn flush_all(&self) {
        if let Err(e) = self.surveys.flush() {
            tracing::warn!(error = %e, "survey store flush failed");
        }
        if let Err(e) = self.conversations.flush() {
            tracing::warn!(error = %e, "conversation store flush failed");
        }
    }
}
