//! AppState construction and background-task spawning extracted from `main.rs`.
//!
//! `serve` and the one-shot `insights` command share [`build_app_state`] so
//! they boot the same runtime with or without an HTTP listener.

use std::sync::Arc;

use anyhow::Context;
use sha2::{Digest, Sha256};

use sv_domain::config::{Config, ConfigSeverity};
use sv_media::MediaLookup;
use sv_providers::LlmRouter;
use sv_sessions::{ConversationStore, InsightStore, SurveyStore, TranscriptWriter};

use crate::runtime::session_lock::SessionLockMap;
use crate::state::AppState;

/// Validate config, initialize every subsystem and return a fully-wired
/// [`AppState`].
pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── LLM router ───────────────────────────────────────────────────
    let llm = Arc::new(LlmRouter::from_config(&config.llm));
    if llm.registry().is_empty() {
        tracing::info!("no LLM providers initialized; configure API keys to enable conversations");
    } else {
        tracing::info!(
            providers = llm.registry().len(),
            ids = ?llm.registry().list_providers(),
            "LLM router ready"
        );
    }

    // ── Media lookup ─────────────────────────────────────────────────
    let media = MediaLookup::from_config(&config.media);
    tracing::info!(timeout_ms = config.media.timeout_ms, "media lookup ready");

    build_app_state_with(config, llm, media)
}

/// Wire the stores around an already-built router and media lookup.
/// Tests use this to inject scripted providers.
pub fn build_app_state_with(
    config: Arc<Config>,
    llm: Arc<LlmRouter>,
    media: MediaLookup,
) -> anyhow::Result<AppState> {
    let state_path = &config.storage.state_path;
    std::fs::create_dir_all(state_path)
        .with_context(|| format!("creating state directory {}", state_path.display()))?;

    // ── Surveys ──────────────────────────────────────────────────────
    let surveys = Arc::new(SurveyStore::new(state_path).context("loading survey store")?);
    let seeded = surveys
        .seed(&config.surveys)
        .context("seeding surveys from config")?;
    tracing::info!(
        surveys = surveys.list().len(),
        seeded,
        "survey seeds applied"
    );

    // ── Conversations & insights ─────────────────────────────────────
    let conversations =
        Arc::new(ConversationStore::new(state_path).context("loading conversation store")?);
    let insights = Arc::new(InsightStore::new(state_path).context("loading insight store")?);
    tracing::info!("conversation + insight stores loaded");

    // ── Transcripts ──────────────────────────────────────────────────
    let transcripts = Arc::new(
        TranscriptWriter::new(&config.storage.transcripts_dir())
            .context("initializing transcript writer")?,
    );
    let analysis_transcripts = Arc::new(
        TranscriptWriter::new(&config.storage.analysis_dir())
            .context("initializing analysis transcript writer")?,
    );
    tracing::info!(
        path = %config.storage.transcripts_dir().display(),
        "transcript writers ready"
    );

    // ── Session locks (per-conversation concurrency) ─────────────────
    let session_locks = Arc::new(SessionLockMap::new());
    tracing::info!("session lock map ready");

    // ── Admin token (read once, hash for constant-time comparison) ──
    let admin_token_hash = {
        let env_var = &config.server.admin_token_env;
        match std::env::var(env_var).ok().filter(|t| !t.is_empty()) {
            Some(t) => {
                tracing::info!(source = %format!("env:{env_var}"), "admin bearer-token auth enabled");
                Some(Sha256::digest(t.as_bytes()).to_vec())
            }
            None => {
                tracing::warn!("admin bearer-token auth DISABLED; set the {env_var} env var");
                None
            }
        }
    };

    Ok(AppState {
        config,
        llm,
        media,
        surveys,
        conversations,
        insights,
        transcripts,
        analysis_transcripts,
        session_locks,
        admin_token_hash,
    })
}

/// Spawn the long-running background tokio tasks. Stores persist on every
/// write, so the only periodic job is pruning idle conversation locks.
///
/// Call this **after** [`build_app_state`] when running the HTTP server.
/// One-shot CLI commands skip it.
pub fn spawn_background_tasks(state: &AppState) {
    // ── Periodic session lock pruning ────────────────────────────────
    {
        let session_locks = state.session_locks.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                session_locks.prune_idle();
            }
        });
    }
    tracing::info!("background tasks spawned");
}
