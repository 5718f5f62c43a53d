//! Shared harness: a scripted model, controllable media providers, and an
//! `AppState` rooted in a temp dir.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use sv_domain::capability::Media;
use sv_domain::config::{Config, SurveySeed};
use sv_domain::error::{Error, Result};
use sv_domain::tool::ContentBlock;
use sv_gateway::bootstrap;
use sv_gateway::state::AppState;
use sv_media::{MediaLookup, MediaProvider};
use sv_providers::{ChatRequest, ChatResponse, LlmProvider, LlmRouter, ProviderRegistry};

pub const SURVEY_CODE: &str = "COMMUTE";

// ── Scripted model ────────────────────────────────────────────────────

pub enum Scripted {
    Blocks(Vec<ContentBlock>),
    Fail(String),
    /// Never answers within any reasonable timeout.
    Hang,
}

/// Replies from a queue; once the queue is empty every call returns a
/// short text reply.
#[derive(Default)]
pub struct ScriptedModel {
    queue: Mutex<VecDeque<Scripted>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<ChatRequest>>,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, reply: Scripted) {
        self.queue.lock().push_back(reply);
    }

    pub fn push_text(&self, text: &str) {
        self.push(Scripted::Blocks(vec![ContentBlock::text(text)]));
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl LlmProvider for ScriptedModel {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(req);

        let delay = *self.delay.lock();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }

        let next = self.queue.lock().pop_front();
        let blocks = match next {
            Some(Scripted::Blocks(blocks)) => blocks,
            Some(Scripted::Fail(message)) => {
                return Err(Error::Provider {
                    provider: "scripted".into(),
                    message,
                })
            }
            Some(Scripted::Hang) => {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
                Vec::new()
            }
            None => vec![ContentBlock::text("Tell me more.")],
        };
        Ok(ChatResponse {
            blocks,
            usage: None,
            model: "scripted-1".into(),
            finish_reason: Some("stop".into()),
        })
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }
}

// ── Media providers ───────────────────────────────────────────────────

/// Always finds the same item.
pub struct FixedMedia(pub &'static str);

#[async_trait]
impl MediaProvider for FixedMedia {
    async fn search(&self, query: &str) -> Result<Option<Media>> {
        Ok(Some(Media {
            url: format!("{}?q={}", self.0, query.replace(' ', "+")),
            attribution: Some("Photo by Test".into()),
            description: Some(format!("{query} photo")),
        }))
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// Never returns before the lookup timeout.
pub struct SlowMedia;

#[async_trait]
impl MediaProvider for SlowMedia {
    async fn search(&self, _query: &str) -> Result<Option<Media>> {
        tokio::time::sleep(Duration::from_secs(3_600)).await;
        Ok(None)
    }

    fn name(&self) -> &str {
        "slow"
    }
}

/// Finds an item after a fixed delay.
pub struct DelayedMedia(pub &'static str, pub Duration);

#[async_trait]
impl MediaProvider for DelayedMedia {
    async fn search(&self, query: &str) -> Result<Option<Media>> {
        tokio::time::sleep(self.1).await;
        FixedMedia(self.0).search(query).await
    }

    fn name(&self) -> &str {
        "delayed"
    }
}

pub fn fixed_media() -> MediaLookup {
    MediaLookup::new(
        Arc::new(FixedMedia("https://img.test/photo")),
        Arc::new(FixedMedia("https://vid.test/clip")),
        Duration::from_millis(500),
    )
}

/// Images resolve well after videos, both within the timeout.
pub fn staggered_media() -> MediaLookup {
    MediaLookup::new(
        Arc::new(DelayedMedia("https://img.test/photo", Duration::from_millis(150))),
        Arc::new(FixedMedia("https://vid.test/clip")),
        Duration::from_millis(1_000),
    )
}

pub fn slow_media() -> MediaLookup {
    MediaLookup::new(Arc::new(SlowMedia), Arc::new(SlowMedia), Duration::from_millis(50))
}

// ── AppState ──────────────────────────────────────────────────────────

pub struct Harness {
    pub state: AppState,
    pub model: Arc<ScriptedModel>,
    // Held so the state dir outlives the test.
    _dir: tempfile::TempDir,
}

pub fn test_config(dir: &std::path::Path, max_messages: u32) -> Config {
    let mut config = Config::default();
    config.storage.state_path = dir.to_path_buf();
    config.conversation.chunk_chars = 10;
    config.conversation.model_timeout_ms = 500;
    config.insights.model_timeout_ms = 500;
    config.surveys = vec![SurveySeed {
        code: SURVEY_CODE.into(),
        title: "Commuting habits".into(),
        topic: "how people get to work".into(),
        system_prompt: "You are interviewing someone about their commute.".into(),
        facilitator_intro: Some("I'm Sam from the transport office.".into()),
        max_messages,
    }];
    config
}

pub fn harness_with(max_messages: u32, media: MediaLookup, tweak: impl FnOnce(&mut Config)) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path(), max_messages);
    tweak(&mut config);

    let model = ScriptedModel::new();
    let registry = ProviderRegistry::from_providers([model.clone() as Arc<dyn LlmProvider>]);
    let llm = Arc::new(LlmRouter::new(registry, HashMap::new()));

    let state = bootstrap::build_app_state_with(Arc::new(config), llm, media).unwrap();
    Harness {
        state,
        model,
        _dir: dir,
    }
}

pub fn harness(max_messages: u32) -> Harness {
    harness_with(max_messages, fixed_media(), |_| {})
}

impl Harness {
    pub fn survey_id(&self) -> String {
        self.state
            .surveys
            .get_by_code(SURVEY_CODE)
            .map(|s| s.id)
            .unwrap()
    }

    /// Join with a scripted greeting; returns the session token.
    pub async fn join(&self) -> String {
        self.model.push_text("Hi! How do you usually get to work?");
        sv_gateway::runtime::participant::join(&self.state, SURVEY_CODE)
            .await
            .unwrap()
            .session_token
    }

    pub fn conversation_id(&self, token: &str) -> String {
        self.state.conversations.get_by_token(token).unwrap().id
    }
}
