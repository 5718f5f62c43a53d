//! Participant conversations, persisted in `conversations.json`.
//!
//! Conversations are addressed by id internally and by session token from
//! participant-facing routes; a token index is kept alongside the map.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use sv_domain::error::{Error, Result};
use sv_domain::survey::{Conversation, ConversationStatus};

use crate::json_file;

#[derive(Default)]
struct Inner {
    by_id: HashMap<String, Conversation>,
    by_token: HashMap<String, String>,
}

impl Inner {
    fn insert(&mut self, conv: Conversation) {
        self.by_token.insert(conv.session_token.clone(), conv.id.clone());
        self.by_id.insert(conv.id.clone(), conv);
    }
}

pub struct ConversationStore {
    path: PathBuf,
    inner: RwLock<Inner>,
    flush_lock: Mutex<()>,
}

/// A fresh bearer token: 64 hex characters from two v4 UUIDs.
fn new_session_token() -> String {
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

impl ConversationStore {
    /// Load or create the store at `state_path/conversations.json`.
    pub fn new(state_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_path).map_err(Error::Io)?;
        let path = state_path.join("conversations.json");
        let by_id: HashMap<String, Conversation> = json_file::load_or_default(&path)?;

        let mut inner = Inner::default();
        for conv in by_id.into_values() {
            inner.insert(conv);
        }

        tracing::info!(
            conversations = inner.by_id.len(),
            path = %path.display(),
            "conversation store loaded"
        );

        Ok(Self {
            path,
            inner: RwLock::new(inner),
            flush_lock: Mutex::new(()),
        })
    }

    /// Start a new active conversation in `survey_id`.
    pub fn create(&self, survey_id: &str) -> Result<Conversation> {
        let conv = Conversation {
            id: uuid::Uuid::new_v4().to_string(),
            survey_id: survey_id.to_owned(),
            session_token: new_session_token(),
            status: ConversationStatus::Active,
            turn_count: 0,
            started_at: Utc::now(),
            completed_at: None,
            duration_seconds: None,
        };
        self.inner.write().insert(conv.clone());
        self.flush()?;
        Ok(conv)
    }

    pub fn get(&self, id: &str) -> Option<Conversation> {
        self.inner.read().by_id.get(id).cloned()
    }

    pub fn get_by_token(&self, token: &str) -> Option<Conversation> {
        let inner = self.inner.read();
        let id = inner.by_token.get(token)?;
        inner.by_id.get(id).cloned()
    }

    /// Every conversation of a survey, oldest first.
    pub fn list_for_survey(&self, survey_id: &str) -> Vec<Conversation> {
        let mut out: Vec<Conversation> = self
            .inner
            .read()
            .by_id
            .values()
            .filter(|c| c.survey_id == survey_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        out
    }

    /// Count one committed turn, completing the conversation if `complete`.
    pub fn record_turn(&self, id: &str, complete: bool, now: DateTime<Utc>) -> Result<Conversation> {
        let updated = {
            let mut inner = self.inner.write();
            let conv = inner
                .by_id
                .get_mut(id)
                .ok_or_else(|| Error::NotFound(format!("conversation {id}")))?;
            conv.turn_count += 1;
            if complete {
                conv.finish(ConversationStatus::Completed, now);
            }
            conv.clone()
        };
        self.flush()?;
        Ok(updated)
    }

    /// End an active conversation. Returns the conversation as stored and
    /// whether this call changed it.
    pub fn finish(
        &self,
        id: &str,
        status: ConversationStatus,
        now: DateTime<Utc>,
    ) -> Result<(Conversation, bool)> {
        let (conv, changed) = {
            let mut inner = self.inner.write();
            let conv = inner
                .by_id
                .get_mut(id)
                .ok_or_else(|| Error::NotFound(format!("conversation {id}")))?;
            let changed = conv.finish(status, now);
            (conv.clone(), changed)
        };
        if changed {
            self.flush()?;
        }
        Ok((conv, changed))
    }

    /// Mark every active conversation of a survey abandoned. Returns how
    /// many were changed.
    pub fn abandon_active(&self, survey_id: &str, now: DateTime<Utc>) -> Result<usize> {
        let changed = {
            let mut inner = self.inner.write();
            inner
                .by_id
                .values_mut()
                .filter(|c| c.survey_id == survey_id)
                .map(|c| c.finish(ConversationStatus::Abandoned, now))
                .filter(|changed| *changed)
                .count()
        };
        if changed > 0 {
            self.flush()?;
        }
        Ok(changed)
    }

    pub fn flush(&self) -> Result<()> {
        let _guard = self.flush_lock.lock();
        let snapshot = self.inner.read().by_id.clone();
        json_file::write_atomic(&self.path, &snapshot)
    }
}
