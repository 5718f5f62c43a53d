//! Survey definitions, persisted in `surveys.json`.
//!
//! Surveys are authored elsewhere; this store holds what the gateway needs
//! to route participants (code lookup) and gate submissions (status).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use sv_domain::config::SurveySeed;
use sv_domain::error::{Error, Result};
use sv_domain::survey::{Survey, SurveyStatus};

use crate::json_file;

pub struct SurveyStore {
    path: PathBuf,
    surveys: RwLock<HashMap<String, Survey>>,
    flush_lock: Mutex<()>,
}

impl SurveyStore {
    /// Load or create the store at `state_path/surveys.json`.
    pub fn new(state_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_path).map_err(Error::Io)?;
        let path = state_path.join("surveys.json");
        let surveys: HashMap<String, Survey> = json_file::load_or_default(&path)?;

        tracing::info!(
            surveys = surveys.len(),
            path = %path.display(),
            "survey store loaded"
        );

        Ok(Self {
            path,
            surveys: RwLock::new(surveys),
            flush_lock: Mutex::new(()),
        })
    }

    /// Insert config-defined surveys whose code is not already present.
    /// Returns how many were added. Existing surveys keep their status.
    pub fn seed(&self, seeds: &[SurveySeed]) -> Result<usize> {
        let added = {
            let mut surveys = self.surveys.write();
            let mut added = 0;
            for seed in seeds {
                let code = Survey::normalize_code(&seed.code);
                if surveys.values().any(|s| s.code == code) {
                    continue;
                }
                let survey = Survey {
                    id: uuid::Uuid::new_v4().to_string(),
                    code,
                    title: seed.title.clone(),
                    topic: seed.topic.clone(),
                    system_prompt: seed.system_prompt.clone(),
                    facilitator_intro: seed.facilitator_intro.clone(),
                    status: SurveyStatus::Active,
                    max_messages: seed.max_messages,
                    created_at: Utc::now(),
                    closed_at: None,
                };
                tracing::debug!(survey_id = %survey.id, code = %survey.code, "seeded survey");
                surveys.insert(survey.id.clone(), survey);
                added += 1;
            }
            added
        };
        if added > 0 {
            self.flush()?;
        }
        Ok(added)
    }

    pub fn insert(&self, survey: Survey) -> Result<()> {
        self.surveys.write().insert(survey.id.clone(), survey);
        self.flush()
    }

    pub fn get(&self, id: &str) -> Option<Survey> {
        self.surveys.read().get(id).cloned()
    }

    /// Case-insensitive lookup by join code.
    pub fn get_by_code(&self, code: &str) -> Option<Survey> {
        let code = Survey::normalize_code(code);
        self.surveys.read().values().find(|s| s.code == code).cloned()
    }

    /// All surveys, newest first.
    pub fn list(&self) -> Vec<Survey> {
        let mut out: Vec<Survey> = self.surveys.read().values().cloned().collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    /// Change a survey's status. Closing stamps `closed_at`; any other
    /// status clears it.
    pub fn set_status(&self, id: &str, status: SurveyStatus, now: DateTime<Utc>) -> Result<Survey> {
        let updated = {
            let mut surveys = self.surveys.write();
            let survey = surveys
                .get_mut(id)
                .ok_or_else(|| Error::NotFound(format!("survey {id}")))?;
            survey.status = status;
            survey.closed_at = match status {
                SurveyStatus::Closed => Some(now),
                _ => None,
            };
            survey.clone()
        };
        self.flush()?;
        Ok(updated)
    }

    /// Persist to disk. Snapshots are taken under the flush lock so the
    /// last writer always writes the newest state.
    pub fn flush(&self) -> Result<()> {
        let _guard = self.flush_lock.lock();
        let snapshot = self.surveys.read().clone();
        json_file::write_atomic(&self.path, &snapshot)
    }
}
