//! Insight snapshots, one per survey, persisted in `insights.json`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use sv_domain::error::{Error, Result};
use sv_domain::insight::InsightSnapshot;

use crate::json_file;

pub struct InsightStore {
    path: PathBuf,
    snapshots: RwLock<HashMap<String, InsightSnapshot>>,
    flush_lock: Mutex<()>,
}

impl InsightStore {
    pub fn new(state_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_path).map_err(Error::Io)?;
        let path = state_path.join("insights.json");
        let snapshots: HashMap<String, InsightSnapshot> = json_file::load_or_default(&path)?;
        tracing::info!(snapshots = snapshots.len(), "insight store loaded");
        Ok(Self {
            path,
            snapshots: RwLock::new(snapshots),
            flush_lock: Mutex::new(()),
        })
    }

    pub fn get(&self, survey_id: &str) -> Option<InsightSnapshot> {
        self.snapshots.read().get(survey_id).cloned()
    }

    /// Replace the survey's snapshot. Concurrent writers are not
    /// coordinated; whichever upsert lands last is the live snapshot.
    pub fn upsert(&self, snapshot: InsightSnapshot) -> Result<()> {
        self.snapshots
            .write()
            .insert(snapshot.survey_id.clone(), snapshot);
        let _guard = self.flush_lock.lock();
        let all = self.snapshots.read().clone();
        json_file::write_atomic(&self.path, &all)
    }
}
