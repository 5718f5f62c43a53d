use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// On-disk layout root. Holds `surveys.json`, `conversations.json`,
/// `insights.json`, and the `transcripts/` directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: d_state_path(),
        }
    }
}

impl StorageConfig {
    pub fn transcripts_dir(&self) -> PathBuf {
        self.state_path.join("transcripts")
    }

    pub fn analysis_dir(&self) -> PathBuf {
        self.state_path.join("analysis")
    }
}

fn d_state_path() -> PathBuf {
    PathBuf::from("./data")
}
