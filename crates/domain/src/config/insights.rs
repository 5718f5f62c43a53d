use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Insights and analysis
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightsConfig {
    /// A snapshot older than this is regenerated on the next read.
    #[serde(default = "d_300")]
    pub staleness_secs: u64,
    #[serde(default = "d_4096")]
    pub max_tokens: u32,
    /// Reply budget for the admin analysis chat.
    #[serde(default = "d_2048")]
    pub analysis_max_tokens: u32,
    #[serde(default = "d_120000")]
    pub model_timeout_ms: u64,
}

impl Default for InsightsConfig {
    fn default() -> Self {
        Self {
            staleness_secs: d_300(),
            max_tokens: d_4096(),
            analysis_max_tokens: d_2048(),
            model_timeout_ms: d_120000(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_300() -> u64 {
    300
}
fn d_4096() -> u32 {
    4096
}
fn d_2048() -> u32 {
    2048
}
fn d_120000() -> u64 {
    120_000
}
