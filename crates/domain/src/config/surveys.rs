use serde::{Deserialize, Serialize};

/// Survey definition seeded from `[[surveys]]`.
///
/// Seeds are inserted on startup when no survey with the same code exists;
/// an existing survey keeps its persisted status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveySeed {
    pub code: String,
    pub title: String,
    pub topic: String,
    pub system_prompt: String,
    #[serde(default)]
    pub facilitator_intro: Option<String>,
    #[serde(default = "d_20")]
    pub max_messages: u32,
}

fn d_20() -> u32 {
    crate::survey::DEFAULT_MAX_MESSAGES
}
