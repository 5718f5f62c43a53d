//! Persistent state for Surveyor.
//!
//! Survey definitions, participant conversations, and insight snapshots
//! live in JSON files under the configured state path; each conversation's
//! messages live in an append-only JSONL transcript whose lines are either
//! prose or a replay envelope of side-channel events.

mod json_file;

pub mod conversations;
pub mod snapshots;
pub mod surveys;
pub mod transcript;

pub use conversations::ConversationStore;
pub use snapshots::InsightStore;
pub use surveys::SurveyStore;
pub use transcript::{TranscriptEntry, TranscriptLine, TranscriptWriter};
