pub mod capability;
pub mod config;
pub mod error;
pub mod event;
pub mod insight;
pub mod survey;
pub mod tool;
pub mod trace;
