//! Shared types, error model, and configuration for Feedloom.
//!
//! This crate is the foundation depended on by all other Feedloom crates.
//! It provides:
//! - [`FeedloomError`] — the unified error type
//! - Domain types ([`Feed`], [`Item`], [`StageMarker`], [`FeedId`], [`ItemId`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, SchedulerConfig, SpeechConfig, TextgenConfig, config_dir,
    config_file_path, expand_home, init_config, load_config, load_config_from, validate_api_key,
};
pub use error::{FeedloomError, Result};
pub use types::{Feed, FeedId, FeedKind, Item, ItemId, ItemKind, StageMarker};
