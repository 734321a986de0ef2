//! Docchat Common - Shared types, utilities, and configuration for the docchat bot.
//!
//! This crate provides:
//! - Configuration types and loading (JSON file, `.env`, environment overrides)
//! - Error types and handling utilities
//! - Logging setup and trace ID helpers
//! - Utility functions used by the bot crate

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod util;

pub use config::{
    ChatPdfConfig, Config, ConfigSources, DocumentsConfig, ObservabilityConfig, TelegramConfig,
};
pub use error::{Error, Result, ResultExt};

