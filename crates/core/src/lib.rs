//! grabmodels_core - Core library for detection model provisioning
//!
//! This crate provides:
//! - Model directory resolution from env overrides and mount conventions
//! - SAS-authenticated download URLs with log-safe masking
//! - Streaming downloads with retry/backoff, checksum verification, archive install
//! - The idempotent `ensure` / `assert_present` / `redownload` operations

pub mod archive;
pub mod config;
pub mod downloader;
pub mod fixtures;
pub mod integrity;
pub mod manager;
pub mod paths;
pub mod registry;
pub mod retry;
pub mod url;

mod staging;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use manager::{ModelManager, ProvisionError};
pub use registry::{ModelEntry, ModelKey, ModelRegistry};
