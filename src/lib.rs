//! PDF Tools Server Library
//!
//! Backend for the compress and merge PDF tools. Every produced file is
//! handed out as an ephemeral download job guarded by a bearer token.
//!
//! # Modules
//!
//! - `jobs`: Job registry, tokens, download resolution, zip bundles, reaper
//! - `tools`: Artifact producers (Ghostscript compression, lopdf merging)
//! - `stats`: File-backed usage counters and review aggregates
//! - `routes`: HTTP surface

pub mod config;
pub mod error;
pub mod jobs;
pub mod routes;
pub mod state;
pub mod stats;
pub mod tools;

pub use config::Config;
pub use error::{AppError, Result};
pub use state::AppState;
