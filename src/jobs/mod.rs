//! Download Jobs
//!
//! Every artifact the server produces is tracked as a job that a client can
//! redeem with a bearer token for a limited time:
//! - `registry`: registration, lookup, token validation and removal
//! - `bundle`: zips several jobs into a new job
//! - `reaper`: background removal of expired jobs and their files
//! - `store`: record persistence (index directory or memory)
//!
//! Lifecycle:
//! 1. A producer finishes an artifact and registers it
//! 2. The client downloads it (or bundles it) while the token is valid
//! 3. The reaper deletes record and files once the job has expired

pub mod bundle;
pub mod reaper;
pub mod registry;
pub mod store;
pub mod token;
pub mod types;

pub use bundle::{BundleBuilder, BundleJob};
pub use reaper::{Reaper, ReaperHandle, SweepReport};
pub use registry::{Download, JobRegistry};
pub use store::{DirectoryJobStore, JobStore, MemoryJobStore};
pub use types::*;
