//! Team Holdings Library
//!
//! Estimates the share of a token's supply held by its team from a holder
//! snapshot, early post-deployment transfers and a user-supplied allowlist.

pub mod amount;
pub mod chain;
pub mod cli;
pub mod config;
pub mod error;
pub mod inputs;
pub mod pipeline;
pub mod provider;
pub mod report;
pub mod types;

// Re-export commonly used types
pub use chain::Chain;
pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::{AttributionPipeline, AttributionRequest};
pub use provider::{ProviderMode, ProviderRouter};
pub use report::ReportBundle;
