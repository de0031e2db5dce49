//! Shared data model, error type, and configuration for the clinical concept
//! relevance engine.

pub mod config;
pub mod error;
pub mod types;

pub use config::ClinrankConfig;
pub use error::{ClinrankError, MissingFeature, Result};
pub use types::*;
