//! Core types, errors, and constants for Dejavu
//!
//! This crate provides the foundational pieces shared by the Dejavu media
//! deduplication pipeline: media and post identifiers, the derived-feature
//! model, the schema-versioned embedding codec, and the similarity math used
//! by the candidate matcher.

pub mod codec;
pub mod constants;
pub mod error;
pub mod similarity;
pub mod types;

// Re-exports for convenience
pub use error::{Error, Result};
pub use types::*;
