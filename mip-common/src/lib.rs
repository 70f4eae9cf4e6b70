//! # MIP Common Library
//!
//! Shared code for the media ingestion services and their Rust clients:
//! - Error type
//! - Progress event model (the payloads carried on an ingestion event stream)
//! - Event-stream wire codec (encoder and incremental decoder)
//! - Configuration file loading and logging setup
//! - Human-readable byte formatting

pub mod config;
pub mod error;
pub mod events;
pub mod human_size;
pub mod logging;
pub mod sse;

pub use error::{Error, Result};
pub use events::{ProgressEvent, ProgressPhase};
