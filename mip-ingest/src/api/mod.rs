//! HTTP API handlers for mip-ingest
//!
//! Ingestion endpoints answer with a per-job event stream; file and health
//! endpoints are plain JSON.

pub mod files;
pub mod health;
pub mod ingest;
pub mod sse;
pub mod tenant;

pub use files::file_routes;
pub use health::health_routes;
pub use ingest::ingest_routes;
pub use sse::job_event_stream;
pub use tenant::{RequestTenant, TENANT_HEADER};
