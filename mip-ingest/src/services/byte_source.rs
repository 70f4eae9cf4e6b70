//! Where a job's bytes come from
//!
//! The three input modes differ only here; everything after the bytes (or
//! the provider file, for direct uploads) is shared pipeline code.

use crate::services::direct_grant::IssuedGrant;
use axum::body::Bytes;

#[derive(Debug, Clone)]
pub enum ByteSource {
    /// Payload already buffered by this server (thin upload)
    ServerBuffer {
        bytes: Bytes,
        mime_type: String,
        display_name: Option<String>,
    },
    /// Remote URL fetched server-side
    RemoteUrl { url: String, title: Option<String> },
    /// Browser uploaded straight to the provider under a redeemed grant;
    /// only the provider file name is known
    BrowserDirect { file_name: String, grant: IssuedGrant },
}
