//! Provider-side file handle and readiness state

use serde::{Deserialize, Serialize};

/// Readiness state reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderFileState {
    /// Still being ingested/transcoded
    Processing,
    /// Ready for downstream use
    Active,
    /// Terminal failure
    Failed,
    /// Any value this client does not recognize (kept verbatim for logs)
    Unrecognized(String),
}

impl ProviderFileState {
    /// Parse the provider's `state` field
    pub fn parse(raw: &str) -> Self {
        match raw {
            "PROCESSING" => ProviderFileState::Processing,
            "ACTIVE" => ProviderFileState::Active,
            "FAILED" => ProviderFileState::Failed,
            other => ProviderFileState::Unrecognized(other.to_string()),
        }
    }
}

/// One status answer: the readiness state plus the file resource as the
/// provider currently describes it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFileStatus {
    pub state: ProviderFileState,
    pub uri: Option<String>,
    pub mime_type: Option<String>,
    pub size_bytes: Option<u64>,
    pub display_name: Option<String>,
}

impl ProviderFileStatus {
    /// Status carrying only a state
    pub fn bare(state: ProviderFileState) -> Self {
        Self {
            state,
            uri: None,
            mime_type: None,
            size_bytes: None,
            display_name: None,
        }
    }
}

/// Opaque identifier + URI assigned by the provider after finalize
///
/// Owned by the provider; this service only caches it on the job and in the
/// persisted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFileHandle {
    /// Resource name used for status polling (e.g. `files/abc123`)
    pub name: String,
    /// URI downstream consumers reference the file by
    pub uri: String,
    /// MIME type as recorded by the provider, if reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_and_unknown_states() {
        assert_eq!(ProviderFileState::parse("PROCESSING"), ProviderFileState::Processing);
        assert_eq!(ProviderFileState::parse("ACTIVE"), ProviderFileState::Active);
        assert_eq!(ProviderFileState::parse("FAILED"), ProviderFileState::Failed);
        assert_eq!(
            ProviderFileState::parse("STATE_UNSPECIFIED"),
            ProviderFileState::Unrecognized("STATE_UNSPECIFIED".to_string())
        );
    }
}
