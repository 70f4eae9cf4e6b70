//! URL-import admission
//!
//! A URL is accepted when it is http(s) and either its path ends in a known
//! media extension or its host belongs to an allow-listed storage provider.
//! Everything else is rejected before any network request is made.

use crate::error::IngestError;
use crate::models::media::{extension_of, DIRECT_MEDIA_EXTENSIONS};
use reqwest::Url;

#[derive(Debug, Clone)]
pub struct UrlPolicy {
    allowed_hosts: Vec<String>,
}

impl UrlPolicy {
    pub fn new(allowed_hosts: &[String]) -> Self {
        Self {
            allowed_hosts: allowed_hosts
                .iter()
                .map(|host| host.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|host| !host.is_empty())
                .collect(),
        }
    }

    /// Parse and admit `raw`, or explain why it is refused
    pub fn check(&self, raw: &str) -> Result<Url, IngestError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(IngestError::Validation("A URL is required.".to_string()));
        }

        let url = Url::parse(raw)
            .map_err(|_| IngestError::Validation("Please provide a valid URL.".to_string()))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(IngestError::Validation(
                "Only http and https URLs can be imported.".to_string(),
            ));
        }

        let host = url
            .host_str()
            .ok_or_else(|| IngestError::Validation("The URL has no host.".to_string()))?
            .to_ascii_lowercase();

        let has_media_extension = extension_of(url.path())
            .map(|ext| DIRECT_MEDIA_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false);

        if has_media_extension || self.host_allowed(&host) {
            Ok(url)
        } else {
            Err(IngestError::Validation(format!(
                "The URL must point directly to a video file ({}) or to a supported storage provider.",
                DIRECT_MEDIA_EXTENSIONS.join(", ")
            )))
        }
    }

    /// Exact match or a subdomain of an allow-listed host
    fn host_allowed(&self, host: &str) -> bool {
        self.allowed_hosts.iter().any(|allowed| {
            host == allowed
                || host
                    .strip_suffix(allowed.as_str())
                    .map(|prefix| prefix.ends_with('.'))
                    .unwrap_or(false)
        })
    }
}
