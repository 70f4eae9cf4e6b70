//! Tenant extraction
//!
//! The `x-tenant-id` header names the tenant. Without it the configured
//! default tenant applies; with neither the request is refused.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::ApiError;
use crate::models::TenantId;
use crate::AppState;

pub const TENANT_HEADER: &str = "x-tenant-id";

/// Tenant owning the current request
#[derive(Debug, Clone)]
pub struct RequestTenant(pub TenantId);

#[async_trait]
impl FromRequestParts<AppState> for RequestTenant {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match parts.headers.get(TENANT_HEADER) {
            Some(value) => {
                let raw = value
                    .to_str()
                    .map_err(|_| ApiError::BadRequest("Invalid x-tenant-id header".to_string()))?;
                TenantId::new(raw)
                    .map(RequestTenant)
                    .ok_or_else(|| ApiError::BadRequest("Invalid x-tenant-id header".to_string()))
            }
            None => state
                .default_tenant
                .clone()
                .map(RequestTenant)
                .ok_or_else(|| ApiError::BadRequest("Missing x-tenant-id header".to_string())),
        }
    }
}
