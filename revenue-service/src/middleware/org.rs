//! Org context extractor for multi-tenant request scoping.
//!
//! The org id arrives in the X-Org-ID header, set by the gateway after it
//! has authenticated the caller and validated membership. Every repository
//! call is additionally org-filtered, so a bad header can only ever reach
//! that org's own rows.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use uuid::Uuid;

pub const ORG_ID_HEADER: &str = "X-Org-ID";

/// Tenant scope for a request.
#[derive(Debug, Clone, Copy)]
pub struct OrgContext {
    pub org_id: Uuid,
}

#[async_trait]
impl<S> FromRequestParts<S> for OrgContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(ORG_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Unauthorized(anyhow::anyhow!("Missing X-Org-ID header"))
            })?;

        let org_id = Uuid::parse_str(raw).map_err(|_| {
            AppError::BadRequest(anyhow::anyhow!("X-Org-ID is not a valid UUID"))
        })?;

        tracing::Span::current().record("org_id", raw);

        Ok(OrgContext { org_id })
    }
}
