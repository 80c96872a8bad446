//! Bearer shared-secret auth for the scheduled and administrative triggers.
//!
//! These endpoints are invoked by an external scheduler or operator tool,
//! never by end users, so a single shared credential is the whole surface.

use crate::startup::AppState;
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use service_core::auth::{bearer_token_matches, strip_bearer};
use service_core::error::AppError;

pub async fn job_auth_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let presented = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(strip_bearer)
        .ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!("Missing bearer credential"))
        })?;

    if !bearer_token_matches(presented, &state.config.jobs.trigger_token) {
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "Invalid trigger credential"
        )));
    }

    Ok(next.run(req).await)
}
