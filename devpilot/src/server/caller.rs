//! Caller identity extraction
//!
//! Authentication happens in front of this service; it forwards the
//! authenticated user id in a request header.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::errors::PilotError;
use crate::orchestrator::Caller;

pub const CALLER_HEADER: &str = "x-devpilot-user";

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = PilotError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(CALLER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| PilotError::Unauthorized(format!("Missing {} header", CALLER_HEADER)))?;
        Ok(Caller::new(id))
    }
}
