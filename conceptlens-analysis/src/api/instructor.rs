//! Calling instructor identity
//!
//! Authentication happens upstream; the service trusts the forwarded
//! `x-instructor-id` header.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::ApiError;

pub const INSTRUCTOR_HEADER: &str = "x-instructor-id";

/// Instructor id taken from the request headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructorId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for InstructorId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(INSTRUCTOR_HEADER)
            .ok_or_else(|| ApiError::BadRequest(format!("Missing {} header", INSTRUCTOR_HEADER)))?;

        let id = value
            .to_str()
            .map_err(|_| ApiError::BadRequest(format!("Malformed {} header", INSTRUCTOR_HEADER)))?
            .trim();

        if id.is_empty() {
            return Err(ApiError::BadRequest(format!("Empty {} header", INSTRUCTOR_HEADER)));
        }

        Ok(InstructorId(id.to_string()))
    }
}
