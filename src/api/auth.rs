//! Request identity. Authentication happens upstream of this service;
//! requests arrive with the verified account id in the `x-user-id`
//! header and anything without one is rejected.

use axum::Json;
use axum::extract::FromRequestParts;
use http::StatusCode;
use http::request::Parts;
use serde_json::{Value, json};

/// The acting user's account id, extracted from the `x-user-id`
/// header.
pub struct UserId(pub String);

impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<Value>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| UserId(value.to_string()))
            .ok_or((
                StatusCode::UNAUTHORIZED,
                Json(json!({ "message": "Missing x-user-id header" })),
            ))
    }
}
