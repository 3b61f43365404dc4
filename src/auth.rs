use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::response::AppError;

/// Set by the gateway after it has authenticated the caller.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Id of the authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
}

pub fn extract_user_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        extract_user_id(&parts.headers)
            .map(|id| AuthUser { id })
            .ok_or_else(|| AppError::unauthorized("missing user identity"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn blank_header_is_rejected() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_user_id(&headers), None);
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("  "));
        assert_eq!(extract_user_id(&headers), None);
        headers.insert(USER_ID_HEADER, HeaderValue::from_static(" u1 "));
        assert_eq!(extract_user_id(&headers).as_deref(), Some("u1"));
    }
}
