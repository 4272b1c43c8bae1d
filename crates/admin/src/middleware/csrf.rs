//! CSRF protection for form posts and AJAX calls.
//!
//! Each session gets one random token. Pages embed it in forms as a
//! hidden `csrf_token` field and in a `<meta name="csrf-token">` tag that
//! page scripts copy into the `x-csrf-token` header.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use rand::RngCore;
use tower_sessions::Session;

use crate::models::session_keys;

/// Header carrying the token on AJAX requests.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// The session's CSRF token, created on first use.
///
/// # Errors
///
/// Returns an error if the session store fails.
pub async fn token(session: &Session) -> Result<String, tower_sessions::session::Error> {
    if let Some(existing) = session.get::<String>(session_keys::CSRF_TOKEN).await? {
        return Ok(existing);
    }

    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    let token = hex::encode(bytes);
    session.insert(session_keys::CSRF_TOKEN, &token).await?;
    Ok(token)
}

/// Whether `supplied` matches the session's token.
pub async fn verify(session: &Session, supplied: &str) -> bool {
    match session.get::<String>(session_keys::CSRF_TOKEN).await {
        Ok(Some(expected)) => !supplied.is_empty() && constant_time_eq(&expected, supplied),
        _ => false,
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Extractor that checks the `x-csrf-token` header of an AJAX request.
#[derive(Debug)]
pub struct CsrfHeader;

/// Missing or wrong CSRF token.
#[derive(Debug)]
pub struct CsrfRejection;

impl IntoResponse for CsrfRejection {
    fn into_response(self) -> Response {
        (
            StatusCode::FORBIDDEN,
            axum::Json(serde_json::json!({
                "success": false,
                "error": "Token de seguridad inválido. Recargá la página.",
            })),
        )
            .into_response()
    }
}

impl<S> FromRequestParts<S> for CsrfHeader
where
    S: Send + Sync,
{
    type Rejection = CsrfRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = parts.extensions.get::<Session>().ok_or(CsrfRejection)?;
        let supplied = parts
            .headers
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(CsrfRejection)?;

        if verify(session, supplied).await {
            Ok(Self)
        } else {
            Err(CsrfRejection)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use tower_sessions::MemoryStore;

    use super::*;

    fn session() -> Session {
        Session::new(None, Arc::new(MemoryStore::default()), None)
    }

    #[tokio::test]
    async fn test_token_is_stable_per_session() {
        let session = session();
        let first = token(&session).await.unwrap();
        let second = token(&session).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);

        let other = token(&self::session()).await.unwrap();
        assert_ne!(first, other);
    }

    #[tokio::test]
    async fn test_verify() {
        let session = session();
        assert!(!verify(&session, "anything").await);

        let token = token(&session).await.unwrap();
        assert!(verify(&session, &token).await);
        assert!(!verify(&session, "").await);
        assert!(!verify(&session, &token[1..]).await);
        assert!(!verify(&session, &"0".repeat(64)).await);
    }
}
