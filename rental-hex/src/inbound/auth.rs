//! Authentication middleware for the staff API key.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use rental_types::ErrorResponse;

use super::handlers::AppState;

/// Extracts the API key from the Authorization header.
/// Expected format: "Bearer <api_key>" or just "<api_key>"
fn extract_api_key(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;
    Some(header.strip_prefix("Bearer ").unwrap_or(header))
}

/// Routes that are reachable without the staff API key.
///
/// The provider webhook authenticates with its signature instead.
pub(crate) fn is_public(path: &str) -> bool {
    path == "/health" || path == "/webhooks/provider" || path.starts_with("/docs")
        || path.starts_with("/api-docs")
}

/// Authentication middleware that validates the staff API key.
///
/// The key is hashed with SHA-256 and compared in constant time against the
/// hash configured at startup.
pub async fn auth_middleware<R, G>(
    State(state): State<Arc<AppState<R, G>>>,
    request: Request<Body>,
    next: Next,
) -> Response
where
    R: Send + Sync + 'static,
    G: Send + Sync + 'static,
{
    if is_public(request.uri().path()) {
        return next.run(request).await;
    }

    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok());

    let api_key = match extract_api_key(auth_header) {
        Some(key) if !key.is_empty() => key,
        _ => {
            return unauthorized_response("Missing or invalid Authorization header");
        }
    };

    if rental_repo::security::verify_api_key(api_key, &state.api_key_hash) {
        next.run(request).await
    } else {
        tracing::warn!(target: "security", path = %request.uri().path(), "Rejected API key");
        unauthorized_response("Invalid API key")
    }
}

fn unauthorized_response(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            success: false,
            error_code: "UNAUTHORIZED".into(),
            error: message.into(),
            warnings: Vec::new(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_api_key_bearer() {
        assert_eq!(
            extract_api_key(Some("Bearer sk_test_123")),
            Some("sk_test_123")
        );
    }

    #[test]
    fn test_extract_api_key_raw() {
        assert_eq!(extract_api_key(Some("sk_test_123")), Some("sk_test_123"));
    }

    #[test]
    fn test_extract_api_key_none() {
        assert_eq!(extract_api_key(None), None);
    }

    #[test]
    fn test_webhook_route_is_public() {
        assert!(is_public("/webhooks/provider"));
        assert!(is_public("/health"));
        assert!(!is_public("/api/reservations"));
    }
}
