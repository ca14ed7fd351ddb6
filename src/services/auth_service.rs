use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use tracing::warn;

/// Pull an auth token from an explicit query-supplied token, the
/// Authorization header, or the `auth_token` cookie, in that order.
///
/// Browser WebSocket clients cannot set custom headers, which is why the
/// query parameter and cookie paths exist.
pub fn extract_token(headers: &HeaderMap, query_token: Option<&str>) -> Option<String> {
    if let Some(token) = query_token {
        return Some(token.to_string());
    }

    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            return Some(
                auth_str
                    .strip_prefix("Bearer ")
                    .unwrap_or(auth_str)
                    .to_string(),
            );
        }
    }

    if let Some(cookie_header) = headers.get(header::COOKIE) {
        if let Ok(cookies) = cookie_header.to_str() {
            for c in cookie::Cookie::split_parse(cookies).flatten() {
                if c.name() == "auth_token" {
                    return Some(c.value().to_string());
                }
            }
        }
    }

    None
}

/// Validate a JWT token and return the token data
pub fn validate_jwt(
    token: &str,
    secret: &str,
) -> Result<TokenData<serde_json::Value>, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<serde_json::Value>(token, &decoding_key, &validation)
}

/// Decide whether a connection may be admitted, returning the authenticated
/// identity reference to attach to it.
///
/// With no JWT secret configured the relay runs open and every connection is
/// admitted as `anonymous`. With a secret configured, connections without a
/// valid token are refused and never reach the room registry.
pub fn authorize_connection(headers: &HeaderMap, query_token: Option<&str>) -> Result<String, String> {
    let config = crate::config::get_config();
    let Some(secret) = &config.auth_jwt_secret else {
        warn!("No JWT secret configured - admitting connection without authentication");
        return Ok("anonymous".to_string());
    };

    let token =
        extract_token(headers, query_token).ok_or_else(|| "missing auth token".to_string())?;
    let token_data =
        validate_jwt(&token, secret).map_err(|e| format!("JWT validation failed: {}", e))?;

    match token_data.claims.get("sub").and_then(|v| v.as_str()) {
        Some(sub) => Ok(sub.to_string()),
        None => Err("JWT token does not contain 'sub' claim".to_string()),
    }
}
