//! Admin session tokens: HMAC-SHA256 signed, age-limited, carried in an
//! HttpOnly cookie. The password check lives in the auth handlers; this
//! module only mints and verifies tokens.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Maximum session age before the token is considered expired (24 hours).
const MAX_SESSION_AGE_SECS: i64 = 86400;

const COOKIE_NAME: &str = "adminToken";

/// Mint a token for the given issue timestamp: `"<ts>.<hex signature>"`.
pub fn issue_token(secret: &str, issued_at: i64) -> String {
    format!("{}.{}", issued_at, sign(secret, issued_at))
}

/// Verify a token: signature must match and the issue time must be within
/// the session age window (future timestamps are rejected too).
pub fn verify_token(token: &str, secret: &str, now: i64) -> bool {
    let Some((ts_part, sig_part)) = token.split_once('.') else {
        return false;
    };
    let Ok(issued_at) = ts_part.parse::<i64>() else {
        return false;
    };
    let age = now - issued_at;
    if !(0..=MAX_SESSION_AGE_SECS).contains(&age) {
        return false;
    }
    // Constant-time comparison via the Mac verify API.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(ts_part.as_bytes());
    match hex::decode(sig_part) {
        Ok(sig) => mac.verify_slice(&sig).is_ok(),
        Err(_) => false,
    }
}

fn sign(secret: &str, issued_at: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(issued_at.to_string().as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// The Set-Cookie value for a freshly minted token.
pub fn session_cookie(token: &str) -> String {
    format!("{COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Strict")
}

/// Pull the session token out of a Cookie header value.
pub fn token_from_cookie(header: &str) -> Option<&str> {
    header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == COOKIE_NAME).then_some(value)
    })
}

/// Whether the request carries a valid admin session.
pub fn is_authorized(headers: &HeaderMap, secret: &str, now: i64) -> bool {
    headers
        .get(axum::http::header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(token_from_cookie)
        .is_some_and(|token| verify_token(token, secret, now))
}

// ── Tests ──
