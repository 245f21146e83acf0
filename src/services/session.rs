//! Cookie-backed sessions and password digests.
//!
//! The session cookie carries the logged-in user's id next to an
//! HMAC-SHA256 signature over it, so the browser holds the whole session and
//! the server only needs the signing key to trust it.

use axum::http::{HeaderMap, header::COOKIE};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};
use std::sync::Arc;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_COOKIE_NAME: &str = "tardigradio_session";

/// Signing key for session cookies. Cheap to clone.
#[derive(Clone)]
pub struct SessionKey {
    secret: Arc<[u8]>,
}

impl SessionKey {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: Arc::from(secret.as_ref()),
        }
    }

    fn sign(&self, payload: &[u8]) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(payload);
        mac
    }

    /// Cookie value for `user_id`: `<id>.<base64url signature>`.
    pub fn encode(&self, user_id: i64) -> String {
        let payload = user_id.to_string();
        let signature = self.sign(payload.as_bytes()).finalize().into_bytes();
        format!("{}.{}", payload, URL_SAFE_NO_PAD.encode(signature))
    }

    /// Recover the user id from a cookie value, or None if it was not signed by this key.
    pub fn decode(&self, value: &str) -> Option<i64> {
        let (payload, signature) = value.split_once('.')?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
        self.sign(payload.as_bytes())
            .verify_slice(&signature)
            .ok()?;
        payload.parse().ok()
    }

    /// `Set-Cookie` value that logs `user_id` in.
    pub fn set_cookie(&self, user_id: i64) -> String {
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            SESSION_COOKIE_NAME,
            self.encode(user_id)
        )
    }

    /// `Set-Cookie` value that ends the session.
    pub fn clear_cookie() -> String {
        format!(
            "{}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax",
            SESSION_COOKIE_NAME
        )
    }

    /// User id carried by the request's session cookie, if it is present and valid.
    pub fn user_id_from_headers(&self, headers: &HeaderMap) -> Option<i64> {
        extract_session_cookie(headers).and_then(|value| self.decode(&value))
    }
}

/// Extract the session cookie value from the Cookie header.
pub fn extract_session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|cookie| {
            let (name, value) = cookie.trim().split_once('=')?;
            (name == SESSION_COOKIE_NAME && !value.is_empty()).then(|| value.to_string())
        })
}

/// SHA-512 digest stored for a password.
pub fn hash_password(password: &str) -> Vec<u8> {
    Sha512::digest(password.as_bytes()).to_vec()
}

/// Compare a submitted password against a stored digest in constant time.
pub fn verify_password(password: &str, stored: &[u8]) -> bool {
    let candidate = hash_password(password);
    candidate.len() == stored.len() && bool::from(candidate.ct_eq(stored))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn encoded_cookie_decodes_to_the_same_user() {
        let key = SessionKey::new("test-secret");
        let value = key.encode(42);
        assert!(value.starts_with("42."));
        assert_eq!(key.decode(&value), Some(42));
    }

    #[test]
    fn tampered_or_foreign_cookies_are_rejected() {
        let key = SessionKey::new("test-secret");
        let value = key.encode(42);

        let (_, signature) = value.split_once('.').unwrap();
        assert_eq!(key.decode(&format!("43.{}", signature)), None);
        assert_eq!(key.decode("42"), None);
        assert_eq!(key.decode("42.not-base64!"), None);

        let other = SessionKey::new("other-secret");
        assert_eq!(other.decode(&value), None);
    }

    #[test]
    fn finds_session_among_other_cookies() {
        let key = SessionKey::new("s");
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!(
                "theme=dark; {}={}; lang=en",
                SESSION_COOKIE_NAME,
                key.encode(7)
            ))
            .unwrap(),
        );
        assert_eq!(key.user_id_from_headers(&headers), Some(7));
    }

    #[test]
    fn missing_or_cleared_cookie_is_guest() {
        let key = SessionKey::new("s");
        let mut headers = HeaderMap::new();
        assert_eq!(extract_session_cookie(&headers), None);

        headers.insert(
            COOKIE,
            HeaderValue::from_static("tardigradio_session=; theme=dark"),
        );
        assert_eq!(extract_session_cookie(&headers), None);
        assert_eq!(key.user_id_from_headers(&headers), None);
    }

    #[test]
    fn set_and_clear_cookie_attributes() {
        let key = SessionKey::new("s");
        let set = key.set_cookie(1);
        assert!(set.starts_with("tardigradio_session=1."));
        assert!(set.contains("HttpOnly"));
        assert!(set.contains("SameSite=Lax"));
        assert!(SessionKey::clear_cookie().contains("Max-Age=0"));
    }

    #[test]
    fn password_digest_round_trip() {
        let stored = hash_password("secret");
        assert_eq!(stored.len(), 64);
        assert!(verify_password("secret", &stored));
        assert!(!verify_password("Secret", &stored));
        assert!(!verify_password("secret", &stored[..32]));
    }
}
