//! Identity session cookie encoding.
//!
//! The session issued by the identity service (access token, refresh token, expiry) is stored in
//! a single cookie as `base64-` followed by the URL-safe base64 encoding of its JSON form. Only
//! the identity client reads this value; the session gate treats the cookie as opaque.

use axum_extra::extract::cookie::Cookie;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{config::SessionCookieConfig, identity::IdentityError};

const VALUE_PREFIX: &str = "base64-";

/// Session tokens persisted in the browser between requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64, // Unix timestamp (seconds)
}

impl StoredSession {
    pub fn encode(&self) -> Result<String, IdentityError> {
        let json = serde_json::to_vec(self).map_err(|e| IdentityError::InvalidCookie {
            message: format!("serialize session: {e}"),
        })?;
        Ok(format!("{VALUE_PREFIX}{}", URL_SAFE_NO_PAD.encode(json)))
    }

    /// Decode a cookie value. Returns `None` for anything this client did not write.
    pub fn decode(value: &str) -> Option<Self> {
        let encoded = value.strip_prefix(VALUE_PREFIX)?;
        let json = URL_SAFE_NO_PAD.decode(encoded).ok()?;
        serde_json::from_slice(&json).ok()
    }

    /// True when the access token has expired or will within `margin`
    pub fn expires_within(&self, margin: Duration, now: i64) -> bool {
        let margin = i64::try_from(margin.as_secs()).unwrap_or(i64::MAX);
        self.expires_at.saturating_sub(margin) <= now
    }
}

fn attributes(config: &SessionCookieConfig) -> String {
    let same_site = match config.same_site.to_ascii_lowercase().as_str() {
        "strict" => "Strict",
        "none" => "None",
        _ => "Lax",
    };
    let mut attributes = format!("Path=/; HttpOnly; SameSite={same_site}");
    if config.secure {
        attributes.push_str("; Secure");
    }
    attributes
}

/// Cookie carrying `session`, with the configured attributes
pub fn session_cookie(session: &StoredSession, config: &SessionCookieConfig) -> Result<Cookie<'static>, IdentityError> {
    let value = session.encode()?;
    let raw = format!(
        "{}={}; {}; Max-Age={}",
        config.name,
        value,
        attributes(config),
        config.max_age.as_secs()
    );
    Cookie::parse(raw).map_err(|e| IdentityError::InvalidCookie { message: e.to_string() })
}

/// Expired cookie that makes the browser drop the session
pub fn removal_cookie(config: &SessionCookieConfig) -> Result<Cookie<'static>, IdentityError> {
    let raw = format!("{}=; {}; Max-Age=0", config.name, attributes(config));
    Cookie::parse(raw).map_err(|e| IdentityError::InvalidCookie { message: e.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_extra::extract::cookie::SameSite;

    fn session() -> StoredSession {
        StoredSession {
            access_token: "access.jwt.token".to_string(),
            refresh_token: "refresh-123".to_string(),
            expires_at: 1_700_000_000,
        }
    }

    #[test]
    fn test_encode_and_decode_session() {
        let encoded = session().encode().unwrap();
        assert!(encoded.starts_with("base64-"));
        assert!(!encoded.contains(';'));

        let decoded = StoredSession::decode(&encoded).unwrap();
        assert_eq!(decoded, session());
    }

    #[test]
    fn test_decode_rejects_foreign_values() {
        let values = vec![
            "",
            "plain-token",
            "base64-!!!not base64!!!",
            "base64-e30", // "{}" - valid base64, missing fields
        ];

        for value in values {
            assert!(StoredSession::decode(value).is_none(), "Expected {value:?} to be rejected");
        }
    }

    #[test]
    fn test_expires_within() {
        let session = session();
        let margin = Duration::from_secs(60);

        assert!(!session.expires_within(margin, session.expires_at - 120));
        assert!(session.expires_within(margin, session.expires_at - 60));
        assert!(session.expires_within(margin, session.expires_at + 1));
    }

    #[test]
    fn test_session_cookie_attributes() {
        let config = SessionCookieConfig {
            name: "nexus-auth-token".to_string(),
            secure: true,
            same_site: "strict".to_string(),
            max_age: Duration::from_secs(3600),
        };

        let cookie = session_cookie(&session(), &config).unwrap();

        assert_eq!(cookie.name(), "nexus-auth-token");
        assert_eq!(StoredSession::decode(cookie.value()), Some(session()));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.max_age().map(|d| d.whole_seconds()), Some(3600));
    }

    #[test]
    fn test_removal_cookie() {
        let config = SessionCookieConfig {
            secure: false,
            ..Default::default()
        };

        let cookie = removal_cookie(&config).unwrap();

        assert_eq!(cookie.name(), config.name);
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age().map(|d| d.whole_seconds()), Some(0));
        assert_eq!(cookie.secure(), None);
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
    }
}
