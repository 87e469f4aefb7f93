//! Session identification.
//!
//! The session id is opaque. It is read from the session cookie, then from
//! the `X-Session-Id` header; when neither carries a usable value a new
//! UUID v4 is minted and handed back through `Set-Cookie`.

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use uuid::Uuid;

/// Header clients without cookies use to carry their session.
pub const SESSION_HEADER: &str = "x-session-id";

/// Longest accepted session id, in bytes.
const MAX_SESSION_ID_LEN: usize = 128;

/// One year.
const COOKIE_MAX_AGE_SECS: u64 = 31_536_000;

/// Resolved session for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    /// True when this request created the session.
    pub minted: bool,
}

impl Session {
    /// Session from the request, minting one when absent.
    pub fn resolve(headers: &HeaderMap, cookie_name: &str) -> Self {
        match existing_session(headers, cookie_name) {
            Some(id) => Self { id, minted: false },
            None => Self {
                id: Uuid::new_v4().to_string(),
                minted: true,
            },
        }
    }

    /// Headers to attach to the response: a `Set-Cookie` for minted sessions.
    pub fn response_headers(&self, cookie_name: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if !self.minted {
            return headers;
        }

        let cookie = format!(
            "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
            cookie_name, self.id, COOKIE_MAX_AGE_SECS
        );
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                headers.insert(SET_COOKIE, value);
            }
            Err(e) => log::warn!("Cannot encode session cookie {}: {}", cookie_name, e),
        }
        headers
    }
}

/// Session id carried by the request, if any.
pub fn existing_session(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let from_header = || {
        headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
            .filter(|id| valid_session_id(id))
    };

    cookie_value(headers, cookie_name)
        .filter(|id| valid_session_id(id))
        .or_else(from_header)
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
}

fn valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id.bytes().all(|b| b.is_ascii_graphic() && b != b';' && b != b',')
}
