//! Caller identity resolution.
//!
//! Precedence:
//! 1. URL userinfo (`bob@host`)
//! 2. Query parameter `u`, overriding userinfo
//! 3. Basic-Auth credentials, only when both of the above are empty

use axum::http::{header, HeaderMap, Uri};
use base64::{engine::general_purpose::STANDARD, Engine};
use url::form_urlencoded;

/// Query parameter carrying the username.
pub const USER_PARAM: &str = "u";

/// Returns the first non-empty candidate, or `""`.
pub fn first_non_empty<'a>(candidates: &[&'a str]) -> &'a str {
    candidates
        .iter()
        .copied()
        .find(|c| !c.is_empty())
        .unwrap_or("")
}

/// Resolve the username for a request, empty when none is known.
pub fn resolve_username(uri: &Uri, headers: &HeaderMap) -> String {
    let mut username = userinfo_username(uri).unwrap_or_default();

    if let Some(u) = query_value(uri, USER_PARAM).filter(|u| !u.is_empty()) {
        username = u;
    }

    if username.is_empty() {
        if let Some((user, _)) = basic_auth(headers) {
            username = user;
        }
    }

    username
}

/// Username component of the URI's userinfo, percent-decoded.
pub fn userinfo_username(uri: &Uri) -> Option<String> {
    let authority = uri.authority()?.as_str();
    let (userinfo, _) = authority.rsplit_once('@')?;
    let raw = userinfo.split(':').next().unwrap_or_default();
    let name = urlencoding::decode(raw)
        .map(|name| name.into_owned())
        .unwrap_or_else(|_| raw.to_string());
    Some(name).filter(|name| !name.is_empty())
}

/// First value of a query parameter, form-decoded.
pub fn query_value(uri: &Uri, name: &str) -> Option<String> {
    let query = uri.query()?;
    form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// Credentials from an `Authorization: Basic` header.
///
/// The scheme is matched case-insensitively; anything that does not decode
/// to `user:password` is ignored.
pub fn basic_auth(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}
