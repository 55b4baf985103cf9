//! Query string redaction.
//!
//! Sensitive parameters are replaced before any log field is derived. The
//! result is a new `Uri`; the request is left untouched.

use axum::http::uri::{PathAndQuery, Uri};
use url::form_urlencoded;

/// Value written in place of a redacted parameter.
pub const REDACTED: &str = "[REDACTED]";

/// Query parameter carrying the password.
pub const PASSWORD_PARAM: &str = "p";

/// Replace every listed parameter that has a non-empty value.
///
/// When nothing is replaced the original URI is returned unchanged. When a
/// parameter is replaced the whole query is re-encoded with keys in sorted
/// order, so `[REDACTED]` appears as `%5BREDACTED%5D`.
pub fn redact_query<S: AsRef<str>>(uri: &Uri, params: &[S]) -> Uri {
    let Some(query) = uri.query() else {
        return uri.clone();
    };

    let mut pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();

    let mut redacted = false;
    for param in params {
        let name = param.as_ref();
        let first = pairs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str());
        if first.is_some_and(|v| !v.is_empty()) {
            // All values collapse into a single marker
            pairs.retain(|(k, _)| k != name);
            pairs.push((name.to_string(), REDACTED.to_string()));
            redacted = true;
        }
    }

    if !redacted {
        return uri.clone();
    }

    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    let encoded = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs.iter())
        .finish();

    // Never fall back to the original query
    with_query(uri, &encoded).unwrap_or_else(|| without_query(uri))
}

/// Password redaction with the default parameter list.
pub fn redact_password(uri: &Uri) -> Uri {
    redact_query(uri, &[PASSWORD_PARAM])
}

fn with_query(uri: &Uri, query: &str) -> Option<Uri> {
    let path = match uri.path() {
        "" => "/",
        p => p,
    };
    let path_and_query: PathAndQuery = format!("{path}?{query}").parse().ok()?;

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(path_and_query);
    Uri::from_parts(parts).ok()
}

/// The URI with its query dropped, `/` if even that cannot be rebuilt.
fn without_query(uri: &Uri) -> Uri {
    let path = match uri.path() {
        "" => "/",
        p => p,
    };
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = PathAndQuery::try_from(path).ok();
    Uri::from_parts(parts).unwrap_or_else(|_| Uri::from_static("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_is_redacted() {
        let uri: Uri = "/path?p=secret123&u=alice".parse().unwrap();
        let redacted = redact_password(&uri);

        assert_eq!(redacted.to_string(), "/path?p=%5BREDACTED%5D&u=alice");
        assert!(!redacted.to_string().contains("secret123"));
    }

    #[test]
    fn test_repeated_password_collapses() {
        let uri: Uri = "/q?z=1&p=one&a=2&p=two".parse().unwrap();
        let redacted = redact_password(&uri);

        assert_eq!(
            redacted.path_and_query().unwrap().as_str(),
            "/q?a=2&p=%5BREDACTED%5D&z=1"
        );
    }

    #[test]
    fn test_untouched_without_password() {
        for raw in ["/plain", "/search?q=a+b&z=%2F", "/login?p=&u=bob"] {
            let uri: Uri = raw.parse().unwrap();
            assert_eq!(redact_password(&uri), uri, "{raw} should be unchanged");
        }
    }

    #[test]
    fn test_absolute_uri_keeps_authority() {
        let uri: Uri = "http://bob@example.com/x?p=hunter2".parse().unwrap();
        let redacted = redact_password(&uri);

        assert_eq!(redacted.authority().unwrap().as_str(), "bob@example.com");
        assert_eq!(redacted.query(), Some("p=%5BREDACTED%5D"));
    }

    #[test]
    fn test_custom_parameter_list() {
        let uri: Uri = "/api?token=abc&p=pw&keep=1".parse().unwrap();
        let redacted = redact_query(&uri, &["token", "p"]);

        let query = redacted.query().unwrap();
        assert!(!query.contains("abc"));
        assert!(!query.contains("pw"));
        assert_eq!(query, "keep=1&p=%5BREDACTED%5D&token=%5BREDACTED%5D");
    }

    #[test]
    fn test_query_dropped_when_rebuild_fails() {
        let uri: Uri = "http://example.com/login?p=hunter2&u=bob".parse().unwrap();
        let stripped = without_query(&uri);

        assert_eq!(stripped.to_string(), "http://example.com/login");
        assert!(!stripped.to_string().contains("hunter2"));

        let relative: Uri = "/x?p=hunter2".parse().unwrap();
        assert_eq!(without_query(&relative).to_string(), "/x");
    }
}
