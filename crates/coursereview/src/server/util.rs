//! Cookie and header helpers.

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderName};
use std::time::Duration;

/// Reads a cookie value from the request headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` header for an HttpOnly cookie living `max_age`.
pub fn set_cookie(name: &str, value: &str, max_age: Duration, secure: bool) -> (HeaderName, String) {
    let mut cookie = format!(
        "{name}={value}; Max-Age={}; Path=/; HttpOnly; SameSite=Lax",
        max_age.as_secs()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    (SET_COOKIE, cookie)
}

/// `Set-Cookie` header that expires a cookie immediately.
pub fn clear_cookie(name: &str) -> (HeaderName, String) {
    (
        SET_COOKIE,
        format!("{name}=; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Path=/"),
    )
}

/// Client address as reported by the edge proxy.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    header("cf-connecting-ip")
        .or_else(|| {
            header("x-forwarded-for")
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        })
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_read_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("sessionid=abc; temp_token=xyz123"),
        );
        assert_eq!(read_cookie(&headers, "temp_token").as_deref(), Some("xyz123"));
        assert_eq!(read_cookie(&headers, "sessionid").as_deref(), Some("abc"));
        assert_eq!(read_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_set_cookie_flags() {
        let (_, cookie) = set_cookie("temp_token", "t", Duration::from_secs(600), true);
        assert_eq!(
            cookie,
            "temp_token=t; Max-Age=600; Path=/; HttpOnly; SameSite=Lax; Secure"
        );
        let (_, insecure) = set_cookie("temp_token", "t", Duration::from_secs(1), false);
        assert!(!insecure.contains("Secure"));
    }

    #[test]
    fn test_client_ip_prefers_cloudflare_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1, 10.0.0.2"));
        assert_eq!(client_ip(&headers).as_deref(), Some("10.0.0.1"));

        headers.insert("cf-connecting-ip", HeaderValue::from_static("203.0.113.9"));
        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.9"));

        assert_eq!(client_ip(&HeaderMap::new()), None);
    }
}
