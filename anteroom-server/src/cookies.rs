//! Cookie helpers — the validation token store plus session cookies
//!
//! All cookies share the same fixed attributes: HttpOnly, SameSite=Lax,
//! Path=/, and Secure outside development. The validation token cookie is
//! the only record of a passed access-code check; there is no server-side
//! store, so validity is entirely time- and possession-based.

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::Response;

/// Proof that the access gate was passed; consumed by the OAuth callback.
pub const VALIDATION_COOKIE_NAME: &str = "access_validated";
pub const ACCESS_COOKIE_NAME: &str = "ar_access_token";
pub const REFRESH_COOKIE_NAME: &str = "ar_refresh_token";

fn secure_suffix(secure: bool) -> &'static str {
    if secure {
        "; Secure"
    } else {
        ""
    }
}

pub fn validation_cookie(token: &str, max_age_seconds: u64, secure: bool) -> String {
    format!(
        "{VALIDATION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_seconds}{}",
        secure_suffix(secure)
    )
}

pub fn access_cookie(access_token: &str, max_age_seconds: u64, secure: bool) -> String {
    format!(
        "{ACCESS_COOKIE_NAME}={access_token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_seconds}{}",
        secure_suffix(secure)
    )
}

pub fn refresh_cookie(refresh_token: &str, max_age_seconds: u64, secure: bool) -> String {
    format!(
        "{REFRESH_COOKIE_NAME}={refresh_token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_seconds}{}",
        secure_suffix(secure)
    )
}

pub fn clear_cookie(name: &str, secure: bool) -> String {
    format!(
        "{name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0{}",
        secure_suffix(secure)
    )
}

/// Append a Set-Cookie header to an already-built response. Values we build
/// are plain ASCII; a provider token that is not gets dropped with a warning
/// rather than poisoning the response.
pub fn append_set_cookie(response: &mut Response, cookie: &str) {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            response.headers_mut().append(SET_COOKIE, value);
        }
        Err(e) => {
            tracing::warn!(error = %e, "dropping unencodable Set-Cookie header");
        }
    }
}

pub fn extract_cookie_value(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let raw = headers.get(COOKIE)?.to_str().ok()?;
    for part in raw.split(';') {
        let mut pieces = part.trim().splitn(2, '=');
        let key = pieces.next()?.trim();
        let value = pieces.next()?.trim();

        if key == cookie_name && !value.is_empty() {
            return Some(value.to_string());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_cookie_attributes() {
        let cookie = validation_cookie("tok-1", 600, false);
        assert_eq!(
            cookie,
            "access_validated=tok-1; Path=/; HttpOnly; SameSite=Lax; Max-Age=600"
        );
        assert!(!cookie.contains("Secure"));
    }

    #[test]
    fn test_secure_flag_outside_development() {
        let cookie = validation_cookie("tok-1", 600, true);
        assert!(cookie.ends_with("; Secure"));

        let cleared = clear_cookie(VALIDATION_COOKIE_NAME, true);
        assert!(cleared.contains("Max-Age=0"));
        assert!(cleared.ends_with("; Secure"));
    }

    #[test]
    fn test_clear_cookie_empties_value() {
        let cleared = clear_cookie(ACCESS_COOKIE_NAME, false);
        assert_eq!(
            cleared,
            "ar_access_token=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"
        );
    }

    #[test]
    fn test_extract_cookie_value() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("a=1; access_validated=tok-9 ; ar_access_token=at-3"),
        );

        assert_eq!(
            extract_cookie_value(&headers, "access_validated"),
            Some("tok-9".to_string())
        );
        assert_eq!(
            extract_cookie_value(&headers, "ar_access_token"),
            Some("at-3".to_string())
        );
        assert_eq!(extract_cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn test_extract_ignores_empty_values() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("access_validated="));
        assert_eq!(extract_cookie_value(&headers, "access_validated"), None);

        let headers = HeaderMap::new();
        assert_eq!(extract_cookie_value(&headers, "access_validated"), None);
    }
}
