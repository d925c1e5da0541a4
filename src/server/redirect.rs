//! Plain-HTTP to HTTPS redirect.
//!
//! Behind a TLS-terminating proxy the scheme the client used is only known
//! from forwarding headers. The RFC 7239 `Forwarded` header wins over the
//! de-facto `X-Forwarded-Proto`/`X-Forwarded-Host` pair. Nothing here logs
//! header values.

use crate::server::AppState;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, Uri, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};

const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// Redirect plain HTTP requests to HTTPS unless running in local mode.
pub async fn https_redirect(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if state.is_local() {
        return next.run(req).await;
    }

    match https_location(req.headers(), req.uri()) {
        Some(location) => {
            tracing::debug!(path = %req.uri().path(), "Redirecting plain HTTP request to HTTPS");
            Redirect::permanent(&location).into_response()
        }
        None => next.run(req).await,
    }
}

/// The HTTPS URL to redirect to, if the request arrived over plain HTTP
/// and a usable host is known.
pub(crate) fn https_location(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    let proto = forwarded_proto(headers)?;
    if !proto.eq_ignore_ascii_case("http") {
        return None;
    }

    let host = forwarded_host(headers)?;
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    Some(format!("https://{}{}", host, path))
}

/// Protocol reported by the nearest proxy.
pub(crate) fn forwarded_proto(headers: &HeaderMap) -> Option<String> {
    forwarded_param(headers, "proto").or_else(|| first_list_value(headers, X_FORWARDED_PROTO))
}

fn forwarded_host(headers: &HeaderMap) -> Option<String> {
    forwarded_param(headers, "host")
        .or_else(|| first_list_value(headers, X_FORWARDED_HOST))
        .or_else(|| {
            headers
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.trim().to_string())
        })
        .filter(|host| is_valid_host(host))
}

/// A parameter of the first element of the first `Forwarded` header, e.g.
/// `proto` in `for=192.0.2.60;proto=http;by=203.0.113.43, for=...`.
fn forwarded_param(headers: &HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(header::FORWARDED)?.to_str().ok()?;
    let first = value.split(',').next()?;

    first.split(';').find_map(|pair| {
        let (key, val) = pair.split_once('=')?;
        if key.trim().eq_ignore_ascii_case(name) {
            let val = val.trim().trim_matches('"').trim();
            (!val.is_empty()).then(|| val.to_string())
        } else {
            None
        }
    })
}

/// First entry of a comma-separated header such as `X-Forwarded-Proto: http, https`.
fn first_list_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(name)?.to_str().ok()?;
    let first = value.split(',').next()?.trim();
    (!first.is_empty()).then(|| first.to_string())
}

/// Host names and `host:port` only; anything that could change the shape
/// of the redirect URL is refused.
fn is_valid_host(host: &str) -> bool {
    !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '[' | ']'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_x_forwarded_proto_http_redirects() {
        let h = headers(&[("x-forwarded-proto", "http"), ("host", "books.example.com")]);
        let uri: Uri = "/books?title=dune&limit=5".parse().unwrap();
        assert_eq!(
            https_location(&h, &uri).as_deref(),
            Some("https://books.example.com/books?title=dune&limit=5")
        );
    }

    #[test]
    fn test_https_passes_through() {
        let h = headers(&[("x-forwarded-proto", "https"), ("host", "books.example.com")]);
        let uri: Uri = "/books".parse().unwrap();
        assert!(https_location(&h, &uri).is_none());
    }

    #[test]
    fn test_no_indicator_passes_through() {
        let h = headers(&[("host", "books.example.com")]);
        let uri: Uri = "/".parse().unwrap();
        assert!(https_location(&h, &uri).is_none());
    }

    #[test]
    fn test_forwarded_header_preferred() {
        let h = headers(&[
            ("forwarded", "for=192.0.2.60;proto=\"HTTP\";host=public.example.com, proto=https"),
            ("x-forwarded-proto", "https"),
            ("host", "internal:8080"),
        ]);
        assert_eq!(forwarded_proto(&h).as_deref(), Some("HTTP"));

        let uri: Uri = "/authors".parse().unwrap();
        assert_eq!(
            https_location(&h, &uri).as_deref(),
            Some("https://public.example.com/authors")
        );
    }

    #[test]
    fn test_first_proxy_value_used() {
        let h = headers(&[("x-forwarded-proto", "http, https"), ("host", "a.example")]);
        assert_eq!(forwarded_proto(&h).as_deref(), Some("http"));
    }

    #[test]
    fn test_suspicious_host_refused() {
        let h = headers(&[
            ("x-forwarded-proto", "http"),
            ("x-forwarded-host", "evil.example/@"),
        ]);
        let uri: Uri = "/".parse().unwrap();
        assert!(https_location(&h, &uri).is_none());
    }
}
