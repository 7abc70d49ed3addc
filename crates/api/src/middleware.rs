use axum::{http::HeaderMap, middleware::Next, response::Response};

use crate::context::InitiatorContext;

/// Attach the audit initiator to every request. Missing or unreadable
/// headers degrade to "unknown" rather than rejecting the request.
pub async fn initiator_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let initiator = extract_initiator(req.headers());
    req.extensions_mut().insert(initiator);
    next.run(req).await
}

fn extract_initiator(headers: &HeaderMap) -> InitiatorContext {
    headers
        .get("x-initiator")
        .and_then(|v| v.to_str().ok())
        .map(InitiatorContext::new)
        .unwrap_or_else(InitiatorContext::unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn header_is_parsed_when_present() {
        let mut headers = HeaderMap::new();
        headers.insert("x-initiator", HeaderValue::from_static("ops@team"));
        assert_eq!(extract_initiator(&headers).initiator(), "ops@team");
    }

    #[test]
    fn missing_header_degrades_to_unknown() {
        assert_eq!(extract_initiator(&HeaderMap::new()).initiator(), "unknown");
    }
}
