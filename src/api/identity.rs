//! Client identity extraction.

use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};

use crate::rollout::ClientIdentity;

/// Request header carrying the opaque client identifier.
pub const CLIENT_ID_HEADER: &str = "X-SUC-Cluster-ID";

/// Reads the identity from [`CLIENT_ID_HEADER`]. A missing or non-UTF-8
/// header is the same as an empty identity, so extraction never fails.
impl<S> FromRequestParts<S> for ClientIdentity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(identity_from_headers(&parts.headers))
    }
}

pub fn identity_from_headers(headers: &HeaderMap) -> ClientIdentity {
    ClientIdentity::from(
        headers
            .get(CLIENT_ID_HEADER)
            .and_then(|value| value.to_str().ok()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue};

    fn header_name() -> HeaderName {
        HeaderName::from_bytes(CLIENT_ID_HEADER.as_bytes()).unwrap()
    }

    #[test]
    fn reads_identity_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header_name(), HeaderValue::from_static("c-42"));
        assert_eq!(identity_from_headers(&headers).as_str(), "c-42");
    }

    #[test]
    fn header_name_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("x-suc-cluster-id", HeaderValue::from_static("  c-42 "));
        assert_eq!(identity_from_headers(&headers).as_str(), "c-42");
    }

    #[test]
    fn missing_header_is_anonymous() {
        assert!(identity_from_headers(&HeaderMap::new()).is_empty());
    }

    #[test]
    fn non_utf8_header_is_anonymous() {
        let mut headers = HeaderMap::new();
        headers.insert(header_name(), HeaderValue::from_bytes(&[0xff, 0xfe]).unwrap());
        assert!(identity_from_headers(&headers).is_empty());
    }
}
