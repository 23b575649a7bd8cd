pub mod download;
pub mod ping;
pub mod server_info;
pub mod upload;

use bytes::Bytes;
use reqwest::header::{
    HeaderMap, HeaderValue, CACHE_CONTROL, PRAGMA, USER_AGENT,
};
use reqwest::Method;
use serde::Deserialize;
use std::borrow::Cow;

pub(crate) static UA: &str = concat!(
    env!("CARGO_PKG_NAME"),
    "/",
    env!("CARGO_PKG_VERSION")
);

/// A typed request against one speed test endpoint.
pub trait Request {
    type Response: for<'de> Deserialize<'de>;

    const METHOD: Method = Method::GET;

    /// Path relative to the server's base URL, query included.
    fn endpoint(&self) -> Cow<'_, str>;

    fn headers(&self) -> HeaderMap {
        default_headers()
    }

    fn body(&self) -> Option<Bytes> {
        None
    }
}

impl<R: Request> Request for &R {
    type Response = R::Response;

    const METHOD: Method = R::METHOD;

    fn endpoint(&self) -> Cow<'_, str> {
        (**self).endpoint()
    }

    fn headers(&self) -> HeaderMap {
        (**self).headers()
    }

    fn body(&self) -> Option<Bytes> {
        (**self).body()
    }
}

/// Headers every request carries: identify ourselves and defeat caches.
pub(crate) fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();

    headers.insert(USER_AGENT, HeaderValue::from_static(UA));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store, no-cache"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_names_the_crate() {
        assert_eq!(
            UA,
            format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
        );
    }

    #[test]
    fn test_default_headers_defeat_caching() {
        let headers = default_headers();
        assert_eq!(headers[CACHE_CONTROL], "no-store, no-cache");
        assert_eq!(headers[PRAGMA], "no-cache");
        assert!(headers.contains_key(USER_AGENT));
    }
}
