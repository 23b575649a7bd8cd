use crate::client::requests::{default_headers, Request};
use crate::client::UploadReply;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use std::borrow::Cow;

/// Largest body the server accepts before answering 413.
pub const MAX_UPLOAD_BYTES: u64 = 8 * 1024 * 1024;

/// One fixed-size upload.
#[derive(Debug, Clone)]
pub(crate) struct UploadRequest {
    pub payload: Bytes,
}

impl Request for UploadRequest {
    type Response = UploadReply;

    const METHOD: Method = Method::POST;

    fn endpoint(&self) -> Cow<'_, str> {
        "api/speed/upload".into()
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = default_headers();

        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );

        headers
    }

    fn body(&self) -> Option<Bytes> {
        // Cheap: Bytes clones share the allocation.
        Some(self.payload.clone())
    }
}

/// Deterministic upload payload of `len` bytes.
pub fn payload(len: usize) -> Bytes {
    (0..len).map(|i| (i.wrapping_mul(31) & 0xff) as u8).collect::<Vec<u8>>().into()
}
