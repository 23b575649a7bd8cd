use crate::client::requests::Request;
use std::borrow::Cow;

/// Smallest download the server will produce, in MiB.
pub const MIN_DOWNLOAD_MB: u32 = 1;

/// Largest download the server will produce, in MiB.
pub const MAX_DOWNLOAD_MB: u32 = 32;

/// Size the server uses when none is requested.
pub const DEFAULT_DOWNLOAD_MB: u32 = 16;

/// Streamed download of `mb` mebibytes.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DownloadRequest {
    pub mb: u32,
}

impl Request for DownloadRequest {
    // The body is read as a stream, never deserialized.
    type Response = ();

    fn endpoint(&self) -> Cow<'_, str> {
        format!("api/speed/download?mb={}", self.mb).into()
    }
}
