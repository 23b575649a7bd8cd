//! Client side of the speed test wire contract.
//!
//! The engine talks to the server only through [`Transport`], so tests can
//! substitute in-memory fakes while production uses the reqwest backed
//! [`http_client::Client`].

pub mod http_client;
pub mod requests;

use bytes::Bytes;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

/// A failure of a single request. Never fatal to a phase.
#[derive(Debug)]
pub enum TransportError {
    /// Connection could not be made or was dropped.
    Network(String),
    /// The transport's own deadline fired.
    Timeout,
    /// The server answered with a non-success status.
    Status(StatusCode),
    /// The response did not match the wire contract.
    Malformed(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Network(msg) => write!(f, "network error: {}", msg),
            TransportError::Timeout => f.write_str("request timed out"),
            TransportError::Status(status) => {
                write!(f, "unexpected status: {}", status)
            }
            TransportError::Malformed(msg) => {
                write!(f, "malformed response: {}", msg)
            }
        }
    }
}

impl Error for TransportError {}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            TransportError::Timeout
        } else if let Some(status) = error.status() {
            TransportError::Status(status)
        } else if error.is_decode() {
            TransportError::Malformed(error.to_string())
        } else {
            TransportError::Network(error.to_string())
        }
    }
}

/// Body of `GET /ping`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingReply {
    pub ok: bool,
    pub server_time: i64,
    pub iso: String,
}

/// Body of a successful `POST /upload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_received: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iso: Option<String>,
}

/// Body of `GET /server`. Informational only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub region: String,
    pub runtime: String,
    pub host: String,
    pub iso: String,
}

/// A streamed download response, consumed chunk by chunk.
#[allow(async_fn_in_trait)]
pub trait DownloadBody {
    /// Next chunk of the body, or `None` once the body is complete.
    async fn chunk(&mut self) -> Result<Option<Bytes>, TransportError>;
}

/// The four endpoints the engine depends on.
#[allow(async_fn_in_trait)]
pub trait Transport {
    type Body: DownloadBody;

    async fn ping(&self) -> Result<PingReply, TransportError>;

    /// Open a download of `mb` mebibytes; the body is read lazily.
    async fn download(&self, mb: u32) -> Result<Self::Body, TransportError>;

    async fn upload(&self, payload: Bytes)
        -> Result<UploadReply, TransportError>;

    async fn server_info(&self) -> Result<ServerInfo, TransportError>;
}

impl<T: Transport> Transport for &T {
    type Body = T::Body;

    async fn ping(&self) -> Result<PingReply, TransportError> {
        (**self).ping().await
    }

    async fn download(&self, mb: u32) -> Result<Self::Body, TransportError> {
        (**self).download(mb).await
    }

    async fn upload(
        &self,
        payload: Bytes,
    ) -> Result<UploadReply, TransportError> {
        (**self).upload(payload).await
    }

    async fn server_info(&self) -> Result<ServerInfo, TransportError> {
        (**self).server_info().await
    }
}
