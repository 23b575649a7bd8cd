use crate::client::requests::download::{
    DEFAULT_DOWNLOAD_MB, MAX_DOWNLOAD_MB, MIN_DOWNLOAD_MB,
};
use crate::client::requests::upload::MAX_UPLOAD_BYTES;
use crate::client::{PingReply, ServerInfo, UploadReply};
use crate::measurements::MIB;
use crate::server::payload::{body_stream, seed_for};
use axum::body::Body;
use axum::extract::Query;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, HOST};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use futures::{Stream, StreamExt};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Echo of the body size on download responses.
pub const X_BYTES: HeaderName = HeaderName::from_static("x-bytes");

/// Environment variables consulted, in order, for the server region.
pub const REGION_VARS: [&str; 3] = ["REACTOR_REGION", "FLY_REGION", "AWS_REGION"];

#[derive(Debug, Deserialize)]
pub(crate) struct DownloadParams {
    mb: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    ok: bool,
    error: &'static str,
}

fn error_response(status: StatusCode, error: &'static str) -> Response {
    (status, Json(ErrorBody { ok: false, error })).into_response()
}

fn iso_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Requested download size in MiB: numeric values are truncated and
/// clamped, anything else falls back to the default.
pub fn parse_download_mb(raw: Option<&str>) -> u32 {
    let Some(value) = raw.map(str::trim).and_then(|s| s.parse::<f64>().ok())
    else {
        return DEFAULT_DOWNLOAD_MB;
    };

    if value.is_nan() {
        return DEFAULT_DOWNLOAD_MB;
    }

    value
        .trunc()
        .clamp(f64::from(MIN_DOWNLOAD_MB), f64::from(MAX_DOWNLOAD_MB)) as u32
}

/// First non-empty value among [`REGION_VARS`], else `"local"`.
pub fn infer_region(lookup: impl Fn(&str) -> Option<String>) -> String {
    REGION_VARS
        .iter()
        .filter_map(|name| lookup(name))
        .find(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "local".to_string())
}

pub(crate) async fn ping() -> Json<PingReply> {
    Json(PingReply {
        ok: true,
        server_time: Utc::now().timestamp_millis(),
        iso: iso_now(),
    })
}

pub(crate) async fn download(Query(params): Query<DownloadParams>) -> Response {
    let mb = parse_download_mb(params.mb.as_deref());
    let total = u64::from(mb) * MIB;
    let seed = seed_for(Utc::now().timestamp_millis() as u64, total);

    debug!("Serving {} MiB download", mb);

    (
        [
            (CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
            (CONTENT_LENGTH, HeaderValue::from(total)),
            (X_BYTES, HeaderValue::from(total)),
        ],
        Body::from_stream(body_stream(total, seed)),
    )
        .into_response()
}

/// Most bytes read and discarded after an upload crosses the cap. A body
/// rejected on its declared length is not read at all and the connection
/// is left for hyper to close.
pub const UPLOAD_DRAIN_LIMIT: u64 = MIB;

/// Discard up to `limit` more bytes of a body. Returns the bytes discarded.
async fn drain<S, E>(frames: &mut S, limit: u64) -> u64
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    let mut drained = 0u64;

    while drained < limit {
        match frames.next().await {
            Some(Ok(chunk)) => drained += chunk.len() as u64,
            Some(Err(_)) | None => break,
        }
    }

    drained
}

pub(crate) async fn upload(headers: HeaderMap, body: Body) -> Response {
    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());

    if declared.is_some_and(|length| length > MAX_UPLOAD_BYTES) {
        debug!("Rejecting upload declared at {:?} bytes", declared);
        return error_response(StatusCode::PAYLOAD_TOO_LARGE, "payload too large");
    }

    // Counted as it streams in, never buffered.
    let mut received = 0u64;
    let mut frames = body.into_data_stream();

    while let Some(frame) = frames.next().await {
        match frame {
            Ok(chunk) => {
                received += chunk.len() as u64;
                if received > MAX_UPLOAD_BYTES {
                    let drained = drain(&mut frames, UPLOAD_DRAIN_LIMIT).await;
                    debug!(
                        "Upload exceeded the cap mid-stream, drained {} more bytes",
                        drained
                    );
                    return error_response(
                        StatusCode::PAYLOAD_TOO_LARGE,
                        "payload too large",
                    );
                }
            }
            Err(e) => {
                warn!("Upload body read failed after {} bytes: {}", received, e);
                return error_response(StatusCode::BAD_REQUEST, "failed to read body");
            }
        }
    }

    Json(UploadReply {
        ok: true,
        bytes_received: Some(received),
        iso: Some(iso_now()),
    })
    .into_response()
}

pub(crate) async fn server_info(headers: HeaderMap) -> Json<ServerInfo> {
    let host = headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    Json(ServerInfo {
        region: infer_region(|name| std::env::var(name).ok()),
        runtime: "rust".to_string(),
        host,
        iso: iso_now(),
    })
}
