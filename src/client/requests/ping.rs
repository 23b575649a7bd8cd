use crate::client::requests::Request;
use crate::client::PingReply;
use std::borrow::Cow;

/// Latency probe. The round trip is timed by the caller.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct PingRequest;

impl Request for PingRequest {
    type Response = PingReply;

    fn endpoint(&self) -> Cow<'_, str> {
        "api/speed/ping".into()
    }
}
