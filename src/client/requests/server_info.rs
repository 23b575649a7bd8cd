use crate::client::requests::Request;
use crate::client::ServerInfo;
use std::borrow::Cow;

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ServerInfoRequest;

impl Request for ServerInfoRequest {
    type Response = ServerInfo;

    fn endpoint(&self) -> Cow<'_, str> {
        "api/speed/server".into()
    }
}
