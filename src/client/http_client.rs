use crate::client::requests::download::DownloadRequest;
use crate::client::requests::ping::PingRequest;
use crate::client::requests::server_info::ServerInfoRequest;
use crate::client::requests::upload::UploadRequest;
use crate::client::requests::Request;
use crate::client::{
    DownloadBody, PingReply, ServerInfo, Transport, TransportError, UploadReply,
};
use crate::errors::SpeedTestError;
use bytes::Bytes;
use reqwest::{Client as ReqwestClient, RequestBuilder, Response};
use url::Url;

/// Server used when none is given on the command line.
pub static DEFAULT_SERVER: &str = "http://127.0.0.1:8080";

/// reqwest backed [`Transport`] against one speed test server.
#[derive(Debug, Clone)]
pub struct Client {
    client: ReqwestClient,
    base: Url,
}

impl Client {
    /// Build a client rooted at `base_url`, e.g. `http://host:8080/`.
    pub fn new(base_url: &str) -> Result<Self, SpeedTestError> {
        let mut base = Url::parse(base_url).map_err(|e| {
            SpeedTestError::config(format!(
                "invalid server URL '{}': {}",
                base_url, e
            ))
            .with_source(e)
        })?;

        if !matches!(base.scheme(), "http" | "https") {
            return Err(SpeedTestError::config(format!(
                "server URL must be http or https, got '{}'",
                base.scheme()
            )));
        }

        // Url::join replaces the last segment unless the path ends in '/'.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Client { client: ReqwestClient::new(), base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Send `request` and decode its JSON body.
    pub async fn send<R: Request>(
        &self,
        request: R,
    ) -> Result<R::Response, TransportError> {
        let response = self.open(request).await?;
        let text = response.text().await?;

        serde_json::from_str::<R::Response>(&text)
            .map_err(|e| TransportError::Malformed(e.to_string()))
    }

    /// Send `request` and hand back the response with its body unread.
    pub async fn open<R: Request>(
        &self,
        request: R,
    ) -> Result<Response, TransportError> {
        let endpoint = request.endpoint();
        let url = self
            .base
            .join(endpoint.trim_start_matches('/'))
            .map_err(|e| TransportError::Malformed(e.to_string()))?;

        let response = self
            .client
            .request(R::METHOD, url)
            .headers(request.headers())
            .speed_test_body(request.body())
            .send()
            .await?
            .error_for_status()?;

        Ok(response)
    }
}

trait RequestBuilderExt: Sized {
    fn speed_test_body(self, body: Option<Bytes>) -> Self;
}

impl RequestBuilderExt for RequestBuilder {
    fn speed_test_body(self, body: Option<Bytes>) -> Self {
        match body {
            Some(bytes) => self.body(bytes),
            None => self,
        }
    }
}

impl DownloadBody for Response {
    async fn chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        Ok(Response::chunk(self).await?)
    }
}

impl Transport for Client {
    type Body = Response;

    async fn ping(&self) -> Result<PingReply, TransportError> {
        self.send(PingRequest).await
    }

    async fn download(&self, mb: u32) -> Result<Response, TransportError> {
        self.open(DownloadRequest { mb }).await
    }

    async fn upload(
        &self,
        payload: Bytes,
    ) -> Result<UploadReply, TransportError> {
        self.send(UploadRequest { payload }).await
    }

    async fn server_info(&self) -> Result<ServerInfo, TransportError> {
        self.send(ServerInfoRequest).await
    }
}
