use bytes::Bytes;
use reactor_speed::client::http_client::Client;
use reactor_speed::client::requests::upload::payload;
use reactor_speed::client::{DownloadBody, Transport};
use reactor_speed::engine::config::{
    LoadedPingConfig, PingConfig, RunConfig, ThroughputConfig,
};
use reactor_speed::engine::controller::{Phase, RunController, RunOutcome};
use reactor_speed::measurements::{Direction, MIB};
use reactor_speed::server;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

struct TestServer {
    addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
}

impl TestServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();

        tokio::spawn(server::serve(listener, async {
            let _ = stopped.await;
        }));

        Self { addr, stop: Some(stop) }
    }

    fn client(&self) -> Client {
        Client::new(&format!("http://{}", self.addr)).unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

fn quick_config() -> RunConfig {
    let phase = |concurrency, mb_per_request, max_mib| ThroughputConfig {
        duration_ms: 1500,
        warmup_ms: 500,
        concurrency,
        mb_per_request,
        max_bytes: max_mib * MIB,
    };

    RunConfig {
        ping: PingConfig { samples: 5, gap_ms: 0, timeout_ms: 1200 },
        loaded_ping: LoadedPingConfig { interval_ms: 100 },
        download: phase(2, 2, 8),
        upload: phase(1, 1, 4),
    }
}

#[tokio::test]
async fn test_ping_against_live_server() {
    let server = TestServer::start().await;
    let reply = server.client().ping().await.unwrap();

    assert!(reply.ok);
    assert!(reply.server_time > 0);
    assert!(reply.iso.ends_with('Z'));
}

#[tokio::test]
async fn test_download_streams_requested_size() {
    let server = TestServer::start().await;
    let mut body = server.client().download(2).await.unwrap();

    let mut total = 0u64;
    while let Some(chunk) = body.chunk().await.unwrap() {
        total += chunk.len() as u64;
    }

    assert_eq!(total, 2 * MIB);
}

#[tokio::test]
async fn test_upload_counts_bytes() {
    let server = TestServer::start().await;
    let reply = server.client().upload(payload(MIB as usize)).await.unwrap();

    assert!(reply.ok);
    assert_eq!(reply.bytes_received, Some(MIB));
}

#[tokio::test]
async fn test_empty_upload_is_accepted() {
    let server = TestServer::start().await;
    let reply = server.client().upload(Bytes::new()).await.unwrap();

    assert_eq!(reply.bytes_received, Some(0));
}

#[tokio::test]
async fn test_server_info_is_reported() {
    let server = TestServer::start().await;
    let info = server.client().server_info().await.unwrap();

    assert!(!info.runtime.is_empty());
    assert!(!info.region.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_run_completes() {
    let server = TestServer::start().await;
    let controller = RunController::new(server.client(), quick_config()).unwrap();

    let result = match controller.run().await {
        RunOutcome::Completed(result) => result,
        other => panic!("run did not complete: {:?}", other),
    };

    assert_eq!(controller.status().phase, Phase::Done);
    assert_eq!(result.idle_ping.sent, 5);
    assert!(result.idle_ping.received > 0);
    assert!(result.server.is_some());

    assert_eq!(result.download.direction, Direction::Download);
    assert!(result.download.total_bytes > 0);
    assert!(result.download.total_bytes <= 8 * MIB + 2 * 2 * MIB);
    assert_eq!(result.upload.direction, Direction::Upload);
    assert!(result.upload.total_bytes > 0);

    assert_eq!(
        result.total_bytes,
        result.download_bytes + result.upload_bytes
    );
    assert!(result.to_json().unwrap().contains("\"idle_ping\""));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unreachable_server_records_total_loss() {
    // Bind then drop to get a port with nothing listening.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let client = Client::new(&format!("http://{}", addr)).unwrap();

    let mut config = quick_config();
    config.ping.samples = 2;
    let controller = RunController::new(client, config).unwrap();

    let result = match controller.run().await {
        RunOutcome::Completed(result) => result,
        other => panic!("run did not complete: {:?}", other),
    };

    assert_eq!(controller.status().phase, Phase::Done);
    assert_eq!(result.idle_ping.sent, 2);
    assert_eq!(result.idle_ping.loss_pct, 100.0);
    assert_eq!(result.idle_ping.median_ms, None);
    assert!(result.server.is_none());
    assert_eq!(result.download.total_bytes, 0);
    assert_eq!(result.upload.total_bytes, 0);
    assert_eq!(result.total_bytes, 0);
}
