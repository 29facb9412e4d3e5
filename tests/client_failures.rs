use async_trait::async_trait;
use gopoints::{ClientConfig, GetPoint, PointReply, PointRequest, Rpc, RpcImpl};
use std::time::Duration;

struct SlowGetPointImpl(Duration);

#[async_trait]
impl RpcImpl for SlowGetPointImpl {
    type E = std::convert::Infallible;
    type Rpc = GetPoint;

    async fn rpc_impl(&self, q: PointRequest) -> Result<PointReply, Self::E> {
        tokio::time::sleep(self.0).await;
        Ok(PointReply { point: gopoints::format_point(&q.name, 1) })
    }
}

struct Quick;

impl Rpc for Quick {
    type Q = PointRequest;
    type R = PointReply;
    const RPC_NAME: &'static str = "quick";
    const RPC_VERSION: i64 = 0i64;
}

struct QuickImpl;

#[async_trait]
impl RpcImpl for QuickImpl {
    type E = std::convert::Infallible;
    type Rpc = Quick;

    async fn rpc_impl(&self, q: PointRequest) -> Result<PointReply, Self::E> {
        Ok(PointReply { point: gopoints::format_point(&q.name, 2) })
    }
}

async fn slow_server(delay: Duration) -> Result<std::net::SocketAddr, gopoints::Error> {
    let rpc_server = gopoints::RpcServer::new("127.0.0.1:0")
        .await?
        .add_rpc(SlowGetPointImpl(delay))
        .add_rpc(QuickImpl);
    let local_addr = rpc_server.local_addr()?;
    tokio::spawn(async move { rpc_server.run().await });
    Ok(local_addr)
}

// An address on which nothing listens anymore.
async fn unused_addr() -> std::io::Result<std::net::SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    listener.local_addr()
}

#[tokio::test]
async fn unreachable_server() -> anyhow::Result<()> {
    let addr = unused_addr().await?;
    let config = ClientConfig::new().with_addr(addr.to_string());
    let started = std::time::Instant::now();
    let result = gopoints::request_point(&config).await;
    assert!(started.elapsed() < Duration::from_secs(2));
    match result {
        Err(gopoints::Error::IoError(err)) => {
            assert_eq!(err.kind(), std::io::ErrorKind::ConnectionRefused)
        }
        Err(gopoints::Error::DeadlineExceeded(_)) => {}
        other => panic!("unexpected result {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn silent_server() -> anyhow::Result<()> {
    // Accepts connections but never sends its handshake.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let mut streams = vec![];
        while let Ok((stream, _)) = listener.accept().await {
            streams.push(stream);
        }
    });
    let config = ClientConfig::new()
        .with_addr(addr.to_string())
        .with_connect_timeout(Duration::from_millis(200));
    let result = gopoints::request_point(&config).await;
    assert!(
        matches!(result, Err(gopoints::Error::DeadlineExceeded(d)) if d == Duration::from_millis(200)),
        "unexpected result {:?}",
        result
    );
    Ok(())
}

#[tokio::test]
async fn deadline_exceeded() -> anyhow::Result<()> {
    let local_addr = slow_server(Duration::from_millis(1500)).await?;
    let config = ClientConfig::new().with_addr(local_addr.to_string());
    let started = std::time::Instant::now();
    let result = gopoints::request_point(&config).await;
    let elapsed = started.elapsed();
    assert!(
        matches!(result, Err(gopoints::Error::DeadlineExceeded(d)) if d == Duration::from_secs(1)),
        "unexpected result {:?}",
        result
    );
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_millis(1500));
    Ok(())
}

#[tokio::test]
async fn within_deadline() -> anyhow::Result<()> {
    let local_addr = slow_server(Duration::from_millis(50)).await?;
    let config = ClientConfig::new().with_addr(local_addr.to_string()).with_name("Nadiem");
    let reply = gopoints::request_point(&config).await?;
    assert_eq!(reply, "Hi Nadiem, you received 1 points from GO-JEK");
    Ok(())
}

#[tokio::test]
async fn late_response_is_discarded() -> anyhow::Result<()> {
    let local_addr = slow_server(Duration::from_millis(300)).await?;
    let rpc_client = gopoints::RpcClient::new(local_addr).await?;
    let request = PointRequest { name: "late".to_string() };
    let result =
        GetPoint::dispatch_with_deadline(&rpc_client, request, Duration::from_millis(100)).await;
    assert!(matches!(result, Err(gopoints::Error::DeadlineExceeded(_))));
    // Let the abandoned response arrive, the following calls must not see it.
    tokio::time::sleep(Duration::from_millis(400)).await;
    let request = PointRequest { name: "quick".to_string() };
    let reply = Quick::dispatch_with_deadline(&rpc_client, request, Duration::from_secs(1)).await?;
    assert_eq!(reply.point, "Hi quick, you received 2 points from GO-JEK");
    Ok(())
}

#[tokio::test]
async fn abandoned_large_query_keeps_connection_usable() -> anyhow::Result<()> {
    let local_addr = slow_server(Duration::from_millis(0)).await?;
    let rpc_client = gopoints::RpcClient::new(local_addr).await?;
    // Far larger than the socket buffers: the deadline expires while the
    // frame is still being written.
    let request = PointRequest { name: "x".repeat(20 << 20) };
    let result =
        GetPoint::dispatch_with_deadline(&rpc_client, request, Duration::from_millis(1)).await;
    assert!(matches!(result, Err(gopoints::Error::DeadlineExceeded(_))));
    let request = PointRequest { name: "quick".to_string() };
    let reply = Quick::dispatch_with_deadline(&rpc_client, request, Duration::from_secs(5)).await?;
    assert_eq!(reply.point, "Hi quick, you received 2 points from GO-JEK");
    Ok(())
}

#[tokio::test]
async fn server_hangs_up() -> anyhow::Result<()> {
    // Accepts connections and closes them right away.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            drop(stream);
        }
    });
    let config = ClientConfig::new().with_addr(addr.to_string());
    let result = gopoints::request_point(&config).await;
    assert!(matches!(result, Err(gopoints::Error::IoError(_))), "unexpected result {:?}", result);
    Ok(())
}
