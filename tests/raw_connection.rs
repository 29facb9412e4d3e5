// Talks to the server with hand-written frames, the way a misbehaving or
// minimal peer would.
use async_trait::async_trait;
use binprot::{BinProtRead, BinProtWrite};
use gopoints::{ClientConfig, GetPoint, PointReply, PointRequest, RpcImpl, RpcServer};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

struct SlowGetPointImpl(Duration);

#[async_trait]
impl RpcImpl for SlowGetPointImpl {
    type E = std::convert::Infallible;
    type Rpc = GetPoint;

    async fn rpc_impl(&self, q: PointRequest) -> Result<PointReply, Self::E> {
        tokio::time::sleep(self.0).await;
        Ok(PointReply { point: gopoints::format_point(&q.name, 42) })
    }
}

async fn spawn_server(delay: Duration) -> anyhow::Result<SocketAddr> {
    let server = RpcServer::new("127.0.0.1:0").await?.add_rpc(SlowGetPointImpl(delay));
    let local_addr = server.local_addr()?;
    tokio::spawn(async move { server.run().await });
    Ok(local_addr)
}

async fn write_frame(stream: &mut TcpStream, payload: &[u8]) -> std::io::Result<()> {
    stream.write_all(&(payload.len() as i64).to_le_bytes()).await?;
    stream.write_all(payload).await
}

async fn read_frame(stream: &mut TcpStream) -> std::io::Result<Vec<u8>> {
    let mut header = [0u8; 8];
    stream.read_exact(&mut header).await?;
    let mut payload = vec![0u8; i64::from_le_bytes(header) as usize];
    stream.read_exact(&mut payload).await?;
    Ok(payload)
}

async fn raw_connect(addr: SocketAddr) -> anyhow::Result<TcpStream> {
    let mut stream = TcpStream::connect(addr).await?;
    let _server_handshake = read_frame(&mut stream).await?;
    let mut handshake = vec![];
    let values = vec![gopoints::RPC_MAGIC_NUMBER, gopoints::RPC_PROTOCOL_VERSION];
    values.binprot_write(&mut handshake)?;
    write_frame(&mut stream, &handshake).await?;
    Ok(stream)
}

// Query message up to, and excluding, the length prefixed payload.
fn query_header(id: i64) -> anyhow::Result<Vec<u8>> {
    let mut bytes = vec![1u8];
    "GetPoint".to_string().binprot_write(&mut bytes)?;
    1i64.binprot_write(&mut bytes)?;
    id.binprot_write(&mut bytes)?;
    Ok(bytes)
}

#[tokio::test]
async fn huge_inner_length_drops_only_that_connection() -> anyhow::Result<()> {
    let local_addr = spawn_server(Duration::from_millis(0)).await?;

    let mut huge_payload = query_header(0)?;
    binprot::Nat0(1 << 40).binprot_write(&mut huge_payload)?;
    let mut huge_rpc_tag = vec![1u8];
    binprot::Nat0(1 << 40).binprot_write(&mut huge_rpc_tag)?;

    for frame in [huge_payload, huge_rpc_tag].iter() {
        let mut stream = raw_connect(local_addr).await?;
        write_frame(&mut stream, frame).await?;
        // The server hangs up on this peer.
        let mut rest = vec![];
        let _ = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut rest)).await?;
    }

    let config = ClientConfig::new().with_addr(local_addr.to_string()).with_name("Nadiem");
    let reply = gopoints::request_point(&config).await?;
    assert_eq!(reply, "Hi Nadiem, you received 42 points from GO-JEK");
    Ok(())
}

#[tokio::test]
async fn answers_queries_after_half_close() -> anyhow::Result<()> {
    let local_addr = spawn_server(Duration::from_millis(200)).await?;
    let mut stream = raw_connect(local_addr).await?;

    let mut frame = query_header(7)?;
    binprot::WithLen(PointRequest { name: "Nadiem".to_string() }).binprot_write(&mut frame)?;
    write_frame(&mut stream, &frame).await?;
    stream.shutdown().await?;

    let payload = tokio::time::timeout(Duration::from_secs(5), read_frame(&mut stream)).await??;
    // Response, id 7, Ok result, then the length prefixed reply.
    assert_eq!(&payload[..3], &[2u8, 7, 0]);
    let mut rest = &payload[3..];
    binprot::Nat0::binprot_read(&mut rest).map_err(gopoints::Error::from)?;
    let reply = PointReply::binprot_read(&mut rest).map_err(gopoints::Error::from)?;
    assert_eq!(reply.point, "Hi Nadiem, you received 42 points from GO-JEK");

    // Nothing else follows the reply.
    let mut rest = vec![];
    let _ = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut rest)).await?;
    assert!(rest.is_empty());
    Ok(())
}
