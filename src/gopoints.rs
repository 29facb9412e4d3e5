//! The GO-POINTS service: a single rpc greeting callers with a random amount
//! of points.
use async_trait::async_trait;
use binprot::BinProtRead;
use binprot_derive::BinProtWrite;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, PoisonError};

use crate::config::{ClientConfig, ServerConfig};
use crate::error::Error;
use crate::protocol::read_string;
use crate::rpc_client::RpcClient;
use crate::rpc_server::RpcServer;
use crate::traits::{Rpc, RpcImpl};

/// Points are drawn uniformly from `0..POINT_RANGE`.
pub const POINT_RANGE: u32 = 100;

#[derive(BinProtWrite, Debug, Clone, PartialEq)]
pub struct PointRequest {
    pub name: String,
}

#[derive(BinProtWrite, Debug, Clone, PartialEq)]
pub struct PointReply {
    pub point: String,
}

// Names come straight from the network, their length prefix is checked
// against the bytes actually received.
impl BinProtRead for PointRequest {
    fn binprot_read<R: std::io::Read + ?Sized>(r: &mut R) -> Result<Self, binprot::Error>
    where
        Self: Sized,
    {
        Ok(PointRequest { name: read_string(r)? })
    }
}

impl BinProtRead for PointReply {
    fn binprot_read<R: std::io::Read + ?Sized>(r: &mut R) -> Result<Self, binprot::Error>
    where
        Self: Sized,
    {
        Ok(PointReply { point: read_string(r)? })
    }
}

pub struct GetPoint;

impl Rpc for GetPoint {
    type Q = PointRequest;
    type R = PointReply;

    const RPC_NAME: &'static str = "GetPoint";
    const RPC_VERSION: i64 = 1i64;
}

pub fn format_point(name: &str, point: u32) -> String {
    format!("Hi {}, you received {} points from GO-JEK", name, point)
}

/// Where the points come from. Implementations are called concurrently and
/// must return values below `POINT_RANGE`.
pub trait PointSource: Send + Sync {
    fn next_point(&self) -> u32;
}

/// The thread local generator seeded from the OS.
pub struct ThreadRngSource;

impl PointSource for ThreadRngSource {
    fn next_point(&self) -> u32 {
        rand::thread_rng().gen_range(0..POINT_RANGE)
    }
}

/// Reproducible sequence of points for a given seed.
pub struct SeededSource(Mutex<StdRng>);

impl SeededSource {
    pub fn new(seed: u64) -> Self {
        SeededSource(Mutex::new(StdRng::seed_from_u64(seed)))
    }
}

impl PointSource for SeededSource {
    fn next_point(&self) -> u32 {
        let mut rng = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        rng.gen_range(0..POINT_RANGE)
    }
}

impl<F> PointSource for F
where
    F: Fn() -> u32 + Send + Sync,
{
    fn next_point(&self) -> u32 {
        self()
    }
}

pub struct GoPointsImpl<S> {
    source: S,
}

impl<S: PointSource> GoPointsImpl<S> {
    pub fn new(source: S) -> Self {
        GoPointsImpl { source }
    }

    pub fn get_point(&self, name: &str) -> String {
        format_point(name, self.source.next_point())
    }
}

#[async_trait]
impl<S: PointSource> RpcImpl for GoPointsImpl<S> {
    type E = std::convert::Infallible;
    type Rpc = GetPoint;

    async fn rpc_impl(&self, q: PointRequest) -> Result<PointReply, Self::E> {
        Ok(PointReply { point: self.get_point(&q.name) })
    }
}

/// Binds the server described by `config`, serving `GetPoint` with the
/// thread local generator.
pub async fn server(config: &ServerConfig) -> Result<RpcServer, Error> {
    let server = RpcServer::new(config.addr()).await?.add_rpc(GoPointsImpl::new(ThreadRngSource));
    if config.reflection() {
        Ok(server.with_reflection())
    } else {
        Ok(server)
    }
}

/// Performs a single `GetPoint` call and returns the greeting. The connection
/// is closed before returning, whatever the outcome of the call.
pub async fn request_point(config: &ClientConfig) -> Result<String, Error> {
    let client = RpcClient::connect(config.addr(), config.connect_timeout()).await?;
    tracing::debug!("connected to {}", config.addr());
    let request = PointRequest { name: config.name().to_string() };
    let reply = GetPoint::dispatch_with_deadline(&client, request, config.deadline()).await;
    client.close().await;
    Ok(reply?.point)
}
