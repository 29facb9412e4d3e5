use async_trait::async_trait;
use binprot::{BinProtRead, BinProtWrite};
use std::time::Duration;

use crate::error::Error;
use crate::rpc_client::RpcClient;

/// Typed description of an rpc, shared by clients and servers.
#[async_trait]
pub trait Rpc {
    type Q; // Query
    type R; // Response

    const RPC_NAME: &'static str;
    const RPC_VERSION: i64;

    async fn dispatch(rpc_client: &RpcClient, q: Self::Q) -> Result<Self::R, Error>
    where
        Self: 'static,
        Self::Q: BinProtWrite + Send + Sync + 'static,
        Self::R: BinProtRead + Send + Sync + 'static,
    {
        rpc_client.dispatch(Self::RPC_NAME, Self::RPC_VERSION, q).await
    }

    async fn dispatch_with_deadline(
        rpc_client: &RpcClient,
        q: Self::Q,
        deadline: Duration,
    ) -> Result<Self::R, Error>
    where
        Self: 'static,
        Self::Q: BinProtWrite + Send + Sync + 'static,
        Self::R: BinProtRead + Send + Sync + 'static,
    {
        rpc_client.dispatch_with_deadline(Self::RPC_NAME, Self::RPC_VERSION, q, deadline).await
    }
}

/// Server side implementation of an rpc. Implementations are shared between
/// every connection and may be called concurrently.
#[async_trait]
pub trait RpcImpl {
    type E; // Error
    type Rpc: Rpc;

    async fn rpc_impl(
        &self,
        q: <Self::Rpc as Rpc>::Q,
    ) -> std::result::Result<<Self::Rpc as Rpc>::R, Self::E>;
}
