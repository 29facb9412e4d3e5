use async_trait::async_trait;
use binprot::{BinProtRead, BinProtWrite};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};

use crate::error::Error;
use crate::menu::{Menu, MenuImpl};
use crate::protocol::*;
use crate::read_write::*;
use crate::sexp::Sexp;
use crate::traits::{Rpc, RpcImpl};

#[async_trait]
trait ErasedRpcImpl {
    // Decodes the query, runs the implementation and writes the full response
    // message to `buf`.
    async fn erased_rpc_impl(&self, id: i64, payload: &BufferWithLen, buf: &mut Vec<u8>);
}

fn write_response<T: BinProtWrite>(id: i64, data: RpcResult<T>, buf: &mut Vec<u8>) {
    buf.clear();
    let message = Message::<(), _>::Response(Response { id, data });
    // Writing to a vec cannot fail.
    let _ = message.binprot_write(buf);
}

#[async_trait]
impl<T> ErasedRpcImpl for T
where
    T: RpcImpl + Send + Sync + 'static,
    <T::Rpc as Rpc>::Q: BinProtRead + Send + Sync + 'static,
    <T::Rpc as Rpc>::R: BinProtWrite + Send + Sync + 'static,
    T::E: std::fmt::Display + Send + 'static,
{
    async fn erased_rpc_impl(&self, id: i64, payload: &BufferWithLen, buf: &mut Vec<u8>) {
        let query = match payload.decode::<<T::Rpc as Rpc>::Q>() {
            Ok(query) => query,
            Err(err) => {
                let sexp = Sexp::atom(format!("{:?}", err));
                write_response::<()>(id, RpcResult::Error(RpcError::BinIoExn(sexp)), buf);
                return;
            }
        };
        let rpc_result = match self.rpc_impl(query).await {
            Ok(response) => RpcResult::Ok(binprot::WithLen(response)),
            Err(error) => RpcResult::Error(RpcError::UncaughtExn(Sexp::atom(error.to_string()))),
        };
        write_response(id, rpc_result, buf)
    }
}

type RpcImpls = BTreeMap<(String, i64), Box<dyn ErasedRpcImpl + Send + Sync>>;

pub struct RpcServer {
    rpc_impls: RpcImpls,
    listener: TcpListener,
    reflection: bool,
}

impl RpcServer {
    pub async fn new<A: tokio::net::ToSocketAddrs>(addr: A) -> Result<Self, Error> {
        let listener = TcpListener::bind(addr).await?;
        tracing::debug!("listening on {:?}", listener.local_addr());
        Ok(RpcServer { rpc_impls: BTreeMap::new(), listener, reflection: false })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    pub fn add_rpc<T>(mut self, impl_: T) -> Self
    where
        T: RpcImpl + Send + Sync + 'static,
        <T::Rpc as Rpc>::Q: BinProtRead + Send + Sync + 'static,
        <T::Rpc as Rpc>::R: BinProtWrite + Send + Sync + 'static,
        T::E: std::fmt::Display + Send + 'static,
    {
        let key = (T::Rpc::RPC_NAME.to_string(), T::Rpc::RPC_VERSION);
        if self.rpc_impls.contains_key(&key) {
            tracing::info!("replacing implementation of {} version {}", key.0, key.1);
        }
        self.rpc_impls.insert(key, Box::new(impl_));
        self
    }

    /// Serves the menu rpc listing every registered rpc, including the ones
    /// added after this call.
    pub fn with_reflection(mut self) -> Self {
        self.reflection = true;
        self
    }

    /// Names and versions of the registered rpcs, in ascending order.
    pub fn rpc_names(&self) -> Vec<(String, i64)> {
        self.rpc_impls.keys().cloned().collect()
    }

    async fn answer_query(
        rpc_impls: &RpcImpls,
        q: RawQuery,
        write: &SharedWriter,
    ) -> std::io::Result<()> {
        let mut buf = Vec::with_capacity(128);
        let rpc_key = (q.rpc_tag, q.version);
        match rpc_impls.get(&rpc_key) {
            None => {
                tracing::debug!("unimplemented rpc {} version {}", rpc_key.0, rpc_key.1);
                let err = RpcError::UnimplementedRpc((rpc_key.0, Version::Version(rpc_key.1)));
                write_response::<()>(q.id, RpcResult::Error(err), &mut buf);
            }
            Some(r) => r.erased_rpc_impl(q.id, &q.data, &mut buf).await,
        }
        write_with_size(write, &buf).await
    }

    async fn handle_connection_(
        rpc_impls: &Arc<RpcImpls>,
        mut read: tokio::net::tcp::OwnedReadHalf,
        write: &SharedWriter,
        addr: std::net::SocketAddr,
    ) -> Result<(), Error> {
        let mut buf = Vec::with_capacity(128);
        write_bin_prot(write, &Handshake::current(), &mut buf).await?;
        let handshake: Handshake = read_bin_prot(&mut read, &mut buf).await?;
        tracing::debug!("handshake: {:?}", handshake);
        handshake.check()?;

        // Every query task holds a sender, `recv` returns once they are all
        // gone.
        let (in_flight, mut all_answered) = tokio::sync::mpsc::channel::<()>(1);
        loop {
            let msg: IncomingMessage = match read_bin_prot(&mut read, &mut buf).await {
                Ok(msg) => msg,
                Err(Error::IoError(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                    tracing::debug!("connection closed {:?}", addr);
                    drop(in_flight);
                    let _ = all_answered.recv().await;
                    return Ok(());
                }
                Err(err) => return Err(err),
            };
            tracing::debug!("received: {:?}", msg);
            match msg {
                Message::Heartbeat => {}
                Message::Query(q) => {
                    let rpc_impls = rpc_impls.clone();
                    let write = write.clone();
                    let in_flight = in_flight.clone();
                    tokio::spawn(async move {
                        if let Err(err) = RpcServer::answer_query(&rpc_impls, q, &write).await {
                            tracing::debug!("could not send response to {:?}: {:?}", addr, err);
                        }
                        drop(in_flight);
                    });
                }
                Message::Response(r) => {
                    tracing::error!("server received a response message for id {}", r.id)
                }
            };
        }
    }

    async fn handle_connection(
        rpc_impls: Arc<RpcImpls>,
        stream: TcpStream,
        addr: std::net::SocketAddr,
    ) -> Result<(), Error> {
        tracing::debug!("accepted connection {:?}", addr);
        let (read, write) = stream.into_split();
        let write = shared_writer(write);
        let heartbeat = spawn_heartbeat(write.clone());
        let res = RpcServer::handle_connection_(&rpc_impls, read, &write, addr).await;
        heartbeat.abort();
        close(&write).await;
        res
    }

    pub async fn run(mut self) -> Result<(), Error> {
        if self.reflection {
            let mut menu = self.rpc_names();
            menu.push((Menu::RPC_NAME.to_string(), Menu::RPC_VERSION));
            menu.sort();
            self = self.add_rpc(MenuImpl::new(menu));
        }
        let rpc_impls = Arc::new(self.rpc_impls);
        loop {
            let (stream, addr) = self.listener.accept().await?;
            let rpc_impls = rpc_impls.clone();
            tokio::spawn(async move {
                if let Err(e) = RpcServer::handle_connection(rpc_impls, stream, addr).await {
                    tracing::info!("error handling connection {:?} {:?}", addr, e);
                }
            });
        }
    }
}
