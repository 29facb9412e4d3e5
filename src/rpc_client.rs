use binprot::{BinProtRead, BinProtWrite};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::error::Error;
use crate::protocol::*;
use crate::read_write::*;

type OneShots = BTreeMap<i64, oneshot::Sender<Result<RawRpcResult, Error>>>;

/// A connection to an rpc server. Queries can be dispatched concurrently from
/// multiple tasks, responses are routed back by query id.
///
/// Dropping the client stops the background tasks and releases the
/// connection.
pub struct RpcClient {
    w: SharedWriter,
    id_and_oneshots: Arc<Mutex<(i64, OneShots)>>,
    reader: JoinHandle<()>,
    heartbeat: JoinHandle<()>,
}

impl RpcClient {
    pub async fn new<A: tokio::net::ToSocketAddrs>(addr: A) -> Result<Self, Error> {
        let stream = TcpStream::connect(addr).await?;
        let (mut r, w) = stream.into_split();
        let w = shared_writer(w);
        let mut buf = Vec::with_capacity(128);
        let handshake: Handshake = read_bin_prot(&mut r, &mut buf).await?;
        tracing::debug!("handshake: {:?}", handshake);
        handshake.check()?;
        write_bin_prot(&w, &Handshake::current(), &mut buf).await?;

        let id_and_oneshots = Arc::new(Mutex::new((0i64, OneShots::new())));
        let heartbeat = spawn_heartbeat(w.clone());
        let reader = tokio::spawn(Self::read_loop(r, id_and_oneshots.clone()));
        Ok(RpcClient { w, id_and_oneshots, reader, heartbeat })
    }

    /// Same as `new` but gives up if the connection and handshake have not
    /// completed after `timeout`.
    pub async fn connect<A: tokio::net::ToSocketAddrs>(
        addr: A,
        timeout: Duration,
    ) -> Result<Self, Error> {
        match tokio::time::timeout(timeout, Self::new(addr)).await {
            Ok(client) => client,
            Err(_elapsed) => Err(Error::DeadlineExceeded(timeout)),
        }
    }

    async fn read_loop(
        mut r: tokio::net::tcp::OwnedReadHalf,
        id_and_oneshots: Arc<Mutex<(i64, OneShots)>>,
    ) {
        let mut buf = Vec::with_capacity(128);
        loop {
            let msg: IncomingMessage = match read_bin_prot(&mut r, &mut buf).await {
                Ok(msg) => msg,
                Err(Error::IoError(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                    tracing::debug!("connection closed by server");
                    break;
                }
                Err(err) => {
                    tracing::error!("socket read error: {:?}", err);
                    break;
                }
            };
            tracing::debug!("client received: {:?}", msg);
            match msg {
                Message::Heartbeat => {}
                Message::Query(q) => {
                    tracing::error!("client received an unexpected query {}", q.rpc_tag);
                }
                Message::Response(resp) => {
                    let mut id_and_oneshots = id_and_oneshots.lock().await;
                    match id_and_oneshots.1.remove(&resp.id) {
                        None => {
                            // Either a bogus id or a query abandoned after its deadline.
                            tracing::debug!("client received an unexpected id: {}", resp.id);
                        }
                        Some(tx) => {
                            if tx.send(Ok(resp.data)).is_err() {
                                tracing::debug!("caller for id {} went away", resp.id)
                            }
                        }
                    }
                }
            }
        }
        let oneshots = std::mem::take(&mut id_and_oneshots.lock().await.1);
        for (_id, tx) in oneshots.into_iter() {
            let error = std::io::Error::new(
                std::io::ErrorKind::ConnectionAborted,
                "connection closed by server",
            );
            let _ = tx.send(Err(error.into()));
        }
    }

    // Registers a fresh id and get back both the id and the receiver on
    // which the response will be delivered.
    async fn register_new_id(&self) -> (i64, oneshot::Receiver<Result<RawRpcResult, Error>>) {
        let mut id_and_oneshots = self.id_and_oneshots.lock().await;
        let (tx, rx) = oneshot::channel();
        let fresh_id = id_and_oneshots.0;
        id_and_oneshots.1.insert(fresh_id, tx);
        id_and_oneshots.0 += 1;
        (fresh_id, rx)
    }

    async fn forget_id(&self, id: i64) {
        self.id_and_oneshots.lock().await.1.remove(&id);
    }

    // The frame is written from its own task: a caller giving up on its
    // deadline must not leave half a frame on a connection shared with other
    // calls.
    fn send_query<Q: BinProtWrite>(
        &self,
        rpc_tag: &str,
        version: i64,
        id: i64,
        q: Q,
    ) -> Result<JoinHandle<std::io::Result<()>>, Error> {
        let message = Message::<_, ()>::Query(Query {
            rpc_tag: rpc_tag.to_string(),
            version,
            id,
            data: binprot::WithLen(q),
        });
        let mut buf = Vec::with_capacity(128);
        message.binprot_write(&mut buf)?;
        let w = self.w.clone();
        Ok(tokio::spawn(async move { write_with_size(&w, &buf).await }))
    }

    async fn wait_response<R: BinProtRead>(
        write: JoinHandle<std::io::Result<()>>,
        rx: oneshot::Receiver<Result<RawRpcResult, Error>>,
    ) -> Result<R, Error> {
        write
            .await
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))??;
        match rx.await?? {
            RawRpcResult::Ok(payload) => Ok(payload.decode()?),
            RawRpcResult::Error(err) => Err(err.into()),
        }
    }

    pub async fn dispatch<Q, R>(&self, rpc_tag: &str, version: i64, q: Q) -> Result<R, Error>
    where
        Q: BinProtWrite,
        R: BinProtRead,
    {
        let (id, rx) = self.register_new_id().await;
        let res = match self.send_query(rpc_tag, version, id, q) {
            Ok(write) => Self::wait_response(write, rx).await,
            Err(err) => Err(err),
        };
        if res.is_err() {
            self.forget_id(id).await;
        }
        res
    }

    /// Dispatches a query and abandons it if no response has been received
    /// `deadline` after the call started. A query abandoned while it was
    /// still being sent is sent in full anyway.
    pub async fn dispatch_with_deadline<Q, R>(
        &self,
        rpc_tag: &str,
        version: i64,
        q: Q,
        deadline: Duration,
    ) -> Result<R, Error>
    where
        Q: BinProtWrite,
        R: BinProtRead,
    {
        let started = tokio::time::Instant::now();
        let (id, rx) = self.register_new_id().await;
        let res = match self.send_query(rpc_tag, version, id, q) {
            Ok(write) => tokio::time::timeout_at(started + deadline, Self::wait_response(write, rx))
                .await
                .unwrap_or(Err(Error::DeadlineExceeded(deadline))),
            Err(err) => Err(err),
        };
        if res.is_err() {
            self.forget_id(id).await;
        }
        res
    }

    /// Shuts the connection down and stops the background tasks.
    pub async fn close(self) {
        close(&self.w).await;
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.reader.abort();
        self.heartbeat.abort();
    }
}
