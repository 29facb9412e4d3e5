use std::io::Read as _;
use binprot::{BinProtRead, BinProtWrite};
use binprot_derive::{BinProtRead, BinProtWrite};

use crate::sexp::Sexp;

/// First element of the handshake sent by both sides of a connection.
pub const RPC_MAGIC_NUMBER: i64 = 4_411_474;
pub const RPC_PROTOCOL_VERSION: i64 = 1;

/// Frames above this size are rejected before any allocation happens.
pub const MAX_FRAME_LEN: i64 = 64 * 1024 * 1024;

// Every length read below comes from the peer. None of them is used to size
// an allocation: buffers only grow with the bytes actually present.

pub(crate) fn invalid_data<E>(err: E) -> binprot::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    std::io::Error::new(std::io::ErrorKind::InvalidData, err).into()
}

pub(crate) fn read_tag<R: std::io::Read + ?Sized>(r: &mut R) -> Result<u8, binprot::Error> {
    let mut tag = [0u8; 1];
    r.read_exact(&mut tag)?;
    Ok(tag[0])
}

pub(crate) fn read_bytes<R: std::io::Read + ?Sized>(
    r: &mut R,
    len: u64,
) -> Result<Vec<u8>, binprot::Error> {
    let mut buf = Vec::new();
    std::io::Read::take(&mut *r, len).read_to_end(&mut buf)?;
    if buf.len() as u64 != len {
        let msg = format!("length prefix {} but only {} bytes left", len, buf.len());
        return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, msg).into());
    }
    Ok(buf)
}

pub(crate) fn read_string<R: std::io::Read + ?Sized>(r: &mut R) -> Result<String, binprot::Error> {
    let len = binprot::Nat0::binprot_read(r)?;
    let bytes = read_bytes(r, len.0)?;
    String::from_utf8(bytes).map_err(invalid_data)
}

#[derive(BinProtRead, BinProtWrite, Debug, Clone, PartialEq)]
#[polymorphic_variant]
pub enum Version {
    Version(i64),
}

/// Errors reported by the remote side in place of a response.
#[derive(BinProtWrite, Debug, Clone, PartialEq)]
pub enum RpcError {
    BinIoExn(Sexp),
    ConnectionClosed,
    WriteError(Sexp),
    UncaughtExn(Sexp),
    UnimplementedRpc((String, Version)),
    UnknownQueryId(String),
}

// Tags follow the declaration order used by the derived writer.
impl BinProtRead for RpcError {
    fn binprot_read<R: std::io::Read + ?Sized>(r: &mut R) -> Result<Self, binprot::Error>
    where
        Self: Sized,
    {
        let err = match read_tag(r)? {
            0 => RpcError::BinIoExn(Sexp::binprot_read(r)?),
            1 => RpcError::ConnectionClosed,
            2 => RpcError::WriteError(Sexp::binprot_read(r)?),
            3 => RpcError::UncaughtExn(Sexp::binprot_read(r)?),
            4 => {
                let name = read_string(r)?;
                RpcError::UnimplementedRpc((name, Version::binprot_read(r)?))
            }
            5 => RpcError::UnknownQueryId(read_string(r)?),
            tag => return Err(invalid_data(format!("unknown rpc error tag {}", tag))),
        };
        Ok(err)
    }
}

#[derive(BinProtWrite, Debug, Clone, PartialEq)]
pub struct Handshake(pub Vec<i64>);

impl BinProtRead for Handshake {
    fn binprot_read<R: std::io::Read + ?Sized>(r: &mut R) -> Result<Self, binprot::Error>
    where
        Self: Sized,
    {
        let len = binprot::Nat0::binprot_read(r)?;
        let mut values = Vec::new();
        for _ in 0..len.0 {
            values.push(i64::binprot_read(r)?);
        }
        Ok(Handshake(values))
    }
}

impl Handshake {
    pub fn current() -> Self {
        Handshake(vec![RPC_MAGIC_NUMBER, RPC_PROTOCOL_VERSION])
    }

    pub fn check(&self) -> Result<(), crate::Error> {
        match self.0.first() {
            None => Err(crate::Error::NoMagicNumberInHandshake),
            Some(&RPC_MAGIC_NUMBER) => Ok(()),
            Some(&magic) => Err(crate::Error::UnexpectedMagicNumber(magic)),
        }
    }
}

#[derive(BinProtRead, BinProtWrite, Debug, Clone, PartialEq)]
pub struct Query<T> {
    pub rpc_tag: String,
    pub version: i64,
    pub id: i64,
    pub data: binprot::WithLen<T>,
}

#[derive(BinProtRead, BinProtWrite, Debug, Clone, PartialEq)]
pub enum RpcResult<T> {
    Ok(binprot::WithLen<T>),
    Error(RpcError),
}

#[derive(BinProtRead, BinProtWrite, Debug, Clone, PartialEq)]
pub struct Response<T> {
    pub id: i64,
    pub data: RpcResult<T>,
}

/// Everything that travels on a connection after the handshake. Writers pick
/// the typed payloads, readers use `IncomingMessage` and decode the payload
/// once they know which type to expect.
#[derive(BinProtRead, BinProtWrite, Debug, Clone, PartialEq)]
pub enum Message<Q, R> {
    Heartbeat,
    Query(Q),
    Response(R),
}

pub type IncomingMessage = Message<RawQuery, RawResponse>;

/// Length prefixed payload kept as raw bytes, this has the same wire
/// representation as `binprot::WithLen<T>`.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferWithLen(pub Vec<u8>);

impl BufferWithLen {
    pub fn decode<T: BinProtRead>(&self) -> Result<T, binprot::Error> {
        T::binprot_read(&mut self.0.as_slice())
    }
}

impl BinProtRead for BufferWithLen {
    fn binprot_read<R: std::io::Read + ?Sized>(r: &mut R) -> Result<Self, binprot::Error>
    where
        Self: Sized,
    {
        let len = binprot::Nat0::binprot_read(r)?;
        Ok(BufferWithLen(read_bytes(r, len.0)?))
    }
}

impl BinProtWrite for BufferWithLen {
    fn binprot_write<W: std::io::Write>(&self, w: &mut W) -> Result<(), std::io::Error> {
        binprot::Nat0(self.0.len() as u64).binprot_write(w)?;
        w.write_all(&self.0)
    }
}

#[derive(BinProtWrite, Debug, Clone, PartialEq)]
pub struct RawQuery {
    pub rpc_tag: String,
    pub version: i64,
    pub id: i64,
    pub data: BufferWithLen,
}

impl BinProtRead for RawQuery {
    fn binprot_read<R: std::io::Read + ?Sized>(r: &mut R) -> Result<Self, binprot::Error>
    where
        Self: Sized,
    {
        let rpc_tag = read_string(r)?;
        let version = i64::binprot_read(r)?;
        let id = i64::binprot_read(r)?;
        let data = BufferWithLen::binprot_read(r)?;
        Ok(RawQuery { rpc_tag, version, id, data })
    }
}

#[derive(BinProtRead, BinProtWrite, Debug, Clone, PartialEq)]
pub enum RawRpcResult {
    Ok(BufferWithLen),
    Error(RpcError),
}

#[derive(BinProtRead, BinProtWrite, Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub id: i64,
    pub data: RawRpcResult,
}
