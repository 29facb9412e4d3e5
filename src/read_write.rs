use binprot::{BinProtRead, BinProtWrite};
use byteorder::{ByteOrder, LittleEndian};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::error::Error;
use crate::protocol::{Message, MAX_FRAME_LEN};

pub const HEARTBEAT_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

/// Reads one length prefixed frame into `buf`. A clean end of stream before
/// the header surfaces as an `UnexpectedEof` io error.
pub async fn read_frame<R: AsyncReadExt + Unpin>(r: &mut R, buf: &mut Vec<u8>) -> Result<(), Error> {
    let mut header = [0u8; 8];
    r.read_exact(&mut header).await?;
    let len = LittleEndian::read_i64(&header);
    if !(0..=MAX_FRAME_LEN).contains(&len) {
        return Err(Error::FrameTooLarge(len));
    }
    buf.resize(len as usize, 0u8);
    r.read_exact(buf).await?;
    Ok(())
}

pub async fn read_bin_prot<T: BinProtRead, R: AsyncReadExt + Unpin>(
    r: &mut R,
    buf: &mut Vec<u8>,
) -> Result<T, Error> {
    read_frame(r, buf).await?;
    let data = T::binprot_read(&mut buf.as_slice())?;
    Ok(data)
}

// The writer is shared between the task reading from the connection, the
// tasks answering queries and the heartbeat task. Replacing it with `Closed`
// drops the write half which shuts the connection down for every holder.
pub enum WriteOrClosed {
    Write(tokio::net::tcp::OwnedWriteHalf),
    Closed,
}

pub type SharedWriter = Arc<Mutex<WriteOrClosed>>;

pub fn shared_writer(w: tokio::net::tcp::OwnedWriteHalf) -> SharedWriter {
    Arc::new(Mutex::new(WriteOrClosed::Write(w)))
}

pub async fn close(w: &SharedWriter) {
    let mut w = w.lock().await;
    if let WriteOrClosed::Write(mut w) = std::mem::replace(&mut *w, WriteOrClosed::Closed) {
        if let Err(err) = w.shutdown().await {
            tracing::debug!("shutdown error {:?}", err);
        }
    }
}

pub async fn write_with_size(w: &SharedWriter, buf: &[u8]) -> std::io::Result<()> {
    let mut w = w.lock().await;
    match &mut *w {
        WriteOrClosed::Write(w) => {
            let mut header = [0u8; 8];
            LittleEndian::write_i64(&mut header, buf.len() as i64);
            w.write_all(&header).await?;
            w.write_all(buf).await?;
            Ok(())
        }
        WriteOrClosed::Closed => Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionAborted,
            "connection already closed",
        )),
    }
}

pub async fn write_bin_prot<T: BinProtWrite>(
    w: &SharedWriter,
    v: &T,
    buf: &mut Vec<u8>,
) -> std::io::Result<()> {
    buf.clear();
    v.binprot_write(buf)?;
    write_with_size(w, buf).await
}

/// Sends a heartbeat every `HEARTBEAT_INTERVAL` until writing fails, which
/// happens at the latest once the writer has been closed.
pub fn spawn_heartbeat(w: SharedWriter) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = Vec::with_capacity(16);
        loop {
            tokio::time::sleep(HEARTBEAT_INTERVAL).await;
            tracing::debug!("heartbeating");
            let res = write_bin_prot(&w, &Message::<(), ()>::Heartbeat, &mut buf).await;
            if let Err(error) = res {
                match error.kind() {
                    std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionAborted => {}
                    _ => tracing::error!("heartbeat failure {:?}", error),
                }
                break;
            }
        }
    })
}
