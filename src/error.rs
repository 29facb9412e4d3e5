#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),
    BinProtError(binprot::Error),
    NoMagicNumberInHandshake,
    UnexpectedMagicNumber(i64),
    OneshotError(tokio::sync::oneshot::error::RecvError),
    RpcError(crate::protocol::RpcError),
    DeadlineExceeded(std::time::Duration),
    FrameTooLarge(i64),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::IoError(err) => write!(f, "io error: {}", err),
            Error::DeadlineExceeded(deadline) => {
                write!(f, "deadline exceeded after {}ms", deadline.as_millis())
            }
            Error::FrameTooLarge(len) => write!(f, "invalid frame length {}", len),
            Error::UnexpectedMagicNumber(magic) => {
                write!(f, "unexpected magic number in handshake: {}", magic)
            }
            _ => write!(f, "{:?}", self),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoError(e)
    }
}

impl From<binprot::Error> for Error {
    fn from(e: binprot::Error) -> Self {
        Error::BinProtError(e)
    }
}

impl From<crate::protocol::RpcError> for Error {
    fn from(e: crate::protocol::RpcError) -> Self {
        Error::RpcError(e)
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for Error {
    fn from(e: tokio::sync::oneshot::error::RecvError) -> Self {
        Error::OneshotError(e)
    }
}
