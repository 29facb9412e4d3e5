// GO-POINTS rpc client and server. The wire protocol follows the framing and
// handshake of https://github.com/janestreet/async_rpc_kernel
mod config;
mod error;
mod gopoints;
mod menu;
mod protocol;
mod read_write;
mod rpc_client;
mod rpc_server;
mod sexp;
mod traits;

pub use crate::config::*;
pub use crate::error::Error;
pub use crate::gopoints::*;
pub use crate::menu::{Menu, MenuImpl};
pub use crate::protocol::{RpcError, Version, RPC_MAGIC_NUMBER, RPC_PROTOCOL_VERSION};
pub use crate::rpc_client::*;
pub use crate::rpc_server::*;
pub use crate::sexp::Sexp;
pub use crate::traits::{Rpc, RpcImpl};
