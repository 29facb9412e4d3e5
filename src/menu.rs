//! Discovery rpc: lets tooling ask a server which rpcs it implements.
use async_trait::async_trait;

use crate::traits::{Rpc, RpcImpl};

pub struct Menu;

impl Rpc for Menu {
    type Q = ();
    type R = Vec<(String, i64)>;

    const RPC_NAME: &'static str = "__Versioned_rpc.Menu";
    const RPC_VERSION: i64 = 1i64;
}

pub struct MenuImpl(Vec<(String, i64)>);

impl MenuImpl {
    pub fn new(rpcs: Vec<(String, i64)>) -> Self {
        MenuImpl(rpcs)
    }
}

#[async_trait]
impl RpcImpl for MenuImpl {
    type E = std::convert::Infallible;
    type Rpc = Menu;

    async fn rpc_impl(&self, _q: ()) -> Result<Vec<(String, i64)>, Self::E> {
        Ok(self.0.clone())
    }
}
