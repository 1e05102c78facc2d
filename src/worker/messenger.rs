use super::FoundValue;
use crate::{
    error::RpcError,
    id::NodeId,
    message::{MsgId, Query, Reply, Request, Response},
    routing::contact::Contact,
    socket::Transport,
    vanish::VanishingDataObject,
};
use std::{net::SocketAddr, sync::Arc};

/// Outbound RPC client. Every call is a single request/response exchange; nothing is retried.
#[derive(Clone)]
pub(crate) struct Rpc {
    transport: Arc<dyn Transport>,
    sender: Contact,
}

impl Rpc {
    pub fn new(transport: Arc<dyn Transport>, sender: Contact) -> Self {
        Self { transport, sender }
    }

    /// Returns the contact the remote node reports for itself.
    pub async fn ping(&self, addr: SocketAddr) -> Result<Contact, RpcError> {
        match self.call(addr, Request::Ping {}).await? {
            Response::Pong { sender } => Ok(sender),
            _ => Err(RpcError::UnexpectedResponse),
        }
    }

    pub async fn store(&self, addr: SocketAddr, key: NodeId, value: Vec<u8>) -> Result<(), RpcError> {
        match self.call(addr, Request::Store { key, value }).await? {
            Response::Stored {} => Ok(()),
            _ => Err(RpcError::UnexpectedResponse),
        }
    }

    pub async fn find_node(&self, addr: SocketAddr, target: NodeId) -> Result<Vec<Contact>, RpcError> {
        match self.call(addr, Request::FindNode { target }).await? {
            Response::Nodes { nodes } => Ok(nodes),
            _ => Err(RpcError::UnexpectedResponse),
        }
    }

    pub async fn find_value(&self, addr: SocketAddr, key: NodeId) -> Result<FoundValue, RpcError> {
        match self.call(addr, Request::FindValue { key }).await? {
            Response::Value {
                value: Some(value), ..
            } => Ok(FoundValue::Value(value)),
            Response::Value { value: None, nodes } => Ok(FoundValue::Nodes(nodes)),
            _ => Err(RpcError::UnexpectedResponse),
        }
    }

    pub async fn get_vdo(
        &self,
        addr: SocketAddr,
        vdo_id: NodeId,
    ) -> Result<VanishingDataObject, RpcError> {
        match self.call(addr, Request::GetVdo { vdo_id }).await? {
            Response::Vdo { vdo } => Ok(vdo),
            _ => Err(RpcError::UnexpectedResponse),
        }
    }

    async fn call(&self, addr: SocketAddr, request: Request) -> Result<Response, RpcError> {
        let query = Query {
            request,
            sender: self.sender,
            msg_id: MsgId::random(),
        };

        log::trace!("Sending to {addr:?} {query:?}");

        let bytes = self.transport.exchange(addr, &query.encode()?).await?;
        let reply = Reply::decode(&bytes)?;

        log::trace!("Received from {addr:?} {reply:?}");

        if reply.msg_id != query.msg_id {
            return Err(RpcError::MsgIdMismatch);
        }

        match reply.response {
            Response::Error { message } => Err(RpcError::Remote(message)),
            response => Ok(response),
        }
    }
}
