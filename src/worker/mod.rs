pub(crate) use self::{handler::TableHandler, messenger::Rpc};
use crate::{error::Error, id::NodeId, routing::contact::Contact};
use tokio::sync::{mpsc, oneshot};

mod handler;
pub(crate) mod lookup;
mod messenger;
pub(crate) mod server;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DebugState {
    pub node_count: usize,
    pub occupied_buckets: usize,
}

/// Outcome of a `find_value`, either against a single node or iterative.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FoundValue {
    /// The value, without any contacts.
    Value(Vec<u8>),
    /// No value; the closest contacts known instead.
    Nodes(Vec<Contact>),
}

/// Message accepted by the routing table actor. Every query carries its own reply slot.
pub(crate) enum TableCommand {
    /// Insert or refresh a contact seen on the network.
    Update(Contact),
    /// Look up a contact by id.
    Find(NodeId, oneshot::Sender<Option<Contact>>),
    /// Up to `count` contacts closest to `target`.
    Closest {
        target: NodeId,
        count: usize,
        tx: oneshot::Sender<Vec<Contact>>,
    },
    /// Outcome of pinging the head of a full bucket.
    ProbeResult {
        head: Contact,
        alive: bool,
        candidate: Contact,
    },
    /// Retrieve debug information.
    GetDebugState(oneshot::Sender<DebugState>),
    /// Stop accepting commands.
    Shutdown,
}

/// Cloneable front end of the routing table actor.
#[derive(Clone)]
pub(crate) struct TableHandle {
    tx: mpsc::UnboundedSender<TableCommand>,
}

impl TableHandle {
    pub fn new(tx: mpsc::UnboundedSender<TableCommand>) -> Self {
        Self { tx }
    }

    pub fn update(&self, contact: Contact) {
        if self.tx.send(TableCommand::Update(contact)).is_err() {
            log::debug!("Routing table has shut down, dropping update of {contact:?}");
        }
    }

    pub async fn find(&self, id: NodeId) -> Result<Option<Contact>, Error> {
        let (tx, rx) = oneshot::channel();
        self.send(TableCommand::Find(id, tx))?;
        rx.await.map_err(|_| Error::Shutdown)
    }

    pub async fn closest(&self, target: NodeId, count: usize) -> Result<Vec<Contact>, Error> {
        let (tx, rx) = oneshot::channel();
        self.send(TableCommand::Closest { target, count, tx })?;
        rx.await.map_err(|_| Error::Shutdown)
    }

    pub async fn state(&self) -> Result<DebugState, Error> {
        let (tx, rx) = oneshot::channel();
        self.send(TableCommand::GetDebugState(tx))?;
        rx.await.map_err(|_| Error::Shutdown)
    }

    pub fn shutdown(&self) {
        self.tx.send(TableCommand::Shutdown).ok();
    }

    /// Resolves once the actor has stopped.
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    pub(crate) fn send(&self, command: TableCommand) -> Result<(), Error> {
        self.tx.send(command).map_err(|_| Error::Shutdown)
    }
}
