use crate::{
    error::{Error, RpcError},
    id::NodeId,
    routing::{contact::Contact, table::RoutingTable},
    socket::{TcpTransport, Transport},
    storage::LocalStorage,
    vanish::{self, EpochConfig, Unvanished, VanishingDataObject},
    worker::{
        lookup::{self, Lookup},
        server::{self, Protocol},
        DebugState, FoundValue, Rpc, TableHandle, TableHandler,
    },
};
use std::{
    io,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};
use tokio::{
    net::{TcpListener, ToSocketAddrs},
    sync::mpsc,
    task,
};

/// A running Kademlia node.
///
/// This type is cheaply cloneable where each clone refers to the same underlying node. This is
/// useful to be able to issue DHT operations from multiple tasks/threads.
///
/// Single node RPCs (`ping`, `store`, `find_node`, `find_value`, `get_vdo`) talk to one remote
/// node; the `iterative_*` operations walk the network. Every contact that answers is added to
/// the routing table.
///
/// The node shuts down when the last clone is dropped. VDO monitors hold a clone until their
/// timeout runs out.
#[derive(Clone)]
pub struct Kademlia {
    contact: Contact,
    table: TableHandle,
    _guard: Arc<ShutdownOnDrop>,
    rpc: Rpc,
    storage: Arc<LocalStorage<Vec<u8>>>,
    vdos: Arc<LocalStorage<VanishingDataObject>>,
    epoch_config: EpochConfig,
}

impl Kademlia {
    /// Create a new DhtBuilder.
    pub fn builder() -> DhtBuilder {
        DhtBuilder {
            node_id: None,
            epoch_config: EpochConfig::default(),
        }
    }

    /// Start the node with the given DhtBuilder.
    fn with_builder(
        builder: DhtBuilder,
        listener: TcpListener,
        transport: Arc<dyn Transport>,
    ) -> io::Result<Self> {
        let node_id = builder.node_id.unwrap_or_else(NodeId::random);
        let contact = Contact::new(node_id, advertised_addr(listener.local_addr()?));

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let rpc = Rpc::new(transport, contact);
        let table = TableHandle::new(command_tx.clone());

        let handler = TableHandler::new(
            RoutingTable::new(node_id),
            rpc.clone(),
            command_rx,
            command_tx.downgrade(),
        );
        task::spawn(handler.run());

        let node = Self {
            contact,
            _guard: Arc::new(ShutdownOnDrop(table.clone())),
            table,
            rpc,
            storage: Arc::new(LocalStorage::new()),
            vdos: Arc::new(LocalStorage::new()),
            epoch_config: builder.epoch_config,
        };

        let protocol = Arc::new(Protocol {
            contact,
            table: node.table.clone(),
            storage: node.storage.clone(),
            vdos: node.vdos.clone(),
        });
        task::spawn(server::run(listener, protocol));

        log::info!("{:?}: Listening on {}", node_id, contact.addr());

        Ok(node)
    }

    pub fn node_id(&self) -> NodeId {
        self.contact.id()
    }

    /// The contact other nodes reach us at.
    pub fn contact(&self) -> Contact {
        self.contact
    }

    pub fn epoch_config(&self) -> &EpochConfig {
        &self.epoch_config
    }

    /// Ping a bare address. On success the responder joins our routing table.
    pub async fn ping(&self, addr: SocketAddr) -> Result<Contact, Error> {
        let contact = self.rpc.ping(addr).await.map_err(rpc_error(addr))?;
        self.table.update(contact);
        Ok(contact)
    }

    /// Store a value at a single node.
    pub async fn store(&self, contact: &Contact, key: NodeId, value: Vec<u8>) -> Result<(), Error> {
        self.rpc
            .store(contact.addr(), key, value)
            .await
            .map_err(rpc_error(contact.addr()))?;
        self.table.update(*contact);
        Ok(())
    }

    /// Ask a single node for the contacts it knows closest to `target`.
    pub async fn find_node(&self, contact: &Contact, target: NodeId) -> Result<Vec<Contact>, Error> {
        let nodes = self
            .rpc
            .find_node(contact.addr(), target)
            .await
            .map_err(rpc_error(contact.addr()))?;
        self.table.update(*contact);
        Ok(nodes)
    }

    /// Ask a single node for a value.
    pub async fn find_value(&self, contact: &Contact, key: NodeId) -> Result<FoundValue, Error> {
        let found = self
            .rpc
            .find_value(contact.addr(), key)
            .await
            .map_err(rpc_error(contact.addr()))?;
        self.table.update(*contact);
        Ok(found)
    }

    /// Fetch a VDO registered at a single node.
    pub async fn get_vdo(
        &self,
        contact: &Contact,
        vdo_id: NodeId,
    ) -> Result<VanishingDataObject, Error> {
        let vdo = self
            .rpc
            .get_vdo(contact.addr(), vdo_id)
            .await
            .map_err(rpc_error(contact.addr()))?;
        self.table.update(*contact);
        Ok(vdo)
    }

    /// Look the id up in the routing table. Our own id resolves to our own contact.
    pub async fn find_contact(&self, id: NodeId) -> Result<Contact, Error> {
        if id == self.node_id() {
            return Ok(self.contact);
        }

        self.table.find(id).await?.ok_or(Error::NotFound(id))
    }

    pub fn local_find_value(&self, key: NodeId) -> Result<Vec<u8>, Error> {
        self.storage.get(&key)?.ok_or(Error::NotFound(key))
    }

    pub fn local_find_vdo(&self, vdo_id: NodeId) -> Result<VanishingDataObject, Error> {
        self.vdos.get(&vdo_id)?.ok_or(Error::NotFound(vdo_id))
    }

    /// Up to K contacts closest to `target`, nearest first.
    pub async fn iterative_find_node(&self, target: NodeId) -> Result<Vec<Contact>, Error> {
        match self.lookup(target, false).await? {
            FoundValue::Nodes(nodes) => Ok(nodes),
            FoundValue::Value(_) => Ok(Vec::new()),
        }
    }

    pub async fn iterative_find_value(&self, key: NodeId) -> Result<FoundValue, Error> {
        self.lookup(key, true).await
    }

    /// Store the value at the K nodes closest to `key`. Returns the remote nodes that accepted
    /// it; a copy is kept locally too when this node is one of the K closest.
    pub async fn iterative_store(&self, key: NodeId, value: Vec<u8>) -> Result<Vec<Contact>, Error> {
        lookup::iterative_store(
            &self.rpc,
            &self.table,
            &self.storage,
            self.node_id(),
            key,
            value,
        )
        .await
    }

    /// Encrypt `data` and secret share the key into the DHT. With a non-zero `timeout` the shares
    /// are kept alive across epochs for that long.
    pub async fn vanish_data(
        &self,
        data: &[u8],
        number_keys: u8,
        threshold: u8,
        timeout: Duration,
    ) -> Result<VanishingDataObject, Error> {
        vanish::vanish_data(self, data, number_keys, threshold, timeout).await
    }

    pub async fn unvanish_data(
        &self,
        vdo: &VanishingDataObject,
        decrypt: bool,
    ) -> Result<Unvanished, Error> {
        vanish::unvanish_data(self, vdo, decrypt).await
    }

    /// `vanish_data` and register the result under `vdo_id` so other nodes can fetch it.
    pub async fn vanish(
        &self,
        vdo_id: NodeId,
        data: &[u8],
        number_keys: u8,
        threshold: u8,
        timeout: Duration,
    ) -> Result<VanishingDataObject, Error> {
        let vdo = self
            .vanish_data(data, number_keys, threshold, timeout)
            .await?;
        self.vdos.put(vdo_id, vdo.clone())?;
        Ok(vdo)
    }

    /// Fetch the VDO registered as `vdo_id` at node `node_id` and recover its payload.
    pub async fn unvanish(&self, node_id: NodeId, vdo_id: NodeId) -> Result<Vec<u8>, Error> {
        let vdo = if node_id == self.node_id() {
            self.local_find_vdo(vdo_id)?
        } else {
            let contact = self.locate(node_id).await?;
            self.get_vdo(&contact, vdo_id).await?
        };

        vanish::unvanish_payload(self, &vdo).await
    }

    pub async fn state(&self) -> Result<DebugState, Error> {
        self.table.state().await
    }

    /// Stop the routing table and the listener. Requests and probes already in flight run to
    /// completion.
    pub fn shutdown(&self) {
        log::info!("{:?}: Shutting down", self.node_id());
        self.table.shutdown();
    }

    async fn lookup(&self, target: NodeId, find_value: bool) -> Result<FoundValue, Error> {
        Lookup::new(&self.rpc, &self.table, self.node_id(), target, find_value)
            .run()
            .await
    }

    /// The routing table first, then the network.
    async fn locate(&self, node_id: NodeId) -> Result<Contact, Error> {
        if let Ok(contact) = self.find_contact(node_id).await {
            return Ok(contact);
        }

        self.iterative_find_node(node_id)
            .await?
            .into_iter()
            .find(|contact| contact.id() == node_id)
            .ok_or(Error::NotFound(node_id))
    }
}

struct ShutdownOnDrop(TableHandle);

impl Drop for ShutdownOnDrop {
    fn drop(&mut self) {
        self.0.shutdown();
    }
}

fn rpc_error(addr: SocketAddr) -> impl FnOnce(RpcError) -> Error {
    move |source| Error::Rpc { addr, source }
}

/// An unspecified listen address is advertised as the loopback address of the same family.
fn advertised_addr(local: SocketAddr) -> SocketAddr {
    match local.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => (Ipv4Addr::LOCALHOST, local.port()).into(),
        IpAddr::V6(ip) if ip.is_unspecified() => (Ipv6Addr::LOCALHOST, local.port()).into(),
        _ => local,
    }
}

// ----------------------------------------------------------------------------//

/// Stores information for initializing a node.
#[derive(Debug)]
pub struct DhtBuilder {
    node_id: Option<NodeId>,
    epoch_config: EpochConfig,
}

impl DhtBuilder {
    /// Set the id of this node. If not provided, a random node id is generated.
    pub fn set_node_id(mut self, id: NodeId) -> Self {
        self.node_id = Some(id);
        self
    }

    /// Set the epoch length and the refresh margin used for vanishing data objects. Every node
    /// of a network must use the same epoch length.
    pub fn set_epoch_config(mut self, epoch_config: EpochConfig) -> Self {
        self.epoch_config = epoch_config;
        self
    }

    /// Start a node with the current configuration on the provided listener.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self, listener: TcpListener) -> io::Result<Kademlia> {
        Kademlia::with_builder(self, listener, Arc::new(TcpTransport))
    }

    /// Bind a listener to `addr` and start the node on it.
    pub async fn bind<A: ToSocketAddrs>(self, addr: A) -> io::Result<Kademlia> {
        let listener = TcpListener::bind(addr).await?;
        self.start(listener)
    }
}
