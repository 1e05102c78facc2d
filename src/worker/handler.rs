use super::{DebugState, Rpc, TableCommand};
use crate::{
    id::NodeId,
    routing::{bucket::BucketUpdate, contact::Contact, table::RoutingTable},
};
use std::collections::HashSet;
use tokio::{sync::mpsc, task};

/// Sole owner of the routing table. All reads and writes arrive as `TableCommand`s and are
/// applied one at a time; nothing else holds a reference to the buckets.
pub(crate) struct TableHandler {
    running: bool,
    routing_table: RoutingTable,
    command_rx: mpsc::UnboundedReceiver<TableCommand>,
    // Used by probe tasks to report back. Weak so that the actor stops once every handle is gone.
    command_tx: mpsc::WeakUnboundedSender<TableCommand>,
    rpc: Rpc,
    // Heads of full buckets with a probe in flight.
    probing: HashSet<NodeId>,
}

impl TableHandler {
    pub fn new(
        routing_table: RoutingTable,
        rpc: Rpc,
        command_rx: mpsc::UnboundedReceiver<TableCommand>,
        command_tx: mpsc::WeakUnboundedSender<TableCommand>,
    ) -> Self {
        Self {
            running: true,
            routing_table,
            command_rx,
            command_tx,
            rpc,
            probing: HashSet::new(),
        }
    }

    pub async fn run(mut self) {
        while self.running {
            match self.command_rx.recv().await {
                Some(command) => self.handle_command(command),
                None => self.running = false,
            }
        }

        log::info!(
            "{:?}: Routing table shut down with {} contacts",
            self.routing_table.node_id(),
            self.routing_table.len()
        );
    }

    fn handle_command(&mut self, command: TableCommand) {
        match command {
            TableCommand::Update(contact) => self.handle_update(contact),
            TableCommand::Find(id, tx) => {
                tx.send(self.routing_table.find(&id)).ok();
            }
            TableCommand::Closest { target, count, tx } => {
                tx.send(self.routing_table.closest(&target, count)).ok();
            }
            TableCommand::ProbeResult {
                head,
                alive,
                candidate,
            } => self.handle_probe_result(head, alive, candidate),
            TableCommand::GetDebugState(tx) => {
                tx.send(self.debug_state()).ok();
            }
            TableCommand::Shutdown => {
                self.running = false;
                // Dropping the receiver makes every handle observe the shutdown.
                self.command_rx.close();
            }
        }
    }

    fn handle_update(&mut self, contact: Contact) {
        match self.routing_table.update(contact) {
            Some(BucketUpdate::Full { head }) => self.start_probe(head, contact),
            Some(update) => log::trace!("{contact:?}: {update:?}"),
            None => (),
        }
    }

    fn start_probe(&mut self, head: Contact, candidate: Contact) {
        if !self.probing.insert(head.id()) {
            return;
        }

        log::trace!("Bucket full, probing {head:?} on behalf of {candidate:?}");

        let rpc = self.rpc.clone();
        let tx = self.command_tx.clone();

        task::spawn(async move {
            let alive = match rpc.ping(head.addr()).await {
                Ok(sender) => sender.id() == head.id(),
                Err(error) => {
                    log::debug!("Probe of {head:?} failed: {error}");
                    false
                }
            };

            match tx.upgrade() {
                Some(tx) => {
                    tx.send(TableCommand::ProbeResult {
                        head,
                        alive,
                        candidate,
                    })
                    .ok();
                }
                None => log::trace!("Routing table gone, dropping probe result for {head:?}"),
            }
        });
    }

    fn handle_probe_result(&mut self, head: Contact, alive: bool, candidate: Contact) {
        self.probing.remove(&head.id());

        if !alive {
            log::debug!("Evicting {head:?} in favour of {candidate:?}");
        }

        self.routing_table.apply_probe(head, alive, candidate);
    }

    fn debug_state(&self) -> DebugState {
        DebugState {
            node_count: self.routing_table.len(),
            occupied_buckets: self
                .routing_table
                .buckets()
                .filter(|bucket| !bucket.is_empty())
                .count(),
        }
    }
}

// ----------------------------------------------------------------------------//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::RpcError,
        id::ID_LEN,
        routing::bucket::MAX_BUCKET_SIZE,
        socket::Transport,
        test,
        worker::TableHandle,
    };
    use async_trait::async_trait;
    use std::{net::SocketAddr, sync::Arc};

    // Every remote node is unreachable.
    struct Unreachable;

    #[async_trait]
    impl Transport for Unreachable {
        async fn exchange(&self, _: SocketAddr, _: &[u8]) -> Result<Vec<u8>, RpcError> {
            Err(RpcError::UnexpectedResponse)
        }
    }

    fn spawn_table(node_id: NodeId) -> TableHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let rpc = Rpc::new(
            Arc::new(Unreachable),
            Contact::new(node_id, test::dummy_socket_addr_v4()),
        );

        task::spawn(TableHandler::new(RoutingTable::new(node_id), rpc, rx, tx.downgrade()).run());

        TableHandle::new(tx)
    }

    #[tokio::test]
    async fn positive_update_then_find() {
        let table = spawn_table(NodeId::random());
        let contact = Contact::new(NodeId::random(), test::dummy_socket_addr_v4());

        table.update(contact);

        assert_eq!(table.find(contact.id()).await.unwrap(), Some(contact));
        assert_eq!(table.state().await.unwrap().node_count, 1);
    }

    #[tokio::test]
    async fn positive_unreachable_head_is_evicted() {
        let table = spawn_table(NodeId::from([0u8; ID_LEN]));
        let addr = test::dummy_socket_addr_v4();

        let contacts: Vec<_> = (0..=MAX_BUCKET_SIZE)
            .map(|index| {
                let mut id = [0u8; ID_LEN];
                id[0] = 0x80;
                id[ID_LEN - 1] = index as u8;
                Contact::new(id.into(), addr)
            })
            .collect();

        for contact in &contacts {
            table.update(*contact);
        }

        let head = contacts[0];
        let candidate = contacts[MAX_BUCKET_SIZE];

        // The probe reports asynchronously; poll until the candidate made it in.
        for _ in 0..100 {
            if table.find(candidate.id()).await.unwrap().is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        assert_eq!(table.find(candidate.id()).await.unwrap(), Some(candidate));
        assert_eq!(table.find(head.id()).await.unwrap(), None);

        let state = table.state().await.unwrap();
        assert_eq!(state.node_count, MAX_BUCKET_SIZE);
        assert_eq!(state.occupied_buckets, 1);
    }

    #[tokio::test]
    async fn positive_stops_when_all_handles_dropped() {
        let node_id = NodeId::random();
        let (tx, rx) = mpsc::unbounded_channel();
        let rpc = Rpc::new(
            Arc::new(Unreachable),
            Contact::new(node_id, test::dummy_socket_addr_v4()),
        );

        let actor =
            task::spawn(TableHandler::new(RoutingTable::new(node_id), rpc, rx, tx.downgrade()).run());

        let table = TableHandle::new(tx);
        let other = table.clone();
        assert_eq!(other.state().await.unwrap().node_count, 0);

        drop(table);
        drop(other);

        tokio::time::timeout(std::time::Duration::from_secs(5), actor)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn negative_commands_after_shutdown() {
        let table = spawn_table(NodeId::random());

        table.shutdown();
        table.closed().await;

        assert!(table.find(NodeId::random()).await.is_err());
        assert!(table.closest(NodeId::random(), 3).await.is_err());
    }
}
