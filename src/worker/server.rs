//! Inbound side: accepts connections and answers requests.

use super::{lookup::K, TableHandle};
use crate::{
    id::NodeId,
    message::{Query, Reply, Request, Response},
    routing::contact::Contact,
    socket,
    storage::LocalStorage,
    vanish::VanishingDataObject,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::{
    net::{TcpListener, TcpStream},
    select, task,
};

/// Request handlers shared by all connections.
pub(crate) struct Protocol {
    pub contact: Contact,
    pub table: TableHandle,
    pub storage: Arc<LocalStorage<Vec<u8>>>,
    pub vdos: Arc<LocalStorage<VanishingDataObject>>,
}

impl Protocol {
    pub async fn handle(&self, query: Query) -> Reply {
        // Any request refreshes the sender in our routing table.
        self.table.update(query.sender);

        let response = match query.request {
            Request::Ping {} => Response::Pong {
                sender: self.contact,
            },
            Request::Store { key, value } => match self.storage.put(key, value) {
                Ok(()) => Response::Stored {},
                Err(error) => Response::Error {
                    message: error.to_string(),
                },
            },
            Request::FindNode { target } => match self.closest(target, &query.sender).await {
                Some(nodes) => Response::Nodes { nodes },
                None => shutting_down(),
            },
            Request::FindValue { key } => match self.storage.get(&key) {
                Ok(Some(value)) => Response::Value {
                    nodes: Vec::new(),
                    value: Some(value),
                },
                Ok(None) => match self.closest(key, &query.sender).await {
                    Some(nodes) => Response::Value { nodes, value: None },
                    None => shutting_down(),
                },
                Err(error) => Response::Error {
                    message: error.to_string(),
                },
            },
            Request::GetVdo { vdo_id } => match self.vdos.get(&vdo_id) {
                Ok(Some(vdo)) => Response::Vdo { vdo },
                Ok(None) => Response::Error {
                    message: "VDO not found".to_owned(),
                },
                Err(error) => Response::Error {
                    message: error.to_string(),
                },
            },
        };

        Reply {
            response,
            msg_id: query.msg_id,
        }
    }

    /// Up to K closest contacts, never including the requester.
    async fn closest(&self, target: NodeId, requester: &Contact) -> Option<Vec<Contact>> {
        let mut nodes = self.table.closest(target, K + 1).await.ok()?;
        nodes.retain(|node| node.id() != requester.id());
        nodes.truncate(K);
        Some(nodes)
    }
}

fn shutting_down() -> Response {
    Response::Error {
        message: "node is shutting down".to_owned(),
    }
}

/// Accept connections until the routing table actor stops.
pub(crate) async fn run(listener: TcpListener, protocol: Arc<Protocol>) {
    let table = protocol.table.clone();

    loop {
        select! {
            result = listener.accept() => match result {
                Ok((stream, addr)) => {
                    task::spawn(handle_connection(stream, addr, protocol.clone()));
                }
                Err(error) => log::warn!("Failed to accept incoming connection: {error}"),
            },
            _ = table.closed() => break,
        }
    }

    log::info!("{:?}: Listener shut down", protocol.contact);
}

async fn handle_connection(mut stream: TcpStream, addr: SocketAddr, protocol: Arc<Protocol>) {
    loop {
        let frame = match socket::read_frame(&mut stream).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(error) => {
                log::debug!("Failed to read request from {addr:?}: {error}");
                break;
            }
        };

        let query = match Query::decode(&frame) {
            Ok(query) => query,
            Err(error) => {
                log::warn!("Failed to decode incoming message from {addr:?}: {error}");
                break;
            }
        };

        log::trace!("Received from {addr:?} {query:?}");

        let reply = protocol.handle(query).await;

        let bytes = match reply.encode() {
            Ok(bytes) => bytes,
            Err(error) => {
                log::warn!("Failed to encode reply to {addr:?}: {error}");
                break;
            }
        };

        if let Err(error) = socket::write_frame(&mut stream, &bytes).await {
            log::debug!("Failed to send reply to {addr:?}: {error}");
            break;
        }
    }
}

// ----------------------------------------------------------------------------//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::RpcError,
        message::MsgId,
        routing::table::RoutingTable,
        socket::Transport,
        test,
        worker::{Rpc, TableHandler},
    };
    use async_trait::async_trait;
    use std::net::Ipv4Addr;
    use tokio::sync::mpsc;

    struct Unreachable;

    #[async_trait]
    impl Transport for Unreachable {
        async fn exchange(&self, _: SocketAddr, _: &[u8]) -> Result<Vec<u8>, RpcError> {
            Err(RpcError::UnexpectedResponse)
        }
    }

    fn protocol() -> Protocol {
        let contact = Contact::new(NodeId::random(), test::dummy_socket_addr_v4());
        let rpc = Rpc::new(Arc::new(Unreachable), contact);

        let (tx, rx) = mpsc::unbounded_channel();
        task::spawn(
            TableHandler::new(RoutingTable::new(contact.id()), rpc, rx, tx.downgrade()).run(),
        );

        Protocol {
            contact,
            table: TableHandle::new(tx),
            storage: Arc::new(LocalStorage::new()),
            vdos: Arc::new(LocalStorage::new()),
        }
    }

    fn peer(port: u16) -> Contact {
        Contact::new(NodeId::random(), (Ipv4Addr::LOCALHOST, port).into())
    }

    fn query(sender: Contact, request: Request) -> Query {
        Query {
            request,
            sender,
            msg_id: MsgId::random(),
        }
    }

    #[tokio::test]
    async fn positive_ping_answers_own_contact() {
        let protocol = protocol();
        let request = query(peer(1), Request::Ping {});
        let msg_id = request.msg_id;

        let reply = protocol.handle(request).await;

        assert_eq!(reply.msg_id, msg_id);
        assert_eq!(
            reply.response,
            Response::Pong {
                sender: protocol.contact
            }
        );
    }

    #[tokio::test]
    async fn positive_find_node_excludes_requester() {
        let protocol = protocol();
        let others: Vec<_> = (1..=5).map(peer).collect();
        for other in &others {
            protocol.table.update(*other);
        }

        let requester = peer(100);
        let reply = protocol
            .handle(query(
                requester,
                Request::FindNode {
                    target: requester.id(),
                },
            ))
            .await;

        let nodes = match reply.response {
            Response::Nodes { nodes } => nodes,
            other => panic!("unexpected {:?}", other),
        };

        assert!(!nodes.contains(&requester));
        assert_eq!(nodes.len(), others.len());
        assert!(others.iter().all(|other| nodes.contains(other)));
    }

    #[tokio::test]
    async fn positive_find_value_present_returns_value_only() {
        let protocol = protocol();
        protocol.table.update(peer(1));

        let key = NodeId::sha1(b"greeting");
        protocol.storage.put(key, b"hello".to_vec()).unwrap();

        let reply = protocol
            .handle(query(peer(2), Request::FindValue { key }))
            .await;

        assert_eq!(
            reply.response,
            Response::Value {
                nodes: Vec::new(),
                value: Some(b"hello".to_vec()),
            }
        );
    }

    #[tokio::test]
    async fn positive_find_value_missing_returns_nodes() {
        let protocol = protocol();
        let known = peer(1);
        protocol.table.update(known);

        let reply = protocol
            .handle(query(
                peer(2),
                Request::FindValue {
                    key: NodeId::random(),
                },
            ))
            .await;

        assert_eq!(
            reply.response,
            Response::Value {
                nodes: vec![known],
                value: None,
            }
        );
    }

    #[tokio::test]
    async fn positive_store_then_get_vdo() {
        let protocol = protocol();
        let key = NodeId::random();

        let reply = protocol
            .handle(query(
                peer(1),
                Request::Store {
                    key,
                    value: b"value".to_vec(),
                },
            ))
            .await;

        assert_eq!(reply.response, Response::Stored {});
        assert_eq!(protocol.storage.get(&key).unwrap(), Some(b"value".to_vec()));

        let vdo_id = NodeId::random();
        let vdo = VanishingDataObject {
            access_key: 7,
            ciphertext: b"sealed".to_vec(),
            number_keys: 5,
            threshold: 3,
        };
        protocol.vdos.put(vdo_id, vdo.clone()).unwrap();

        let reply = protocol
            .handle(query(peer(2), Request::GetVdo { vdo_id }))
            .await;

        assert_eq!(reply.response, Response::Vdo { vdo });
    }

    #[tokio::test]
    async fn negative_get_vdo_missing() {
        let protocol = protocol();

        let reply = protocol
            .handle(query(
                peer(1),
                Request::GetVdo {
                    vdo_id: NodeId::random(),
                },
            ))
            .await;

        assert_eq!(
            reply.response,
            Response::Error {
                message: "VDO not found".to_owned(),
            }
        );
    }

    #[tokio::test]
    async fn positive_every_request_refreshes_sender() {
        let protocol = protocol();
        let key = NodeId::random();

        let requests = vec![
            Request::Ping {},
            Request::Store {
                key,
                value: b"value".to_vec(),
            },
            Request::FindNode { target: key },
            Request::FindValue { key },
            Request::GetVdo { vdo_id: key },
        ];

        for (index, request) in requests.into_iter().enumerate() {
            let sender = peer(200 + index as u16);

            protocol.handle(query(sender, request)).await;

            assert_eq!(protocol.table.find(sender.id()).await.unwrap(), Some(sender));
        }

        assert_eq!(protocol.table.state().await.unwrap().node_count, 5);
    }
}
