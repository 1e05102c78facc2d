use crate::id::NodeId;
use std::{
    fmt,
    net::{IpAddr, SocketAddr},
};

/// A reachable peer: its id and the address its RPC listener accepts connections on.
///
/// Two contacts are equal only when the id, the host and the port all match.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Contact {
    id: NodeId,
    addr: SocketAddr,
}

impl Contact {
    pub fn new(id: NodeId, addr: SocketAddr) -> Self {
        Self { id, addr }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn host(&self) -> IpAddr {
        self.addr.ip()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

impl fmt::Debug for Contact {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}@{}", self.id, self.addr)
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test;

    #[test]
    fn positive_equal_when_all_fields_match() {
        let id = NodeId::random();
        let addr = test::dummy_socket_addr_v4();

        assert_eq!(Contact::new(id, addr), Contact::new(id, addr));
    }

    #[test]
    fn negative_port_differs() {
        let id = NodeId::random();
        let a = Contact::new(id, "127.0.0.1:1000".parse().unwrap());
        let b = Contact::new(id, "127.0.0.1:1001".parse().unwrap());

        assert_ne!(a, b);
        assert_eq!(a.host(), b.host());
    }
}
