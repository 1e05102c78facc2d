use crate::{id::NodeId, routing::contact::Contact, vanish::VanishingDataObject};
use serde::{Deserialize, Serialize};

/// Random id correlating a request with its response.
pub(crate) type MsgId = NodeId;

/// Request envelope. Every request names its sender so the receiver can refresh its routing table.
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub(crate) struct Query {
    #[serde(rename = "q")]
    pub request: Request,
    #[serde(rename = "s")]
    pub sender: Contact,
    #[serde(rename = "t")]
    pub msg_id: MsgId,
}

/// Response envelope, echoing the message id of the request.
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub(crate) struct Reply {
    #[serde(rename = "r")]
    pub response: Response,
    #[serde(rename = "t")]
    pub msg_id: MsgId,
}

impl Query {
    pub fn decode(input: &[u8]) -> Result<Self, serde_bencode::Error> {
        serde_bencode::from_bytes(input)
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_bencode::Error> {
        serde_bencode::to_bytes(self)
    }
}

impl Reply {
    pub fn decode(input: &[u8]) -> Result<Self, serde_bencode::Error> {
        serde_bencode::from_bytes(input)
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_bencode::Error> {
        serde_bencode::to_bytes(self)
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Request {
    Ping {},
    Store {
        key: NodeId,
        #[serde(with = "serde_bytes")]
        value: Vec<u8>,
    },
    FindNode {
        target: NodeId,
    },
    FindValue {
        key: NodeId,
    },
    GetVdo {
        vdo_id: NodeId,
    },
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Response {
    Pong {
        sender: Contact,
    },
    Stored {},
    Nodes {
        nodes: Vec<Contact>,
    },
    /// Answer to `find_value`: the value when the responder has it, otherwise the closest nodes
    /// it knows.
    Value {
        nodes: Vec<Contact>,
        #[serde(
            with = "serde_bytes",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        value: Option<Vec<u8>>,
    },
    Vdo {
        vdo: VanishingDataObject,
    },
    Error {
        message: String,
    },
}

// ----------------------------------------------------------------------------//
