use crate::id::NodeId;
use std::{io, net::SocketAddr};
use thiserror::Error;

/// Errors surfaced by the node operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(NodeId),
    #[error("rpc to {addr} failed")]
    Rpc {
        addr: SocketAddr,
        #[source]
        source: RpcError,
    },
    #[error("local storage failure: {0}")]
    Storage(String),
    #[error("secret sharing failure")]
    SecretSharing(#[from] SharingError),
    #[error("failed to encrypt or decrypt payload")]
    Cipher,
    #[error("node has shut down")]
    Shutdown,
    #[error("io error")]
    Io(#[from] io::Error),
}

/// Failure of a single request/response exchange. All of them mean "contact unreachable" to the
/// callers that do not care about the details.
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("socket error")]
    Io(#[from] io::Error),
    #[error("invalid bencode data")]
    Codec(#[from] serde_bencode::Error),
    #[error("response message id does not match the request")]
    MsgIdMismatch,
    #[error("unexpected response")]
    UnexpectedResponse,
    #[error("frame of {0} bytes exceeds the limit")]
    FrameTooLarge(usize),
    #[error("remote error: {0}")]
    Remote(String),
}

/// Errors of the threshold secret sharing scheme.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharingError {
    #[error("cannot split into {shares} shares with threshold {threshold}")]
    InvalidParameters { shares: u8, threshold: u8 },
    #[error("found {found} shares, need at least {threshold}")]
    NotEnoughShares { found: usize, threshold: u8 },
    #[error("shares are inconsistent")]
    InconsistentShares,
}
