//! Kademlia distributed hash table node with vanishing data objects.
//!
//! A node keeps 160 k-buckets of contacts behind a single routing table actor, answers
//! `ping`/`store`/`find_node`/`find_value`/`get_vdo` requests over TCP and drives iterative
//! lookups with ALPHA requests in flight per round. On top of that, a vanishing data object is a
//! payload encrypted under a key that is split with threshold secret sharing and spread over
//! locations that rotate every epoch.

mod builder;
mod compact;
mod error;
mod id;
mod message;
mod routing;
mod socket;
mod storage;
mod vanish;
mod worker;

pub use crate::builder::{DhtBuilder, Kademlia};
pub use crate::error::{Error, RpcError, SharingError};
pub use crate::id::{LengthError, NodeId, ID_LEN};
pub use crate::routing::contact::Contact;
pub use crate::vanish::{EpochConfig, Unvanished, VanishingDataObject};
pub use crate::worker::lookup::{ALPHA, K};
pub use crate::worker::{DebugState, FoundValue};
