use super::{FoundValue, Rpc, TableHandle};
use crate::{
    error::{Error, RpcError},
    id::NodeId,
    routing::{bucket::MAX_BUCKET_SIZE, contact::Contact},
    storage::LocalStorage,
};
use futures_util::future;
use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashSet},
};

/// Number of contacts a lookup aims to collect.
pub const K: usize = MAX_BUCKET_SIZE;

/// Number of requests in flight per round.
pub const ALPHA: usize = 3;

type Distance = NodeId;

/// Unqueried lookup candidates, nearest to the target first. Built for a single target and
/// thrown away with the lookup.
struct Frontier {
    target: NodeId,
    heap: BinaryHeap<Reverse<(Distance, Candidate)>>,
}

// Ordering of the heap entries is decided by the distance alone; ids are unique within a
// lookup so two candidates never share a distance.
#[derive(Clone, Copy, Debug)]
struct Candidate(Contact);

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.0.id() == other.0.id()
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.id().cmp(&other.0.id())
    }
}

impl Frontier {
    fn new(target: NodeId) -> Self {
        Self {
            target,
            heap: BinaryHeap::new(),
        }
    }

    fn push(&mut self, contact: Contact) {
        let distance = self.target.distance(&contact.id());
        self.heap.push(Reverse((distance, Candidate(contact))));
    }

    fn pop(&mut self) -> Option<Contact> {
        self.heap
            .pop()
            .map(|Reverse((_, Candidate(contact)))| contact)
    }

    fn pop_many(&mut self, count: usize) -> Vec<Contact> {
        std::iter::from_fn(|| self.pop()).take(count).collect()
    }

    fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    fn len(&self) -> usize {
        self.heap.len()
    }
}

/// State of one iterative `find_node` or `find_value`.
pub(crate) struct Lookup<'a> {
    rpc: &'a Rpc,
    table: &'a TableHandle,
    target: NodeId,
    find_value: bool,
    frontier: Frontier,
    seen: HashSet<NodeId>,
    active: Vec<Contact>,
    value: Option<Vec<u8>>,
}

impl<'a> Lookup<'a> {
    pub fn new(
        rpc: &'a Rpc,
        table: &'a TableHandle,
        this_node_id: NodeId,
        target: NodeId,
        find_value: bool,
    ) -> Self {
        let mut seen = HashSet::new();
        seen.insert(this_node_id);

        Self {
            rpc,
            table,
            target,
            find_value,
            frontier: Frontier::new(target),
            seen,
            active: Vec::new(),
            value: None,
        }
    }

    pub async fn run(mut self) -> Result<FoundValue, Error> {
        let seeds = self.table.closest(self.target, K).await?;
        for contact in seeds.into_iter().take(ALPHA) {
            if self.seen.insert(contact.id()) {
                self.frontier.push(contact);
            }
        }

        let mut closest: Option<Distance> = None;

        loop {
            let batch = self.frontier.pop_many(ALPHA);
            if batch.is_empty() {
                break;
            }

            self.round(batch).await;

            if self.value.is_some() || self.active.len() >= K {
                break;
            }

            let current = self.closest_active();
            let improved = match (closest, current) {
                (Some(old), Some(new)) => new < old,
                (None, Some(_)) => true,
                (_, None) => false,
            };

            if current.is_some() {
                closest = current;
            }

            // A stalled round ends the alpha-wide phase; whatever is left gets drained below.
            if !improved {
                break;
            }
        }

        if self.value.is_none() && self.active.len() < K && !self.frontier.is_empty() {
            log::trace!(
                "Lookup of {:?} draining {} remaining candidates",
                self.target,
                self.frontier.len()
            );

            let batch = self.frontier.pop_many(usize::MAX);
            self.round(batch).await;
        }

        if let Some(value) = self.value {
            return Ok(FoundValue::Value(value));
        }

        let target = self.target;
        let mut active = self.active;
        active.sort_by_key(|contact| target.distance(&contact.id()));
        active.truncate(K);

        Ok(FoundValue::Nodes(active))
    }

    /// Query every contact of the batch concurrently and wait for all of them.
    async fn round(&mut self, batch: Vec<Contact>) {
        let responses = future::join_all(batch.iter().map(|contact| self.query(*contact))).await;

        for (contact, response) in batch.into_iter().zip(responses) {
            match response {
                Ok(found) => {
                    self.active.push(contact);
                    self.table.update(contact);

                    match found {
                        FoundValue::Value(value) => {
                            if self.value.is_none() {
                                self.value = Some(value);
                            }
                        }
                        FoundValue::Nodes(nodes) => {
                            for node in nodes {
                                if self.seen.insert(node.id()) {
                                    self.frontier.push(node);
                                }
                            }
                        }
                    }
                }
                Err(error) => {
                    log::debug!("Lookup of {:?}: {contact:?} unreachable: {error}", self.target);
                }
            }
        }
    }

    async fn query(&self, contact: Contact) -> Result<FoundValue, RpcError> {
        if self.find_value {
            self.rpc.find_value(contact.addr(), self.target).await
        } else {
            self.rpc
                .find_node(contact.addr(), self.target)
                .await
                .map(FoundValue::Nodes)
        }
    }

    fn closest_active(&self) -> Option<Distance> {
        self.active
            .iter()
            .map(|contact| self.target.distance(&contact.id()))
            .min()
    }
}

/// `find_node` to locate the closest contacts, then `store` at each of them concurrently.
/// Returns the contacts that acknowledged the store.
///
/// This node keeps a copy as well when it would be among the K closest to `key`: the lookup
/// found fewer than K contacts or our id is nearer than the farthest of them.
pub(crate) async fn iterative_store(
    rpc: &Rpc,
    table: &TableHandle,
    storage: &LocalStorage<Vec<u8>>,
    this_node_id: NodeId,
    key: NodeId,
    value: Vec<u8>,
) -> Result<Vec<Contact>, Error> {
    let contacts = match Lookup::new(rpc, table, this_node_id, key, false).run().await? {
        FoundValue::Nodes(contacts) => contacts,
        FoundValue::Value(_) => Vec::new(),
    };

    let keep_local = contacts.len() < K
        || contacts
            .last()
            .map_or(true, |farthest| key.distance(&this_node_id) < key.distance(&farthest.id()));

    let results = future::join_all(
        contacts
            .iter()
            .map(|contact| rpc.store(contact.addr(), key, value.clone())),
    )
    .await;

    if keep_local {
        storage.put(key, value)?;
    }

    let stored = contacts
        .into_iter()
        .zip(results)
        .filter_map(|(contact, result)| match result {
            Ok(()) => Some(contact),
            Err(error) => {
                log::debug!("Store of {key:?} at {contact:?} failed: {error}");
                None
            }
        })
        .collect();

    Ok(stored)
}

// ----------------------------------------------------------------------------//
