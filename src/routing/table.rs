use super::{
    bucket::{BucketUpdate, KBucket},
    contact::Contact,
};
use crate::id::{NodeId, ID_BITS};
use std::cmp::Ordering;

pub const MAX_BUCKETS: usize = ID_BITS;

/// Routing table containing one bucket per prefix length as well as the id of the local node
/// participating in the dht.
///
/// A contact sharing `p` leading bits with our id lives in bucket `p` and nowhere else. Our own
/// id is never stored.
pub struct RoutingTable {
    buckets: Vec<KBucket>,
    node_id: NodeId,
}

impl RoutingTable {
    /// Create a new RoutingTable with the given node id as our id.
    pub fn new(node_id: NodeId) -> RoutingTable {
        let buckets = (0..MAX_BUCKETS).map(|_| KBucket::new()).collect();

        RoutingTable { buckets, node_id }
    }

    /// Return the node id of the RoutingTable.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Iterator over all buckets in the routing table.
    pub fn buckets(&self) -> impl Iterator<Item = &KBucket> + ExactSizeIterator {
        self.buckets.iter()
    }

    /// Total number of contacts in the table.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(KBucket::len).sum()
    }

    pub fn find(&self, id: &NodeId) -> Option<Contact> {
        let index = self.bucket_index(id)?;
        self.buckets[index].find(id).copied()
    }

    /// Offer a contact to its bucket. Returns `None` if the contact carries our own id.
    pub fn update(&mut self, contact: Contact) -> Option<BucketUpdate> {
        let index = self.bucket_index(&contact.id())?;
        Some(self.buckets[index].update(contact))
    }

    /// Apply the result of probing the head of a full bucket.
    ///
    /// If the head answered it becomes the freshest-seen entry and the candidate is dropped.
    /// Otherwise the head is evicted and the candidate appended. The bucket may have changed
    /// since the probe was started, so both steps work by id and give up quietly when the
    /// expected entry is gone or there is no room.
    pub fn apply_probe(&mut self, head: Contact, alive: bool, candidate: Contact) {
        let index = match self.bucket_index(&head.id()) {
            Some(index) => index,
            None => return,
        };
        let bucket = &mut self.buckets[index];

        if alive {
            bucket.move_to_back(&head.id());
        } else {
            bucket.remove(&head.id());

            if self.bucket_index(&candidate.id()) == Some(index) {
                self.buckets[index].push(candidate);
            }
        }
    }

    /// Up to `count` known contacts ordered by ascending distance to `target`.
    ///
    /// Buckets are visited starting from the one `target` would fall into and moving outward,
    /// alternating to the right and to the left.
    pub fn closest(&self, target: &NodeId, count: usize) -> Vec<Contact> {
        let start_index = self.node_id.prefix_len(target).min(MAX_BUCKETS - 1);
        let mut current_index = Some(start_index);
        let mut contacts = Vec::with_capacity(count);

        while let Some(index) = current_index {
            if contacts.len() >= count {
                break;
            }

            let missing = count - contacts.len();
            contacts.extend(self.buckets[index].freshest(missing).copied());

            current_index = next_bucket_index(MAX_BUCKETS, start_index, index);
        }

        contacts.sort_by_key(|contact: &Contact| target.distance(&contact.id()));
        contacts
    }

    fn bucket_index(&self, id: &NodeId) -> Option<usize> {
        let index = self.node_id.prefix_len(id);

        if index < MAX_BUCKETS {
            Some(index)
        } else {
            None
        }
    }
}

/// Computes the next bucket index that should be visited given the number of buckets, the starting index
/// and the current index.
///
/// Returns None if all of the buckets have been visited.
fn next_bucket_index(num_buckets: usize, start_index: usize, curr_index: usize) -> Option<usize> {
    // Since we prefer going right first, that means if we are on the right side then we want to go
    // to the same offset on the left, however, if we are on the left we want to go 1 past the offset
    // to the right. All assuming we can actually do this without going out of bounds.
    match curr_index.cmp(&start_index) {
        Ordering::Equal => {
            let right_index = start_index.checked_add(1);
            let left_index = start_index.checked_sub(1);

            in_bounds(num_buckets, right_index).or_else(|| in_bounds(num_buckets, left_index))
        }
        Ordering::Greater => {
            let offset = curr_index - start_index;

            let left_index = start_index.checked_sub(offset);
            let right_index = curr_index.checked_add(1);

            in_bounds(num_buckets, left_index).or_else(|| in_bounds(num_buckets, right_index))
        }
        Ordering::Less => {
            let offset = (start_index - curr_index) + 1;

            let right_index = start_index.checked_add(offset);
            let left_index = curr_index.checked_sub(1);

            in_bounds(num_buckets, right_index).or_else(|| in_bounds(num_buckets, left_index))
        }
    }
}

/// Returns the overflow checked index if it is in bounds of the given length.
fn in_bounds(length: usize, checked_index: Option<usize>) -> Option<usize> {
    checked_index.filter(|index| *index < length)
}

// ----------------------------------------------------------------------------//
