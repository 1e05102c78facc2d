use std::collections::VecDeque;

use crate::id::NodeId;
use crate::routing::contact::Contact;

/// Maximum number of contacts that should reside in any bucket.
pub const MAX_BUCKET_SIZE: usize = 20;

/// Outcome of offering a contact to a bucket.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BucketUpdate {
    /// The contact was already known and is now the freshest-seen entry.
    Refreshed,
    /// The contact was new and there was room for it.
    Inserted,
    /// The contact is new but the bucket is full. `head` is the least-recently-seen contact which
    /// should be probed before deciding whether the new one gets in.
    Full { head: Contact },
}

/// Bucket containing contacts with identical bit prefixes, ordered from the least-recently-seen
/// (front) to the freshest-seen (back).
#[derive(Default)]
pub struct KBucket {
    contacts: VecDeque<Contact>,
}

impl KBucket {
    pub fn new() -> KBucket {
        KBucket {
            contacts: VecDeque::with_capacity(MAX_BUCKET_SIZE),
        }
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.contacts.len() >= MAX_BUCKET_SIZE
    }

    pub fn find(&self, id: &NodeId) -> Option<&Contact> {
        self.contacts.iter().find(|contact| contact.id() == *id)
    }

    /// The least-recently-seen contact.
    pub fn head(&self) -> Option<&Contact> {
        self.contacts.front()
    }

    /// Up to `count` contacts, freshest-seen first.
    pub fn freshest(&self, count: usize) -> impl Iterator<Item = &Contact> {
        self.contacts.iter().rev().take(count)
    }

    /// Offer a contact seen on the network.
    ///
    /// A known id is moved to the freshest-seen end and never duplicated; the stored entry is
    /// kept as is.
    pub fn update(&mut self, contact: Contact) -> BucketUpdate {
        if self.move_to_back(&contact.id()) {
            return BucketUpdate::Refreshed;
        }

        if self.push(contact) {
            return BucketUpdate::Inserted;
        }

        match self.head() {
            Some(head) => BucketUpdate::Full { head: *head },
            None => BucketUpdate::Inserted,
        }
    }

    /// Move the contact with the given id to the freshest-seen end.
    ///
    /// Returns false if no such contact is in the bucket.
    pub fn move_to_back(&mut self, id: &NodeId) -> bool {
        match self.position(id) {
            Some(index) => {
                if let Some(contact) = self.contacts.remove(index) {
                    self.contacts.push_back(contact);
                }
                true
            }
            None => false,
        }
    }

    /// Append the contact at the freshest-seen end if there is room and its id is not present.
    pub fn push(&mut self, contact: Contact) -> bool {
        if self.is_full() || self.position(&contact.id()).is_some() {
            return false;
        }

        self.contacts.push_back(contact);
        true
    }

    pub fn remove(&mut self, id: &NodeId) -> Option<Contact> {
        let index = self.position(id)?;
        self.contacts.remove(index)
    }

    fn position(&self, id: &NodeId) -> Option<usize> {
        self.contacts.iter().position(|contact| contact.id() == *id)
    }
}

// ----------------------------------------------------------------------------//
