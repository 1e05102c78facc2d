//! Vanishing data objects: payloads encrypted under a key that only lives, secret shared, in the
//! DHT. The shares are placed at locations that move every epoch, so once nobody re-pushes them
//! and the network churns, the key (and with it the payload) becomes unrecoverable.

pub(crate) mod cipher;
mod epoch;
pub(crate) mod sss;

pub use self::epoch::EpochConfig;
use self::sss::Share;
use crate::{
    builder::Kademlia,
    error::{Error, SharingError},
    worker::FoundValue,
};
use futures_util::future;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    time::{Duration, SystemTime},
};
use tokio::{task, time};

/// Everything needed to recover the payload while its key shares are still in the DHT.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct VanishingDataObject {
    /// Seed of the share locations. Never negative.
    pub access_key: i64,
    /// Random nonce followed by the encrypted payload.
    #[serde(with = "serde_bytes")]
    pub ciphertext: Vec<u8>,
    pub number_keys: u8,
    pub threshold: u8,
}

/// Result of `unvanish_data`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Unvanished {
    pub key: Vec<u8>,
    /// The decrypted payload, when decryption was requested.
    pub data: Option<Vec<u8>>,
}

pub(crate) async fn vanish_data(
    node: &Kademlia,
    data: &[u8],
    number_keys: u8,
    threshold: u8,
    timeout: Duration,
) -> Result<VanishingDataObject, Error> {
    let key = cipher::random_key();
    let ciphertext = cipher::encrypt(&key, data)?;
    let shares = sss::split(&key, number_keys, threshold)?;

    let access_key = rand::random::<i64>() & i64::MAX;
    let epoch = node.epoch_config().current_epoch();

    push_shares(node, access_key, epoch, &shares, threshold).await?;

    let vdo = VanishingDataObject {
        access_key,
        ciphertext,
        number_keys,
        threshold,
    };

    if !timeout.is_zero() {
        task::spawn(monitor(node.clone(), vdo.clone(), timeout));
    }

    Ok(vdo)
}

pub(crate) async fn unvanish_data(
    node: &Kademlia,
    vdo: &VanishingDataObject,
    decrypt: bool,
) -> Result<Unvanished, Error> {
    let key = recover_key(node, vdo).await?;

    let data = if decrypt {
        Some(cipher::decrypt(&key, &vdo.ciphertext)?)
    } else {
        None
    };

    Ok(Unvanished { key, data })
}

/// Recover the key and decrypt the payload.
pub(crate) async fn unvanish_payload(
    node: &Kademlia,
    vdo: &VanishingDataObject,
) -> Result<Vec<u8>, Error> {
    let key = recover_key(node, vdo).await?;
    cipher::decrypt(&key, &vdo.ciphertext)
}

/// Store every share at its location for the epoch. Fails unless at least `threshold` of them
/// were acknowledged by someone.
async fn push_shares(
    node: &Kademlia,
    access_key: i64,
    epoch: u64,
    shares: &[Share],
    threshold: u8,
) -> Result<(), Error> {
    let locations = epoch::derive_locations(access_key, epoch, shares.len() as u8);

    let results = future::join_all(
        locations
            .iter()
            .zip(shares)
            .map(|(location, share)| node.iterative_store(*location, share.to_bytes())),
    )
    .await;

    let placed = results
        .into_iter()
        .zip(&locations)
        .filter(|(result, location)| match result {
            Ok(contacts) if !contacts.is_empty() => true,
            Ok(_) => {
                log::debug!("No node accepted the share at {location:?}");
                false
            }
            Err(error) => {
                log::debug!("Failed to push share to {location:?}: {error}");
                false
            }
        })
        .count();

    if placed < threshold as usize {
        return Err(SharingError::NotEnoughShares {
            found: placed,
            threshold,
        }
        .into());
    }

    log::debug!("Placed {placed}/{} shares for epoch {epoch}", shares.len());

    Ok(())
}

/// Try the previous, the current and the next epoch in turn and rebuild the key from the first
/// one that yields enough shares.
async fn recover_key(node: &Kademlia, vdo: &VanishingDataObject) -> Result<Vec<u8>, Error> {
    let mut best = 0;

    for epoch in node.epoch_config().search_window(SystemTime::now()) {
        let locations = epoch::derive_locations(vdo.access_key, epoch, vdo.number_keys);

        let results = future::join_all(
            locations
                .iter()
                .map(|location| node.iterative_find_value(*location)),
        )
        .await;

        // Keyed by share index so duplicates collapse.
        let mut shares = BTreeMap::new();
        for result in results {
            match result {
                Ok(FoundValue::Value(bytes)) => match Share::from_bytes(&bytes) {
                    Some(share) => {
                        shares.insert(share.index, share);
                    }
                    None => log::debug!("Ignoring malformed share"),
                },
                Ok(FoundValue::Nodes(_)) => (),
                Err(error) => log::debug!("Share lookup failed: {error}"),
            }
        }

        best = best.max(shares.len());

        if shares.len() >= vdo.threshold as usize {
            let shares: Vec<_> = shares.into_values().collect();
            return Ok(sss::combine(&shares, vdo.threshold)?);
        }
    }

    Err(SharingError::NotEnoughShares {
        found: best,
        threshold: vdo.threshold,
    }
    .into())
}

/// Keep the shares alive for `timeout` by re-splitting the key into the next epoch's locations
/// shortly after every epoch boundary.
async fn monitor(node: Kademlia, vdo: VanishingDataObject, timeout: Duration) {
    let mut remaining = timeout;

    loop {
        let wait = node.epoch_config().until_next_rotation(SystemTime::now());
        time::sleep(wait).await;

        remaining = remaining.saturating_sub(wait);
        if remaining.is_zero() {
            break;
        }

        if let Err(error) = republish(&node, &vdo).await {
            log::debug!("Giving up on VDO {}: {error}", vdo.access_key);
            return;
        }
    }

    log::debug!("Stopped refreshing VDO {}", vdo.access_key);
}

async fn republish(node: &Kademlia, vdo: &VanishingDataObject) -> Result<(), Error> {
    let key = unvanish_data(node, vdo, false).await?.key;
    let shares = sss::split(&key, vdo.number_keys, vdo.threshold)?;
    let epoch = node.epoch_config().current_epoch();

    push_shares(node, vdo.access_key, epoch, &shares, vdo.threshold).await
}
