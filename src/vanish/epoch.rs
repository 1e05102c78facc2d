use crate::id::{NodeId, ID_LEN};
use rand::{rngs::StdRng, RngCore, SeedableRng};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Timing of the share rotation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EpochConfig {
    /// Length of one epoch. Share locations change every epoch.
    pub period: Duration,
    /// How long after an epoch boundary the monitor waits before re-pushing the shares.
    pub margin: Duration,
}

impl Default for EpochConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(8),
            margin: Duration::from_secs(1),
        }
    }
}

impl EpochConfig {
    /// Index of the epoch `now` falls into.
    pub fn epoch_at(&self, now: SystemTime) -> u64 {
        (since_unix_epoch(now).as_millis() / self.period_millis()) as u64
    }

    pub fn current_epoch(&self) -> u64 {
        self.epoch_at(SystemTime::now())
    }

    /// Time from `now` until `margin` past the start of the next epoch.
    pub fn until_next_rotation(&self, now: SystemTime) -> Duration {
        let elapsed = since_unix_epoch(now).as_millis() % self.period_millis();
        let remaining = self.period_millis() - elapsed;

        Duration::from_millis(remaining as u64) + self.margin
    }

    /// Epochs searched when retrieving shares, tolerating a clock skew of one epoch either way.
    pub fn search_window(&self, now: SystemTime) -> [u64; 3] {
        let epoch = self.epoch_at(now);
        [epoch.saturating_sub(1), epoch, epoch + 1]
    }

    fn period_millis(&self) -> u128 {
        self.period.as_millis().max(1)
    }
}

/// The `count` pseudo-random share locations for the given access key and epoch.
///
/// Deterministic: the generator is seeded by `access_key + epoch`.
pub fn derive_locations(access_key: i64, epoch: u64, count: u8) -> Vec<NodeId> {
    let seed = access_key.wrapping_add(epoch as i64) as u64;
    let mut rng = StdRng::seed_from_u64(seed);

    (0..count)
        .map(|_| {
            let mut bytes = [0u8; ID_LEN];
            rng.fill_bytes(&mut bytes);
            NodeId::from(bytes)
        })
        .collect()
}

fn since_unix_epoch(now: SystemTime) -> Duration {
    now.duration_since(UNIX_EPOCH).unwrap_or_default()
}
