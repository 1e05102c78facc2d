use rand::{
    distributions::{Distribution, Standard},
    Rng,
};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::{
    convert::{TryFrom, TryInto},
    fmt,
    ops::BitXor,
    str::FromStr,
};
use thiserror::Error;

/// Length of a `NodeId` in bytes.
pub const ID_LEN: usize = 20;

/// Number of bits in a `NodeId`.
pub const ID_BITS: usize = ID_LEN * 8;

/// 160-bit identifier shared by nodes and content keys.
///
/// The derived `Ord` compares bytes most-significant first, which for XOR distances is exactly
/// the "closer to the target" ordering used by the routing table and the lookups.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct NodeId(#[serde(with = "byte_array")] [u8; ID_LEN]);

impl NodeId {
    /// Generate a random id.
    pub fn random() -> Self {
        rand::random()
    }

    /// Create a NodeId by hashing the given bytes using SHA-1.
    pub fn sha1(bytes: &[u8]) -> Self {
        let hash = Sha1::digest(bytes);
        Self(hash.into())
    }

    /// XOR distance to `other`.
    pub fn distance(&self, other: &NodeId) -> NodeId {
        *self ^ *other
    }

    /// Number of leading zero bits, in `0..=160`.
    pub fn leading_zeros(&self) -> usize {
        let mut bits = 0;

        for byte in self.0 {
            bits += byte.leading_zeros() as usize;

            if byte != 0 {
                break;
            }
        }

        bits
    }

    /// Length of the common prefix of `self` and `other`, i.e. the leading zeros of their
    /// distance. Equals `ID_BITS` only when both ids are the same.
    pub fn prefix_len(&self, other: &NodeId) -> usize {
        self.distance(other).leading_zeros()
    }

    /// Panics if index is out of bounds.
    pub fn flip_bit(self, index: usize) -> Self {
        let mut bytes = self.0;
        let (byte_index, bit_index) = (index / 8, index % 8);

        let actual_bit_index = 7 - bit_index;
        bytes[byte_index] ^= 1 << actual_bit_index;

        bytes.into()
    }
}

impl AsRef<[u8]> for NodeId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<NodeId> for [u8; ID_LEN] {
    fn from(id: NodeId) -> [u8; ID_LEN] {
        id.0
    }
}

impl From<[u8; ID_LEN]> for NodeId {
    fn from(id: [u8; ID_LEN]) -> NodeId {
        Self(id)
    }
}

#[derive(Debug, Error)]
#[error("invalid node id length")]
pub struct LengthError;

impl<'a> TryFrom<&'a [u8]> for NodeId {
    type Error = LengthError;

    fn try_from(slice: &'a [u8]) -> Result<Self, Self::Error> {
        Ok(Self(slice.try_into().map_err(|_| LengthError)?))
    }
}

/// Parses the 40 character hex form produced by `{:x}`.
impl FromStr for NodeId {
    type Err = LengthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != ID_LEN * 2 || !s.is_ascii() {
            return Err(LengthError);
        }

        let mut bytes = [0u8; ID_LEN];
        for (index, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[index * 2..index * 2 + 2], 16).map_err(|_| LengthError)?;
        }

        Ok(Self(bytes))
    }
}

impl BitXor for NodeId {
    type Output = Self;

    fn bitxor(mut self, rhs: Self) -> Self {
        for (src, dst) in rhs.0.iter().zip(self.0.iter_mut()) {
            *dst ^= *src;
        }

        self
    }
}

impl Distribution<NodeId> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> NodeId {
        NodeId(rng.gen())
    }
}

impl fmt::LowerHex for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }

        Ok(())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:x}", self)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:x}", self)
    }
}

mod byte_array {
    use super::ID_LEN;
    use serde::{
        de::{Deserialize, Deserializer, Error},
        ser::{Serialize, Serializer},
    };
    use serde_bytes::{ByteBuf, Bytes};
    use std::convert::TryInto;

    pub(super) fn serialize<S: Serializer>(bytes: &[u8; ID_LEN], s: S) -> Result<S::Ok, S::Error> {
        Bytes::new(bytes.as_ref()).serialize(s)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; ID_LEN], D::Error> {
        let buf = ByteBuf::deserialize(d)?;
        let buf = buf.into_vec();
        let len = buf.len();

        buf.try_into().map_err(|_| {
            let expected = format!("{}", ID_LEN);
            D::Error::invalid_length(len, &expected.as_ref())
        })
    }
}

// ----------------------------------------------------------------------------//
