//! Shamir threshold secret sharing over GF(2^8).
//!
//! Every byte of the secret is the constant term of its own random polynomial of degree
//! `threshold - 1`. Share `x` holds the evaluations of all those polynomials at `x`, for
//! `x` in `1..=shares`.

use crate::error::SharingError;
use rand::Rng;
use std::collections::HashSet;

/// One point of the sharing polynomials.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Share {
    pub index: u8,
    pub bytes: Vec<u8>,
}

impl Share {
    /// Stored form: the index byte followed by the share bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(1 + self.bytes.len());
        buffer.push(self.index);
        buffer.extend_from_slice(&self.bytes);
        buffer
    }

    pub fn from_bytes(src: &[u8]) -> Option<Self> {
        let (index, bytes) = src.split_first()?;

        if *index == 0 {
            return None;
        }

        Some(Self {
            index: *index,
            bytes: bytes.to_vec(),
        })
    }
}

pub fn split(secret: &[u8], shares: u8, threshold: u8) -> Result<Vec<Share>, SharingError> {
    if threshold == 0 || shares < threshold {
        return Err(SharingError::InvalidParameters { shares, threshold });
    }

    let mut rng = rand::thread_rng();
    let mut output: Vec<_> = (1..=shares)
        .map(|index| Share {
            index,
            bytes: Vec::with_capacity(secret.len()),
        })
        .collect();

    let mut coefficients = vec![0u8; threshold as usize];

    for byte in secret {
        coefficients[0] = *byte;
        rng.fill(&mut coefficients[1..]);

        for share in &mut output {
            share.bytes.push(evaluate(&coefficients, share.index));
        }
    }

    Ok(output)
}

/// Rebuild the secret from at least `threshold` shares with distinct indices.
pub fn combine(shares: &[Share], threshold: u8) -> Result<Vec<u8>, SharingError> {
    if threshold == 0 {
        return Err(SharingError::InvalidParameters {
            shares: 0,
            threshold,
        });
    }

    if shares.len() < threshold as usize {
        return Err(SharingError::NotEnoughShares {
            found: shares.len(),
            threshold,
        });
    }

    let points = &shares[..threshold as usize];
    let len = points[0].bytes.len();

    let mut indices = HashSet::new();
    for share in points {
        if share.index == 0 || share.bytes.len() != len || !indices.insert(share.index) {
            return Err(SharingError::InconsistentShares);
        }
    }

    // Lagrange basis polynomials evaluated at zero.
    let basis: Vec<u8> = points
        .iter()
        .map(|share| {
            points
                .iter()
                .filter(|other| other.index != share.index)
                .fold(1, |acc, other| {
                    mul(acc, div(other.index, other.index ^ share.index))
                })
        })
        .collect();

    let secret = (0..len)
        .map(|position| {
            points
                .iter()
                .zip(&basis)
                .fold(0, |acc, (share, weight)| {
                    acc ^ mul(share.bytes[position], *weight)
                })
        })
        .collect();

    Ok(secret)
}

fn evaluate(coefficients: &[u8], x: u8) -> u8 {
    coefficients
        .iter()
        .rev()
        .fold(0, |acc, coefficient| mul(acc, x) ^ coefficient)
}

fn mul(mut a: u8, mut b: u8) -> u8 {
    let mut product = 0;

    while b != 0 {
        if b & 1 != 0 {
            product ^= a;
        }

        let carry = a & 0x80 != 0;
        a <<= 1;
        if carry {
            a ^= 0x1b;
        }

        b >>= 1;
    }

    product
}

// a^254 is the inverse of a in GF(2^8). Callers never pass zero.
fn inverse(a: u8) -> u8 {
    let mut result = 1;
    let mut base = a;
    let mut exponent = 254u8;

    while exponent != 0 {
        if exponent & 1 != 0 {
            result = mul(result, base);
        }
        base = mul(base, base);
        exponent >>= 1;
    }

    result
}

fn div(a: u8, b: u8) -> u8 {
    mul(a, inverse(b))
}
