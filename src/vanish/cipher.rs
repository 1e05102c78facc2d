//! Authenticated symmetric encryption of the payload. The random nonce travels in front of the
//! ciphertext.

use crate::error::Error;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};

pub const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

pub fn random_key() -> [u8; KEY_LEN] {
    rand::random()
}

pub fn encrypt(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| Error::Cipher)?;

    let nonce: [u8; NONCE_LEN] = rand::random();
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| Error::Cipher)?;

    let mut output = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    output.extend_from_slice(&nonce);
    output.extend_from_slice(&ciphertext);

    Ok(output)
}

pub fn decrypt(key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
    if data.len() < NONCE_LEN {
        return Err(Error::Cipher);
    }

    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| Error::Cipher)?;
    let (nonce, ciphertext) = data.split_at(NONCE_LEN);

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| Error::Cipher)
}
