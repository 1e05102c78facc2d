//! Compact representation of contacts.
//!
//! A contact is a single byte string: the 20 byte node id, followed by the 4 (IPv4) or 16
//! (IPv6) address octets, followed by the big-endian port.

use crate::{id::ID_LEN, routing::contact::Contact};
use serde::{
    de::{Deserialize, Deserializer, Error as _},
    ser::{Serialize, Serializer},
};
use serde_bytes::{ByteBuf, Bytes};
use std::{
    convert::{TryFrom, TryInto},
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
};

const SOCKET_ADDR_V4_LEN: usize = 6;
const SOCKET_ADDR_V6_LEN: usize = 18;
const CONTACT_V4_LEN: usize = ID_LEN + SOCKET_ADDR_V4_LEN;
const CONTACT_V6_LEN: usize = ID_LEN + SOCKET_ADDR_V6_LEN;

impl Serialize for Contact {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        Bytes::new(&encode_contact(self)).serialize(s)
    }
}

impl<'de> Deserialize<'de> for Contact {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let buffer = ByteBuf::deserialize(d)?;

        decode_contact(&buffer).ok_or_else(|| {
            let msg = format!("{} or {}", CONTACT_V4_LEN, CONTACT_V6_LEN);
            D::Error::invalid_length(buffer.len(), &msg.as_ref())
        })
    }
}

pub(crate) fn encode_contact(contact: &Contact) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(CONTACT_V6_LEN);
    buffer.extend(contact.id().as_ref());
    buffer.extend(encode_socket_addr(&contact.addr()));
    buffer
}

pub(crate) fn decode_contact(src: &[u8]) -> Option<Contact> {
    if src.len() != CONTACT_V4_LEN && src.len() != CONTACT_V6_LEN {
        return None;
    }

    let id = TryFrom::try_from(&src[..ID_LEN]).ok()?;
    let addr = decode_socket_addr(&src[ID_LEN..])?;

    Some(Contact::new(id, addr))
}

fn decode_socket_addr(src: &[u8]) -> Option<SocketAddr> {
    if src.len() == SOCKET_ADDR_V4_LEN {
        let addr: [u8; 4] = src.get(..4)?.try_into().ok()?;
        let addr = Ipv4Addr::from(addr);
        let port = u16::from_be_bytes(src.get(4..)?.try_into().ok()?);
        Some((addr, port).into())
    } else if src.len() == SOCKET_ADDR_V6_LEN {
        let addr: [u8; 16] = src.get(..16)?.try_into().ok()?;
        let addr = Ipv6Addr::from(addr);
        let port = u16::from_be_bytes(src.get(16..)?.try_into().ok()?);
        Some((addr, port).into())
    } else {
        None
    }
}

fn encode_socket_addr(addr: &SocketAddr) -> Vec<u8> {
    let mut buffer = match addr {
        SocketAddr::V4(addr) => {
            let mut buffer = Vec::with_capacity(SOCKET_ADDR_V4_LEN);
            buffer.extend(addr.ip().octets().as_ref());
            buffer
        }
        SocketAddr::V6(addr) => {
            let mut buffer = Vec::with_capacity(SOCKET_ADDR_V6_LEN);
            buffer.extend(addr.ip().octets().as_ref());
            buffer
        }
    };

    buffer.extend(addr.port().to_be_bytes().as_ref());
    buffer
}
