//! C1: the IPv4-prefix codec (§4.1). A prefix is length-prefixed on the wire: one byte
//! for the prefix length followed by `ceil(prefix_len / 8)` bytes of address, so a /0
//! consumes one byte total and a /25..32 consumes five.

use crate::{
    primitives,
    WireError,
};
use alloc::vec::Vec;
use bgp_common::Ipv4Prefix;
use core::net::Ipv4Addr;

/// Encodes a single prefix. The output is always minimal: no trailing zero address
/// bytes beyond `ceil(prefix_len / 8)`.
pub fn marshal(prefix: &Ipv4Prefix) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(1 + prefix.address_octets());
    buffer.push(prefix.prefix_len);
    buffer.extend_from_slice(&prefix.address.octets()[..prefix.address_octets()]);
    buffer
}

fn unmarshal_one(input: &[u8]) -> Result<(&[u8], Ipv4Prefix), WireError> {
    let (input, prefix_len) = primitives::be_u8(input)?;
    if prefix_len > 32 {
        return Err(WireError::InvalidPrefixLength(prefix_len));
    }
    let need = ((prefix_len as usize) + 7) / 8;
    if input.len() < need {
        return Err(WireError::TruncatedPrefix { need, have: input.len() });
    }
    let (input, address_bytes) = primitives::take(input, need)?;
    let mut octets = [0u8; 4];
    octets[..need].copy_from_slice(address_bytes);
    Ok((
        input,
        Ipv4Prefix {
            address: Ipv4Addr::from(octets),
            prefix_len,
        },
    ))
}

/// Decodes a sequence of length-prefixed prefixes, consuming `input` until it is
/// empty. Fails if a prefix length exceeds 32 or the buffer is shorter than the
/// implied consumption.
pub fn unmarshal_list(mut input: &[u8]) -> Result<Vec<Ipv4Prefix>, WireError> {
    let mut prefixes = Vec::new();
    while !input.is_empty() {
        let (rest, prefix) = unmarshal_one(input)?;
        prefixes.push(prefix);
        input = rest;
    }
    Ok(prefixes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_prefix_length() {
        for len in 0..=32u8 {
            let prefix = Ipv4Prefix::new(Ipv4Addr::new(10, 100, 220, 7), len).unwrap();
            let bytes = marshal(&prefix);
            assert_eq!(bytes.len(), 1 + prefix.address_octets());
            let decoded = unmarshal_list(&bytes).unwrap();
            assert_eq!(decoded, alloc::vec![prefix]);
        }
    }

    #[test]
    fn decodes_a_concatenated_list() {
        let a = Ipv4Prefix::new(Ipv4Addr::new(10, 100, 220, 0), 24).unwrap();
        let b = Ipv4Prefix::new(Ipv4Addr::new(192, 168, 0, 0), 16).unwrap();
        let mut bytes = marshal(&a);
        bytes.extend(marshal(&b));
        assert_eq!(unmarshal_list(&bytes).unwrap(), alloc::vec![a, b]);
    }

    #[test]
    fn rejects_prefix_length_above_32() {
        assert_eq!(unmarshal_list(&[33]), Err(WireError::InvalidPrefixLength(33)));
    }

    #[test]
    fn rejects_truncated_buffer() {
        // /24 needs 3 address octets, only 1 is present.
        assert!(matches!(unmarshal_list(&[24, 10]), Err(WireError::TruncatedPrefix { .. })));
    }
}
