//! C2: the path-attribute codec (§4.2). Wire layout per attribute:
//! `flags(1B) | type-code(1B) | length(1B or 2B) | value(length bytes)`.
//!
//! This core only originates three well-known attributes (ORIGIN, AS_PATH, NEXT_HOP);
//! anything else is preserved verbatim as [`PathAttribute::Unknown`] so re-encoding is
//! byte-identical, mirroring the `Unknown { kind, data }` pattern `octavius-bgp` uses
//! for attributes and messages it does not model.

use crate::{
    primitives,
    WireError,
};
use alloc::vec::Vec;
use bgp_common::AsNumber;
use bitflags::bitflags;
use core::net::Ipv4Addr;

bitflags! {
    /// The four encoding-flag bits defined by RFC 4271 §4.3. This core only ever
    /// *emits* TRANSITIVE (well-known mandatory) and, when needed, EXTENDED_LENGTH,
    /// OPTIONAL/PARTIAL are kept here only so [`PathAttribute::Unknown`] can preserve
    /// whatever flags an unrecognized attribute arrived with.
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
    pub struct AttributeFlags: u8 {
        const OPTIONAL        = 0b1000_0000;
        const TRANSITIVE      = 0b0100_0000;
        const PARTIAL         = 0b0010_0000;
        const EXTENDED_LENGTH = 0b0001_0000;
    }
}

const TYPE_ORIGIN: u8 = 1;
const TYPE_AS_PATH: u8 = 2;
const TYPE_NEXT_HOP: u8 = 3;

const AS_PATH_SEQUENCE: u8 = 2;
const AS_PATH_SET: u8 = 1;

#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Copy)]
#[repr(u8)]
pub enum Origin {
    Igp = 0,
    Egp = 1,
    Incomplete = 2,
}

impl From<u8> for Origin {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Igp,
            1 => Self::Egp,
            _ => Self::Incomplete,
        }
    }
}

/// A single AS_PATH segment. This implementation only ever emits one segment per
/// AS_PATH attribute (§4.2).
#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone)]
pub enum AsPathSegment {
    Sequence(Vec<AsNumber>),
    Set(Vec<AsNumber>),
}

impl AsPathSegment {
    pub fn len(&self) -> usize {
        match self {
            Self::Sequence(v) | Self::Set(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, target: AsNumber) -> bool {
        match self {
            Self::Sequence(v) | Self::Set(v) => v.contains(&target),
        }
    }

    fn segment_type(&self) -> u8 {
        match self {
            Self::Sequence(_) => AS_PATH_SEQUENCE,
            Self::Set(_) => AS_PATH_SET,
        }
    }

    fn values(&self) -> &[AsNumber] {
        match self {
            Self::Sequence(v) | Self::Set(v) => v,
        }
    }
}

#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone)]
pub enum PathAttribute {
    Origin(Origin),
    AsPath(AsPathSegment),
    NextHop(Ipv4Addr),
    /// An attribute type code this core does not originate. Holds the full raw
    /// attribute bytes (flags, type, length, and value) so re-encoding is
    /// byte-identical.
    Unknown { flags: AttributeFlags, type_code: u8, raw: Vec<u8> },
}

fn value_bytes(attr: &PathAttribute) -> Vec<u8> {
    match attr {
        PathAttribute::Origin(origin) => alloc::vec![*origin as u8],
        PathAttribute::AsPath(segment) => {
            let mut buffer = Vec::with_capacity(2 + segment.len() * 2);
            buffer.push(segment.segment_type());
            buffer.push(segment.len() as u8);
            for asn in segment.values() {
                buffer.extend_from_slice(&asn.0.to_be_bytes());
            }
            buffer
        }
        PathAttribute::NextHop(addr) => addr.octets().to_vec(),
        PathAttribute::Unknown { .. } => unreachable!("Unknown attributes are marshalled verbatim"),
    }
}

fn type_code(attr: &PathAttribute) -> u8 {
    match attr {
        PathAttribute::Origin(_) => TYPE_ORIGIN,
        PathAttribute::AsPath(_) => TYPE_AS_PATH,
        PathAttribute::NextHop(_) => TYPE_NEXT_HOP,
        PathAttribute::Unknown { type_code, .. } => *type_code,
    }
}

/// Encodes a single attribute. Every well-known attribute this core emits carries
/// `flags = TRANSITIVE`, widened with `EXTENDED_LENGTH` (and a 2-byte length field)
/// when the value exceeds 255 bytes.
pub fn marshal(attr: &PathAttribute) -> Vec<u8> {
    if let PathAttribute::Unknown { raw, .. } = attr {
        return raw.clone();
    }

    let value = value_bytes(attr);
    let mut flags = AttributeFlags::TRANSITIVE;
    let mut buffer = Vec::with_capacity(3 + value.len());
    if value.len() > 255 {
        flags |= AttributeFlags::EXTENDED_LENGTH;
        buffer.push(flags.bits());
        buffer.push(type_code(attr));
        buffer.extend_from_slice(&(value.len() as u16).to_be_bytes());
    } else {
        buffer.push(flags.bits());
        buffer.push(type_code(attr));
        buffer.push(value.len() as u8);
    }
    buffer.extend_from_slice(&value);
    buffer
}

/// `len(marshal(attr))`, without requiring callers to throw away the buffer.
pub fn byte_len(attr: &PathAttribute) -> usize {
    marshal(attr).len()
}

pub fn marshal_all(attrs: &[PathAttribute]) -> Vec<u8> {
    let mut buffer = Vec::new();
    for attr in attrs {
        buffer.extend(marshal(attr));
    }
    buffer
}

fn unmarshal_one(input: &[u8]) -> Result<(&[u8], PathAttribute), WireError> {
    let start = input;
    let (input, raw_flags) = primitives::be_u8(input)?;
    let flags = AttributeFlags::from_bits_truncate(raw_flags);
    let (input, code) = primitives::be_u8(input)?;
    let (input, length) = if flags.contains(AttributeFlags::EXTENDED_LENGTH) {
        let (input, length) = primitives::be_u16(input)?;
        (input, length)
    } else {
        let (input, length) = primitives::be_u8(input)?;
        (input, length as u16)
    };
    let (input, value) = primitives::take(input, length as usize).map_err(|_| WireError::TruncatedAttribute)?;

    let header_len = start.len() - input.len() - value.len();
    let attr = match code {
        TYPE_ORIGIN => {
            if value.len() != 1 {
                return Err(WireError::TruncatedAttribute);
            }
            PathAttribute::Origin(Origin::from(value[0]))
        }
        TYPE_AS_PATH => {
            if value.len() < 2 {
                return Err(WireError::MalformedAsPath);
            }
            let segment_type = value[0];
            let count = value[1] as usize;
            let mut numbers = Vec::with_capacity(count);
            let mut rest = &value[2..];
            for _ in 0..count {
                let (next, high) = primitives::be_u8(rest).map_err(|_| WireError::MalformedAsPath)?;
                let (next, low) = primitives::be_u8(next).map_err(|_| WireError::MalformedAsPath)?;
                numbers.push(AsNumber((high as u16) << 8 | low as u16));
                rest = next;
            }
            PathAttribute::AsPath(match segment_type {
                AS_PATH_SEQUENCE => AsPathSegment::Sequence(numbers),
                AS_PATH_SET => AsPathSegment::Set(numbers),
                _ => return Err(WireError::MalformedAsPath),
            })
        }
        TYPE_NEXT_HOP => {
            if value.len() != 4 {
                return Err(WireError::TruncatedAttribute);
            }
            PathAttribute::NextHop(Ipv4Addr::new(value[0], value[1], value[2], value[3]))
        }
        _ => {
            PathAttribute::Unknown {
                flags,
                type_code: code,
                raw: start[..header_len + value.len()].to_vec(),
            }
        }
    };
    Ok((input, attr))
}

pub fn unmarshal_all(mut input: &[u8]) -> Result<Vec<PathAttribute>, WireError> {
    let mut attrs = Vec::new();
    while !input.is_empty() {
        let (rest, attr) = unmarshal_one(input)?;
        attrs.push(attr);
        input = rest;
    }
    Ok(attrs)
}

/// Prepends `new_as` to an AS_SEQUENCE, or inserts it into an AS_SET (a no-op if
/// already present). Used when forwarding a learned route to the peer (§4.2).
pub fn append_to_as_path(existing: &PathAttribute, new_as: AsNumber) -> PathAttribute {
    match existing {
        PathAttribute::AsPath(AsPathSegment::Sequence(seq)) => {
            let mut updated = Vec::with_capacity(seq.len() + 1);
            updated.push(new_as);
            updated.extend_from_slice(seq);
            PathAttribute::AsPath(AsPathSegment::Sequence(updated))
        }
        PathAttribute::AsPath(AsPathSegment::Set(set)) => {
            let mut updated = set.clone();
            if !updated.contains(&new_as) {
                updated.push(new_as);
            }
            PathAttribute::AsPath(AsPathSegment::Set(updated))
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn byte_len_matches_marshal_len() {
        let attrs = vec![
            PathAttribute::Origin(Origin::Igp),
            PathAttribute::AsPath(AsPathSegment::Sequence(vec![AsNumber(64513), AsNumber(64514)])),
            PathAttribute::NextHop(Ipv4Addr::new(10, 200, 100, 3)),
        ];
        for attr in &attrs {
            assert_eq!(byte_len(attr), marshal(attr).len());
        }
    }

    #[test]
    fn round_trips_all_well_known_attributes() {
        let attrs = vec![
            PathAttribute::Origin(Origin::Incomplete),
            PathAttribute::AsPath(AsPathSegment::Sequence(vec![AsNumber(64513), AsNumber(64514)])),
            PathAttribute::NextHop(Ipv4Addr::new(10, 200, 100, 3)),
        ];
        let bytes = marshal_all(&attrs);
        let decoded = unmarshal_all(&bytes).unwrap();
        assert_eq!(decoded, attrs);
        let total: usize = decoded.iter().map(byte_len).sum();
        assert_eq!(total, bytes.len());
    }

    #[test]
    fn unknown_attribute_round_trips_byte_identical() {
        // flags=0xC0 (optional+transitive), type=99, length=2, value=[0xAB, 0xCD]
        let raw = [0xC0, 99, 2, 0xAB, 0xCD];
        let decoded = unmarshal_all(&raw).unwrap();
        assert_eq!(marshal_all(&decoded), raw);
    }

    #[test]
    fn extended_length_round_trips() {
        let long_set: Vec<AsNumber> = (0..200).map(AsNumber).collect();
        let attr = PathAttribute::AsPath(AsPathSegment::Sequence(long_set));
        let bytes = marshal(&attr);
        assert!(bytes[0] & 0b0001_0000 != 0, "expected EXTENDED_LENGTH flag for a >255 byte value");
        let (rest, decoded) = unmarshal_one(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded, attr);
    }

    #[test]
    fn append_to_as_path_prepends_sequence() {
        let existing = PathAttribute::AsPath(AsPathSegment::Sequence(vec![AsNumber(64513)]));
        let updated = append_to_as_path(&existing, AsNumber(64512));
        assert_eq!(updated, PathAttribute::AsPath(AsPathSegment::Sequence(vec![AsNumber(64512), AsNumber(64513)])));
    }

    #[test]
    fn append_to_as_path_set_is_idempotent() {
        let existing = PathAttribute::AsPath(AsPathSegment::Set(vec![AsNumber(64512)]));
        let updated = append_to_as_path(&existing, AsNumber(64512));
        assert_eq!(updated, existing);
    }
}
