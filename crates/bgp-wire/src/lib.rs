//! Bit-exact serialization and deserialization for the subset of BGP-4 (RFC 4271) this
//! speaker implements: the message header, OPEN, KEEPALIVE, and UPDATE (withdrawn
//! routes, path attributes, NLRI). NOTIFICATION is intentionally not modeled; this
//! speaker neither sends nor parses it.
//!
//! Mirrors the `octavius-bgp` crate's `no_std` + `nom` approach, narrowed to the
//! fields this core cares about: 2-octet AS numbers, IPv4-only prefixes, and exactly
//! three message types.

#![no_std]
extern crate alloc;

pub mod message;
pub mod path_attribute;
pub mod prefix;

use alloc::vec::Vec;
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum WireError {
    #[error("buffer too short: need at least {need} bytes, have {have}")]
    TooShort { need: usize, have: usize },
    #[error("invalid BGP marker (expected sixteen 0xFF bytes)")]
    InvalidMarker,
    #[error("unknown BGP message type {0}")]
    UnknownMessageType(u8),
    #[error("declared header length {0} is below the minimum of 19")]
    HeaderLengthTooSmall(u16),
    #[error("KEEPALIVE message carried {0} bytes of unexpected payload")]
    UnexpectedKeepAlivePayload(usize),
    #[error("invalid IPv4 prefix length {0} (must be 0..=32)")]
    InvalidPrefixLength(u8),
    #[error("truncated prefix: expected {need} address bytes, {have} remained")]
    TruncatedPrefix { need: usize, have: usize },
    #[error("truncated path attribute")]
    TruncatedAttribute,
    #[error("malformed AS_PATH segment")]
    MalformedAsPath,
    #[error("unparseable trailing data ({0} bytes left over)")]
    TrailingData(usize),
}

/// Implemented by every wire-level element: a message, a path attribute, a prefix.
/// Mirrors `octavius-bgp`'s `BGPElement` trait.
pub trait WireElement: Sized {
    fn unpack(input: &[u8]) -> Result<(&[u8], Self), WireError>;
    fn pack(&self) -> Vec<u8>;
}

pub(crate) fn require(input: &[u8], need: usize) -> Result<(), WireError> {
    if input.len() < need {
        Err(WireError::TooShort { need, have: input.len() })
    } else {
        Ok(())
    }
}

/// Thin wrappers around `nom`'s byte-level combinators that convert its generic parse
/// errors into [`WireError::TooShort`]. Every higher-level parser in this crate is
/// built out of these instead of hand-rolled slicing, matching `octavius-bgp`'s use of
/// `nom` for the same primitives.
pub(crate) mod primitives {
    use super::WireError;
    use nom::Parser;

    pub(crate) fn be_u8(input: &[u8]) -> Result<(&[u8], u8), WireError> {
        nom::number::complete::be_u8::<_, nom::error::Error<&[u8]>>(input).map_err(|_| WireError::TooShort { need: 1, have: input.len() })
    }

    pub(crate) fn be_u16(input: &[u8]) -> Result<(&[u8], u16), WireError> {
        nom::number::complete::be_u16::<_, nom::error::Error<&[u8]>>(input).map_err(|_| WireError::TooShort { need: 2, have: input.len() })
    }

    pub(crate) fn be_u32(input: &[u8]) -> Result<(&[u8], u32), WireError> {
        nom::number::complete::be_u32::<_, nom::error::Error<&[u8]>>(input).map_err(|_| WireError::TooShort { need: 4, have: input.len() })
    }

    pub(crate) fn take(input: &[u8], count: usize) -> Result<(&[u8], &[u8]), WireError> {
        nom::bytes::complete::take::<_, _, nom::error::Error<&[u8]>>(count)
            .parse(input)
            .map_err(|_| WireError::TooShort { need: count, have: input.len() })
    }
}
