//! Shared data model used by every crate in the bgp-speaker workspace: the 2-octet
//! [`AsNumber`], the [`Ipv4Prefix`] (length-prefixed IPv4 destination), and the error
//! type their textual parsers produce.

#![no_std]
extern crate alloc;

use alloc::string::{
    String,
    ToString,
};
use core::{
    fmt::{
        Debug,
        Display,
        Formatter,
    },
    net::{
        AddrParseError,
        Ipv4Addr,
    },
    num::ParseIntError,
    str::FromStr,
};
use thiserror::Error;

/// A 2-octet Autonomous System number. This implementation does not speak RFC 6793
/// (4-octet AS numbers); that is out of scope for the core speaker.
#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Copy)]
pub struct AsNumber(pub u16);

impl AsNumber {
    pub const fn new(value: u16) -> Self {
        Self(value)
    }
}

impl From<u16> for AsNumber {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl From<AsNumber> for u16 {
    fn from(value: AsNumber) -> Self {
        value.0
    }
}

impl Display for AsNumber {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> core::fmt::Result {
        write!(formatter, "AS{}", self.0)
    }
}

impl FromStr for AsNumber {
    type Err = CommonError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        Ok(Self(string.parse()?))
    }
}

#[derive(Debug, Error)]
pub enum CommonError {
    #[error("expected format <address>/<prefix-length> (e.g. 192.168.2.0/24), got '{0}'")]
    InvalidPrefixFormat(String),
    #[error("invalid prefix length {0} (must be 0..=32)")]
    InvalidPrefixLength(u8),
    #[error("unable to parse IPv4 address: {0}")]
    IpAddrParse(#[from] AddrParseError),
    #[error("unable to parse integer: {0}")]
    IntParse(#[from] ParseIntError),
}

/// An IPv4 network prefix: an address paired with a prefix length in `0..=32`. The
/// invariant upheld by every constructor in this crate is that host bits beyond
/// `prefix_len` are zeroed (`address & !mask(prefix_len) == 0`).
#[derive(Ord, PartialOrd, Eq, PartialEq, Hash, Clone, Copy)]
pub struct Ipv4Prefix {
    pub address: Ipv4Addr,
    pub prefix_len: u8,
}

impl Ipv4Prefix {
    /// Builds a prefix, masking off any host bits beyond `prefix_len`.
    pub fn new(address: Ipv4Addr, prefix_len: u8) -> Result<Self, CommonError> {
        if prefix_len > 32 {
            return Err(CommonError::InvalidPrefixLength(prefix_len));
        }
        let mask = if prefix_len == 0 { 0 } else { u32::MAX << (32 - prefix_len) };
        let masked = u32::from(address) & mask;
        Ok(Self {
            address: Ipv4Addr::from(masked),
            prefix_len,
        })
    }

    /// Number of bytes the address portion consumes on the wire: `ceil(prefix_len / 8)`.
    pub fn address_octets(&self) -> usize {
        ((self.prefix_len as usize) + 7) / 8
    }
}

impl Debug for Ipv4Prefix {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> core::fmt::Result {
        write!(formatter, "{}/{}", self.address, self.prefix_len)
    }
}

impl Display for Ipv4Prefix {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> core::fmt::Result {
        write!(formatter, "{}/{}", self.address, self.prefix_len)
    }
}

impl FromStr for Ipv4Prefix {
    type Err = CommonError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let (addr, len) = string.split_once('/').ok_or_else(|| CommonError::InvalidPrefixFormat(string.to_string()))?;
        Self::new(addr.parse()?, len.parse()?)
    }
}
