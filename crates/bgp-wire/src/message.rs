//! C3: the message codec (§4.3): header, OPEN, KEEPALIVE, and UPDATE. NOTIFICATION is
//! out of scope (§1 Non-goals): the decoder treats its type code (3) like any other
//! unknown type and rejects it.

use crate::{
    path_attribute::{
        self,
        PathAttribute,
    },
    prefix,
    primitives,
    WireError,
};
use alloc::vec::Vec;
use bgp_common::{
    AsNumber,
    Ipv4Prefix,
};
use core::net::Ipv4Addr;

const HEADER_LEN: usize = 19;
const MARKER: [u8; 16] = [0xFF; 16];

const TYPE_OPEN: u8 = 1;
const TYPE_UPDATE: u8 = 2;
const TYPE_KEEPALIVE: u8 = 4;

const BGP_VERSION: u8 = 4;

#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone)]
pub struct OpenMessage {
    pub version: u8,
    pub autonomous_system: AsNumber,
    pub hold_time: u16,
    pub bgp_identifier: Ipv4Addr,
    /// Optional parameters, kept verbatim. This implementation always emits an empty
    /// list (§4.3) but accepts and preserves whatever a peer sends.
    pub optional_parameters: Vec<u8>,
}

impl OpenMessage {
    /// Builds the OPEN this speaker sends: version 4, zero hold time, no optional
    /// parameters (§4.3).
    pub fn new(local_as: AsNumber, local_identifier: Ipv4Addr) -> Self {
        Self {
            version: BGP_VERSION,
            autonomous_system: local_as,
            hold_time: 0,
            bgp_identifier: local_identifier,
            optional_parameters: Vec::new(),
        }
    }

    fn pack(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(10 + self.optional_parameters.len());
        buffer.push(self.version);
        buffer.extend_from_slice(&self.autonomous_system.0.to_be_bytes());
        buffer.extend_from_slice(&self.hold_time.to_be_bytes());
        buffer.extend_from_slice(&self.bgp_identifier.octets());
        buffer.push(self.optional_parameters.len() as u8);
        buffer.extend_from_slice(&self.optional_parameters);
        buffer
    }

    fn unpack(body: &[u8]) -> Result<Self, WireError> {
        let (body, version) = primitives::be_u8(body)?;
        let (body, as_raw) = primitives::be_u16(body)?;
        let (body, hold_time) = primitives::be_u16(body)?;
        let (body, id_bytes) = primitives::take(body, 4)?;
        let (body, opt_len) = primitives::be_u8(body)?;
        let (body, opt_params) = primitives::take(body, opt_len as usize)?;
        if !body.is_empty() {
            return Err(WireError::TrailingData(body.len()));
        }
        Ok(Self {
            version,
            autonomous_system: AsNumber(as_raw),
            hold_time,
            bgp_identifier: Ipv4Addr::new(id_bytes[0], id_bytes[1], id_bytes[2], id_bytes[3]),
            optional_parameters: opt_params.to_vec(),
        })
    }
}

#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone)]
pub struct UpdateMessage {
    pub withdrawn_routes: Vec<Ipv4Prefix>,
    pub path_attributes: Vec<PathAttribute>,
    pub nlri: Vec<Ipv4Prefix>,
}

impl UpdateMessage {
    fn pack(&self) -> Vec<u8> {
        let mut buffer = Vec::new();

        let mut withdrawn = Vec::new();
        for prefix in &self.withdrawn_routes {
            withdrawn.extend(prefix::marshal(prefix));
        }
        buffer.extend_from_slice(&(withdrawn.len() as u16).to_be_bytes());
        buffer.extend(withdrawn);

        let attrs = path_attribute::marshal_all(&self.path_attributes);
        buffer.extend_from_slice(&(attrs.len() as u16).to_be_bytes());
        buffer.extend(attrs);

        for prefix in &self.nlri {
            buffer.extend(prefix::marshal(prefix));
        }
        buffer
    }

    fn unpack(body: &[u8]) -> Result<Self, WireError> {
        let (body, withdrawn_len) = primitives::be_u16(body)?;
        let (body, withdrawn_bytes) = primitives::take(body, withdrawn_len as usize)?;
        let (body, attrs_len) = primitives::be_u16(body)?;
        let (nlri_bytes, attrs_bytes) = primitives::take(body, attrs_len as usize)?;

        Ok(Self {
            withdrawn_routes: prefix::unmarshal_list(withdrawn_bytes)?,
            path_attributes: path_attribute::unmarshal_all(attrs_bytes)?,
            nlri: prefix::unmarshal_list(nlri_bytes)?,
        })
    }
}

#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone)]
pub enum BgpMessage {
    Open(OpenMessage),
    Update(UpdateMessage),
    KeepAlive,
}

impl BgpMessage {
    fn kind(&self) -> u8 {
        match self {
            Self::Open(_) => TYPE_OPEN,
            Self::Update(_) => TYPE_UPDATE,
            Self::KeepAlive => TYPE_KEEPALIVE,
        }
    }
}

/// Encodes a message, always producing a well-formed header (16 0xFF marker bytes,
/// declared length equal to the byte length of the result, and a valid type code).
pub fn marshal(message: &BgpMessage) -> Vec<u8> {
    let body = match message {
        BgpMessage::Open(open) => open.pack(),
        BgpMessage::Update(update) => update.pack(),
        BgpMessage::KeepAlive => Vec::new(),
    };

    let mut buffer = Vec::with_capacity(HEADER_LEN + body.len());
    buffer.extend_from_slice(&MARKER);
    buffer.extend_from_slice(&((HEADER_LEN + body.len()) as u16).to_be_bytes());
    buffer.push(message.kind());
    buffer.extend(body);
    buffer
}

/// Decodes one whole message from a slice that is at least as long as the header
/// declares. Rejects a non-0xFF marker, an unknown type code, a declared length below
/// 19, or a declared length longer than `input`.
pub fn unmarshal(input: &[u8]) -> Result<BgpMessage, WireError> {
    if input.len() < HEADER_LEN {
        return Err(WireError::TooShort { need: HEADER_LEN, have: input.len() });
    }
    let (rest, marker) = primitives::take(input, 16)?;
    if marker != MARKER {
        return Err(WireError::InvalidMarker);
    }
    let (rest, length) = primitives::be_u16(rest)?;
    if (length as usize) < HEADER_LEN {
        return Err(WireError::HeaderLengthTooSmall(length));
    }
    if length as usize > input.len() {
        return Err(WireError::TooShort { need: length as usize, have: input.len() });
    }
    let (_, kind) = primitives::be_u8(rest)?;
    let body = &input[HEADER_LEN..length as usize];

    match kind {
        TYPE_OPEN => Ok(BgpMessage::Open(OpenMessage::unpack(body)?)),
        TYPE_UPDATE => Ok(BgpMessage::Update(UpdateMessage::unpack(body)?)),
        TYPE_KEEPALIVE => {
            if !body.is_empty() {
                return Err(WireError::UnexpectedKeepAlivePayload(body.len()));
            }
            Ok(BgpMessage::KeepAlive)
        }
        other => Err(WireError::UnknownMessageType(other)),
    }
}

/// The framing helper used to read BGP messages off a byte stream: returns the length
/// declared in bytes 16-17 of `buffer`, or 0 if fewer than 19 bytes are buffered yet.
pub fn message_length(buffer: &[u8]) -> usize {
    if buffer.len() < HEADER_LEN {
        return 0;
    }
    u16::from_be_bytes([buffer[16], buffer[17]]) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn open_round_trip_matches_spec_example() {
        let open = OpenMessage::new(AsNumber(64512), Ipv4Addr::new(127, 0, 0, 1));
        let bytes = marshal(&BgpMessage::Open(open.clone()));
        assert_eq!(bytes.len(), 29);
        assert_eq!(&bytes[0..16], &[0xFFu8; 16]);
        assert_eq!(
            &bytes[16..29],
            &[0x00, 0x1D, 0x01, 0x04, 0xFC, 0x00, 0x00, 0x00, 0x7F, 0x00, 0x00, 0x01, 0x00]
        );
        assert_eq!(unmarshal(&bytes).unwrap(), BgpMessage::Open(open));
    }

    #[test]
    fn keepalive_round_trip_is_exactly_the_header() {
        let bytes = marshal(&BgpMessage::KeepAlive);
        assert_eq!(bytes.len(), 19);
        assert_eq!(bytes[18], TYPE_KEEPALIVE);
        assert_eq!(message_length(&bytes), 19);
        assert_eq!(unmarshal(&bytes).unwrap(), BgpMessage::KeepAlive);
    }

    #[test]
    fn update_round_trip() {
        use crate::path_attribute::{
            AsPathSegment,
            Origin,
        };
        let update = UpdateMessage {
            withdrawn_routes: Vec::new(),
            path_attributes: vec![
                PathAttribute::Origin(Origin::Igp),
                PathAttribute::AsPath(AsPathSegment::Sequence(vec![AsNumber(64513), AsNumber(64514)])),
                PathAttribute::NextHop(Ipv4Addr::new(10, 200, 100, 3)),
            ],
            nlri: vec![Ipv4Prefix::new(Ipv4Addr::new(10, 100, 220, 0), 24).unwrap()],
        };
        let bytes = marshal(&BgpMessage::Update(update.clone()));
        assert_eq!(message_length(&bytes), bytes.len());
        assert_eq!(unmarshal(&bytes).unwrap(), BgpMessage::Update(update));
    }

    #[test]
    fn rejects_bad_marker() {
        let mut bytes = marshal(&BgpMessage::KeepAlive);
        bytes[0] = 0x00;
        assert_eq!(unmarshal(&bytes), Err(WireError::InvalidMarker));
    }

    #[test]
    fn rejects_unknown_type() {
        let mut bytes = marshal(&BgpMessage::KeepAlive);
        bytes[18] = 3; // NOTIFICATION, not modeled by this core
        assert_eq!(unmarshal(&bytes), Err(WireError::UnknownMessageType(3)));
    }

    #[test]
    fn rejects_short_declared_length() {
        let mut bytes = marshal(&BgpMessage::KeepAlive);
        bytes[17] = 10;
        assert_eq!(unmarshal(&bytes), Err(WireError::HeaderLengthTooSmall(10)));
    }

    #[test]
    fn message_length_is_zero_below_header_size() {
        assert_eq!(message_length(&[0u8; 18]), 0);
    }
}
