//! STUN/TURN message framing.
//!
//! RFC 5389 Section 6 header layout with the RFC 5766 TURN methods added.
//! Encoding and decoding are strict in both directions: a datagram whose
//! declared body length disagrees with the bytes on the wire, or whose
//! attribute list overruns the buffer, is rejected outright.

use crate::error::ProtoError;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// STUN magic cookie (0x2112A442)
pub const MAGIC_COOKIE: u32 = 0x2112_A442;

/// Fixed message header size (20 bytes)
pub const HEADER_SIZE: usize = 20;

/// 96-bit transaction id shared by a request and its response
pub type TransactionId = [u8; 12];

/// Message class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    /// Request message
    Request,
    /// Indication (no response expected)
    Indication,
    /// Success response
    SuccessResponse,
    /// Error response
    ErrorResponse,
}

/// Message method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Binding (0x001) - address discovery
    Binding,
    /// Allocate (0x003) - reserve a relay address
    Allocate,
    /// Refresh (0x004) - extend an allocation lifetime
    Refresh,
    /// Send (0x006) - relay data toward a permitted peer
    Send,
    /// CreatePermission (0x008) - authorize a peer address
    CreatePermission,
}

impl Method {
    fn code(self) -> u16 {
        match self {
            Self::Binding => 0x001,
            Self::Allocate => 0x003,
            Self::Refresh => 0x004,
            Self::Send => 0x006,
            Self::CreatePermission => 0x008,
        }
    }

    fn from_code(code: u16) -> Result<Self, ProtoError> {
        match code {
            0x001 => Ok(Self::Binding),
            0x003 => Ok(Self::Allocate),
            0x004 => Ok(Self::Refresh),
            0x006 => Ok(Self::Send),
            0x008 => Ok(Self::CreatePermission),
            other => Err(ProtoError::UnknownMethod(other)),
        }
    }
}

/// Encode method and class into the 16-bit message type.
///
/// RFC 5389 Section 6 interleaving:
/// ```text
///  0                 1
///  2  3  4 5 6 7 8 9 0 1 2 3 4 5
/// +--+--+-+-+-+-+-+-+-+-+-+-+-+-+
/// |M |M |M|M|M|C|M|M|M|C|M|M|M|M|
/// |11|10|9|8|7|1|6|5|4|0|3|2|1|0|
/// +--+--+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
fn encode_type(method: Method, class: MessageClass) -> u16 {
    let method = method.code();
    let class_bits: u16 = match class {
        MessageClass::Request => 0b00,
        MessageClass::Indication => 0b01,
        MessageClass::SuccessResponse => 0b10,
        MessageClass::ErrorResponse => 0b11,
    };

    let m0_m3 = method & 0x0F;
    let c0 = (class_bits & 0x01) << 4;
    let m4_m6 = (method & 0x70) << 1;
    let c1 = (class_bits & 0x02) << 7;
    let m7_m11 = (method & 0xF80) << 2;

    m0_m3 | c0 | m4_m6 | c1 | m7_m11
}

fn decode_type(msg_type: u16) -> Result<(Method, MessageClass), ProtoError> {
    let c0 = (msg_type >> 4) & 0x01;
    let c1 = (msg_type >> 8) & 0x01;

    let class = match c0 | (c1 << 1) {
        0b00 => MessageClass::Request,
        0b01 => MessageClass::Indication,
        0b10 => MessageClass::SuccessResponse,
        _ => MessageClass::ErrorResponse,
    };

    let m0_m3 = msg_type & 0x0F;
    let m4_m6 = (msg_type >> 1) & 0x70;
    let m7_m11 = (msg_type >> 2) & 0xF80;
    let method = Method::from_code(m0_m3 | m4_m6 | m7_m11)?;

    Ok((method, class))
}

/// Message attribute (16-bit type, 16-bit length, value padded to 4 bytes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
    /// MAPPED-ADDRESS (0x0001) - plain observed address
    MappedAddress(SocketAddr),
    /// USERNAME (0x0006)
    Username(String),
    /// PASSWORD (0x0007) - static-credential check, no message integrity
    Password(String),
    /// ERROR-CODE (0x0009) - numeric code plus UTF-8 reason phrase
    ErrorCode(u16, String),
    /// LIFETIME (0x000D) - allocation lifetime in seconds
    Lifetime(u32),
    /// XOR-PEER-ADDRESS (0x0012) - permission / send target
    XorPeerAddress(SocketAddr),
    /// DATA (0x0013) - opaque payload of a Send indication
    Data(Vec<u8>),
    /// XOR-RELAYED-ADDRESS (0x0016) - allocated relay endpoint
    XorRelayedAddress(SocketAddr),
    /// REQUESTED-TRANSPORT (0x0019) - transport protocol number
    RequestedTransport(u8),
    /// XOR-MAPPED-ADDRESS (0x0020) - observed address, XOR-obfuscated
    XorMappedAddress(SocketAddr),
    /// SOFTWARE (0x8022)
    Software(String),
    /// Any attribute type this codec does not interpret
    Unknown(u16, Vec<u8>),
}

impl Attribute {
    /// Attribute type code
    pub fn attr_type(&self) -> u16 {
        match self {
            Self::MappedAddress(_) => 0x0001,
            Self::Username(_) => 0x0006,
            Self::Password(_) => 0x0007,
            Self::ErrorCode(..) => 0x0009,
            Self::Lifetime(_) => 0x000D,
            Self::XorPeerAddress(_) => 0x0012,
            Self::Data(_) => 0x0013,
            Self::XorRelayedAddress(_) => 0x0016,
            Self::RequestedTransport(_) => 0x0019,
            Self::XorMappedAddress(_) => 0x0020,
            Self::Software(_) => 0x8022,
            Self::Unknown(t, _) => *t,
        }
    }

    /// Encode as TLV, padded to the 4-byte boundary.
    fn encode(&self, transaction_id: &TransactionId) -> Vec<u8> {
        let value = self.encode_value(transaction_id);

        let mut bytes = Vec::with_capacity(4 + value.len() + 3);
        bytes.extend_from_slice(&self.attr_type().to_be_bytes());
        bytes.extend_from_slice(&(value.len() as u16).to_be_bytes());
        bytes.extend_from_slice(&value);

        let padding = (4 - (value.len() % 4)) % 4;
        bytes.extend(std::iter::repeat_n(0, padding));

        bytes
    }

    fn encode_value(&self, transaction_id: &TransactionId) -> Vec<u8> {
        match self {
            Self::MappedAddress(addr) => encode_plain_addr(*addr),
            Self::Username(s) | Self::Password(s) | Self::Software(s) => s.as_bytes().to_vec(),
            Self::ErrorCode(code, reason) => {
                let mut value = vec![0, 0, (code / 100) as u8, (code % 100) as u8];
                value.extend_from_slice(reason.as_bytes());
                value
            }
            Self::Lifetime(secs) => secs.to_be_bytes().to_vec(),
            Self::Data(data) => data.clone(),
            Self::RequestedTransport(protocol) => vec![*protocol, 0, 0, 0],
            Self::XorPeerAddress(addr)
            | Self::XorRelayedAddress(addr)
            | Self::XorMappedAddress(addr) => encode_xor_addr(*addr, transaction_id),
            Self::Unknown(_, data) => data.clone(),
        }
    }

    fn decode(
        attr_type: u16,
        value: &[u8],
        transaction_id: &TransactionId,
    ) -> Result<Self, ProtoError> {
        let malformed = || ProtoError::MalformedAttribute(attr_type);

        match attr_type {
            0x0001 => Ok(Self::MappedAddress(
                decode_plain_addr(value).ok_or_else(malformed)?,
            )),
            0x0006 => Ok(Self::Username(
                String::from_utf8(value.to_vec()).map_err(|_| malformed())?,
            )),
            0x0007 => Ok(Self::Password(
                String::from_utf8(value.to_vec()).map_err(|_| malformed())?,
            )),
            0x0009 => {
                if value.len() < 4 {
                    return Err(malformed());
                }
                let code = u16::from(value[2]) * 100 + u16::from(value[3]);
                let reason = String::from_utf8_lossy(&value[4..]).into_owned();
                Ok(Self::ErrorCode(code, reason))
            }
            0x000D => {
                let bytes: [u8; 4] = value.try_into().map_err(|_| malformed())?;
                Ok(Self::Lifetime(u32::from_be_bytes(bytes)))
            }
            0x0012 => Ok(Self::XorPeerAddress(
                decode_xor_addr(value, transaction_id).ok_or_else(malformed)?,
            )),
            0x0013 => Ok(Self::Data(value.to_vec())),
            0x0016 => Ok(Self::XorRelayedAddress(
                decode_xor_addr(value, transaction_id).ok_or_else(malformed)?,
            )),
            0x0019 => {
                if value.len() != 4 {
                    return Err(malformed());
                }
                Ok(Self::RequestedTransport(value[0]))
            }
            0x0020 => Ok(Self::XorMappedAddress(
                decode_xor_addr(value, transaction_id).ok_or_else(malformed)?,
            )),
            0x8022 => Ok(Self::Software(
                String::from_utf8_lossy(value).into_owned(),
            )),
            _ => Ok(Self::Unknown(attr_type, value.to_vec())),
        }
    }
}

fn encode_plain_addr(addr: SocketAddr) -> Vec<u8> {
    let mut value = vec![0, if addr.is_ipv4() { 0x01 } else { 0x02 }];
    value.extend_from_slice(&addr.port().to_be_bytes());
    match addr.ip() {
        IpAddr::V4(ip) => value.extend_from_slice(&ip.octets()),
        IpAddr::V6(ip) => value.extend_from_slice(&ip.octets()),
    }
    value
}

fn decode_plain_addr(value: &[u8]) -> Option<SocketAddr> {
    if value.len() < 4 {
        return None;
    }
    let port = u16::from_be_bytes([value[2], value[3]]);
    match value[1] {
        0x01 => {
            let octets: [u8; 4] = value.get(4..8)?.try_into().ok()?;
            Some(SocketAddr::new(Ipv4Addr::from(octets).into(), port))
        }
        0x02 => {
            let octets: [u8; 16] = value.get(4..20)?.try_into().ok()?;
            Some(SocketAddr::new(Ipv6Addr::from(octets).into(), port))
        }
        _ => None,
    }
}

/// XOR the port with the top 16 bits of the magic cookie and the address
/// with the cookie (IPv6: cookie followed by the transaction id). The
/// transaction id is always the one of the message being encoded - never a
/// freshly generated id.
fn encode_xor_addr(addr: SocketAddr, transaction_id: &TransactionId) -> Vec<u8> {
    let mut value = vec![0, if addr.is_ipv4() { 0x01 } else { 0x02 }];

    let xor_port = addr.port() ^ (MAGIC_COOKIE >> 16) as u16;
    value.extend_from_slice(&xor_port.to_be_bytes());

    match addr.ip() {
        IpAddr::V4(ip) => {
            let cookie = MAGIC_COOKIE.to_be_bytes();
            for (byte, key) in ip.octets().iter().zip(cookie.iter()) {
                value.push(byte ^ key);
            }
        }
        IpAddr::V6(ip) => {
            let mut key = MAGIC_COOKIE.to_be_bytes().to_vec();
            key.extend_from_slice(transaction_id);
            for (byte, key) in ip.octets().iter().zip(key.iter()) {
                value.push(byte ^ key);
            }
        }
    }

    value
}

fn decode_xor_addr(value: &[u8], transaction_id: &TransactionId) -> Option<SocketAddr> {
    if value.len() < 4 {
        return None;
    }

    let xor_port = u16::from_be_bytes([value[2], value[3]]);
    let port = xor_port ^ (MAGIC_COOKIE >> 16) as u16;

    match value[1] {
        0x01 => {
            let encoded = value.get(4..8)?;
            let cookie = MAGIC_COOKIE.to_be_bytes();
            let mut octets = [0u8; 4];
            for i in 0..4 {
                octets[i] = encoded[i] ^ cookie[i];
            }
            Some(SocketAddr::new(Ipv4Addr::from(octets).into(), port))
        }
        0x02 => {
            let encoded = value.get(4..20)?;
            let mut key = MAGIC_COOKIE.to_be_bytes().to_vec();
            key.extend_from_slice(transaction_id);
            let mut octets = [0u8; 16];
            for i in 0..16 {
                octets[i] = encoded[i] ^ key[i];
            }
            Some(SocketAddr::new(Ipv6Addr::from(octets).into(), port))
        }
        _ => None,
    }
}

/// A decoded STUN/TURN message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message method
    pub method: Method,
    /// Message class
    pub class: MessageClass,
    /// Transaction id shared by request and response
    pub transaction_id: TransactionId,
    /// Attributes in wire order
    pub attributes: Vec<Attribute>,
}

impl Message {
    /// New request with a random transaction id.
    pub fn request(method: Method) -> Self {
        Self {
            method,
            class: MessageClass::Request,
            transaction_id: random_transaction_id(),
            attributes: Vec::new(),
        }
    }

    /// New indication with a random transaction id.
    pub fn indication(method: Method) -> Self {
        Self {
            method,
            class: MessageClass::Indication,
            transaction_id: random_transaction_id(),
            attributes: Vec::new(),
        }
    }

    /// Success response echoing the transaction id of the request it answers.
    pub fn success_response(method: Method, transaction_id: TransactionId) -> Self {
        Self {
            method,
            class: MessageClass::SuccessResponse,
            transaction_id,
            attributes: Vec::new(),
        }
    }

    /// Error response echoing the request's transaction id.
    pub fn error_response(
        method: Method,
        transaction_id: TransactionId,
        code: u16,
        reason: &str,
    ) -> Self {
        Self {
            method,
            class: MessageClass::ErrorResponse,
            transaction_id,
            attributes: vec![Attribute::ErrorCode(code, reason.to_string())],
        }
    }

    /// Append an attribute, builder style.
    #[must_use]
    pub fn with_attribute(mut self, attr: Attribute) -> Self {
        self.attributes.push(attr);
        self
    }

    /// First attribute matched by `f`, if any.
    pub fn find_attribute<T>(&self, f: impl Fn(&Attribute) -> Option<T>) -> Option<T> {
        self.attributes.iter().find_map(f)
    }

    /// USERNAME attribute value
    pub fn username(&self) -> Option<&str> {
        self.attributes.iter().find_map(|a| match a {
            Attribute::Username(u) => Some(u.as_str()),
            _ => None,
        })
    }

    /// PASSWORD attribute value
    pub fn password(&self) -> Option<&str> {
        self.attributes.iter().find_map(|a| match a {
            Attribute::Password(p) => Some(p.as_str()),
            _ => None,
        })
    }

    /// XOR-MAPPED-ADDRESS attribute value
    pub fn xor_mapped_address(&self) -> Option<SocketAddr> {
        self.find_attribute(|a| match a {
            Attribute::XorMappedAddress(addr) => Some(*addr),
            _ => None,
        })
    }

    /// XOR-PEER-ADDRESS attribute value
    pub fn xor_peer_address(&self) -> Option<SocketAddr> {
        self.find_attribute(|a| match a {
            Attribute::XorPeerAddress(addr) => Some(*addr),
            _ => None,
        })
    }

    /// XOR-RELAYED-ADDRESS attribute value
    pub fn xor_relayed_address(&self) -> Option<SocketAddr> {
        self.find_attribute(|a| match a {
            Attribute::XorRelayedAddress(addr) => Some(*addr),
            _ => None,
        })
    }

    /// LIFETIME attribute value
    pub fn lifetime(&self) -> Option<u32> {
        self.find_attribute(|a| match a {
            Attribute::Lifetime(secs) => Some(*secs),
            _ => None,
        })
    }

    /// ERROR-CODE attribute value
    pub fn error_code(&self) -> Option<u16> {
        self.find_attribute(|a| match a {
            Attribute::ErrorCode(code, _) => Some(*code),
            _ => None,
        })
    }

    /// Encode to wire bytes. The body length is back-patched into the
    /// header after all attributes are serialized.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE + 64);

        bytes.extend_from_slice(&encode_type(self.method, self.class).to_be_bytes());
        let length_offset = bytes.len();
        bytes.extend_from_slice(&[0u8; 2]);
        bytes.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
        bytes.extend_from_slice(&self.transaction_id);

        for attr in &self.attributes {
            bytes.extend_from_slice(&attr.encode(&self.transaction_id));
        }

        let body_len = bytes.len() - HEADER_SIZE;
        bytes[length_offset..length_offset + 2].copy_from_slice(&(body_len as u16).to_be_bytes());

        bytes
    }

    /// Decode from wire bytes.
    ///
    /// # Errors
    ///
    /// Rejects a datagram shorter than the header, a wrong magic cookie, a
    /// declared body length that disagrees with the bytes present, or an
    /// attribute that overruns the buffer.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtoError> {
        if bytes.len() < HEADER_SIZE {
            return Err(ProtoError::TooShort {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        let msg_type = u16::from_be_bytes([bytes[0], bytes[1]]);
        let declared = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
        let cookie = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);

        if cookie != MAGIC_COOKIE {
            return Err(ProtoError::BadMagicCookie(cookie));
        }

        let actual = bytes.len() - HEADER_SIZE;
        if declared != actual {
            return Err(ProtoError::LengthMismatch { declared, actual });
        }

        let mut transaction_id = [0u8; 12];
        transaction_id.copy_from_slice(&bytes[8..20]);

        let (method, class) = decode_type(msg_type)?;

        let mut attributes = Vec::new();
        let mut offset = HEADER_SIZE;

        while offset < bytes.len() {
            if offset + 4 > bytes.len() {
                return Err(ProtoError::AttributeOverrun {
                    attr_type: 0,
                    claimed: 4,
                    remaining: bytes.len() - offset,
                });
            }

            let attr_type = u16::from_be_bytes([bytes[offset], bytes[offset + 1]]);
            let attr_len = u16::from_be_bytes([bytes[offset + 2], bytes[offset + 3]]) as usize;
            offset += 4;

            if offset + attr_len > bytes.len() {
                return Err(ProtoError::AttributeOverrun {
                    attr_type,
                    claimed: attr_len,
                    remaining: bytes.len() - offset,
                });
            }

            let value = &bytes[offset..offset + attr_len];
            attributes.push(Attribute::decode(attr_type, value, &transaction_id)?);

            offset += attr_len;
            offset += (4 - (attr_len % 4)) % 4;
        }

        Ok(Self {
            method,
            class,
            transaction_id,
            attributes,
        })
    }
}

fn random_transaction_id() -> TransactionId {
    use rand::RngCore;
    let mut id = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut id);
    id
}
