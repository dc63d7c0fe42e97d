// SOCKS5 wire values as seen from the client side.
// - [SOCKS5 (RFC 1928)](https://datatracker.ietf.org/doc/html/rfc1928)
// - [Username/Password Authentication (RFC 1929)](https://datatracker.ietf.org/doc/html/rfc1929)

use std::fmt;

// RSV: Fields marked RESERVED (RSV) must be set to X'00'.
pub const RSV: u8 = 0x00;

// USERPASS_VERSION is the version byte of the username/password sub-negotiation
pub const USERPASS_VERSION: u8 = 0x01;

/// Version represents available SOCKS proxy versions.
/// Only SOCKS5 is spoken by this client
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Version {
    SOCKS5 = 0x05,
}

/// AuthMethod represents the SOCKS5 authentication methods
/// the client knows how to offer
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AuthMethod {
    NoAuth = 0x00,
    // Gssapi = 0x01, never offered
    UserPass = 0x02,
    // 0x03 - 0x7f: IANA reserved
    // 0x80 - 0xFE: private methods
    NoAcceptable = 0xFF,
}

impl AuthMethod {
    /// from_byte converts a byte to its related auth method
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(AuthMethod::NoAuth),
            0x02 => Some(AuthMethod::UserPass),
            0xFF => Some(AuthMethod::NoAcceptable),
            _ => None,
        }
    }
}

/// AuthStatus is the status byte of the username/password reply
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AuthStatus {
    Success = 0x00,
    Failure = 0x01,
}

/// AddressType represents the SOCKS5 address types:
/// IPv4, Domain Name, IPv6
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AddressType {
    IPv4 = 0x01,
    DomainName = 0x03,
    IPv6 = 0x04,
}

impl AddressType {
    /// from_byte converts a byte to its related network address type
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(AddressType::IPv4),
            0x03 => Some(AddressType::DomainName),
            0x04 => Some(AddressType::IPv6),
            _ => None,
        }
    }
}

/// Command represents SOCKS5 protocol commands
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Connect = 0x01,
    Bind = 0x02,
    UdpAssociate = 0x03,
}

/// ReplyStatus is the REP field of a SOCKS5 reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    Succeeded,
    GeneralFailure,
    ConnectionNotAllowed,
    NetworkUnreachable,
    HostUnreachable,
    ConnectionRefused,
    TtlExpired,
    CommandNotSupported,
    AddressTypeNotSupported,
    // 0x09 - 0xFF: unassigned
    Unassigned(u8),
}

impl ReplyStatus {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => ReplyStatus::Succeeded,
            0x01 => ReplyStatus::GeneralFailure,
            0x02 => ReplyStatus::ConnectionNotAllowed,
            0x03 => ReplyStatus::NetworkUnreachable,
            0x04 => ReplyStatus::HostUnreachable,
            0x05 => ReplyStatus::ConnectionRefused,
            0x06 => ReplyStatus::TtlExpired,
            0x07 => ReplyStatus::CommandNotSupported,
            0x08 => ReplyStatus::AddressTypeNotSupported,
            other => ReplyStatus::Unassigned(other),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            ReplyStatus::Succeeded => 0x00,
            ReplyStatus::GeneralFailure => 0x01,
            ReplyStatus::ConnectionNotAllowed => 0x02,
            ReplyStatus::NetworkUnreachable => 0x03,
            ReplyStatus::HostUnreachable => 0x04,
            ReplyStatus::ConnectionRefused => 0x05,
            ReplyStatus::TtlExpired => 0x06,
            ReplyStatus::CommandNotSupported => 0x07,
            ReplyStatus::AddressTypeNotSupported => 0x08,
            ReplyStatus::Unassigned(byte) => byte,
        }
    }
}

impl fmt::Display for ReplyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplyStatus::Succeeded => write!(f, "succeeded"),
            ReplyStatus::GeneralFailure => write!(f, "general SOCKS server failure"),
            ReplyStatus::ConnectionNotAllowed => write!(f, "connection not allowed by ruleset"),
            ReplyStatus::NetworkUnreachable => write!(f, "network unreachable"),
            ReplyStatus::HostUnreachable => write!(f, "host unreachable"),
            ReplyStatus::ConnectionRefused => write!(f, "connection refused"),
            ReplyStatus::TtlExpired => write!(f, "TTL expired"),
            ReplyStatus::CommandNotSupported => write!(f, "command not supported"),
            ReplyStatus::AddressTypeNotSupported => write!(f, "address type not supported"),
            ReplyStatus::Unassigned(byte) => write!(f, "unassigned reply code {byte:#04x}"),
        }
    }
}
