use crate::error::{Error, Result};
use crate::protocol::AddressType;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::io::{AsyncRead, AsyncReadExt};

/// TargetAddr represents the destination of a SOCKS5 request:
/// an IP endpoint or a domain name left for the server to resolve
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddr {
    Ip(SocketAddr),
    Domain(String, u16),
}

impl TargetAddr {
    /// new builds a target from a host string, which may be an IPv4 literal,
    /// an IPv6 literal (bracketed or not) or a domain name
    pub fn new(host: &str, port: u16) -> Result<Self> {
        let bare = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        if let Ok(ip) = bare.parse::<IpAddr>() {
            return Ok(TargetAddr::Ip(SocketAddr::new(ip, port)));
        }

        // Domain length is carried in a single octet
        if host.is_empty() || host.len() > u8::MAX as usize {
            return Err(Error::InvalidArgument(format!(
                "domain name must be 1 to 255 bytes, got {}",
                host.len()
            )));
        }

        Ok(TargetAddr::Domain(host.to_string(), port))
    }

    pub fn port(&self) -> u16 {
        match self {
            TargetAddr::Ip(addr) => addr.port(),
            TargetAddr::Domain(_, port) => *port,
        }
    }

    pub fn address_type(&self) -> AddressType {
        match self {
            TargetAddr::Ip(SocketAddr::V4(_)) => AddressType::IPv4,
            TargetAddr::Ip(SocketAddr::V6(_)) => AddressType::IPv6,
            TargetAddr::Domain(..) => AddressType::DomainName,
        }
    }

    /// encode appends ATYP, DST.ADDR and DST.PORT to `buf`
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.address_type() as u8);

        match self {
            TargetAddr::Ip(SocketAddr::V4(addr)) => buf.extend_from_slice(&addr.ip().octets()),
            TargetAddr::Ip(SocketAddr::V6(addr)) => buf.extend_from_slice(&addr.ip().octets()),
            TargetAddr::Domain(domain, _) => {
                // First octet of a domain name holds the number of octets to follow
                buf.push(domain.len() as u8);
                buf.extend_from_slice(domain.as_bytes());
            }
        }

        // Port -> BigEndian (network order)
        buf.extend_from_slice(&self.port().to_be_bytes());
    }
}

impl From<SocketAddr> for TargetAddr {
    fn from(addr: SocketAddr) -> Self {
        TargetAddr::Ip(addr)
    }
}

impl std::fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetAddr::Ip(addr) => write!(f, "{addr}"),
            TargetAddr::Domain(domain, port) => write!(f, "{domain}:{port}"),
        }
    }
}

/// read_bound_addr reads BND.ADDR and BND.PORT for the given address type byte.
/// Domain names are never valid in a reply.
pub async fn read_bound_addr<S>(stream: &mut S, atyp: u8) -> Result<SocketAddr>
where
    S: AsyncRead + Unpin,
{
    let ip = match AddressType::from_byte(atyp) {
        Some(AddressType::IPv4) => {
            let mut addr = [0u8; 4];
            stream
                .read_exact(&mut addr)
                .await
                .map_err(Error::from_handshake_io)?;
            IpAddr::V4(Ipv4Addr::from(addr))
        }
        Some(AddressType::IPv6) => {
            let mut addr = [0u8; 16];
            stream
                .read_exact(&mut addr)
                .await
                .map_err(Error::from_handshake_io)?;
            IpAddr::V6(Ipv6Addr::from(addr))
        }
        _ => {
            return Err(Error::Protocol(format!(
                "unsupported bound address type: {atyp:#04x}"
            )));
        }
    };

    // Read port
    let mut port_buf = [0u8; 2];
    stream
        .read_exact(&mut port_buf)
        .await
        .map_err(Error::from_handshake_io)?;

    Ok(SocketAddr::new(ip, u16::from_be_bytes(port_buf)))
}
