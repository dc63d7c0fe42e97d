use crate::error::{Error, Result};
use url::{Host, Url};

const DEFAULT_HTTP_PORT: u16 = 80;

/// ProxiedRequest is what the bridge needs to know about an incoming proxy
/// request: where it goes, whether it is a CONNECT, and which HTTP version to
/// answer with. Only the request line and the Host header are looked at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxiedRequest {
    pub host: String,
    pub port: u16,
    pub is_connect: bool,
    pub http_version: String,
}

impl ProxiedRequest {
    /// parse reads the header block, up to but excluding the CRLFCRLF terminator
    pub fn parse(header: &[u8]) -> Result<Self> {
        let text = String::from_utf8_lossy(header);
        let mut lines = text.split("\r\n").filter(|line| !line.is_empty());

        let request_line = lines
            .next()
            .ok_or_else(|| malformed("empty header block"))?;

        let mut parts = request_line.split(' ');
        let (Some(method), Some(target), Some(http_version)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed(format!("invalid request line: {request_line}")));
        };

        let host_value = lines
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("host").then(|| value.trim())
            })
            .ok_or_else(|| malformed("missing Host header"))?;

        let (mut host, mut port) = split_host_port(host_value)?;

        // An absolute http:// target wins over the Host header
        if target.starts_with("http://") {
            (host, port) = parse_absolute_target(target)?;
        }

        Ok(Self {
            host,
            port,
            is_connect: method.eq_ignore_ascii_case("CONNECT"),
            http_version: http_version.to_string(),
        })
    }

    /// established is the reply sent once a CONNECT tunnel is open
    pub fn established(&self) -> String {
        format!("{} 200 Connection established\r\n\r\n", self.http_version)
    }

    /// unavailable is the reply sent when the upstream tunnel cannot be opened
    pub fn unavailable(&self) -> String {
        format!("{} 503 Service Unavailable\r\n\r\n", self.http_version)
    }
}

fn malformed(msg: impl Into<String>) -> Error {
    Error::MalformedRequest(msg.into())
}

/// split_host_port splits a Host header value into host and port,
/// defaulting to port 80. Bracketed IPv6 literals are unwrapped.
fn split_host_port(value: &str) -> Result<(String, u16)> {
    if let Some(rest) = value.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| malformed(format!("unterminated IPv6 literal: {value}")))?;

        let port = match after.strip_prefix(':') {
            Some(port) => parse_port(port)?,
            None if after.is_empty() => DEFAULT_HTTP_PORT,
            None => return Err(malformed(format!("invalid host: {value}"))),
        };
        return Ok((host.to_string(), port));
    }

    let mut parts = value.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(host), Some(port), None) => Ok((host.to_string(), parse_port(port)?)),
        // No port, or an unbracketed IPv6 literal
        _ => Ok((value.to_string(), DEFAULT_HTTP_PORT)),
    }
}

fn parse_port(port: &str) -> Result<u16> {
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(malformed(format!("invalid port: {port}"))),
        Ok(port) => Ok(port),
    }
}

fn parse_absolute_target(target: &str) -> Result<(String, u16)> {
    let url = Url::parse(target).map_err(|e| malformed(format!("invalid request target: {e}")))?;

    let host = match url.host() {
        Some(Host::Domain(domain)) => domain.to_string(),
        Some(Host::Ipv4(ip)) => ip.to_string(),
        Some(Host::Ipv6(ip)) => ip.to_string(),
        None => return Err(malformed(format!("request target has no host: {target}"))),
    };

    let port = url.port_or_known_default().unwrap_or(DEFAULT_HTTP_PORT);
    if port == 0 {
        return Err(malformed(format!("invalid port in request target: {target}")));
    }

    Ok((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_connect() {
        let req = ProxiedRequest::parse(b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443")
            .unwrap();
        assert_eq!(
            req,
            ProxiedRequest {
                host: "example.com".to_string(),
                port: 443,
                is_connect: true,
                http_version: "HTTP/1.1".to_string(),
            }
        );
        assert_eq!(req.established(), "HTTP/1.1 200 Connection established\r\n\r\n");
        assert_eq!(req.unavailable(), "HTTP/1.1 503 Service Unavailable\r\n\r\n");
    }

    #[test]
    fn test_connect_is_case_insensitive() {
        let req = ProxiedRequest::parse(b"connect example.com:443 HTTP/1.0\r\nhost: example.com:443")
            .unwrap();
        assert!(req.is_connect);
        assert_eq!(req.http_version, "HTTP/1.0");
    }

    #[test]
    fn test_plain_request_defaults_to_port_80() {
        let req = ProxiedRequest::parse(b"GET /index.html HTTP/1.1\r\nHost: example.com\r\nAccept: */*")
            .unwrap();
        assert_eq!(req.host, "example.com");
        assert_eq!(req.port, 80);
        assert!(!req.is_connect);
    }

    #[test]
    fn test_absolute_target_overrides_host_header() {
        let req = ProxiedRequest::parse(
            b"GET http://other.example:8080/path HTTP/1.1\r\nHost: example.com",
        )
        .unwrap();
        assert_eq!(req.host, "other.example");
        assert_eq!(req.port, 8080);

        let req = ProxiedRequest::parse(b"GET http://example.com/ HTTP/1.1\r\nHost: example.com:81")
            .unwrap();
        assert_eq!(req.port, 80);
    }

    #[test]
    fn test_ipv6_hosts() {
        let req = ProxiedRequest::parse(b"CONNECT [::1]:8443 HTTP/1.1\r\nHost: [::1]:8443").unwrap();
        assert_eq!(req.host, "::1");
        assert_eq!(req.port, 8443);

        let req = ProxiedRequest::parse(b"GET http://[::1]:81/ HTTP/1.1\r\nHost: [::1]").unwrap();
        assert_eq!(req.host, "::1");
        assert_eq!(req.port, 81);
    }

    #[test]
    fn test_missing_host_header() {
        let err = ProxiedRequest::parse(b"GET / HTTP/1.1\r\nAccept: */*").unwrap_err();
        assert!(matches!(err, Error::MalformedRequest(_)));
    }

    #[test]
    fn test_bad_request_line() {
        let err = ProxiedRequest::parse(b"GET /\r\nHost: example.com").unwrap_err();
        assert!(matches!(err, Error::MalformedRequest(_)));

        let err = ProxiedRequest::parse(b"").unwrap_err();
        assert!(matches!(err, Error::MalformedRequest(_)));
    }

    #[test]
    fn test_bad_port() {
        for header in [
            &b"GET / HTTP/1.1\r\nHost: example.com:http"[..],
            &b"GET / HTTP/1.1\r\nHost: example.com:0"[..],
            &b"GET / HTTP/1.1\r\nHost: example.com:65536"[..],
        ] {
            let err = ProxiedRequest::parse(header).unwrap_err();
            assert!(matches!(err, Error::MalformedRequest(_)));
        }
    }
}
