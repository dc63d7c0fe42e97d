use crate::address::{TargetAddr, read_bound_addr};
use crate::auth::check_version;
use crate::error::{Error, Result};
use crate::protocol::{Command, RSV, ReplyStatus, Version};
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// send_request writes a SOCKS5 request for `command` towards `target`
pub async fn send_request<S>(stream: &mut S, command: Command, target: &TargetAddr) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    // SOCKS5 request format
    // +----+-----+-------+------+----------+----------+
    // |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
    // +----+-----+-------+------+----------+----------+
    // | 1  |  1  | X'00' |  1   | Variable |    2     |
    // +----+-----+-------+------+----------+----------+
    let mut request = vec![Version::SOCKS5 as u8, command as u8, RSV];
    target.encode(&mut request);

    stream
        .write_all(&request)
        .await
        .map_err(Error::from_handshake_io)
}

/// read_reply reads the SOCKS5 reply and returns the bound address.
/// Any non-zero REP is a connection error carrying that status.
pub async fn read_reply<S>(stream: &mut S) -> Result<SocketAddr>
where
    S: AsyncRead + Unpin,
{
    // SOCKS5 reply format
    // +----+-----+-------+------+----------+----------+
    // |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
    // +----+-----+-------+------+----------+----------+
    // | 1  |  1  | X'00' |  1   | Variable |    2     |
    // +----+-----+-------+------+----------+----------+
    let mut header = [0u8; 4];
    stream
        .read_exact(&mut header)
        .await
        .map_err(Error::from_handshake_io)?;

    check_version(header[0])?;

    let status = ReplyStatus::from_byte(header[1]);
    if status != ReplyStatus::Succeeded {
        return Err(Error::ConnectionRejected(status));
    }

    // Not checking RSV (RESERVED) -> 0x00
    read_bound_addr(stream, header[3]).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_connect_request_for_domain() {
        let target = TargetAddr::new("example.com", 443).unwrap();
        let mut expected = vec![5, 1, 0, 3, 11];
        expected.extend_from_slice(b"example.com");
        expected.extend_from_slice(&[0x01, 0xbb]);

        let mut stream = Builder::new().write(&expected).build();
        send_request(&mut stream, Command::Connect, &target)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_udp_associate_request_for_ipv4() {
        let target = TargetAddr::from("10.1.2.3:5353".parse::<SocketAddr>().unwrap());
        let mut stream = Builder::new()
            .write(&[5, 3, 0, 1, 10, 1, 2, 3, 0x14, 0xe9])
            .build();
        send_request(&mut stream, Command::UdpAssociate, &target)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_successful_reply() {
        let mut stream = Builder::new()
            .read(&[5, 0, 0, 1, 192, 168, 0, 1, 0x1f, 0x90])
            .build();
        let bound = read_reply(&mut stream).await.unwrap();
        assert_eq!(bound, "192.168.0.1:8080".parse().unwrap());
    }

    #[tokio::test]
    async fn test_ipv6_reply() {
        let mut reply = vec![5, 0, 0, 4];
        reply.extend_from_slice(&[0u8; 15]);
        reply.extend_from_slice(&[1, 0, 53]);
        let mut stream = Builder::new().read(&reply).build();
        let bound = read_reply(&mut stream).await.unwrap();
        assert_eq!(bound, "[::1]:53".parse().unwrap());
    }

    #[tokio::test]
    async fn test_refused_reply() {
        let mut stream = Builder::new().read(&[5, 5, 0, 1]).build();
        let err = read_reply(&mut stream).await.unwrap_err();
        assert_eq!(err.reply_status(), Some(ReplyStatus::ConnectionRefused));
    }

    #[tokio::test]
    async fn test_domain_reply_is_a_protocol_error() {
        let mut stream = Builder::new().read(&[5, 0, 0, 3]).build();
        let err = read_reply(&mut stream).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn test_truncated_reply() {
        let mut stream = Builder::new().read(&[5, 0]).build();
        let err = read_reply(&mut stream).await.unwrap_err();
        assert!(matches!(err, Error::ClosedByServer));
    }
}
