use crate::error::{Error, Result};
use crate::protocol::{AuthMethod, AuthStatus, USERPASS_VERSION, Version};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Credentials holds the username/password pair offered to the SOCKS5 server.
/// Both fields are raw bytes as they go on the wire.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: Vec<u8>,
    pub password: Vec<u8>,
}

impl Credentials {
    /// new returns `None` when both username and password are empty, which
    /// selects the unauthenticated method
    pub fn new(username: impl Into<Vec<u8>>, password: impl Into<Vec<u8>>) -> Option<Self> {
        let username = username.into();
        let password = password.into();

        if username.is_empty() && password.is_empty() {
            return None;
        }

        Some(Self { username, password })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &String::from_utf8_lossy(&self.username))
            .field("password", &"<redacted>")
            .finish()
    }
}

/// negotiate_auth offers exactly one method to the server: username/password
/// when credentials are configured, no authentication otherwise. There is no
/// fallback if the server picks anything else.
pub async fn negotiate_auth<S>(stream: &mut S, credentials: Option<&Credentials>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let offered = match credentials {
        Some(_) => AuthMethod::UserPass,
        None => AuthMethod::NoAuth,
    };

    // ClientHello format
    // +----+----------+----------+
    // |VER | NMETHODS | METHODS  |
    // +----+----------+----------+
    // | 1  |    1     | 1 to 255 |
    // +----+----------+----------+
    stream
        .write_all(&[Version::SOCKS5 as u8, 1, offered as u8])
        .await
        .map_err(Error::from_handshake_io)?;

    // ServerChoice method selection reply format
    // +----+--------+
    // |VER | METHOD |
    // +----+--------+
    // | 1  |   1    |
    // +----+--------+
    let mut choice = [0u8; 2];
    stream
        .read_exact(&mut choice)
        .await
        .map_err(Error::from_handshake_io)?;

    check_version(choice[0])?;

    if choice[1] != offered as u8 {
        return Err(Error::Authentication(format!(
            "server does not accept {offered:?} connections (selected method {:#04x})",
            choice[1]
        )));
    }

    debug!("SOCKS5 server accepted {:?} authentication", offered);

    match credentials {
        Some(creds) => authenticate_userpass(stream, creds).await,
        None => Ok(()),
    }
}

/// authenticate_userpass runs the RFC 1929 sub-negotiation
async fn authenticate_userpass<S>(stream: &mut S, creds: &Credentials) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // Client Username/Password Request
    // +----+------+----------+------+----------+
    // |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
    // +----+------+----------+------+----------+
    // | 1  |  1   | 1 to 255 |  1   | 1 to 255 |
    // +----+------+----------+------+----------+
    let username_len = field_len("username", &creds.username)?;
    let password_len = field_len("password", &creds.password)?;

    let mut request = Vec::with_capacity(3 + creds.username.len() + creds.password.len());
    request.push(USERPASS_VERSION);
    request.push(username_len);
    request.extend_from_slice(&creds.username);
    request.push(password_len);
    request.extend_from_slice(&creds.password);

    stream
        .write_all(&request)
        .await
        .map_err(Error::from_handshake_io)?;

    // Username/Password Server response
    // +----+--------+
    // |VER | STATUS |
    // +----+--------+
    // | 1  |   1    |
    // +----+--------+
    let mut reply = [0u8; 2];
    stream
        .read_exact(&mut reply)
        .await
        .map_err(Error::from_handshake_io)?;

    if reply[0] != USERPASS_VERSION {
        return Err(Error::Protocol(format!(
            "unexpected username/password sub-negotiation version: {:#04x}",
            reply[0]
        )));
    }

    if reply[1] != AuthStatus::Success as u8 {
        return Err(Error::Authentication(
            "server rejected the username/password".to_string(),
        ));
    }

    Ok(())
}

fn field_len(name: &str, field: &[u8]) -> Result<u8> {
    u8::try_from(field.len())
        .map_err(|_| Error::InvalidArgument(format!("{name} longer than 255 bytes")))
}

/// check_version ensures the server speaks SOCKS5
pub(crate) fn check_version(version: u8) -> Result<()> {
    if version != Version::SOCKS5 as u8 {
        return Err(Error::Protocol(format!(
            "invalid protocol version received: {version:#04x}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[test]
    fn test_empty_credentials_select_no_auth() {
        assert_eq!(Credentials::new("", ""), None);
        assert!(Credentials::new("user", "").is_some());
        assert!(Credentials::new("", "pass").is_some());
    }

    #[tokio::test]
    async fn test_no_auth_handshake() {
        let mut stream = Builder::new().write(&[5, 1, 0]).read(&[5, 0]).build();
        negotiate_auth(&mut stream, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_userpass_handshake() {
        let creds = Credentials::new("bob", "hunter2").unwrap();
        let mut stream = Builder::new()
            .write(&[5, 1, 2])
            .read(&[5, 2])
            .write(&[1, 3, b'b', b'o', b'b', 7])
            .write(b"hunter2")
            .read(&[1, 0])
            .build();
        negotiate_auth(&mut stream, Some(&creds)).await.unwrap();
    }

    #[tokio::test]
    async fn test_method_rejected() {
        let mut stream = Builder::new().write(&[5, 1, 0]).read(&[5, 0xff]).build();
        let err = negotiate_auth(&mut stream, None).await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[tokio::test]
    async fn test_no_fallback_to_unauthenticated() {
        let creds = Credentials::new("bob", "hunter2").unwrap();
        let mut stream = Builder::new().write(&[5, 1, 2]).read(&[5, 0]).build();
        let err = negotiate_auth(&mut stream, Some(&creds)).await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[tokio::test]
    async fn test_password_rejected() {
        let creds = Credentials::new("bob", "nope").unwrap();
        let mut stream = Builder::new()
            .write(&[5, 1, 2])
            .read(&[5, 2])
            .write(&[1, 3, b'b', b'o', b'b', 4, b'n', b'o', b'p', b'e'])
            .read(&[1, 1])
            .build();
        let err = negotiate_auth(&mut stream, Some(&creds)).await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[tokio::test]
    async fn test_bad_subnegotiation_version() {
        let creds = Credentials::new("bob", "x").unwrap();
        let mut stream = Builder::new()
            .write(&[5, 1, 2])
            .read(&[5, 2])
            .write(&[1, 3, b'b', b'o', b'b', 1, b'x'])
            .read(&[5, 0])
            .build();
        let err = negotiate_auth(&mut stream, Some(&creds)).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn test_wrong_socks_version() {
        let mut stream = Builder::new().write(&[5, 1, 0]).read(&[4, 0]).build();
        let err = negotiate_auth(&mut stream, None).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn test_server_hangs_up_during_handshake() {
        let mut stream = Builder::new().write(&[5, 1, 0]).read(&[5]).build();
        let err = negotiate_auth(&mut stream, None).await.unwrap_err();
        assert!(matches!(err, Error::ClosedByServer));
    }
}
