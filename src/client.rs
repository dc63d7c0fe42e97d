use crate::{
    address::TargetAddr,
    auth::{self, Credentials},
    commands,
    error::{Error, Result},
    protocol::Command,
};
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tracing::debug;

/// SocksServerConfig describes the upstream SOCKS5 server
#[derive(Debug, Clone)]
pub struct SocksServerConfig {
    pub server_addr: String,
    pub credentials: Option<Credentials>,
}

impl SocksServerConfig {
    /// new is a constructor for an unauthenticated server
    pub fn new(server_addr: impl Into<String>) -> Self {
        Self {
            server_addr: server_addr.into(),
            credentials: None,
        }
    }

    /// with_auth applies the desired username/password credentials
    pub fn with_auth(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }
}

/// UdpAssociation is the result of a UDP ASSOCIATE request: the control
/// connection, which must stay open for the association to live, and the
/// relay endpoint where datagrams are sent
#[derive(Debug)]
pub struct UdpAssociation {
    pub control: TcpStream,
    pub relay_addr: SocketAddr,
}

/// SocksClient opens tunnels through the configured SOCKS5 server
#[derive(Debug, Clone)]
pub struct SocksClient {
    config: SocksServerConfig,
}

impl SocksClient {
    pub fn new(config: SocksServerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SocksServerConfig {
        &self.config
    }

    /// connect_tcp establishes a CONNECT tunnel to `host:port`, where host
    /// may be an IP literal or a domain name resolved by the SOCKS5 server
    pub async fn connect_tcp(&self, host: &str, port: u16) -> Result<TcpStream> {
        let target = TargetAddr::new(host, port)?;
        let (stream, bound_addr) = self.connect(Command::Connect, &target).await?;

        debug!("CONNECT {} established, bound to {}", target, bound_addr);
        Ok(stream)
    }

    /// connect_udp_associate establishes a UDP ASSOCIATE session for datagrams
    /// originating from `client_addr`
    pub async fn connect_udp_associate(&self, client_addr: SocketAddr) -> Result<UdpAssociation> {
        let target = TargetAddr::from(client_addr);
        let (control, relay_addr) = self.connect(Command::UdpAssociate, &target).await?;

        debug!("UDP ASSOCIATE for {} relayed via {}", client_addr, relay_addr);
        Ok(UdpAssociation {
            control,
            relay_addr,
        })
    }

    /// connect runs the full client-side exchange on a fresh connection.
    /// On any failure the stream is dropped, closing the socket.
    async fn connect(&self, command: Command, target: &TargetAddr) -> Result<(TcpStream, SocketAddr)> {
        let mut stream = TcpStream::connect(&self.config.server_addr)
            .await
            .map_err(Error::Unreachable)?;

        auth::negotiate_auth(&mut stream, self.config.credentials.as_ref()).await?;
        commands::send_request(&mut stream, command, target).await?;
        let bound_addr = commands::read_reply(&mut stream).await?;

        Ok((stream, bound_addr))
    }
}
