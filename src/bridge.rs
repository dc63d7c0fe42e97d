use crate::{
    client::SocksClient,
    error::{Error, Result},
    relay,
    request::ProxiedRequest,
    resolver::DestinationResolver,
    search::find_sequence,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpListener,
    select,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Largest request header block accepted from a local client
pub const MAX_HEADER_SIZE: usize = 16 * 1024;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// BridgeState tracks whether the bridge currently owns a listener
#[derive(Debug, Default)]
pub enum BridgeState {
    #[default]
    Stopped,
    Running(Listening),
}

/// Listening is the live half of a running bridge: the bound endpoint and
/// the accept loop serving it
#[derive(Debug)]
pub struct Listening {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    accept_task: JoinHandle<()>,
}

impl Listening {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// ProxyBridge is a local HTTP proxy whose every connection is tunnelled
/// through a SOCKS5 server
pub struct ProxyBridge {
    client: Arc<SocksClient>,
    listen_addr: String,
    state: BridgeState,
}

impl ProxyBridge {
    /// new creates a stopped bridge that will listen on an ephemeral loopback port
    pub fn new(client: SocksClient) -> Self {
        Self {
            client: Arc::new(client),
            listen_addr: "127.0.0.1:0".to_string(),
            state: BridgeState::Stopped,
        }
    }

    /// with_listen_addr overrides the address bound on start
    pub fn with_listen_addr(mut self, listen_addr: impl Into<String>) -> Self {
        self.listen_addr = listen_addr.into();
        self
    }

    pub fn state(&self) -> &BridgeState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, BridgeState::Running(_))
    }

    /// local_addr is the intercept endpoint, only known while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.state {
            BridgeState::Running(listening) => Some(listening.local_addr),
            BridgeState::Stopped => None,
        }
    }

    /// start binds the listener and launches the accept loop. A running
    /// bridge is stopped first, so at most one listener is ever active.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        self.stop().await;

        // Instantiate tokio listener
        let listener = TcpListener::bind(&self.listen_addr).await?;
        let local_addr = listener.local_addr()?;

        info!("HTTP proxy listening on {}", local_addr);

        let cancel = CancellationToken::new();
        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.client),
            cancel.clone(),
        ));

        self.state = BridgeState::Running(Listening {
            local_addr,
            cancel,
            accept_task,
        });

        Ok(local_addr)
    }

    /// stop ends the accept loop and closes the listener. Connections that
    /// were already accepted carry on until they finish.
    pub async fn stop(&mut self) {
        if let BridgeState::Running(listening) = std::mem::take(&mut self.state) {
            listening.cancel.cancel();

            // The listener is dropped when the loop exits
            if let Err(e) = listening.accept_task.await {
                warn!("accept loop ended abnormally: {}", e);
            }

            info!("HTTP proxy on {} stopped", listening.local_addr);
        }
    }
}

impl Drop for ProxyBridge {
    fn drop(&mut self) {
        if let BridgeState::Running(listening) = &self.state {
            listening.cancel.cancel();
        }
    }
}

impl DestinationResolver for ProxyBridge {
    fn resolve(&self, _destination: &Url) -> Result<Url> {
        let local_addr = self.local_addr().ok_or_else(|| {
            Error::InvalidState("the bridge must be started before it is used".to_string())
        })?;

        Url::parse(&format!("http://{local_addr}"))
            .map_err(|e| Error::InvalidArgument(format!("invalid intercept endpoint: {e}")))
    }

    fn is_bypassed(&self, _host: &Url) -> bool {
        false
    }
}

/// accept_loop hands each accepted connection to its own task until cancelled
async fn accept_loop(listener: TcpListener, client: Arc<SocksClient>, cancel: CancellationToken) {
    loop {
        let accepted = select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((inbound, peer_addr)) => {
                let client = Arc::clone(&client);

                tokio::spawn(async move {
                    debug!("new client: {}", peer_addr);

                    if let Err(e) = handle_connection(inbound, &client).await {
                        warn!("connection from {} failed: {}", peer_addr, e);
                    }
                });
            }
            // Accepting is best effort; keep serving
            Err(e) => warn!("failed to accept connection: {}", e),
        }
    }
}

/// handle_connection runs the per-connection pipeline: read the request head,
/// open the SOCKS5 tunnel, answer the client and relay until either side closes
pub async fn handle_connection<S>(mut local: S, client: &SocksClient) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; MAX_HEADER_SIZE];
    let (total, header_end) = read_request_head(&mut local, &mut buf).await?;

    let request = ProxiedRequest::parse(&buf[..header_end])?;
    debug!(
        host = %request.host,
        port = request.port,
        connect = request.is_connect,
        "opening tunnel"
    );

    let mut upstream = match client.connect_tcp(&request.host, request.port).await {
        Ok(upstream) => upstream,
        Err(e) => {
            if let Err(write_err) = local.write_all(request.unavailable().as_bytes()).await {
                debug!("failed to send 503 to client: {}", write_err);
            }
            return Err(e);
        }
    };

    if request.is_connect {
        local.write_all(request.established().as_bytes()).await?;

        // The client may have pipelined data right after its CONNECT
        let body_start = header_end + HEADER_TERMINATOR.len();
        if total > body_start {
            upstream.write_all(&buf[body_start..total]).await?;
        }
    } else {
        // Replay the original request untouched
        upstream.write_all(&buf[..total]).await?;
    }
    drop(buf);

    let (from_client, from_server) = relay::tunnel(local, upstream).await;

    info!(
        "connection to {}:{} closed: {} bytes from client, {} bytes from server",
        request.host, request.port, from_client, from_server
    );

    Ok(())
}

/// read_request_head reads into `buf` until the header terminator shows up.
/// Returns the number of bytes read and the index of the terminator.
async fn read_request_head<S>(stream: &mut S, buf: &mut [u8]) -> Result<(usize, usize)>
where
    S: AsyncRead + Unpin,
{
    let mut total = 0;

    while total < buf.len() {
        let n = stream.read(&mut buf[total..]).await?;
        if n == 0 {
            return Err(Error::MalformedRequest(
                "connection closed before request headers were complete".to_string(),
            ));
        }

        // The terminator may straddle two reads
        let search_from = total.saturating_sub(HEADER_TERMINATOR.len() - 1);
        total += n;

        if let Some(index) = find_sequence(&buf[search_from..total], HEADER_TERMINATOR)? {
            return Ok((total, search_from + index));
        }
    }

    Err(Error::MalformedRequest(format!(
        "request headers exceed {} bytes",
        buf.len()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SocksServerConfig;
    use tokio::net::TcpStream;
    use tokio_test::io::Builder;

    fn bridge() -> ProxyBridge {
        ProxyBridge::new(SocksClient::new(SocksServerConfig::new("127.0.0.1:1080")))
    }

    #[tokio::test]
    async fn test_read_head_across_reads() {
        let mut stream = Builder::new()
            .read(b"GET / HTTP/1.1\r\nHost: a\r")
            .read(b"\n\r")
            .read(b"\nextra")
            .build();
        let mut buf = vec![0u8; MAX_HEADER_SIZE];

        let (total, header_end) = read_request_head(&mut stream, &mut buf).await.unwrap();
        assert_eq!(&buf[..header_end], b"GET / HTTP/1.1\r\nHost: a");
        assert_eq!(&buf[header_end..total], b"\r\n\r\nextra");
    }

    #[tokio::test]
    async fn test_read_head_closed_early() {
        let mut stream = Builder::new().read(b"GET / HTTP/1.1\r\n").build();
        let mut buf = vec![0u8; MAX_HEADER_SIZE];

        let err = read_request_head(&mut stream, &mut buf).await.unwrap_err();
        assert!(matches!(err, Error::MalformedRequest(_)));
    }

    #[tokio::test]
    async fn test_read_head_too_large() {
        let mut stream = Builder::new().read(&[b'a'; 32]).build();
        let mut buf = vec![0u8; 32];

        let err = read_request_head(&mut stream, &mut buf).await.unwrap_err();
        assert!(matches!(err, Error::MalformedRequest(_)));
    }

    #[tokio::test]
    async fn test_resolve_requires_running_bridge() {
        let mut bridge = bridge();
        let destination = Url::parse("http://example.com/").unwrap();

        assert!(matches!(
            bridge.resolve(&destination),
            Err(Error::InvalidState(_))
        ));

        let local_addr = bridge.start().await.unwrap();
        let expected = Url::parse(&format!("http://{local_addr}")).unwrap();
        assert_eq!(bridge.resolve(&destination).unwrap(), expected);
        assert_eq!(bridge.resolve(&destination).unwrap(), expected);
        assert!(!bridge.is_bypassed(&destination));

        bridge.stop().await;
        assert!(!bridge.is_running());
        assert!(matches!(
            bridge.resolve(&destination),
            Err(Error::InvalidState(_))
        ));
        assert!(!bridge.is_bypassed(&destination));
    }

    #[tokio::test]
    async fn test_stop_closes_listener() {
        let mut bridge = bridge();
        let local_addr = bridge.start().await.unwrap();
        assert!(TcpStream::connect(local_addr).await.is_ok());

        bridge.stop().await;
        assert!(bridge.local_addr().is_none());
        assert!(TcpStream::connect(local_addr).await.is_err());
    }

    #[tokio::test]
    async fn test_restart_replaces_listener() {
        let mut bridge = bridge();
        let first = bridge.start().await.unwrap();
        let second = bridge.start().await.unwrap();

        assert_eq!(bridge.local_addr(), Some(second));
        if first != second {
            assert!(TcpStream::connect(first).await.is_err());
        }
        assert!(TcpStream::connect(second).await.is_ok());
    }
}
