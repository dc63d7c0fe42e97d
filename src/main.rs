use anyhow::{Result, bail};
use clap::Parser;
use socksbridge::{Credentials, DestinationResolver, ProxyBridge, SocksClient, SocksServerConfig};
use tracing::info;
use url::Url;

#[derive(Parser, Debug)]
#[command(author, version, about = "An HTTP proxy that tunnels through a SOCKS5 server", long_about = None)]
struct Args {
    /// Upstream SOCKS5 server address
    #[arg(short, long, default_value = "127.0.0.1:1080")]
    socks_server: String,

    /// Local HTTP proxy listener address
    #[arg(short, long, default_value = "127.0.0.1:0")]
    listen: String,

    /// Username for the SOCKS5 server
    #[arg(short, long)]
    username: Option<String>,

    /// Password for the SOCKS5 server
    #[arg(short, long)]
    password: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse args
    let args = Args::parse();

    // Initialize tracing subscriber
    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt().with_max_level(level).init();

    // Check for auth and grab it if present
    let credentials = match (args.username, args.password) {
        (Some(u), Some(p)) => {
            info!("Authentication enabled");
            Credentials::new(u, p)
        }
        (None, None) => None,
        _ => bail!("[ERR] must provide both username and password (or neither)"),
    };

    let config = SocksServerConfig::new(args.socks_server).with_auth(credentials);
    info!("Tunnelling through SOCKS5 server {}", config.server_addr);

    let mut bridge = ProxyBridge::new(SocksClient::new(config)).with_listen_addr(args.listen);
    bridge.start().await?;

    let proxy = bridge.resolve(&Url::parse("http://localhost/")?)?;
    info!("HTTP proxy ready: {}", proxy);

    // Serve until interrupted
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    bridge.stop().await;

    Ok(())
}
