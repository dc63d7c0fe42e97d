//! An HTTP proxy front end that tunnels every connection through a SOCKS5 server
//!
//! ## HTTP bridge
//!
//! - Features:
//!     - CONNECT tunnelling (opaque byte streams, no TLS inspection)
//!     - Plain proxied requests replayed unmodified through the tunnel
//!     - 503 reply when the SOCKS5 tunnel cannot be opened
//!     - One tokio task per connection, no connection cap
//!     - Start/stop/restart on an ephemeral loopback port
//!
//! ## SOCKS5 client
//!
//! - Features:
//!     - CONNECT
//!     - UDP ASSOCIATE
//!     - No Authentication
//!     - Username/Password Authentication
//!     - IPv4, IPv6 and domain name targets
//! - [SOCKS5 (RFC 1928)](https://datatracker.ietf.org/doc/html/rfc1928)
//! - [Username/Password Authentication (RFC 1929)](https://datatracker.ietf.org/doc/html/rfc1929)
//!
//! # Example
//! ```no_run
//! use socksbridge::{DestinationResolver, ProxyBridge, SocksClient, SocksServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = SocksClient::new(SocksServerConfig::new("127.0.0.1:1080"));
//!     let mut bridge = ProxyBridge::new(client);
//!     bridge.start().await?;
//!
//!     let proxy = bridge.resolve(&"http://example.com/".parse::<url::Url>()?)?;
//!     println!("point your HTTP client at {proxy}");
//!     Ok(())
//! }
//! ```

pub mod address;
pub mod auth;
pub mod bridge;
pub mod client;
pub mod commands;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod request;
pub mod resolver;
pub mod search;

// Re-export main types at crate root for convenience
pub use auth::Credentials;
pub use bridge::{BridgeState, ProxyBridge};
pub use client::{SocksClient, SocksServerConfig, UdpAssociation};
pub use error::{Error, Result};
pub use protocol::{AddressType, Command, ReplyStatus};
pub use relay::DataRelay;
pub use request::ProxiedRequest;
pub use resolver::DestinationResolver;
pub use search::find_sequence;
