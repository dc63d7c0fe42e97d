//! Fetches a page through the bridge twice: once as a plain proxied GET and
//! once through a CONNECT tunnel.
//!
//! cargo run --example fetch -- 127.0.0.1:1080 example.com

use socksbridge::{ProxyBridge, SocksClient, SocksServerConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let socks_server = args.next().unwrap_or_else(|| "127.0.0.1:1080".to_string());
    let host = args.next().unwrap_or_else(|| "example.com".to_string());

    let mut bridge = ProxyBridge::new(SocksClient::new(SocksServerConfig::new(socks_server)));
    let proxy_addr = bridge.start().await?;

    println!("plain GET http://{host}/");
    let mut stream = TcpStream::connect(proxy_addr).await?;
    let request = format!(
        "GET http://{host}/ HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n"
    );
    stream.write_all(request.as_bytes()).await?;
    print_response(&mut stream).await?;

    println!("CONNECT {host}:80");
    let mut stream = TcpStream::connect(proxy_addr).await?;
    let connect = format!("CONNECT {host}:80 HTTP/1.1\r\nHost: {host}:80\r\n\r\n");
    let request = format!("GET / HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n");
    // The GET rides along with the CONNECT and is forwarded once the tunnel opens
    stream.write_all(connect.as_bytes()).await?;
    stream.write_all(request.as_bytes()).await?;
    print_response(&mut stream).await?;

    bridge.stop().await;
    Ok(())
}

async fn print_response(stream: &mut TcpStream) -> Result<(), Box<dyn std::error::Error>> {
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await?;
    println!("{}\n", String::from_utf8_lossy(&response));
    Ok(())
}
