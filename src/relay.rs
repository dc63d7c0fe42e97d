use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Size of the private buffer owned by each relay
pub const RELAY_BUFFER_SIZE: usize = 16 * 1024;

/// DataRelay copies bytes from one stream to another through its own buffer
pub struct DataRelay {
    buffer: Box<[u8]>,
    transferred: u64,
}

impl DataRelay {
    pub fn new() -> Self {
        Self {
            buffer: vec![0u8; RELAY_BUFFER_SIZE].into_boxed_slice(),
            transferred: 0,
        }
    }

    /// Bytes written to the destination so far
    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    /// run copies until the source reaches EOF or either side fails
    pub async fn run<R, W>(&mut self, from: &mut R, to: &mut W) -> io::Result<()>
    where
        R: AsyncRead + Unpin + ?Sized,
        W: AsyncWrite + Unpin + ?Sized,
    {
        loop {
            let n = from.read(&mut self.buffer).await?;
            if n == 0 {
                return Ok(());
            }

            to.write_all(&self.buffer[..n]).await?;
            self.transferred += n as u64;
        }
    }
}

impl Default for DataRelay {
    fn default() -> Self {
        Self::new()
    }
}

/// tunnel relays bytes in both directions between `local` and `upstream`.
///
/// When either direction finishes, the other one is told to stop, both write
/// sides are shut down, and the call returns once both relays are done.
/// Returns (bytes from local, bytes from upstream).
pub async fn tunnel<L, U>(local: L, upstream: U) -> (u64, u64)
where
    L: AsyncRead + AsyncWrite + Unpin,
    U: AsyncRead + AsyncWrite + Unpin,
{
    let (mut local_read, mut local_write) = tokio::io::split(local);
    let (mut upstream_read, mut upstream_write) = tokio::io::split(upstream);
    let teardown = CancellationToken::new();

    let (from_local, from_upstream) = tokio::join!(
        relay_until_teardown(&mut local_read, &mut upstream_write, &teardown, "local -> upstream"),
        relay_until_teardown(&mut upstream_read, &mut local_write, &teardown, "upstream -> local"),
    );

    (from_local, from_upstream)
}

async fn relay_until_teardown<R, W>(
    from: &mut R,
    to: &mut W,
    teardown: &CancellationToken,
    direction: &str,
) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut relay = DataRelay::new();

    select! {
        res = relay.run(from, to) => {
            if let Err(e) = res {
                debug!("{direction} relay ended: {e}");
            }
        }
        _ = teardown.cancelled() => {}
    }

    // First one out tears down both directions
    teardown.cancel();
    let _ = to.shutdown().await;

    relay.transferred()
}
