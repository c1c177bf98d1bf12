//! One end-to-end session: the paired client and server connections and the
//! two directional pumps that move obfuscated bytes between them.

use anyhow::Result;
use tokio::io::{self, AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::{XorReader, XorWriter};

/// Owns both connections of one session. Constructed only once the peer dial
/// has succeeded, so the relay never sees a half-paired state; dropping it
/// (or returning from [`Tunnel::relay`]) releases both connections.
pub struct Tunnel<C, S> {
    client: C,
    server: S,
}

impl<C, S> Tunnel<C, S>
where
    C: AsyncRead + AsyncWrite + Unpin,
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(client: C, server: S) -> Self {
        Self { client, server }
    }

    /// Runs both relay directions until the session ends. Every byte sent to
    /// or read from the server connection passes through the obfuscation
    /// codec; client-side bytes are relayed untouched.
    ///
    /// A direction that reaches clean EOF shuts down its write side so the
    /// half-close propagates; the first I/O error cancels the sibling
    /// direction. Both connections are released on return.
    pub async fn relay(self, key: u8) -> Result<()> {
        let (mut client_rx, mut client_tx) = io::split(self.client);
        let (server_rx, server_tx) = io::split(self.server);
        let mut server_rx = XorReader::new(server_rx, key);
        let mut server_tx = XorWriter::new(server_tx, key);

        let outbound = async {
            let n = io::copy(&mut client_rx, &mut server_tx).await?;
            server_tx.shutdown().await?;
            Ok::<_, std::io::Error>(n)
        };
        let inbound = async {
            let n = io::copy(&mut server_rx, &mut client_tx).await?;
            client_tx.shutdown().await?;
            Ok::<_, std::io::Error>(n)
        };

        let (sent, received) = tokio::try_join!(outbound, inbound)?;
        debug!(sent, received, "tunnel closed");
        Ok(())
    }
}
