//! Server-mode agent: accepts connections from the client-mode agent, reads
//! the handoff frame, and relays to the requested destination.

use anyhow::Result;
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info};

use crate::handoff;
use crate::tunnel::Tunnel;

/// Accept loop for server mode. Mirrors [`crate::client::serve`]: sessions
/// run on their own tasks, accept errors are fatal.
pub async fn serve(listener: TcpListener, key: u8) -> Result<()> {
    loop {
        let (conn, peer) = listener.accept().await?;
        tokio::spawn(async move {
            if let Err(err) = handle_session(conn, key).await {
                error!(error = ?err, %peer, "session ended with error");
            }
        });
    }
}

async fn handle_session(mut conn: TcpStream, key: u8) -> Result<()> {
    let peer = conn.peer_addr()?;
    let target = handoff::recv_target(&mut conn, key).await?;
    info!(%peer, %target, "received relay target");

    let server = TcpStream::connect(&target).await?;
    Tunnel::new(conn, server).relay(key).await
}
