//! Client-mode agent: accepts SOCKS5 connections from local applications and
//! forwards each session to the upstream agent.

use anyhow::Result;
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info};

use crate::handoff;
use crate::socks5::{ConnectReply, ConnectRequest, Greeting, MethodSelection};
use crate::tunnel::Tunnel;

/// Accept loop for client mode. Each accepted connection runs its handshake
/// and relay on its own task; a session failure never reaches this loop. An
/// accept error is fatal and propagates to the caller.
pub async fn serve(listener: TcpListener, upstream: String, key: u8) -> Result<()> {
    loop {
        let (conn, peer) = listener.accept().await?;
        let upstream = upstream.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_session(conn, &upstream, key).await {
                error!(error = ?err, %peer, "session ended with error");
            }
        });
    }
}

async fn handle_session(mut conn: TcpStream, upstream: &str, key: u8) -> Result<()> {
    let peer = conn.peer_addr()?;
    Greeting::parse(&mut conn).await?;
    MethodSelection::no_auth().send(&mut conn).await?;

    let request = ConnectRequest::parse(&mut conn).await?;
    ConnectReply::mirror(&request).send(&mut conn).await?;
    info!(%peer, target = %request.target, "socks5 handshake complete");

    let mut server = TcpStream::connect(upstream).await?;
    handoff::send_target(&mut server, key, &request.target).await?;

    Tunnel::new(conn, server).relay(key).await
}
