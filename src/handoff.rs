//! The one-shot frame that carries the destination address from the
//! front-end agent to the upstream agent: a length byte followed by that many
//! obfuscated ASCII bytes.

use anyhow::{anyhow, ensure, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::xor_in_place;

/// The one-byte length prefix caps a target address at 255 bytes.
pub const MAX_TARGET_LEN: usize = 255;

pub async fn send_target(
    mut stream: impl AsyncWrite + Unpin,
    key: u8,
    target: &str,
) -> Result<()> {
    ensure!(
        target.len() <= MAX_TARGET_LEN,
        "target address too long: {} bytes",
        target.len()
    );
    let mut frame = Vec::with_capacity(target.len() + 1);
    frame.push(target.len() as u8);
    frame.extend_from_slice(target.as_bytes());
    xor_in_place(key, &mut frame[1..]);
    stream.write_all(&frame).await?;
    Ok(())
}

pub async fn recv_target(mut stream: impl AsyncRead + Unpin, key: u8) -> Result<String> {
    let len = stream.read_u8().await? as usize;
    let mut addr = vec![0u8; len];
    stream.read_exact(&mut addr).await?;
    xor_in_place(key, &mut addr);
    String::from_utf8(addr).map_err(|_| anyhow!("target address is not valid utf-8"))
}
