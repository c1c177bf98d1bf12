//! Two-agent obfuscating TCP relay: a SOCKS5 front-end agent and an upstream
//! agent, with every byte on the link between them XORed with a shared
//! single-byte key.

use pin_project::pin_project;
use tokio::io::{AsyncRead, AsyncWrite};

pub mod client;
pub mod handoff;
pub mod server;
pub mod socks5;
pub mod tunnel;

/// Applies the obfuscation transform to a buffer. Self-inverse: a second
/// application restores the original bytes.
pub fn xor_in_place(key: u8, bytes: &mut [u8]) {
    for b in bytes {
        *b ^= key;
    }
}

#[pin_project]
pub struct XorReader<R> {
    #[pin]
    inner: R,
    key: u8,
}

impl<R> XorReader<R> {
    pub fn new(inner: R, key: u8) -> Self {
        Self { inner, key }
    }
}

impl<R: AsyncRead> AsyncRead for XorReader<R> {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let this = self.project();
        let old = buf.filled().len();
        let result = this.inner.poll_read(cx, buf);
        let filled_buf = buf.filled_mut();
        for i in old..filled_buf.len() {
            filled_buf[i] ^= *this.key;
        }
        result
    }
}

#[pin_project]
pub struct XorWriter<W> {
    #[pin]
    inner: W,
    key: u8,
    // Reused across writes so the relay loop does not allocate per chunk.
    scratch: Vec<u8>,
}

impl<W> XorWriter<W> {
    pub fn new(inner: W, key: u8) -> Self {
        Self {
            inner,
            key,
            scratch: Vec::new(),
        }
    }
}

impl<W> AsyncWrite for XorWriter<W>
where
    W: AsyncWrite,
{
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<Result<usize, std::io::Error>> {
        let this = self.project();
        this.scratch.clear();
        this.scratch.extend(buf.iter().map(|v| v ^ *this.key));
        this.inner.poll_write(cx, this.scratch)
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), std::io::Error>> {
        let this = self.project();
        this.inner.poll_flush(cx)
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), std::io::Error>> {
        let this = self.project();
        this.inner.poll_shutdown(cx)
    }
}
