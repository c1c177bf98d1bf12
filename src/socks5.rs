//! The SOCKS5 subset spoken to local applications: no-auth negotiation and
//! CONNECT requests with IPv4 or domain addressing.

use anyhow::{anyhow, bail, Result};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const VERSION: u8 = 0x05;

#[derive(IntoPrimitive, TryFromPrimitive, Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum Method {
    NoAuth = 0x00,
    Gssapi = 0x01,
    UserPass = 0x02,
    NoAcceptable = 0xFF,
}

#[derive(IntoPrimitive, TryFromPrimitive, Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum Command {
    Connect = 0x01,
    Bind = 0x02,
    UdpAssociate = 0x03,
}

#[derive(IntoPrimitive, TryFromPrimitive, Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum AddrType {
    IPv4 = 0x01,
    DomainName = 0x03,
    IPv6 = 0x04,
}

#[derive(IntoPrimitive, TryFromPrimitive, Debug, Clone, Copy)]
#[repr(u8)]
pub enum Reply {
    Succeeded = 0x00,
    GeneralFailure = 0x01,
    ConnectionNotAllowed = 0x02,
    NetworkUnreachable = 0x03,
    HostUnreachable = 0x04,
    ConnectionRefused = 0x05,
    TtlExpired = 0x06,
    CommandNotSupported = 0x07,
    AddressTypeNotSupported = 0x08,
}

/// Opening greeting. Only the single-method no-auth form `[5, 1, 0]` is
/// accepted; there is no alternate method negotiation.
#[derive(Debug)]
pub struct Greeting;

impl Greeting {
    pub async fn parse(mut stream: impl AsyncRead + Unpin) -> Result<Self> {
        let mut buf = [0u8; 3];
        stream.read_exact(&mut buf).await?;
        if buf[0] != VERSION {
            bail!("unsupported version: {}", buf[0]);
        }
        if buf[1] != 1 {
            bail!("expected exactly one auth method, got {}", buf[1]);
        }
        let method =
            Method::try_from(buf[2]).map_err(|_| anyhow!("invalid method: {:#04x}", buf[2]))?;
        if method != Method::NoAuth {
            bail!("unsupported auth method: {:?}", method);
        }
        Ok(Self)
    }
}

pub struct MethodSelection {
    pub method: Method,
}

impl MethodSelection {
    pub fn no_auth() -> Self {
        Self {
            method: Method::NoAuth,
        }
    }

    pub async fn send(&self, mut stream: impl AsyncWrite + Unpin) -> Result<()> {
        stream.write_all(&[VERSION, self.method.into()]).await?;
        Ok(())
    }
}

/// A parsed CONNECT request. BIND and UDP-ASSOCIATE are rejected at parse
/// time, as are address types other than IPv4 and domain.
pub struct ConnectRequest {
    pub addr_type: AddrType,
    /// The address field exactly as received (including the length byte for
    /// domains), echoed back verbatim in the reply.
    pub echo: Vec<u8>,
    /// Destination in `host:port` form.
    pub target: String,
}

impl ConnectRequest {
    pub async fn parse(mut stream: impl AsyncRead + Unpin) -> Result<Self> {
        let mut head = [0u8; 4];
        stream.read_exact(&mut head).await?;
        if head[0] != VERSION {
            bail!("unsupported version: {}", head[0]);
        }
        let command =
            Command::try_from(head[1]).map_err(|_| anyhow!("invalid command: {:#04x}", head[1]))?;
        if command != Command::Connect {
            bail!("unsupported command: {:?}", command);
        }
        let addr_type = AddrType::try_from(head[3])
            .map_err(|_| anyhow!("invalid address type: {:#04x}", head[3]))?;
        let (echo, target) = match addr_type {
            AddrType::IPv4 => {
                let mut buf = [0u8; 6];
                stream.read_exact(&mut buf).await?;
                let port = u16::from_be_bytes([buf[4], buf[5]]);
                let target = format!("{}.{}.{}.{}:{}", buf[0], buf[1], buf[2], buf[3], port);
                (buf.to_vec(), target)
            }
            AddrType::DomainName => {
                let len = stream.read_u8().await? as usize;
                let mut buf = vec![0u8; len + 2];
                stream.read_exact(&mut buf).await?;
                let domain = std::str::from_utf8(&buf[..len])
                    .map_err(|_| anyhow!("domain is not valid utf-8"))?;
                let port = u16::from_be_bytes([buf[len], buf[len + 1]]);
                let target = format!("{}:{}", domain, port);
                let mut echo = Vec::with_capacity(len + 3);
                echo.push(len as u8);
                echo.extend_from_slice(&buf);
                (echo, target)
            }
            AddrType::IPv6 => {
                bail!("unsupported address type: {:?}", addr_type);
            }
        };
        Ok(Self {
            addr_type,
            echo,
            target,
        })
    }
}

pub struct ConnectReply {
    pub reply: Reply,
    pub addr_type: AddrType,
    pub addr: Vec<u8>,
}

impl ConnectReply {
    /// Success reply echoing the request's address field verbatim, rather
    /// than reporting a locally bound address.
    pub fn mirror(request: &ConnectRequest) -> Self {
        Self {
            reply: Reply::Succeeded,
            addr_type: request.addr_type,
            addr: request.echo.clone(),
        }
    }

    pub async fn send(&self, mut stream: impl AsyncWrite + Unpin) -> Result<()> {
        let mut buf = Vec::with_capacity(4 + self.addr.len());
        buf.extend_from_slice(&[VERSION, self.reply.into(), 0x00, self.addr_type.into()]);
        buf.extend_from_slice(&self.addr);
        stream.write_all(&buf).await?;
        Ok(())
    }
}
