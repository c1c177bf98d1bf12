//! Full-chain tests: a SOCKS5 client talking through the client-mode agent
//! and the server-mode agent to a local echo destination.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use veil_relay::{client, server};

const KEY: u8 = 0x64;

/// Echo server standing in for the real destination.
async fn spawn_destination() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut conn, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut rx, mut tx) = conn.split();
                let _ = tokio::io::copy(&mut rx, &mut tx).await;
            });
        }
    });
    addr
}

/// Starts a server-mode agent and a client-mode agent chained to it; returns
/// the client agent's SOCKS5 listen address.
async fn spawn_agents(key: u8) -> SocketAddr {
    let server_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server_addr = server_listener.local_addr().unwrap();
    tokio::spawn(server::serve(server_listener, key));

    let client_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let client_addr = client_listener.local_addr().unwrap();
    tokio::spawn(client::serve(client_listener, server_addr.to_string(), key));
    client_addr
}

async fn greet(conn: &mut TcpStream) {
    conn.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut reply = [0u8; 2];
    conn.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x05, 0x00]);
}

#[tokio::test]
async fn ipv4_connect_relays_payload_end_to_end() {
    let destination = spawn_destination().await;
    let socks = spawn_agents(KEY).await;

    let mut conn = TcpStream::connect(socks).await.unwrap();
    greet(&mut conn).await;

    let mut request = vec![0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1];
    request.extend_from_slice(&destination.port().to_be_bytes());
    conn.write_all(&request).await.unwrap();

    // The reply mirrors the request's address field.
    let mut reply = [0u8; 10];
    conn.read_exact(&mut reply).await.unwrap();
    assert_eq!(&reply[..4], &[0x05, 0x00, 0x00, 0x01]);
    assert_eq!(&reply[4..], &request[4..]);

    conn.write_all(b"hello through the relay").await.unwrap();
    let mut echoed = [0u8; 23];
    conn.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"hello through the relay");
}

#[tokio::test]
async fn domain_connect_mirrors_request_and_relays() {
    let destination = spawn_destination().await;
    let socks = spawn_agents(KEY).await;

    let mut conn = TcpStream::connect(socks).await.unwrap();
    greet(&mut conn).await;

    // Dotted-quad in the domain field keeps the test free of name lookups.
    let domain = b"127.0.0.1";
    let mut request = vec![0x05, 0x01, 0x00, 0x03, domain.len() as u8];
    request.extend_from_slice(domain);
    request.extend_from_slice(&destination.port().to_be_bytes());
    conn.write_all(&request).await.unwrap();

    let mut reply = vec![0u8; domain.len() + 7];
    conn.read_exact(&mut reply).await.unwrap();
    assert_eq!(&reply[..4], &[0x05, 0x00, 0x00, 0x03]);
    assert_eq!(&reply[4..], &request[4..]);

    conn.write_all(b"ping").await.unwrap();
    let mut echoed = [0u8; 4];
    conn.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"ping");
}

#[tokio::test]
async fn large_payload_survives_both_hops_intact() {
    let destination = spawn_destination().await;
    let socks = spawn_agents(KEY).await;

    let mut conn = TcpStream::connect(socks).await.unwrap();
    greet(&mut conn).await;

    let mut request = vec![0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1];
    request.extend_from_slice(&destination.port().to_be_bytes());
    conn.write_all(&request).await.unwrap();
    let mut reply = [0u8; 10];
    conn.read_exact(&mut reply).await.unwrap();

    let payload: Vec<u8> = (0..100_000).map(|i| (i * 31 + 7) as u8).collect();
    let (mut rx, mut tx) = conn.split();
    let write = async {
        tx.write_all(&payload).await.unwrap();
    };
    let mut echoed = vec![0u8; payload.len()];
    let read = async {
        rx.read_exact(&mut echoed).await.unwrap();
    };
    tokio::join!(write, read);
    assert_eq!(echoed, payload);
}

#[tokio::test]
async fn wrong_version_greeting_aborts_the_session() {
    let socks = spawn_agents(KEY).await;

    let mut conn = TcpStream::connect(socks).await.unwrap();
    conn.write_all(&[0x04, 0x01, 0x00]).await.unwrap();

    let mut buf = [0u8; 1];
    let n = conn.read(&mut buf).await;
    assert!(matches!(n, Ok(0) | Err(_)), "expected closed connection");
}

#[tokio::test]
async fn unsupported_address_type_aborts_without_dialing_upstream() {
    // Client agent pointed at an upstream we watch ourselves.
    let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = upstream.local_addr().unwrap();

    let client_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let socks = client_listener.local_addr().unwrap();
    tokio::spawn(client::serve(
        client_listener,
        upstream_addr.to_string(),
        KEY,
    ));

    let mut conn = TcpStream::connect(socks).await.unwrap();
    greet(&mut conn).await;
    conn.write_all(&[0x05, 0x01, 0x00, 0x04]).await.unwrap();

    let mut buf = [0u8; 1];
    let n = conn.read(&mut buf).await;
    assert!(matches!(n, Ok(0) | Err(_)), "expected closed connection");

    let dialed = tokio::time::timeout(
        std::time::Duration::from_millis(200),
        upstream.accept(),
    )
    .await;
    assert!(dialed.is_err(), "upstream must not be dialed");
}

#[tokio::test]
async fn client_close_tears_down_the_whole_chain() {
    let destination = spawn_destination().await;
    let socks = spawn_agents(KEY).await;

    let mut conn = TcpStream::connect(socks).await.unwrap();
    greet(&mut conn).await;

    let mut request = vec![0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1];
    request.extend_from_slice(&destination.port().to_be_bytes());
    conn.write_all(&request).await.unwrap();
    let mut reply = [0u8; 10];
    conn.read_exact(&mut reply).await.unwrap();

    conn.write_all(b"last words").await.unwrap();
    let mut echoed = [0u8; 10];
    conn.read_exact(&mut echoed).await.unwrap();
    drop(conn);

    // The chain unwinds once its client is gone; nothing left to observe
    // beyond the agents surviving for the next session.
    let mut again = TcpStream::connect(socks).await.unwrap();
    greet(&mut again).await;
}
