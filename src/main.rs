use anyhow::Result;
use clap::{ArgEnum, Parser};
use tokio::net::TcpListener;
use tracing::info;
use veil_relay::{client, server};

#[derive(ArgEnum, Clone, Copy, Debug)]
enum Mode {
    Client,
    Server,
}

#[derive(Parser)]
#[clap(about = "Two-agent obfuscating TCP relay with a SOCKS5 front-end")]
struct Args {
    /// Run as the SOCKS5-facing client agent or the destination-facing
    /// server agent.
    #[clap(long, arg_enum, default_value = "client")]
    mode: Mode,

    /// Local listen address.
    #[clap(long, default_value = "0.0.0.0:1080")]
    listen: String,

    /// Upstream agent address (client mode only).
    #[clap(long, default_value = "127.0.0.1:1081")]
    server: String,

    /// Single-byte obfuscation key; must match on both agents.
    #[clap(long, default_value_t = 0x64)]
    key: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args: Args = Args::parse();

    let listener = TcpListener::bind(&args.listen).await?;
    info!(mode = ?args.mode, listen = %args.listen, "agent listening");

    match args.mode {
        Mode::Client => client::serve(listener, args.server, args.key).await,
        Mode::Server => server::serve(listener, args.key).await,
    }
}
