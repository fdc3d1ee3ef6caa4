#![forbid(unsafe_code)]

//! Confab relay - blind envelope forwarder for end-to-end encrypted chat.
//!
//! The relay:
//! 1. Tracks who is online in a volatile in-memory directory
//! 2. Hands out registered public keys on request
//! 3. Forwards wrapped keys and ciphertexts between peers
//! 4. Never decrypts traffic (session keys exist only on the clients)

use std::net::SocketAddr;

use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "confab-relay")]
#[command(about = "Confab relay - forwards encrypted envelopes between online peers")]
struct Args {
    /// Listen address
    #[arg(long, env = "CONFAB_LISTEN", default_value = "127.0.0.1:3000")]
    listen: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<()> {
    confab_common::init_tracing();
    let args = Args::parse();

    let listener = TcpListener::bind(args.listen).await?;
    let addr = listener.local_addr()?;
    info!("confab-relay listening on ws://{}/ws", addr);

    confab_relay::serve(listener, confab_relay::new_state()).await?;
    Ok(())
}
