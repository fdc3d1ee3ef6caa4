#![forbid(unsafe_code)]

//! Confab client - minimal terminal front for end-to-end encrypted chat.
//!
//! Commands:
//!   /peers         list who is online
//!   /chat <peer>   start (or resume) a secure conversation
//!   /history       replay the active conversation
//!   /quit          exit
//!
//! Any other input line is encrypted and sent to the active peer.

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use confab_client::{ChatClient, ClientEvent, RelayConnection};

#[derive(Parser, Debug)]
#[command(name = "confab-client")]
#[command(about = "Confab client - end-to-end encrypted chat over a blind relay")]
struct Args {
    /// Relay WebSocket URL
    #[arg(long, env = "CONFAB_RELAY_URL", default_value = "ws://127.0.0.1:3000/ws")]
    relay_url: String,

    /// Username to register
    #[arg(long)]
    username: String,
}

fn print_history(client: &ChatClient, peer: &str) {
    for entry in client.history(peer) {
        println!("[{}] {}", entry.sender, entry.text);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    confab_common::init_tracing();
    let args = Args::parse();

    let mut client = ChatClient::new(args.username);
    let mut conn = RelayConnection::connect(&args.relay_url).await?;
    conn.send(&client.register_envelope()).await?;
    println!("registered as {}", client.username());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut active: Option<String> = None;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                if let Some(peer) = line.strip_prefix("/chat ") {
                    let peer = peer.trim().to_string();
                    match client.request_session(&peer) {
                        Some(request) => {
                            conn.send(&request).await?;
                            println!("starting secure chat with {}, requesting key...", peer);
                        }
                        None => {
                            println!("resuming secure chat with {}", peer);
                            print_history(&client, &peer);
                        }
                    }
                    active = Some(peer);
                } else if line == "/peers" {
                    for user in client.roster() {
                        if user != client.username() {
                            println!("{}", user);
                        }
                    }
                } else if line == "/history" {
                    match &active {
                        Some(peer) => print_history(&client, peer),
                        None => println!("no active conversation"),
                    }
                } else if line == "/quit" {
                    break;
                } else {
                    match &active {
                        Some(peer) => match client.send_message(peer, line) {
                            Ok(envelope) => conn.send(&envelope).await?,
                            Err(err) => println!("cannot send: {}", err),
                        },
                        None => println!("no active conversation; use /chat <peer>"),
                    }
                }
            }

            envelope = conn.recv() => {
                let (event, outbound) = client.handle_event(envelope?);
                if let Some(outbound) = outbound {
                    conn.send(&outbound).await?;
                }

                match event {
                    ClientEvent::Presence { users } => {
                        let others: Vec<&str> = users
                            .iter()
                            .filter(|u| *u != client.username())
                            .map(String::as_str)
                            .collect();
                        println!("online: {}", others.join(", "));
                    }
                    ClientEvent::SessionEstablished { peer } => {
                        println!("secure session with {} established", peer);
                        if active.is_none() {
                            active = Some(peer);
                        }
                    }
                    ClientEvent::SessionFailed { peer } => {
                        println!("could not establish a secure session with {}", peer);
                    }
                    ClientEvent::Message { from, text } => {
                        if active.as_deref() == Some(from.as_str()) {
                            println!("[{}] {}", from, text);
                        } else {
                            println!("(new message from {}; /chat {} to view)", from, from);
                        }
                    }
                    ClientEvent::MessageDiscarded { .. } => {}
                }
            }
        }
    }

    Ok(())
}
