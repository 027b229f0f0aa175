//! Interactive sotto client.
//!
//! # Usage
//!
//! ```bash
//! sotto --server 127.0.0.1:4433 --username alice --passphrase secret123
//! ```
//!
//! Lines typed on stdin are sealed and sent; incoming messages are printed
//! as `[user] text`. Messages sealed under a different passphrase show up
//! as a decryption notice instead of text.

use clap::Parser;
use sotto_client::{Session, SessionOutput, transport};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Sotto encrypted chat client
#[derive(Parser, Debug)]
#[command(name = "sotto")]
#[command(about = "Interactive client for the sotto encrypted chat relay")]
#[command(version)]
struct Args {
    /// Relay address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:4433")]
    server: String,

    /// Display name to declare (self-declared, unauthenticated)
    #[arg(short, long)]
    username: String,

    /// Shared passphrase the group derives its key from
    #[arg(short, long)]
    passphrase: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Key derivation happens here, locally; the passphrase never leaves the
    // process.
    let session = Session::new(args.username, &args.passphrase);

    let mut client = transport::connect(&args.server).await?;
    client.to_server.send(session.hello()?).await?;

    println!("connected to {} as {}", args.server, session.username());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            incoming = client.from_server.recv() => {
                let Some(frame) = incoming else {
                    println!("disconnected");
                    break;
                };

                match session.accept(&frame) {
                    Ok(outputs) => {
                        for output in outputs {
                            match output {
                                SessionOutput::Message { from_user, text, .. } => {
                                    println!("[{from_user}] {text}");
                                },
                                SessionOutput::Undecryptable { from_user, .. } => {
                                    println!("[{from_user}] <message failed to decrypt>");
                                },
                            }
                        }
                    },
                    Err(e) => eprintln!("bad frame from server: {e}"),
                }
            },

            typed = lines.next_line() => {
                match typed? {
                    Some(line) => {
                        let line = line.trim();
                        if !line.is_empty() {
                            client.to_server.send(session.compose(line)?).await?;
                        }
                    },
                    None => break, // stdin closed
                }
            },
        }
    }

    client.stop();
    Ok(())
}
