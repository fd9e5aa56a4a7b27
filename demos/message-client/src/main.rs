//! Self-contained demo: a tiny loopback "echo peer" plus a wirepack client
//! talking to it.
//!
//! The peer speaks the standard package set by hand — read the 2-byte
//! identifier, frame the payload, echo messages back — which doubles as a
//! demonstration of how simple the wire format is to implement on the other
//! side.
//!
//! Run with `cargo run -p message-client`. Set `RUST_LOG=wirepack=debug`
//! to watch the engine at work.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use wirepack::protocol::{Package, base};
use wirepack::{Client, ClientConnection, DisconnectHandler, HandlerError, ReceiveHandler};

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Prints message packages and forwards them to the main task.
struct PrintMessages {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl ReceiveHandler for PrintMessages {
    async fn on_receive(
        &self,
        package: &Package,
        _connection: &ClientConnection,
    ) -> Result<(), HandlerError> {
        if package.id == base::MESSAGE {
            let text = base::message_text(package);
            println!("peer says: {text}");
            let _ = self.tx.send(text);
        }
        Ok(())
    }
}

struct LogDisconnect;

#[async_trait]
impl DisconnectHandler for LogDisconnect {
    async fn on_disconnect(&self, connection: &ClientConnection) {
        println!("connection to {} closed", connection.peer());
    }
}

// ---------------------------------------------------------------------------
// The echo peer
// ---------------------------------------------------------------------------

/// A minimal server-side implementation of the standard package set:
/// ignores keep-alives, echoes messages, closes on close-connection.
async fn run_echo_peer(mut stream: TcpStream) -> std::io::Result<()> {
    loop {
        let mut raw_id = [0u8; 2];
        stream.read_exact(&mut raw_id).await?;

        match u16::from_be_bytes(raw_id) {
            0x0001 => {} // keep alive: nothing to do
            0x0002 => return Ok(()),
            0x0006 => {
                let mut prefix = [0u8; 4];
                stream.read_exact(&mut prefix).await?;
                let mut payload = vec![0u8; u32::from_be_bytes(prefix) as usize];
                stream.read_exact(&mut payload).await?;

                let text = String::from_utf8_lossy(&payload);
                let reply = base::message(&format!("echo: {text}"));
                stream.write_all(&reply.encode()).await?;
            }
            other => {
                tracing::warn!(id = format!("0x{other:04X}"), "peer: unexpected package");
                return Ok(());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wirepack=info".into()),
        )
        .init();

    // Start the loopback peer.
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        if let Ok((stream, peer)) = listener.accept().await {
            tracing::info!(%peer, "peer: accepted connection");
            if let Err(error) = run_echo_peer(stream).await {
                tracing::warn!(%error, "peer: connection ended");
            }
        }
    });

    // Connect the client with handlers wired up front.
    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = Client::builder()
        .address(addr.to_string())
        .read_timeout(Duration::from_secs(10))
        .on_receive(Arc::new(PrintMessages { tx }))
        .on_disconnect(Arc::new(LogDisconnect))
        .connect()
        .await?;

    client.send(&base::keep_alive()).await?;
    client.send(&base::message("hello over the wire")).await?;

    // Wait for the echo before hanging up.
    let echoed = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await?
        .ok_or("echo never arrived")?;
    println!("round trip complete: {echoed:?}");

    client.send(&base::close_connection()).await?;
    client.disable().await;

    Ok(())
}
