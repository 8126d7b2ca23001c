//! Frame listener for real-time clients
//!
//! Accepts TCP connections and speaks one JSON frame per line in both
//! directions (frames themselves contain no newlines). Each connection
//! gets a reader task feeding the engine's session channel and a writer
//! task draining a per-connection frame queue, so a slow client can never
//! stall the engine or other clients.

use crate::services::engine::SessionMsg;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

/// Outbound frames buffered per connection before drops start
const FRAME_QUEUE_SIZE: usize = 256;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Accept connections until shutdown is signalled
pub async fn start_listener(
    addr: String,
    session_tx: mpsc::Sender<SessionMsg>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "listener_started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("listener_shutdown");
                    return Ok(());
                }
            }
            result = listener.accept() => {
                match result {
                    Ok((socket, peer)) => {
                        let conn_id = NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed);
                        debug!(conn_id = %conn_id, peer = %peer, "conn_accepted");
                        let tx = session_tx.clone();
                        tokio::spawn(async move {
                            handle_connection(socket, conn_id, tx).await;
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "listener_accept_failed");
                    }
                }
            }
        }
    }
}

async fn handle_connection(
    socket: tokio::net::TcpStream,
    conn_id: u64,
    session_tx: mpsc::Sender<SessionMsg>,
) {
    let (read_half, write_half) = socket.into_split();
    let (frame_tx, frame_rx) = mpsc::channel::<String>(FRAME_QUEUE_SIZE);

    // Register with the engine before reading anything so initial_data is
    // queued ahead of any event caused by this connection's own commands
    if session_tx.send(SessionMsg::Connected { conn_id, tx: frame_tx }).await.is_err() {
        return;
    }

    let writer = tokio::spawn(write_frames(write_half, frame_rx, conn_id));

    let reader = BufReader::new(read_half);
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                if session_tx.send(SessionMsg::Line { conn_id, line }).await.is_err() {
                    break;
                }
            }
            Ok(None) => break, // peer closed
            Err(e) => {
                debug!(conn_id = %conn_id, error = %e, "conn_read_failed");
                break;
            }
        }
    }

    let _ = session_tx.send(SessionMsg::Disconnected { conn_id }).await;
    writer.abort();
    debug!(conn_id = %conn_id, "conn_reader_finished");
}

/// Drain the per-connection queue onto the socket, one frame per line
async fn write_frames(
    write_half: tokio::net::tcp::OwnedWriteHalf,
    mut frame_rx: mpsc::Receiver<String>,
    conn_id: u64,
) {
    let mut writer = BufWriter::new(write_half);
    while let Some(frame) = frame_rx.recv().await {
        if writer.write_all(frame.as_bytes()).await.is_err() {
            break;
        }
        if writer.write_all(b"\n").await.is_err() {
            break;
        }
        if writer.flush().await.is_err() {
            break;
        }
    }
    debug!(conn_id = %conn_id, "conn_writer_finished");
}
