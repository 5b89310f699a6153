//! Connection ingestion.
//!
//! One task accepts connections. Each connection gets a reader task that
//! frames submissions and admits them, and a writer task that owns the write
//! half and drains the connection's outbound channel. The spooler lock is
//! taken only to register/unregister the client and to admit a job.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::monitor::Monitor;
use crate::protocol::{Response, SubmissionFramer, MAX_LINE_BYTES};
use crate::scheduler::job::{ClientId, SubmissionError};
use crate::scheduler::state::SpoolState;

/// Why a connection's reader stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disconnect {
    PeerClosed,
    ReadFailed,
    WriterGone,
    ServerClosed,
}

/// One line read off a connection.
#[derive(Debug, PartialEq, Eq)]
enum Inbound {
    Line(String),
    Undecodable,
    TooLong,
    Closed,
}

/// Accept connections until `cancel` fires. Every connection runs under a
/// child token so stopping the server closes them all.
pub async fn run_accept_loop(
    listener: TcpListener,
    state: Arc<Mutex<SpoolState>>,
    monitor: Monitor,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("Accept loop stopped");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    tokio::spawn(handle_connection(
                        stream,
                        addr,
                        state.clone(),
                        monitor.clone(),
                        cancel.child_token(),
                    ));
                }
                Err(e) => {
                    monitor.warn(format!("Failed to accept connection: {}", e));
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<Mutex<SpoolState>>,
    monitor: Monitor,
    cancel: CancellationToken,
) {
    let (read_half, write_half) = stream.into_split();
    let (tx, rx) = mpsc::unbounded_channel();

    let client = state
        .lock()
        .await
        .clients
        .register(addr, tx.clone(), cancel.clone());
    let peer = addr.to_string();
    monitor.client_connected(&peer);
    monitor.log(format!("Client connected: {}", peer));
    tracing::info!(client = %client, addr = %peer, "Connection accepted");

    let writer = tokio::spawn(run_writer(write_half, rx, cancel.clone(), peer.clone()));
    let reason = read_submissions(read_half, client, &peer, &state, &tx, &monitor, &cancel).await;

    // Already-admitted jobs stay queued; their completion is simply undeliverable.
    // Dropping the registry entry and our sender lets the writer flush what is
    // still queued (acknowledgements included) and then exit.
    let removed = state.lock().await.clients.remove(client).is_some();
    drop(tx);
    if reason == Disconnect::ReadFailed {
        cancel.cancel();
    }
    if let Err(e) = writer.await {
        tracing::warn!(addr = %peer, error = %e, "Connection writer panicked");
    }

    tracing::info!(client = %client, addr = %peer, reason = ?reason, "Connection closed");
    if removed {
        monitor.client_disconnected(&peer);
        monitor.log(format!("Client disconnected: {}", peer));
    }
}

/// Read one `\n`-terminated line, never buffering more than
/// [`MAX_LINE_BYTES`]. An oversized line is consumed and skipped in bounded
/// chunks.
async fn next_inbound<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Inbound>
where
    R: AsyncBufRead + Unpin,
{
    // One extra byte for the terminator.
    let limit = MAX_LINE_BYTES as u64 + 1;

    buf.clear();
    if (&mut *reader).take(limit).read_until(b'\n', buf).await? == 0 {
        return Ok(Inbound::Closed);
    }

    if buf.last() != Some(&b'\n') && buf.len() as u64 == limit {
        loop {
            buf.clear();
            let read = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
            if read == 0 || buf.last() == Some(&b'\n') {
                break;
            }
        }
        return Ok(Inbound::TooLong);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
    }
    match std::str::from_utf8(buf) {
        Ok(line) => Ok(Inbound::Line(line.trim_end_matches('\r').to_string())),
        Err(_) => Ok(Inbound::Undecodable),
    }
}

async fn read_submissions(
    read_half: OwnedReadHalf,
    client: ClientId,
    peer: &str,
    state: &Mutex<SpoolState>,
    outbound: &mpsc::UnboundedSender<String>,
    monitor: &Monitor,
    cancel: &CancellationToken,
) -> Disconnect {
    let mut reader = BufReader::new(read_half);
    let mut buf = Vec::new();
    let mut framer = SubmissionFramer::new();

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Disconnect::ServerClosed,
            line = next_inbound(&mut reader, &mut buf) => line,
        };

        let framed = match next {
            Ok(Inbound::Line(line)) => framer.push_line(&line),
            Ok(Inbound::Undecodable) => {
                Some(Err(framer.reject_line(SubmissionError::InvalidEncoding)))
            }
            Ok(Inbound::TooLong) => Some(Err(
                framer.reject_line(SubmissionError::LineTooLong(MAX_LINE_BYTES)),
            )),
            Ok(Inbound::Closed) => {
                if let Some(e) = framer.finish() {
                    tracing::debug!(addr = %peer, error = %e, "Dropping truncated submission");
                }
                return Disconnect::PeerClosed;
            }
            Err(e) => {
                monitor.warn(format!("Read error from {}: {}", peer, e));
                return Disconnect::ReadFailed;
            }
        };

        match framed {
            None => {}
            Some(Ok(submission)) => {
                let mut guard = state.lock().await;
                // A stop that landed while we waited owns the state now.
                if cancel.is_cancelled() {
                    return Disconnect::ServerClosed;
                }
                let queue_number = guard.admit(client, peer, submission);
                drop(guard);

                let ack = Response::Received { queue_number }.to_line();
                if outbound.send(ack).is_err() {
                    return Disconnect::WriterGone;
                }
            }
            Some(Err(e)) => {
                tracing::debug!(addr = %peer, error = %e, "Dropping malformed submission");
            }
        }
    }
}

async fn run_writer(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
    peer: String,
) {
    loop {
        tokio::select! {
            // Only a server stop or a failed read cancels; a normal close ends
            // the channel instead, so queued lines still go out.
            _ = cancel.cancelled() => break,
            line = rx.recv() => match line {
                Some(line) => {
                    if let Err(e) = writer.write_all(line.as_bytes()).await {
                        tracing::warn!(addr = %peer, error = %e, "Write to client failed");
                        cancel.cancel();
                        break;
                    }
                }
                None => break,
            }
        }
    }
    let _ = writer.shutdown().await;
}
