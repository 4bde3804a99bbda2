//! Per-connection driver: line reader, writer task, and disconnect cleanup.
//!
//! Each connection runs as two tasks. The reader (this function's task)
//! reads one line at a time and hands it to the dispatcher; the writer drains
//! the connection's outbound queue into the socket. Slow sockets therefore
//! only ever stall their own writer.

use std::{io, sync::Arc};

use huddle_proto::reply;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    sync::mpsc,
};

use crate::{
    bus::MessageBus,
    config::ConnectionConfig,
    connection::{ConnectionHandle, ConnectionId},
    dispatcher::{Dispatcher, Session},
    storage::Storage,
};

/// One result of reading from a connection.
#[derive(Debug, PartialEq, Eq)]
enum ReadLine {
    /// A complete line, newline and trailing `\r` removed
    Line(String),
    /// A line longer than the limit, discarded through its newline
    TooLong,
    /// The peer closed its side
    Eof,
}

/// Serve one connection until it closes.
///
/// Runs disconnect cleanup exactly once when the peer closes, the read
/// fails, or a reply to this connection cannot be queued. Then waits up to
/// `config.drain_timeout` for queued lines to reach the socket.
pub async fn run_connection<T, S, B>(
    stream: T,
    id: ConnectionId,
    dispatcher: Arc<Dispatcher<S, B>>,
    config: ConnectionConfig,
) where
    T: AsyncRead + AsyncWrite + Send + 'static,
    S: Storage,
    B: MessageBus,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let (handle, outbound) = ConnectionHandle::new(id, config.outbound_queue);
    let mut writer = tokio::spawn(write_loop(write_half, outbound, id));

    let mut session = Session::new(handle);
    let mut reader = BufReader::new(read_half);
    let mut buf = Vec::new();

    tracing::debug!(connection = %id, "connection opened");

    loop {
        let line = match read_line(&mut reader, &mut buf, config.max_line_bytes).await {
            Ok(ReadLine::Line(line)) => line,
            Ok(ReadLine::TooLong) => {
                tracing::debug!(connection = %id, limit = config.max_line_bytes, "line too long");
                if session.reply(reply::LINE_TOO_LONG).is_err() {
                    break;
                }
                continue;
            },
            Ok(ReadLine::Eof) => {
                tracing::debug!(connection = %id, "peer closed");
                break;
            },
            Err(e) => {
                tracing::debug!(connection = %id, error = %e, "read failed");
                break;
            },
        };

        if let Err(e) = dispatcher.handle_line(&mut session, &line) {
            tracing::warn!(connection = %id, error = %e, "closing slow or dead connection");
            break;
        }
    }

    dispatcher.disconnect(&mut session);

    // The session held the last long-lived handle; once it is gone the writer
    // sees the queue close after flushing.
    drop(session);

    match tokio::time::timeout(config.drain_timeout, &mut writer).await {
        Ok(Ok(())) => {},
        Ok(Err(e)) => tracing::error!(connection = %id, error = %e, "writer task failed"),
        Err(_) => {
            tracing::debug!(connection = %id, "drain timed out");
            writer.abort();
        },
    }

    tracing::debug!(connection = %id, "connection closed");
}

async fn write_loop<W>(mut writer: W, mut outbound: mpsc::Receiver<String>, id: ConnectionId)
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = outbound.recv().await {
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            tracing::debug!(connection = %id, error = %e, "write failed");
            return;
        }
    }

    if let Err(e) = writer.shutdown().await {
        tracing::debug!(connection = %id, error = %e, "shutdown failed");
    }
}

/// Read the next line, holding at most `max` bytes of it.
///
/// The limit applies to the line content: a `\r` before the newline does not
/// count against it.
///
/// A final line without a newline is still returned before [`ReadLine::Eof`].
/// Invalid UTF-8 is replaced rather than rejected.
async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>, max: usize) -> io::Result<ReadLine>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let mut overflow = false;

    loop {
        let (consumed, complete) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(match (overflow, buf.is_empty()) {
                    (true, _) => ReadLine::TooLong,
                    (false, true) => ReadLine::Eof,
                    (false, false) => finish(buf, max),
                });
            }

            let newline = available.iter().position(|&b| b == b'\n');
            let chunk = &available[..newline.unwrap_or(available.len())];

            if !overflow {
                // One spare byte for a trailing '\r'.
                if buf.len() + chunk.len() > max + 1 {
                    overflow = true;
                    buf.clear();
                } else {
                    buf.extend_from_slice(chunk);
                }
            }

            match newline {
                Some(i) => (i + 1, true),
                None => (available.len(), false),
            }
        };

        reader.consume(consumed);

        if complete {
            return Ok(if overflow { ReadLine::TooLong } else { finish(buf, max) });
        }
    }
}

fn finish(buf: &[u8], max: usize) -> ReadLine {
    let content = buf.strip_suffix(b"\r").unwrap_or(buf);
    if content.len() > max {
        ReadLine::TooLong
    } else {
        ReadLine::Line(String::from_utf8_lossy(content).into_owned())
    }
}
