//! Per-connection handler.
//!
//! Reads RESP frames from a TCP stream, dispatches each command line
//! through the routing layer with this connection's session, and writes
//! responses back. Supports pipelining by draining every complete frame
//! a single read produced before flushing the batched replies.
//!
//! Protocol errors are answered, not fatal: the reply goes out, the
//! parser skips to the next frame boundary, and the loop continues.
//! Only EOF (or an I/O error) ends the connection.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use cinder_core::{Dispatch, Session};
use cinder_protocol::{parse_frame, reply, resync_len, Frame};

/// Initial buffer capacity. 4KB covers most command lines comfortably
/// without over-allocating for simple PING/SET/GET workloads.
const BUF_CAPACITY: usize = 4096;

/// Maximum read buffer size before we disconnect the client. Prevents
/// a single slow or malicious client from consuming unbounded memory
/// with incomplete frames.
const MAX_BUF_SIZE: usize = 64 * 1024 * 1024; // 64 MB

/// How long a connection can sit idle (no data received) before we
/// close it and reclaim its resources.
const IDLE_TIMEOUT: Duration = Duration::from_secs(300); // 5 minutes

/// Drives a single client connection to completion.
pub async fn handle(mut stream: TcpStream, dispatcher: Arc<dyn Dispatch>) -> std::io::Result<()> {
    let mut session = Session::new();
    let mut buf = BytesMut::with_capacity(BUF_CAPACITY);
    let mut out = BytesMut::with_capacity(BUF_CAPACITY);

    loop {
        // guard against unbounded buffer growth from incomplete frames
        if buf.len() > MAX_BUF_SIZE {
            let mut err_buf = BytesMut::new();
            reply::error("ERR max buffer size exceeded, closing connection")
                .serialize(&mut err_buf);
            let _ = stream.write_all(&err_buf).await;
            return Ok(());
        }

        // read some data — returns 0 on clean disconnect, times out
        // after IDLE_TIMEOUT to reclaim abandoned connections
        match tokio::time::timeout(IDLE_TIMEOUT, stream.read_buf(&mut buf)).await {
            Ok(Ok(0)) => return Ok(()),
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Ok(()), // idle timeout — close silently
        }

        // process as many complete frames as the buffer holds
        // (pipelining), batching all responses into one write
        out.clear();
        loop {
            match parse_frame(&buf) {
                Ok(Some((frame, consumed))) => {
                    buf.advance(consumed);
                    let response = execute(frame, &dispatcher, &mut session);
                    response.serialize(&mut out);
                }
                Ok(None) => break, // need more data
                Err(e) => {
                    reply::error(format!("ERR protocol error: {e}")).serialize(&mut out);
                    let skip = resync_len(&buf);
                    buf.advance(skip);
                }
            }
        }

        if !out.is_empty() {
            stream.write_all(&out).await?;
        }
    }
}

/// Turns one inbound frame into a reply.
fn execute(frame: Frame, dispatcher: &Arc<dyn Dispatch>, session: &mut Session) -> Frame {
    match frame.into_cmdline() {
        Some(cmdline) => dispatcher.dispatch(session, &cmdline),
        None => reply::error("ERR protocol error: expected an array of bulk strings"),
    }
}
