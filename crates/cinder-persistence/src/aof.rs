//! The append-only file engine.
//!
//! Append side: command handlers push `(db_index, cmd_line)` payloads
//! into a bounded channel; a dedicated writer thread drains it and
//! appends RESP MultiBulk frames to the file, interleaving a synthetic
//! `SELECT <n>` whenever the payload's database differs from the one the
//! writer last wrote for. A full channel blocks the producing handler —
//! that is the flow-control valve back to client request handling.
//!
//! Replay side: on startup the file (if present) is stream-parsed and
//! every command frame is executed through the router, with embedded
//! SELECT frames steering a fake session. Replies are discarded; error
//! replies are logged.
//!
//! Write errors are logged and the record dropped — the engine keeps
//! serving. Only failing to open the append file at startup is fatal.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;

use bytes::{Buf, Bytes, BytesMut};

use cinder_core::{Dispatch, Router, Session};
use cinder_protocol::{parse_frame, reply, resync_len, Frame};

/// Channel capacity: how many payloads may queue before producers block.
const AOF_BUFFER: usize = 1 << 16;

/// Read chunk size during replay.
const REPLAY_CHUNK: usize = 8 * 1024;

/// One journaled mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AofPayload {
    pub db_index: usize,
    pub cmdline: Vec<Bytes>,
}

/// Owns the writer thread and the producing end of the journal channel.
pub struct AofHandler {
    tx: Option<SyncSender<AofPayload>>,
    worker: Option<JoinHandle<()>>,
    path: PathBuf,
}

impl AofHandler {
    /// Replays `path` into `router`, opens it for appending, starts the
    /// writer thread, and installs the journal sink on every database.
    ///
    /// Replay happens before the sink install, so replayed commands are
    /// not journaled a second time.
    pub fn start(path: impl Into<PathBuf>, router: &Router) -> io::Result<Self> {
        let path = path.into();
        replay(&path, router);

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let (tx, rx) = sync_channel::<AofPayload>(AOF_BUFFER);
        let worker = std::thread::Builder::new()
            .name("cinder-aof".into())
            .spawn(move || writer_loop(file, rx))?;

        let sink_tx = tx.clone();
        router.install_aof(Arc::new(move |db_index, cmdline: &[Bytes]| {
            // blocks when the buffer is full: backpressure on the handler
            let _ = sink_tx.send(AofPayload {
                db_index,
                cmdline: cmdline.to_vec(),
            });
        }));

        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
            path,
        })
    }

    /// Path of the append file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drops this handle's sender and waits for the writer to drain.
    ///
    /// The thread only exits once every database holding a sink clone is
    /// gone too, so drop the router before calling this.
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        drop(self.tx.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("aof writer thread panicked");
            }
        }
    }
}

impl Drop for AofHandler {
    fn drop(&mut self) {
        self.close();
    }
}

fn writer_loop(file: File, rx: Receiver<AofPayload>) {
    let mut writer = Writer::new(file);
    while let Ok(payload) = rx.recv() {
        if let Err(e) = writer.append(&payload) {
            tracing::error!("aof write error: {e}");
        }
    }
}

/// Serializes payloads into an append sink, tracking which database the
/// stream is positioned on and emitting `SELECT` frames at switches.
pub(crate) struct Writer<W: Write> {
    sink: W,
    current_db: usize,
}

impl<W: Write> Writer<W> {
    pub(crate) fn new(sink: W) -> Self {
        Self {
            sink,
            current_db: 0,
        }
    }

    pub(crate) fn append(&mut self, payload: &AofPayload) -> io::Result<()> {
        if payload.db_index != self.current_db {
            // advance the stream position first; a failed SELECT write
            // drops this record but must not desync later ones
            self.current_db = payload.db_index;
            let select = reply::bulk_array([
                Bytes::from_static(b"SELECT"),
                Bytes::from(payload.db_index.to_string()),
            ]);
            self.sink.write_all(&select.to_bytes())?;
        }
        let frame = reply::bulk_array(payload.cmdline.iter().cloned());
        self.sink.write_all(&frame.to_bytes())?;
        Ok(())
    }
}

/// Replays the AOF at `path` into `router`. A missing file is a clean
/// first start; anything else unreadable is logged and skipped.
pub fn replay(path: &Path, router: &Router) {
    if !path.exists() {
        tracing::info!("aof file not found, skipping replay");
        return;
    }
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            tracing::error!("aof open for replay failed: {e}");
            return;
        }
    };
    replay_reader(file, router);
}

fn replay_reader(mut reader: impl Read, router: &Router) {
    let mut buf = BytesMut::with_capacity(REPLAY_CHUNK);
    let mut chunk = [0u8; REPLAY_CHUNK];
    let mut session = Session::preselected(0);
    let mut applied = 0usize;

    loop {
        loop {
            match parse_frame(&buf) {
                Ok(Some((frame, consumed))) => {
                    buf.advance(consumed);
                    apply(frame, router, &mut session);
                    applied += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    // recover at the next frame boundary; the stream
                    // only ends on EOF
                    tracing::error!("aof parse error: {e}");
                    let skip = resync_len(&buf);
                    buf.advance(skip);
                }
            }
        }

        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) => {
                tracing::error!("aof read error: {e}");
                break;
            }
        }
    }

    if !buf.is_empty() {
        tracing::warn!("aof ends mid-frame, {} trailing bytes ignored", buf.len());
    }
    tracing::info!("aof replay applied {applied} frames");
}

fn apply(frame: Frame, router: &Router, session: &mut Session) {
    let Some(cmdline) = frame.into_cmdline() else {
        tracing::error!("aof frame is not a command, skipping");
        return;
    };
    let response = router.dispatch(session, &cmdline);
    if reply::is_error(&response) {
        let cmd: Vec<String> = cmdline
            .iter()
            .map(|a| String::from_utf8_lossy(a).into_owned())
            .collect();
        tracing::error!("aof replay command failed: cmd={:?} reply={response:?}", cmd);
    }
}
