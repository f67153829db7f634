//! Structured result reporting: one JSONL record per terminal, with an
//! optional running SHA-256 digest over the emitted bytes so downstream
//! consumers can verify streams. The async variant moves file I/O onto a
//! dedicated thread behind a bounded channel so emission never stalls the
//! search loop for the cost of a write.

use std::io::{self, BufWriter, Write};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Sender};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::search::dfs::{TerminalReason, TerminalState};
use crate::signature::BoardSignature;
use crate::types::{ActionId, CardCode};

/// One reported terminal, flattened for line-oriented consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalRecord {
    pub combination: u64,
    pub hand: Vec<CardCode>,
    pub depth: u8,
    pub value: i16,
    pub reason: TerminalReason,
    pub line: Vec<ActionId>,
    pub board: BoardSignature,
}

impl TerminalRecord {
    pub fn from_terminal(combination: u64, hand: Vec<CardCode>, terminal: &TerminalState) -> Self {
        Self {
            combination,
            hand,
            depth: terminal.depth,
            value: terminal.value,
            reason: terminal.reason,
            line: terminal.line.clone(),
            board: terminal.signature.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterStats {
    pub lines: u64,
    /// Hex digest of the emitted bytes; `None` when hashing was disabled.
    pub sha256_hex: Option<String>,
}

#[inline]
fn hex_digest(hasher: Sha256) -> String {
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Synchronous JSONL sink.
pub struct JsonlWriter<W: Write> {
    out: BufWriter<W>,
    hasher: Option<Sha256>,
    lines: u64,
}

impl<W: Write> JsonlWriter<W> {
    pub fn new(out: W, hashing: bool) -> Self {
        Self {
            out: BufWriter::new(out),
            hasher: hashing.then(Sha256::new),
            lines: 0,
        }
    }

    pub fn write_record(&mut self, record: &TerminalRecord) -> io::Result<()> {
        let json = serde_json::to_vec(record)?;
        self.write_line(&json)
    }

    fn write_line(&mut self, json_line: &[u8]) -> io::Result<()> {
        self.out.write_all(json_line)?;
        self.out.write_all(b"\n")?;
        if let Some(hasher) = &mut self.hasher {
            hasher.update(json_line);
            hasher.update(b"\n");
        }
        self.lines += 1;
        Ok(())
    }

    /// Single-flush policy: flush once at the end.
    pub fn finish(mut self) -> io::Result<WriterStats> {
        self.out.flush()?;
        Ok(WriterStats {
            lines: self.lines,
            sha256_hex: self.hasher.map(hex_digest),
        })
    }
}

/// Bounded-queue asynchronous JSONL sink: serialization happens on the
/// caller, bytes cross a channel, one writer thread owns the file.
pub struct AsyncJsonlWriter {
    tx: Option<Sender<Vec<u8>>>,
    join: Option<JoinHandle<io::Result<WriterStats>>>,
}

impl AsyncJsonlWriter {
    pub fn new<W: Write + Send + 'static>(out: W, queue_lines: usize, hashing: bool) -> Self {
        let (tx, rx) = bounded::<Vec<u8>>(queue_lines.max(1));
        let join = thread::spawn(move || -> io::Result<WriterStats> {
            let mut writer = JsonlWriter::new(out, hashing);
            for line in rx {
                writer.write_line(&line)?;
            }
            writer.finish()
        });
        Self { tx: Some(tx), join: Some(join) }
    }

    /// Enqueue one record. Blocks only when the queue is full.
    pub fn write_record(&self, record: &TerminalRecord) -> io::Result<()> {
        let json = serde_json::to_vec(record)?;
        self.tx
            .as_ref()
            .expect("writer already finished")
            .send(json)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "writer thread gone"))
    }

    /// Close the queue, join the writer thread, return its stats.
    pub fn finish(mut self) -> io::Result<WriterStats> {
        drop(self.tx.take());
        match self.join.take() {
            Some(join) => join
                .join()
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "writer thread panicked"))?,
            None => Err(io::Error::new(io::ErrorKind::Other, "writer already joined")),
        }
    }
}

impl Drop for AsyncJsonlWriter {
    fn drop(&mut self) {
        drop(self.tx.take());
        if let Some(join) = self.join.take() {
            join.join().ok();
        }
    }
}
