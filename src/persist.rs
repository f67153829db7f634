//! Optional resumable-run persistence.
//!
//! Correctness never depends on this: forward replay from the root is always
//! available. Persisting the transposition table just lets a rerun skip
//! recomputation. Single bincode blob framed by a magic tag and a crc32
//! trailer; entries are sorted by key so equal tables produce equal bytes.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::hash::ZobristSeed;
use crate::search::dfs::TerminalState;
use crate::search::tt::{InMemoryTt, TtEntry};
use crate::types::CardCode;

pub const FORMAT_VERSION: u32 = 1;

const SNAP_MAGIC: [u8; 8] = *b"CSCOPETT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub version: u32,
    /// Keys are only meaningful under the seed that produced them.
    pub zobrist_seed: ZobristSeed,
    pub hand: Vec<CardCode>,
}

impl SnapshotHeader {
    #[inline]
    pub fn new(zobrist_seed: ZobristSeed, hand: Vec<CardCode>) -> Self {
        Self { version: FORMAT_VERSION, zobrist_seed, hand }
    }
}

/// What a resumed run needs: the cache entries *and* the terminals they
/// stand in for. A cache hit short-circuits a subtree instead of re-emitting
/// its terminals, so restoring entries without the terminal collection would
/// silently drop results.
#[derive(Debug, Serialize, Deserialize)]
struct TtSnapshot {
    header: SnapshotHeader,
    entries: Vec<(u128, TtEntry)>,
    terminals: Vec<TerminalState>,
}

/// Save the table and terminal collection under the given header.
/// Byte-deterministic for equal contents.
pub fn save_snapshot<P: AsRef<Path>>(
    path: P,
    header: &SnapshotHeader,
    tt: &InMemoryTt,
    terminals: &[TerminalState],
) -> Result<(), String> {
    let mut entries: Vec<(u128, TtEntry)> = tt.iter().map(|(k, e)| (*k, *e)).collect();
    entries.sort_unstable_by_key(|(k, _)| *k);

    let snapshot = TtSnapshot {
        header: header.clone(),
        entries,
        terminals: terminals.to_vec(),
    };
    let payload =
        bincode::serialize(&snapshot).map_err(|e| format!("bincode serialize error: {e}"))?;

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&payload);
    let crc = hasher.finalize();

    let mut bytes = Vec::with_capacity(SNAP_MAGIC.len() + payload.len() + 4);
    bytes.extend_from_slice(&SNAP_MAGIC);
    bytes.extend_from_slice(&payload);
    bytes.extend_from_slice(&crc.to_le_bytes());
    fs::write(path.as_ref(), bytes).map_err(|e| format!("write error: {e}"))?;
    Ok(())
}

/// Restored snapshot contents.
#[derive(Debug)]
pub struct RestoredSnapshot {
    pub header: SnapshotHeader,
    pub entries: Vec<(u128, TtEntry)>,
    pub terminals: Vec<TerminalState>,
}

/// Load a snapshot written by [`save_snapshot`]. Rejects unknown formats,
/// corrupted payloads and seed mismatches: entries keyed under a different
/// seed would silently poison the cache.
pub fn load_snapshot<P: AsRef<Path>>(
    path: P,
    expected_seed: ZobristSeed,
) -> Result<RestoredSnapshot, String> {
    let bytes = fs::read(path.as_ref()).map_err(|e| format!("read error: {e}"))?;
    if bytes.len() < SNAP_MAGIC.len() + 4 {
        return Err("snapshot file truncated".to_string());
    }
    if bytes[..SNAP_MAGIC.len()] != SNAP_MAGIC {
        return Err("not a transposition snapshot (bad magic)".to_string());
    }
    let (payload, trailer) = bytes[SNAP_MAGIC.len()..].split_at(bytes.len() - SNAP_MAGIC.len() - 4);
    let stored_crc = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(payload);
    if hasher.finalize() != stored_crc {
        return Err("snapshot checksum mismatch".to_string());
    }

    let snapshot: TtSnapshot =
        bincode::deserialize(payload).map_err(|e| format!("bincode deserialize error: {e}"))?;
    if snapshot.header.version != FORMAT_VERSION {
        return Err(format!(
            "unsupported snapshot version {} (expected {FORMAT_VERSION})",
            snapshot.header.version
        ));
    }
    if snapshot.header.zobrist_seed != expected_seed {
        return Err("snapshot was keyed under a different zobrist seed".to_string());
    }
    Ok(RestoredSnapshot {
        header: snapshot.header,
        entries: snapshot.entries,
        terminals: snapshot.terminals,
    })
}
