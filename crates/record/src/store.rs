//! Record stores and leaderboard aggregation.
//!
//! The server treats a store as fire-and-forget: a failed write is logged by
//! the caller and never undoes the in-memory game result.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fourline_wire::{GameRecord, LeaderboardEntry};
use prost::Message;
use tracing::{debug, warn};

/// Persistence failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("record store lock poisoned")]
    Poisoned,
}

/// Durable store of completed games.
pub trait RecordStore: Send + Sync {
    /// Persist one finished game.
    fn record_completed_game(&self, record: &GameRecord) -> Result<(), StoreError>;

    /// Identities ordered by win count, highest first, at most `limit` rows.
    fn fetch_top_winners(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, StoreError>;
}

/// Count wins per identity, skipping draws.
///
/// Ties are broken by identity so the order is stable across calls.
pub fn tally_leaderboard<'a>(
    records: impl IntoIterator<Item = &'a GameRecord>,
    limit: usize,
) -> Vec<LeaderboardEntry> {
    let mut wins = HashMap::new();
    for record in records {
        count_win(&mut wins, record);
    }
    rank(&wins, limit)
}

fn count_win(wins: &mut HashMap<String, u64>, record: &GameRecord) {
    if record.draw || record.winner.is_empty() {
        return;
    }
    *wins.entry(record.winner.clone()).or_insert(0) += 1;
}

fn rank(wins: &HashMap<String, u64>, limit: usize) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<LeaderboardEntry> = wins
        .iter()
        .map(|(username, &wins)| LeaderboardEntry {
            username: username.clone(),
            wins,
        })
        .collect();
    entries.sort_by(|a, b| b.wins.cmp(&a.wins).then_with(|| a.username.cmp(&b.username)));
    entries.truncate(limit);
    entries
}

// ============================================================================
// In-Memory Store
// ============================================================================

/// Keeps records in process memory. Used when no records path is configured
/// and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<GameRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far.
    pub fn records(&self) -> Vec<GameRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

impl RecordStore for MemoryStore {
    fn record_completed_game(&self, record: &GameRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        records.push(record.clone());
        Ok(())
    }

    fn fetch_top_winners(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, StoreError> {
        let records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(tally_leaderboard(records.iter(), limit))
    }
}

// ============================================================================
// File Store
// ============================================================================

/// Append-only file of length-delimited `GameRecord` frames.
///
/// Win counts are loaded once at open and kept current on every append, so
/// leaderboard reads never touch the file. A torn frame at the tail, left by
/// a crash mid-append, is cut off at open.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    /// Serializes appends; also guards the cached tally.
    state: Mutex<FileState>,
}

#[derive(Debug, Default)]
struct FileState {
    /// Length of the intact frame prefix of the file.
    len: u64,
    wins: HashMap<String, u64>,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`, creating parent
    /// directories.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let data = read_file(&path)?;
        let (records, intact) = decode_frames(&data);
        if intact < data.len() {
            warn!(
                path = %path.display(),
                dropped = data.len() - intact,
                "truncating torn record tail"
            );
            OpenOptions::new()
                .write(true)
                .open(&path)?
                .set_len(intact as u64)?;
        }

        let mut state = FileState {
            len: intact as u64,
            wins: HashMap::new(),
        };
        for record in &records {
            count_win(&mut state.wins, record);
        }
        debug!(path = %path.display(), count = records.len(), "record store opened");

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordStore for FileStore {
    fn record_completed_game(&self, record: &GameRecord) -> Result<(), StoreError> {
        let mut state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        let frame = record.encode_length_delimited_to_vec();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let on_disk = file.metadata()?.len();
        if on_disk > state.len {
            warn!(
                path = %self.path.display(),
                dropped = on_disk - state.len,
                "discarding bytes past the last intact record"
            );
            file.set_len(state.len)?;
        } else {
            state.len = on_disk;
        }

        if let Err(e) = file.write_all(&frame).and_then(|()| file.flush()) {
            // Drop whatever part of the frame landed so the next append
            // starts on a frame boundary.
            if let Err(rollback) = file.set_len(state.len) {
                warn!(path = %self.path.display(), error = %rollback, "append rollback failed");
            }
            return Err(e.into());
        }

        state.len += frame.len() as u64;
        count_win(&mut state.wins, record);
        debug!(game_id = record.game_id, path = %self.path.display(), "record appended");
        Ok(())
    }

    fn fetch_top_winners(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, StoreError> {
        let state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(rank(&state.wins, limit))
    }
}

/// Read every intact record from a store file. A missing file reads as
/// empty; a torn frame and anything after it are skipped with a warning.
pub fn read_records(path: &Path) -> Result<Vec<GameRecord>, StoreError> {
    let data = read_file(path)?;
    let (records, intact) = decode_frames(&data);
    if intact < data.len() {
        warn!(
            path = %path.display(),
            skipped = data.len() - intact,
            "ignoring torn record tail"
        );
    }
    debug!(path = %path.display(), count = records.len(), "records read");
    Ok(records)
}

fn read_file(path: &Path) -> Result<Vec<u8>, StoreError> {
    match fs::read(path) {
        Ok(data) => Ok(data),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Decode frames until the data ends or a frame fails to decode. Returns the
/// records and the byte length of the prefix they came from.
fn decode_frames(data: &[u8]) -> (Vec<GameRecord>, usize) {
    let mut buf = data;
    let mut records = Vec::new();
    let mut intact = 0;
    while !buf.is_empty() {
        let Ok(record) = GameRecord::decode_length_delimited(&mut buf) else {
            break;
        };
        records.push(record);
        intact = data.len() - buf.len();
    }
    (records, intact)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn record(game_id: u64, winner: &str) -> GameRecord {
        GameRecord {
            record_format_version: 1,
            game_id,
            player_one: "p1".to_string(),
            player_two: "p2".to_string(),
            winner: winner.to_string(),
            draw: winner.is_empty(),
            end_reason: if winner.is_empty() { "draw" } else { "forfeit" }.to_string(),
            moves: Vec::new(),
            moves_sha256: String::new(),
        }
    }

    #[test]
    fn test_tally_orders_by_wins_then_name() {
        let records = [
            record(1, "carol"),
            record(2, "bob"),
            record(3, "carol"),
            record(4, ""),
            record(5, "alice"),
        ];
        let board = tally_leaderboard(records.iter(), 10);
        let rows: Vec<_> = board.iter().map(|e| (e.username.as_str(), e.wins)).collect();
        assert_eq!(rows, vec![("carol", 2), ("alice", 1), ("bob", 1)]);
    }

    #[test]
    fn test_tally_respects_limit() {
        let records: Vec<_> = (0..20).map(|i| record(i, &format!("p{i}"))).collect();
        assert_eq!(tally_leaderboard(records.iter(), 10).len(), 10);
        assert!(tally_leaderboard(records.iter(), 0).is_empty());
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        store.record_completed_game(&record(1, "alice")).unwrap();
        store.record_completed_game(&record(2, "")).unwrap();

        assert_eq!(store.records().len(), 2);
        let top = store.fetch_top_winners(10).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].username, "alice");
    }

    #[test]
    fn test_file_store_appends_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("games.bin");
        let store = FileStore::open(&path).unwrap();

        assert!(store.fetch_top_winners(10).unwrap().is_empty());

        store.record_completed_game(&record(1, "bob")).unwrap();
        store.record_completed_game(&record(2, "bob")).unwrap();
        store.record_completed_game(&record(3, "alice")).unwrap();

        let records = read_records(store.path()).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].game_id, 3);

        // A second handle sees the same file.
        let reopened = FileStore::open(&path).unwrap();
        let top = reopened.fetch_top_winners(1).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].username, "bob");
        assert_eq!(top[0].wins, 2);
    }

    /// One intact frame followed by the first half of another.
    fn write_torn(path: &Path, intact: &GameRecord, torn: &GameRecord) {
        let mut data = intact.encode_length_delimited_to_vec();
        let frame = torn.encode_length_delimited_to_vec();
        data.extend_from_slice(&frame[..frame.len() / 2]);
        fs::write(path, data).unwrap();
    }

    #[test]
    fn test_torn_tail_is_skipped_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("games.bin");
        write_torn(&path, &record(1, "bob"), &record(2, "alice"));

        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].game_id, 1);
    }

    #[test]
    fn test_open_cuts_torn_tail_and_later_appends_stay_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("games.bin");
        write_torn(&path, &record(1, "bob"), &record(2, "alice"));
        let intact_len = record(1, "bob").encode_length_delimited_to_vec().len() as u64;

        let store = FileStore::open(&path).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), intact_len);
        let top = store.fetch_top_winners(10).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].username, "bob");

        store.record_completed_game(&record(3, "carol")).unwrap();
        let records = read_records(&path).unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.game_id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_append_after_stray_bytes_realigns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("games.bin");
        let store = FileStore::open(&path).unwrap();
        store.record_completed_game(&record(1, "bob")).unwrap();

        // Half a frame lands behind the store's back.
        let frame = record(2, "alice").encode_length_delimited_to_vec();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&frame[..frame.len() / 2]).unwrap();
        drop(file);

        store.record_completed_game(&record(3, "carol")).unwrap();
        let top = store.fetch_top_winners(10).unwrap();
        let rows: Vec<_> = top.iter().map(|e| (e.username.as_str(), e.wins)).collect();
        assert_eq!(rows, vec![("bob", 1), ("carol", 1)]);

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.fetch_top_winners(10).unwrap(), top);
        assert_eq!(read_records(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_leaderboard_reads_do_not_rescan_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("games.bin");
        let store = FileStore::open(&path).unwrap();
        store.record_completed_game(&record(1, "bob")).unwrap();
        store.record_completed_game(&record(2, "bob")).unwrap();

        fs::write(&path, [0xff; 8]).unwrap();
        let top = store.fetch_top_winners(10).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].wins, 2);
    }
}
