use crate::errors::StoreError;
use crate::models::LogRecord;
use std::{
    fs::{self, File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

pub const LOG_HEADER: &str =
    "segment_id,segment_name,date,total_attempts_on_date,daily_attempts,athlete_count";

const REQUIRED_COLUMNS: [&str; 6] = [
    "segment_id",
    "segment_name",
    "date",
    "total_attempts_on_date",
    "daily_attempts",
    "athlete_count",
];

/// How the persisted history looked when the store was opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryStatus {
    Loaded,
    Missing,
    Corrupt(String),
}

/// Append-only store of daily observations.
pub trait LogStore {
    fn append(&mut self, record: LogRecord) -> Result<(), StoreError>;

    /// Records for one segment, oldest date first. Records sharing a date keep
    /// their append order.
    fn query(&self, segment_id: u64) -> Vec<LogRecord>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn status(&self) -> &HistoryStatus;
}

#[derive(Debug)]
pub struct MemoryLogStore {
    records: Vec<LogRecord>,
    status: HistoryStatus,
}

impl Default for MemoryLogStore {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl MemoryLogStore {
    pub fn new(records: Vec<LogRecord>) -> Self {
        Self {
            records,
            status: HistoryStatus::Loaded,
        }
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }
}

impl LogStore for MemoryLogStore {
    fn append(&mut self, record: LogRecord) -> Result<(), StoreError> {
        self.records.push(record);
        Ok(())
    }

    fn query(&self, segment_id: u64) -> Vec<LogRecord> {
        select_segment(&self.records, segment_id)
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn status(&self) -> &HistoryStatus {
        &self.status
    }
}

/// Flat CSV log file. The file is read once on open; appends go to both the
/// file and the in-memory copy so later queries in the same run see them.
#[derive(Debug)]
pub struct CsvLogStore {
    path: PathBuf,
    records: Vec<LogRecord>,
    status: HistoryStatus,
    needs_header: bool,
    needs_newline: bool,
}

impl CsvLogStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (records, status) = match read_log(&path) {
            Ok(Some(records)) => (records, HistoryStatus::Loaded),
            Ok(None) => (Vec::new(), HistoryStatus::Missing),
            Err(reason) => {
                warn!(
                    "could not read log {}: {reason}; history treated as empty",
                    path.display()
                );
                (Vec::new(), HistoryStatus::Corrupt(reason))
            }
        };
        let needs_header = status != HistoryStatus::Loaded;
        let needs_newline = !needs_header && !ends_with_newline(&path);
        if needs_newline {
            warn!(
                "log {} has no trailing newline; one is added before the next row",
                path.display()
            );
        }
        debug!(
            "opened log {} with {} record(s), status {:?}",
            path.display(),
            records.len(),
            status
        );

        Self {
            path,
            records,
            status,
            needs_header,
            needs_newline,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    fn write_row(&mut self, record: &LogRecord) -> Result<(), StoreError> {
        if self.needs_header {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|err| self.io_error(err))?;
            }
            if matches!(self.status, HistoryStatus::Corrupt(_)) && self.path.exists() {
                let backup = corrupt_backup_path(&self.path);
                fs::rename(&self.path, &backup).map_err(|err| self.io_error(err))?;
                warn!(
                    "moved unreadable log {} to {}",
                    self.path.display(),
                    backup.display()
                );
            }
            fs::write(&self.path, format!("{LOG_HEADER}\n")).map_err(|err| self.io_error(err))?;
            self.needs_header = false;
        }

        let mut row = encode_row(record);
        if self.needs_newline {
            row.insert(0, '\n');
        }
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|err| self.io_error(err))?;
        file.write_all(row.as_bytes()).map_err(|err| self.io_error(err))?;
        self.needs_newline = false;
        Ok(())
    }
}

impl LogStore for CsvLogStore {
    fn append(&mut self, record: LogRecord) -> Result<(), StoreError> {
        self.write_row(&record)?;
        self.records.push(record);
        Ok(())
    }

    fn query(&self, segment_id: u64) -> Vec<LogRecord> {
        select_segment(&self.records, segment_id)
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn status(&self) -> &HistoryStatus {
        &self.status
    }
}

/// `Ok(None)` when there is no history yet (absent or zero-length file).
/// `Err` carries the reason the existing file could not be used.
pub fn read_log(path: &Path) -> Result<Option<Vec<LogRecord>>, String> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.to_string()),
    };
    if bytes.is_empty() {
        return Ok(None);
    }
    decode_log(&bytes).map(Some)
}

pub fn decode_log(bytes: &[u8]) -> Result<Vec<LogRecord>, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(bytes);

    let headers = reader.headers().map_err(|err| err.to_string())?;
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|column| !headers.iter().any(|h| h.trim() == *column))
        .collect();
    if !missing.is_empty() {
        return Err(format!("missing column(s): {}", missing.join(", ")));
    }

    reader
        .deserialize::<LogRecord>()
        .map(|row| row.map_err(|err| err.to_string()))
        .collect()
}

pub fn encode_row(record: &LogRecord) -> String {
    format!(
        "{},\"{}\",{},{},{},{}\n",
        record.segment_id,
        record.segment_name.replace('"', "\"\""),
        record.date.format("%Y-%m-%d"),
        record.cumulative_attempts_on_date,
        record.daily_attempts,
        record.athlete_count
    )
}

fn select_segment(records: &[LogRecord], segment_id: u64) -> Vec<LogRecord> {
    let mut selected: Vec<LogRecord> = records
        .iter()
        .filter(|record| record.segment_id == segment_id)
        .cloned()
        .collect();
    // stable: same-day rows stay in append order
    selected.sort_by_key(|record| record.date);
    selected
}

fn last_byte(path: &Path) -> io::Result<u8> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::End(-1))?;
    let mut byte = [0_u8; 1];
    file.read_exact(&mut byte)?;
    Ok(byte[0])
}

fn ends_with_newline(path: &Path) -> bool {
    last_byte(path).map_or(true, |byte| byte == b'\n')
}

/// `<log>.corrupt`, or `<log>.corrupt.N` with the first free `N` when earlier
/// backups exist.
fn corrupt_backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".corrupt");
    let first = PathBuf::from(&name);
    if !first.exists() {
        return first;
    }
    (1_u32..)
        .map(|n| {
            let mut numbered = name.clone();
            numbered.push(format!(".{n}"));
            PathBuf::from(numbered)
        })
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}
