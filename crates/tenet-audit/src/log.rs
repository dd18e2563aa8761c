// log.rs — Append-only, hash-chained violation log.
//
// The log is stored as a JSONL (JSON Lines) file: one LogEntry per line.
// Each entry carries `previous_hash`, the SHA-256 of the previous raw line,
// so inserting, deleting or editing a line breaks the chain.
//
// Durability: `append_batch` writes all of its lines with a single
// `write_all`, then flushes and `sync_data`s before returning. Entries are
// acknowledged only once they are on disk, and a failed batch is cut back
// to the last acknowledged line before the next write. A crash mid-write can leave a torn (newline-less)
// trailing line. Nothing acknowledged it, so `open` truncates it away and
// readers skip it.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::AuditError;
use crate::filter::ViolationFilter;
use crate::hasher;
use crate::record::{CheckRecord, LogEntry, LogRecord, ViolationRecord};

/// Where the engine writes its records.
///
/// Appends must not return until the entries are durable: the engine only
/// acknowledges an ALLOW after the matching records were appended.
pub trait ViolationLogger: Send {
    /// Append a record, returning the entry as written.
    fn append(&mut self, record: LogRecord) -> Result<LogEntry, AuditError>;

    /// Append records as one unit, in order. On error none of them may be
    /// visible to later reads.
    fn append_batch(&mut self, records: Vec<LogRecord>) -> Result<Vec<LogEntry>, AuditError>;

    /// Every entry, oldest first.
    fn entries(&self) -> Result<Vec<LogEntry>, AuditError>;

    /// Violation records matching `filter`, oldest first.
    fn query(&self, filter: &ViolationFilter) -> Result<Vec<ViolationRecord>, AuditError> {
        Ok(self
            .entries()?
            .into_iter()
            .filter_map(|entry| match entry.record {
                LogRecord::Violation(record) if filter.matches(&record) => Some(record),
                _ => None,
            })
            .collect())
    }

    /// Like [`query`](Self::query), restricted to the entry `first` and
    /// everything after it. Empty if `first` is not in the log.
    fn query_from(
        &self,
        first: Uuid,
        filter: &ViolationFilter,
    ) -> Result<Vec<ViolationRecord>, AuditError> {
        Ok(self
            .entries()?
            .into_iter()
            .skip_while(|entry| entry.entry_id != first)
            .filter_map(|entry| match entry.record {
                LogRecord::Violation(record) if filter.matches(&record) => Some(record),
                _ => None,
            })
            .collect())
    }

    /// Check acknowledgments, optionally for one task, oldest first.
    fn checks(&self, task_id: Option<&str>) -> Result<Vec<CheckRecord>, AuditError> {
        Ok(self
            .entries()?
            .into_iter()
            .filter_map(|entry| match entry.record {
                LogRecord::Check(record) if task_id.map_or(true, |t| record.task_id == t) => {
                    Some(record)
                }
                _ => None,
            })
            .collect())
    }
}

/// A violation log backed by a JSONL file.
pub struct ViolationLog {
    file: File,
    path: PathBuf,
    /// Hash of the last acknowledged line, used as the next `previous_hash`.
    last_hash: Option<String>,
    /// File length up to and including the last acknowledged line.
    committed_len: u64,
    /// Set after a failed write, which may have left a partial line.
    needs_repair: bool,
}

impl ViolationLog {
    /// Open (or create) a log at the given path.
    ///
    /// If the file exists, the hash chain resumes from its last complete
    /// line. A torn trailing line is truncated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        let open_failed = |source| AuditError::OpenFailed {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(open_failed)?;
        }

        let (last_hash, committed_len) = if path.exists() {
            Self::scan_tail(&path)?
        } else {
            (None, 0)
        };

        // Append mode: we never overwrite existing data.
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(open_failed)?;

        let actual_len = file.metadata().map_err(open_failed)?.len();
        if actual_len > committed_len {
            tracing::warn!(
                path = %path.display(),
                torn_bytes = actual_len - committed_len,
                "discarding torn trailing line left by an interrupted write"
            );
            file.set_len(committed_len).map_err(open_failed)?;
            file.sync_data().map_err(open_failed)?;
        }

        Ok(Self {
            file,
            path,
            last_hash,
            committed_len,
            needs_repair: false,
        })
    }

    /// Return the path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hash of the newest entry (the chain head), if any.
    pub fn last_hash(&self) -> Option<&str> {
        self.last_hash.as_deref()
    }

    /// Read all entries from a log file, oldest first.
    ///
    /// Blank lines are skipped, and so is a torn (newline-less) final line.
    /// Any other unparseable line is corruption and fails the read.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<LogEntry>, AuditError> {
        Ok(Self::read_lines(path.as_ref())?
            .into_iter()
            .map(|(_, _, entry)| entry)
            .collect())
    }

    /// Verify the hash chain of a log file.
    ///
    /// Returns the number of entries checked, or an `IntegrityViolation`
    /// naming the first broken link.
    pub fn verify_chain(path: impl AsRef<Path>) -> Result<usize, AuditError> {
        let lines = Self::read_lines(path.as_ref())?;
        let mut previous_hash: Option<String> = None;

        for (line_num, raw, entry) in &lines {
            if entry.previous_hash != previous_hash {
                return Err(AuditError::IntegrityViolation {
                    line: *line_num,
                    expected: previous_hash.unwrap_or_else(|| "None".to_string()),
                    actual: entry
                        .previous_hash
                        .clone()
                        .unwrap_or_else(|| "None".to_string()),
                });
            }
            // Hash the raw line, not a re-serialization, so field order
            // can't change the result.
            previous_hash = Some(hasher::hash_str(raw));
        }

        Ok(lines.len())
    }

    /// Parse every complete line as `(line number, raw line, entry)`.
    fn read_lines(path: &Path) -> Result<Vec<(usize, String, LogEntry)>, AuditError> {
        let content = fs::read_to_string(path).map_err(|source| AuditError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let terminated = content.ends_with('\n');
        let lines: Vec<&str> = content.lines().collect();
        let mut parsed = Vec::with_capacity(lines.len());

        for (idx, line) in lines.iter().enumerate() {
            let line_num = idx + 1;
            if !terminated && line_num == lines.len() {
                tracing::warn!(
                    path = %path.display(),
                    line = line_num,
                    "skipping torn trailing line"
                );
                break;
            }
            if line.trim().is_empty() {
                continue;
            }
            let entry: LogEntry =
                serde_json::from_str(line).map_err(|e| AuditError::CorruptRecord {
                    line: line_num,
                    reason: e.to_string(),
                })?;
            parsed.push((line_num, line.to_string(), entry));
        }

        Ok(parsed)
    }

    /// Hash of the last complete line and the length up to it.
    fn scan_tail(path: &Path) -> Result<(Option<String>, u64), AuditError> {
        let data = fs::read(path).map_err(|source| AuditError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let committed_len = data
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |idx| idx + 1);

        let last_line = data[..committed_len]
            .split(|&b| b == b'\n')
            .rev()
            .find(|line| !line.iter().all(u8::is_ascii_whitespace));

        Ok((last_line.map(hasher::hash_bytes), committed_len as u64))
    }

    /// Write already-chained lines and advance the chain head to `head`.
    fn commit(&mut self, lines: &str, head: Option<String>) -> Result<(), AuditError> {
        if self.needs_repair {
            self.repair()?;
        }
        if let Err(e) = self.write_durably(lines.as_bytes()) {
            self.needs_repair = true;
            return Err(e.into());
        }
        self.committed_len += lines.len() as u64;
        self.last_hash = head;
        Ok(())
    }

    fn write_durably(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.file.write_all(bytes)?;
        self.file.flush()?;
        self.file.sync_data()
    }

    /// Cut the file back to the last acknowledged line.
    fn repair(&mut self) -> Result<(), AuditError> {
        self.file.set_len(self.committed_len)?;
        self.file.sync_data()?;
        self.needs_repair = false;
        Ok(())
    }
}

impl ViolationLogger for ViolationLog {
    fn append(&mut self, record: LogRecord) -> Result<LogEntry, AuditError> {
        let entry = LogEntry::new(record, self.last_hash.clone());
        let mut line = serde_json::to_string(&entry)?;
        let hash = hasher::hash_str(&line);
        line.push('\n');

        self.commit(&line, Some(hash))?;
        Ok(entry)
    }

    fn append_batch(&mut self, records: Vec<LogRecord>) -> Result<Vec<LogEntry>, AuditError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let mut head = self.last_hash.clone();
        let mut lines = String::new();
        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            let entry = LogEntry::new(record, head.take());
            let line = serde_json::to_string(&entry)?;
            head = Some(hasher::hash_str(&line));
            lines.push_str(&line);
            lines.push('\n');
            entries.push(entry);
        }

        self.commit(&lines, head)?;
        Ok(entries)
    }

    fn entries(&self) -> Result<Vec<LogEntry>, AuditError> {
        Self::read_all(&self.path)
    }
}

/// An in-process log with the same chaining as [`ViolationLog`].
#[derive(Debug, Default, Clone)]
pub struct MemoryLog {
    entries: Vec<LogEntry>,
    last_hash: Option<String>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ViolationLogger for MemoryLog {
    fn append(&mut self, record: LogRecord) -> Result<LogEntry, AuditError> {
        let entry = LogEntry::new(record, self.last_hash.clone());
        self.last_hash = Some(hasher::hash_str(&serde_json::to_string(&entry)?));
        self.entries.push(entry.clone());
        Ok(entry)
    }

    fn append_batch(&mut self, records: Vec<LogRecord>) -> Result<Vec<LogEntry>, AuditError> {
        let mut head = self.last_hash.clone();
        let mut staged = Vec::with_capacity(records.len());
        for record in records {
            let entry = LogEntry::new(record, head.take());
            head = Some(hasher::hash_str(&serde_json::to_string(&entry)?));
            staged.push(entry);
        }
        if !staged.is_empty() {
            self.last_hash = head;
            self.entries.extend(staged.iter().cloned());
        }
        Ok(staged)
    }

    fn entries(&self) -> Result<Vec<LogEntry>, AuditError> {
        Ok(self.entries.clone())
    }
}
