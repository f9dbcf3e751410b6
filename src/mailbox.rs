//! Shared mailbox between the controller and the agent bridge.
//!
//! Two artifacts live in the mailbox: a JSON status record and a plain-text
//! input payload. The presence of a non-blank payload is itself the signal
//! that a message is available. Reads never fail: anything missing, locked
//! or unparseable reads as "no data yet" and the caller retries next tick.

use std::{
    fs, io,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;

use crate::{error::MailboxError, types::StatusRecord};

pub const NAMESPACE: &str = "turn-mcp";
pub const STATUS_FILE: &str = "status.json";
pub const INPUT_FILE: &str = "input.txt";

pub trait Mailbox: Send + Sync {
    fn read_status(&self) -> Option<StatusRecord>;

    fn write_status(&self, record: &StatusRecord) -> Result<(), MailboxError>;

    /// Returns the payload trimmed, or `None` if absent or blank.
    fn read_input(&self) -> Option<String>;

    fn write_input(&self, text: &str) -> Result<(), MailboxError>;

    fn clear_input(&self) -> Result<(), MailboxError>;

    /// Removes both artifacts.
    fn reset(&self) -> Result<(), MailboxError>;
}

impl<T: Mailbox + ?Sized> Mailbox for Arc<T> {
    fn read_status(&self) -> Option<StatusRecord> {
        (**self).read_status()
    }

    fn write_status(&self, record: &StatusRecord) -> Result<(), MailboxError> {
        (**self).write_status(record)
    }

    fn read_input(&self) -> Option<String> {
        (**self).read_input()
    }

    fn write_input(&self, text: &str) -> Result<(), MailboxError> {
        (**self).write_input(text)
    }

    fn clear_input(&self) -> Result<(), MailboxError> {
        (**self).clear_input()
    }

    fn reset(&self) -> Result<(), MailboxError> {
        (**self).reset()
    }
}

/// Mailbox backed by a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileMailbox {
    dir: PathBuf,
}

impl FileMailbox {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<tmp>/turn-mcp`, shared by every process of the same user session.
    pub fn default_dir() -> PathBuf {
        std::env::temp_dir().join(NAMESPACE)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn status_path(&self) -> PathBuf {
        self.dir.join(STATUS_FILE)
    }

    pub fn input_path(&self) -> PathBuf {
        self.dir.join(INPUT_FILE)
    }

    fn ensure_dir(&self) -> Result<(), MailboxError> {
        fs::create_dir_all(&self.dir).map_err(|source| MailboxError::CreateDir {
            path: self.dir.clone(),
            source,
        })
    }

    /// Write through a temp file in the same directory and rename over the
    /// target, so a concurrent reader sees either the old or the new bytes.
    fn write_atomic(&self, path: &Path, body: &[u8]) -> Result<(), MailboxError> {
        self.ensure_dir()?;
        let write_err = |source: io::Error| MailboxError::Write {
            path: path.to_path_buf(),
            source,
        };
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(write_err)?;
        tmp.write_all(body).map_err(write_err)?;
        tmp.persist(path).map_err(|e| write_err(e.error))?;
        Ok(())
    }

    fn remove_if_exists(path: &Path) -> Result<(), MailboxError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(MailboxError::Remove {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

impl Default for FileMailbox {
    fn default() -> Self {
        Self::new(Self::default_dir())
    }
}

impl Mailbox for FileMailbox {
    fn read_status(&self) -> Option<StatusRecord> {
        let path = self.status_path();
        let body = match fs::read_to_string(&path) {
            Ok(body) => body,
            Err(error) => {
                if error.kind() != io::ErrorKind::NotFound {
                    tracing::trace!(path = %path.display(), error = %error, "status record unreadable");
                }
                return None;
            }
        };
        match serde_json::from_str(&body) {
            Ok(record) => Some(record),
            Err(error) => {
                tracing::trace!(path = %path.display(), error = %error, "status record unparseable");
                None
            }
        }
    }

    fn write_status(&self, record: &StatusRecord) -> Result<(), MailboxError> {
        let body = serde_json::to_vec_pretty(record)?;
        self.write_atomic(&self.status_path(), &body)
    }

    fn read_input(&self) -> Option<String> {
        let text = fs::read_to_string(self.input_path()).ok()?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    fn write_input(&self, text: &str) -> Result<(), MailboxError> {
        self.write_atomic(&self.input_path(), text.as_bytes())
    }

    fn clear_input(&self) -> Result<(), MailboxError> {
        Self::remove_if_exists(&self.input_path())
    }

    fn reset(&self) -> Result<(), MailboxError> {
        Self::remove_if_exists(&self.status_path())?;
        Self::remove_if_exists(&self.input_path())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    status: Option<StatusRecord>,
    input: Option<String>,
    fail_input_writes: bool,
    fail_status_writes: bool,
    input_writes: usize,
}

/// In-process mailbox for driving both sides of the handshake without
/// touching the filesystem. Input and status writes can be made to fail on
/// demand.
#[derive(Debug, Default)]
pub struct MemoryMailbox {
    state: Mutex<MemoryState>,
}

impl MemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_input_writes(&self, fail: bool) {
        self.state.lock().fail_input_writes = fail;
    }

    pub fn set_fail_status_writes(&self, fail: bool) {
        self.state.lock().fail_status_writes = fail;
    }

    /// Number of successful input payload writes so far.
    pub fn input_writes(&self) -> usize {
        self.state.lock().input_writes
    }

    /// Raw payload, untrimmed.
    pub fn peek_input(&self) -> Option<String> {
        self.state.lock().input.clone()
    }
}

impl Mailbox for MemoryMailbox {
    fn read_status(&self) -> Option<StatusRecord> {
        self.state.lock().status.clone()
    }

    fn write_status(&self, record: &StatusRecord) -> Result<(), MailboxError> {
        let mut state = self.state.lock();
        if state.fail_status_writes {
            return Err(MailboxError::Rejected);
        }
        state.status = Some(record.clone());
        Ok(())
    }

    fn read_input(&self) -> Option<String> {
        let state = self.state.lock();
        state
            .input
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned)
    }

    fn write_input(&self, text: &str) -> Result<(), MailboxError> {
        let mut state = self.state.lock();
        if state.fail_input_writes {
            return Err(MailboxError::Rejected);
        }
        state.input = Some(text.to_string());
        state.input_writes += 1;
        Ok(())
    }

    fn clear_input(&self) -> Result<(), MailboxError> {
        self.state.lock().input = None;
        Ok(())
    }

    fn reset(&self) -> Result<(), MailboxError> {
        let mut state = self.state.lock();
        state.status = None;
        state.input = None;
        Ok(())
    }
}
