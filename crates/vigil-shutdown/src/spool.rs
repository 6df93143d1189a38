//! A durable beacon: offline notices appended to an on-disk spool.
//!
//! A terminating process can't wait for a network round-trip, but it can
//! append one line to a file and `fsync` it. The next process start drains
//! the spool and delivers whatever is in it.
//!
//! The spool is JSON lines, one [`SpooledNotice`] per line. A crash in the
//! middle of an append leaves a torn final line; readers skip any line that
//! doesn't parse instead of failing the whole file.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use vigil_session::now_millis;

use crate::{Beacon, NotificationError};

/// File name of the spool inside its directory.
const SPOOL_FILE: &str = "offline-notices.jsonl";

/// One queued offline notice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpooledNotice {
    /// Where the notice should be POSTed.
    pub url: String,
    /// The JSON request body.
    pub body: serde_json::Value,
    /// When it was queued, in Unix milliseconds.
    pub queued_at_ms: u64,
}

/// [`Beacon`] backed by an append-only spool file.
#[derive(Debug)]
pub struct SpoolBeacon {
    dir: PathBuf,
    // Serializes appends against drains within this process.
    lock: Mutex<()>,
}

impl SpoolBeacon {
    /// A spool inside `dir`. The directory is created on first use.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    /// Path of the spool file.
    pub fn path(&self) -> PathBuf {
        self.dir.join(SPOOL_FILE)
    }

    /// Reads every well-formed notice without removing any.
    pub fn pending(&self) -> Result<Vec<SpooledNotice>, NotificationError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        read_spool(&self.path())
    }

    /// Reads every well-formed notice and empties the spool.
    ///
    /// Callers that fail to deliver some of them hand those back through
    /// [`requeue`](Self::requeue).
    pub fn take_pending(&self) -> Result<Vec<SpooledNotice>, NotificationError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let path = self.path();
        let notices = read_spool(&path)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(NotificationError::Spool(e)),
        }
        Ok(notices)
    }

    /// Appends notices that still need delivering.
    pub fn requeue(&self, notices: &[SpooledNotice]) -> Result<(), NotificationError> {
        if notices.is_empty() {
            return Ok(());
        }
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut buf = Vec::new();
        for notice in notices {
            serde_json::to_writer(&mut buf, notice).map_err(NotificationError::Encode)?;
            buf.push(b'\n');
        }
        self.append(&buf)
    }

    /// Appends raw bytes and syncs them to disk.
    fn append(&self, bytes: &[u8]) -> Result<(), NotificationError> {
        std::fs::create_dir_all(&self.dir).map_err(NotificationError::Spool)?;
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(self.path())
            .map_err(NotificationError::Spool)?;
        if ends_mid_line(&mut file).map_err(NotificationError::Spool)? {
            // Terminate a torn line so it doesn't swallow this entry.
            file.write_all(b"\n").map_err(NotificationError::Spool)?;
        }
        file.write_all(bytes).map_err(NotificationError::Spool)?;
        file.sync_all().map_err(NotificationError::Spool)
    }
}

impl Beacon for SpoolBeacon {
    fn is_available(&self) -> bool {
        // The directory either exists or can still be created.
        self.dir.is_dir()
            || self
                .dir
                .parent()
                .is_none_or(|parent| parent.as_os_str().is_empty() || parent.is_dir())
    }

    fn send_beacon(&self, url: &str, body: &[u8]) -> Result<(), NotificationError> {
        let notice = SpooledNotice {
            url: url.to_owned(),
            body: serde_json::from_slice(body).map_err(NotificationError::Encode)?,
            queued_at_ms: now_millis(),
        };
        let mut line = serde_json::to_vec(&notice).map_err(NotificationError::Encode)?;
        line.push(b'\n');

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.append(&line)?;
        tracing::debug!(path = %self.path().display(), url, "offline notice spooled");
        Ok(())
    }
}

fn read_spool(path: &Path) -> Result<Vec<SpooledNotice>, NotificationError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(NotificationError::Spool(e)),
    };

    let mut notices = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(NotificationError::Spool)?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<SpooledNotice>(&line) {
            Ok(notice) => notices.push(notice),
            Err(e) => {
                tracing::warn!(path = %path.display(), line = index + 1, error = %e, "skipping torn spool entry");
            }
        }
    }
    Ok(notices)
}

/// `true` if the file is non-empty and its last byte isn't a newline.
fn ends_mid_line(file: &mut File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}
