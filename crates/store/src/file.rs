//! Append-only, log-structured [`DiskStore`] backed by a single file.
//!
//! Every `put` / `delete` appends one CRC-protected frame (see [`crate::log`])
//! to the end of the file. An in-memory index maps each live key to the
//! offset of its latest value, so `get` is one positioned read. The index is
//! rebuilt by scanning the log on open.
//!
//! Replaced and deleted records stay in the file as garbage until
//! [`FileStore::optimize`] rewrites the log with only live records.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::lock;
use crate::log::{self, FrameOp, FILE_HEADER_BYTES, LOG_MAGIC};
use crate::{DiskStore, StoreError};

/// Location of a live value inside the log.
#[derive(Debug, Clone, Copy)]
struct Slot {
    value_offset: u64,
    value_len: u32,
    frame_len: u64,
}

/// File-backed key-value store.
pub struct FileStore {
    path: PathBuf,
    file: File,
    index: HashMap<Vec<u8>, Slot>,
    /// Current end of the log (next append offset).
    end: u64,
    /// Bytes occupied by superseded or deleted frames.
    garbage: u64,
    /// If `true`, every append is followed by `sync_all()`.
    sync: bool,
    /// Nesting depth of [`DiskStore::lock`]; the OS lock is held while > 0.
    lock_depth: u32,
    /// Reusable frame buffer.
    buf: Vec<u8>,
    #[cfg(test)]
    short_write: Option<usize>,
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.path)
            .field("keys", &self.index.len())
            .field("end", &self.end)
            .field("garbage", &self.garbage)
            .field("sync", &self.sync)
            .field("lock_depth", &self.lock_depth)
            .finish()
    }
}

impl FileStore {
    /// Opens (or creates) the store at `path` with per-write fsync enabled.
    ///
    /// # Recovery
    ///
    /// 1. Create the file with a fresh header if it does not exist.
    /// 2. Scan every frame, rebuilding the key index.
    /// 3. If the scan stopped before the end of the file (crash mid-append),
    ///    truncate the partial frame so later appends stay framed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] on a bad magic, a CRC mismatch, or an
    /// unparsable frame; [`StoreError::Io`] on I/O failure.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let file_len = file.metadata()?.len();
        if file_len == 0 {
            file.write_all(&LOG_MAGIC.to_le_bytes())?;
            file.sync_all()?;
        }

        let mut store = Self {
            path,
            file,
            index: HashMap::new(),
            end: FILE_HEADER_BYTES,
            garbage: 0,
            sync: true,
            lock_depth: 0,
            buf: Vec::with_capacity(256),
            #[cfg(test)]
            short_write: None,
        };
        store.rebuild_index(file_len.max(FILE_HEADER_BYTES))?;
        Ok(store)
    }

    fn rebuild_index(&mut self, file_len: u64) -> Result<(), StoreError> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut rdr = BufReader::new(&self.file);
        log::read_header(&mut rdr)?;

        let mut index: HashMap<Vec<u8>, Slot> = HashMap::new();
        let mut garbage = 0u64;
        let scan = log::scan(&mut rdr, |frame| match frame.op {
            FrameOp::Put {
                value_offset,
                value_len,
            } => {
                let slot = Slot {
                    value_offset,
                    value_len,
                    frame_len: frame.frame_len,
                };
                if let Some(old) = index.insert(frame.key, slot) {
                    garbage += old.frame_len;
                }
            }
            FrameOp::Del => {
                if let Some(old) = index.remove(&frame.key) {
                    garbage += old.frame_len;
                }
                garbage += frame.frame_len;
            }
        })?;
        drop(rdr);

        if scan.valid_end < file_len {
            warn!(
                path = %self.path.display(),
                valid_end = scan.valid_end,
                file_len,
                "discarding partial record at end of store"
            );
            self.file.set_len(scan.valid_end)?;
        }

        debug!(
            path = %self.path.display(),
            keys = index.len(),
            garbage,
            "store index rebuilt"
        );
        self.index = index;
        self.garbage = garbage;
        self.end = scan.valid_end;
        Ok(())
    }

    fn append(&mut self) -> Result<u64, StoreError> {
        let at = self.end;
        if let Err(e) = self.write_frame() {
            // A partial frame must not stay in front of later appends.
            if let Err(cut) = self.file.set_len(at) {
                warn!(at, error = %cut, "could not cut back failed append");
                self.end = self.file.metadata()?.len();
            }
            return Err(e.into());
        }
        self.end += self.buf.len() as u64;
        Ok(at)
    }

    fn write_frame(&mut self) -> io::Result<()> {
        #[cfg(test)]
        if let Some(keep) = self.short_write.take() {
            self.file.write_all(&self.buf[..keep.min(self.buf.len())])?;
            return Err(io::Error::new(io::ErrorKind::Other, "short write"));
        }
        self.file.write_all(&self.buf)?;
        self.file.flush()?;
        if self.sync {
            self.file.sync_all()?;
        }
        Ok(())
    }

    /// Makes the next append write only `bytes` of its frame, then fail.
    #[cfg(test)]
    pub(crate) fn fail_next_append_after(&mut self, bytes: usize) {
        self.short_write = Some(bytes);
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Bytes of superseded records that [`optimize`](Self::optimize) would reclaim.
    pub fn garbage_bytes(&self) -> u64 {
        self.garbage
    }

    /// Current size of the log file in bytes.
    pub fn file_size(&self) -> u64 {
        self.end
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrites the log keeping only live records, reclaiming garbage.
    ///
    /// Crash-safe: live records are copied to `<path>.tmp`, fsynced, and the
    /// temp file is atomically renamed over the log. The advisory lock, if
    /// held, is re-acquired on the new file.
    ///
    /// # Errors
    ///
    /// On I/O failure the original log is left untouched (only the temp file
    /// may remain).
    pub fn optimize(&mut self) -> Result<(), StoreError> {
        let mut tmp_path = self.path.clone().into_os_string();
        tmp_path.push(".tmp");
        let tmp_path = PathBuf::from(tmp_path);
        let before = self.end;

        {
            let tmp = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            let mut w = BufWriter::new(tmp);
            w.write_all(&LOG_MAGIC.to_le_bytes())?;

            let mut frame = Vec::with_capacity(256);
            let mut value = Vec::new();
            for (key, slot) in &self.index {
                value.resize(slot.value_len as usize, 0);
                self.file.seek(SeekFrom::Start(slot.value_offset))?;
                self.file.read_exact(&mut value)?;
                log::frame_put(&mut frame, key, &value)?;
                w.write_all(&frame)?;
            }

            let tmp = w.into_inner().map_err(|e| e.into_error())?;
            tmp.sync_all()?;
        }

        fs::rename(&tmp_path, &self.path)?;

        self.file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        let file_len = self.file.metadata()?.len();
        self.rebuild_index(file_len)?;
        if self.lock_depth > 0 && !lock::try_lock_exclusive(&self.file)? {
            self.lock_depth = 0;
            return Err(StoreError::Locked);
        }

        info!(
            path = %self.path.display(),
            before,
            after = self.end,
            keys = self.index.len(),
            "store optimized"
        );
        Ok(())
    }
}

impl DiskStore for FileStore {
    fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let Some(slot) = self.index.get(key).copied() else {
            return Ok(None);
        };
        let mut value = vec![0u8; slot.value_len as usize];
        self.file.seek(SeekFrom::Start(slot.value_offset))?;
        self.file.read_exact(&mut value)?;
        Ok(Some(value))
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let value_at = log::frame_put(&mut self.buf, key, value)?;
        let frame_len = self.buf.len() as u64;
        let at = self.append()?;

        let slot = Slot {
            value_offset: at + value_at,
            value_len: value.len() as u32,
            frame_len,
        };
        if let Some(old) = self.index.insert(key.to_vec(), slot) {
            self.garbage += old.frame_len;
        }
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        if !self.index.contains_key(key) {
            return Ok(());
        }
        log::frame_del(&mut self.buf, key)?;
        self.append()?;
        if let Some(old) = self.index.remove(key) {
            self.garbage += old.frame_len + self.buf.len() as u64;
        }
        Ok(())
    }

    fn lock(&mut self) -> Result<(), StoreError> {
        if self.lock_depth == 0 && !lock::try_lock_exclusive(&self.file)? {
            return Err(StoreError::Locked);
        }
        self.lock_depth += 1;
        Ok(())
    }

    fn unlock(&mut self) -> Result<(), StoreError> {
        match self.lock_depth {
            0 => Ok(()),
            1 => {
                lock::unlock(&self.file)?;
                self.lock_depth = 0;
                Ok(())
            }
            _ => {
                self.lock_depth -= 1;
                Ok(())
            }
        }
    }

    fn set_sync(&mut self, sync: bool) {
        self.sync = sync;
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        if self.lock_depth > 0 {
            let _ = lock::unlock(&self.file);
        }
        let _ = self.file.sync_all();
    }
}
