use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use tracing::{error, warn};

use crate::errors::StreamError;
use crate::locks::{self, WriteGuard};

/// Default write buffer capacity, matching [`crate::reader::DEFAULT_BUFFER_SIZE`].
pub const DEFAULT_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Buffered writer that stages output at `path + ".tmp"` and only promotes
/// it over `path` on a clean, explicit [`Writer::close`] (spec §4.1's
/// atomic-write pattern). If `close` is never called, or the write was
/// aborted via a latched error, the temp file is left on disk and the
/// original is untouched — the original client silently drops an
/// unpromoted writer the same way, trusting the next run to overwrite the
/// stale `.tmp`.
pub struct Writer {
    file: Option<File>,
    _lock: WriteGuard,
    dest_path: PathBuf,
    tmp_path: PathBuf,

    buffer: Vec<u8>,
    capacity: usize,

    error: Option<StreamError>,
    closed: bool,
}

impl Writer {
    pub fn create(path: impl AsRef<Path>) -> Self {
        Self::with_capacity(path, DEFAULT_BUFFER_SIZE)
    }

    pub fn with_capacity(path: impl AsRef<Path>, capacity: usize) -> Self {
        let dest_path = path.as_ref().to_path_buf();
        let path_str = dest_path.to_string_lossy().into_owned();
        let lock = locks::lock_exclusive(&path_str);

        let mut tmp_path = dest_path.clone();
        let tmp_name = match dest_path.file_name() {
            Some(name) => format!("{}.tmp", name.to_string_lossy()),
            None => "output.tmp".to_string(),
        };
        tmp_path.set_file_name(tmp_name);

        let mut writer = Self {
            file: None,
            _lock: lock,
            dest_path,
            tmp_path: tmp_path.clone(),
            buffer: Vec::with_capacity(capacity.min(DEFAULT_BUFFER_SIZE)),
            capacity,
            error: None,
            closed: false,
        };

        match File::create(&tmp_path) {
            Ok(file) => writer.file = Some(file),
            Err(e) => {
                writer.set_error(StreamError::OpenForWrite {
                    path: tmp_path.to_string_lossy().into_owned(),
                    source: e.to_string(),
                });
            }
        }

        writer
    }

    fn set_error(&mut self, err: StreamError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    pub fn good(&self) -> bool {
        self.error.is_none()
    }

    pub fn error(&self) -> Option<&StreamError> {
        self.error.as_ref()
    }

    fn append(&mut self, bytes: &[u8]) {
        if self.error.is_some() {
            return;
        }
        if self.buffer.len() + bytes.len() > self.capacity {
            self.flush_buffer();
        }
        if bytes.len() > self.capacity {
            self.set_error(StreamError::WriteOverflow {
                requested: bytes.len(),
                capacity: self.capacity,
            });
            return;
        }
        self.buffer.extend_from_slice(bytes);
    }

    fn flush_buffer(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let Some(file) = self.file.as_mut() else {
            return;
        };
        if let Err(e) = file.write_all(&self.buffer) {
            self.set_error(StreamError::Write {
                path: self.tmp_path.to_string_lossy().into_owned(),
                source: e.to_string(),
            });
        }
        self.buffer.clear();
    }

    /// Flushes any buffered bytes to the temp file without promoting it.
    pub fn flush(&mut self) {
        self.flush_buffer();
    }

    pub fn write<T: bytemuck::Pod>(&mut self, value: &T) {
        self.append(bytemuck::bytes_of(value));
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.append(bytes);
    }

    pub fn write_uleb128(&mut self, mut value: u32) {
        loop {
            let mut byte = (value & 0x7f) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            self.write(&byte);
            if value == 0 {
                break;
            }
        }
    }

    /// Presence tag (0 empty, 0x0B present), ULEB128 length, raw UTF-8
    /// bytes — the inverse of [`crate::Reader::read_string`].
    pub fn write_string(&mut self, s: &str) {
        if s.is_empty() {
            self.write(&0u8);
            return;
        }
        self.write(&0x0Bu8);
        self.write_uleb128(s.len() as u32);
        self.write_bytes(s.as_bytes());
    }

    /// Presence tag, ULEB128 length (always 32), then the digest bytes.
    pub fn write_hash_digest(&mut self, digest: &[u8; 32]) {
        self.write(&0x0Bu8);
        self.write_uleb128(32);
        self.write_bytes(digest);
    }

    /// Flushes buffered output, then atomically promotes the temp file
    /// over the destination: remove the old file (if any), then rename.
    /// Never promotes if an error has already latched (spec §8 invariant:
    /// a failed write must not corrupt the previous good file).
    pub fn close(mut self) -> Result<(), StreamError> {
        self.flush_buffer();
        self.file = None;

        if let Some(err) = self.error.clone() {
            warn!(
                path = %self.dest_path.display(),
                "not promoting temp file, writer had a latched error"
            );
            return Err(err);
        }

        if self.dest_path.exists() {
            if let Err(e) = fs::remove_file(&self.dest_path) {
                let err = StreamError::Promote {
                    tmp: self.tmp_path.to_string_lossy().into_owned(),
                    dest: self.dest_path.to_string_lossy().into_owned(),
                    source: e.to_string(),
                };
                error!(error = %err, "failed to remove previous file before promotion");
                return Err(err);
            }
        }

        match fs::rename(&self.tmp_path, &self.dest_path) {
            Ok(()) => {
                self.closed = true;
                Ok(())
            }
            Err(e) => {
                let err = StreamError::Promote {
                    tmp: self.tmp_path.to_string_lossy().into_owned(),
                    dest: self.dest_path.to_string_lossy().into_owned(),
                    source: e.to_string(),
                };
                error!(error = %err, "failed to promote temp file");
                Err(err)
            }
        }
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        if !self.closed {
            // Matches the original ByteBufferedFile::Writer destructor:
            // an unclosed writer leaves its .tmp on disk untouched, rather
            // than guessing whether a partial write should be promoted.
            self.flush_buffer();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::Reader;

    #[test]
    fn write_then_read_round_trips_primitives() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.db");

        let mut writer = Writer::create(&path);
        writer.write(&0xDEAD_BEEFu32);
        writer.write_string("hello");
        writer.close().unwrap();

        let mut reader = Reader::open(&path);
        let value: u32 = reader.read();
        assert_eq!(value, 0xDEAD_BEEF);
        assert_eq!(reader.read_string(), "hello");
    }

    #[test]
    fn uleb128_round_trips_multibyte_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.db");

        let mut writer = Writer::create(&path);
        writer.write_uleb128(300);
        writer.write_uleb128(0);
        writer.write_uleb128(u32::MAX);
        writer.close().unwrap();

        let mut reader = Reader::open(&path);
        assert_eq!(reader.read_uleb128(), 300);
        assert_eq!(reader.read_uleb128(), 0);
        assert_eq!(reader.read_uleb128(), u32::MAX);
    }

    #[test]
    fn unclosed_writer_leaves_destination_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.db");
        fs::write(&path, b"original").unwrap();

        {
            let mut writer = Writer::create(&path);
            writer.write(&42u32);
            // dropped without calling close()
        }

        let contents = fs::read(&path).unwrap();
        assert_eq!(contents, b"original");
        assert!(path.with_file_name("out.db.tmp").exists());
    }

    #[test]
    fn hash_digest_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.db");

        let digest = [7u8; 32];
        let mut writer = Writer::create(&path);
        writer.write_hash_digest(&digest);
        writer.close().unwrap();

        let mut reader = Reader::open(&path);
        let mut out = [0u8; 32];
        assert!(reader.read_hash_digest(&mut out));
        assert_eq!(out, digest);
    }
}
