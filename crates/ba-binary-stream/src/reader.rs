use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use tracing::{debug, warn};

use crate::errors::StreamError;
use crate::locks::{self, ReadGuard};

/// Default ring-buffer capacity (spec §4.1): 4 MiB.
pub const DEFAULT_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Buffered, ring-buffer-backed reader for the client's binary database
/// format (spec §4.1). Construct one per file; it holds a shared lock on
/// the path's hash slot for its entire lifetime so a concurrent [`crate::Writer`]
/// on the same path blocks until every reader is dropped.
///
/// All failures latch: once `error_flag` is set, every subsequent read or
/// skip call returns zeroed output and the first error is preserved
/// (spec §4.1, §7, §8 invariant 6's sibling for reads).
pub struct Reader {
    file: Option<File>,
    _lock: ReadGuard,
    path: String,

    buffer: Box<[u8]>,
    read_pos: usize,
    write_pos: usize,
    buffered_bytes: usize,

    total_pos: u64,
    total_size: u64,

    error: Option<StreamError>,
}

impl Reader {
    /// Opens `path` for buffered reading. The shared lock is acquired
    /// before the file is opened and held until the `Reader` is dropped.
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self::with_capacity(path, DEFAULT_BUFFER_SIZE)
    }

    pub fn with_capacity(path: impl AsRef<Path>, capacity: usize) -> Self {
        let path = path.as_ref();
        let path_str = path.to_string_lossy().into_owned();
        let lock = locks::lock_shared(&path_str);

        let mut reader = Self {
            file: None,
            _lock: lock,
            path: path_str.clone(),
            buffer: vec![0u8; capacity].into_boxed_slice(),
            read_pos: 0,
            write_pos: 0,
            buffered_bytes: 0,
            total_pos: 0,
            total_size: 0,
            error: None,
        };

        match File::open(path) {
            Ok(mut file) => match file.seek(SeekFrom::End(0)) {
                Ok(size) => {
                    if let Err(e) = file.seek(SeekFrom::Start(0)) {
                        reader.set_error(StreamError::Seek {
                            path: path_str,
                            source: e.to_string(),
                        });
                        return reader;
                    }
                    reader.total_size = size;
                    reader.file = Some(file);
                }
                Err(e) => {
                    reader.set_error(StreamError::Seek {
                        path: path_str,
                        source: e.to_string(),
                    });
                }
            },
            Err(e) => {
                // Missing optional databases are routine; only log at debug.
                debug!(path = %path_str, error = %e, "failed to open file for reading");
                reader.set_error(StreamError::OpenForRead {
                    path: path_str,
                    source: e.to_string(),
                });
            }
        }

        reader
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

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn total_pos(&self) -> u64 {
        self.total_pos
    }

    fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Refills the ring buffer from the file, wrapping around the end of
    /// the backing slice in at most two segments, exactly as the original
    /// `ByteBufferedFile::Reader::read_bytes` does.
    fn refill(&mut self) {
        let Some(file) = self.file.as_mut() else {
            return;
        };

        let available_space = self.capacity() - self.buffered_bytes;
        if available_space == 0 {
            return;
        }

        if self.write_pos + available_space <= self.capacity() {
            let read = file
                .read(&mut self.buffer[self.write_pos..self.write_pos + available_space])
                .unwrap_or(0);
            self.write_pos = (self.write_pos + read) % self.capacity();
            self.buffered_bytes += read;
        } else {
            let first_part = self.capacity() - self.write_pos;
            let first_read = file.read(&mut self.buffer[self.write_pos..]).unwrap_or(0);

            if first_read == first_part && available_space > first_part {
                let second_part = available_space - first_part;
                let second_read = file.read(&mut self.buffer[..second_part]).unwrap_or(0);
                self.write_pos = second_read;
                self.buffered_bytes += first_read + second_read;
            } else {
                self.write_pos = (self.write_pos + first_read) % self.capacity();
                self.buffered_bytes += first_read;
            }
        }
    }

    /// Reads up to `out.len()` bytes, returning the number actually served.
    /// Bounded by the ring buffer's capacity (spec §4.1); `out` is zeroed on
    /// any failure path, mirroring the original's `memset`-on-error
    /// behavior so callers that don't check the return value still see a
    /// deterministic (zeroed) result.
    pub fn read_bytes(&mut self, out: &mut [u8]) -> usize {
        if self.error.is_some() {
            out.fill(0);
            return 0;
        }

        let mut len = out.len();
        if len > self.capacity() {
            self.set_error(StreamError::ReadOverflow {
                requested: len,
                capacity: self.capacity(),
            });
            out.fill(0);
            return 0;
        }

        if self.buffered_bytes < len {
            self.refill();
        }

        if self.buffered_bytes == 0 {
            out.fill(0);
            return 0;
        }

        if self.buffered_bytes < len {
            len = self.buffered_bytes;
        }

        if self.read_pos + len <= self.capacity() {
            out[..len].copy_from_slice(&self.buffer[self.read_pos..self.read_pos + len]);
        } else {
            let first_part = self.capacity() - self.read_pos;
            let second_part = len - first_part;
            out[..first_part].copy_from_slice(&self.buffer[self.read_pos..]);
            out[first_part..len].copy_from_slice(&self.buffer[..second_part]);
        }
        if len < out.len() {
            out[len..].fill(0);
        }

        self.read_pos = (self.read_pos + len) % self.capacity();
        self.buffered_bytes -= len;
        self.total_pos += len as u64;

        len
    }

    /// Bitwise copy of `size_of::<T>()` bytes (spec §4.1). Zeroed on short
    /// read, same as `read_bytes`.
    pub fn read<T: bytemuck::Pod>(&mut self) -> T {
        let mut value = T::zeroed();
        let bytes = bytemuck::bytes_of_mut(&mut value);
        let got = self.read_bytes(bytes);
        if got != bytes.len() {
            bytes.fill(0);
        }
        value
    }

    /// Adjusts ring pointers for a skip within buffered data, or seeks the
    /// underlying file (invalidating the buffer) when the skip exceeds what
    /// is currently buffered.
    pub fn skip_bytes(&mut self, n: u64) {
        if self.error.is_some() {
            return;
        }

        if n as usize <= self.buffered_bytes {
            let n = n as usize;
            self.read_pos = (self.read_pos + n) % self.capacity();
            self.buffered_bytes -= n;
            self.total_pos += n as u64;
            return;
        }

        let skip_from_buffer = self.buffered_bytes as u64;
        let skip_from_file = n - skip_from_buffer;
        self.total_pos += skip_from_buffer;

        if let Some(file) = self.file.as_mut() {
            if let Err(e) = file.seek(SeekFrom::Current(skip_from_file as i64)) {
                self.set_error(StreamError::Seek {
                    path: self.path.clone(),
                    source: e.to_string(),
                });
                return;
            }
        }

        self.total_pos += skip_from_file;
        self.read_pos = 0;
        self.write_pos = 0;
        self.buffered_bytes = 0;
    }

    pub fn skip<T: bytemuck::Pod>(&mut self) {
        self.skip_bytes(std::mem::size_of::<T>() as u64);
    }

    /// ULEB128: 7 bits of payload per byte, high bit set means "more
    /// bytes follow" (GLOSSARY).
    pub fn read_uleb128(&mut self) -> u32 {
        if self.error.is_some() {
            return 0;
        }

        let mut result: u32 = 0;
        let mut shift = 0u32;
        loop {
            let byte: u8 = self.read();
            result |= u32::from(byte & 0x7f) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                break;
            }
            if shift >= 35 {
                // Malformed stream: more than 5 continuation bytes for a u32.
                self.set_error(StreamError::ReadOverflow {
                    requested: shift as usize,
                    capacity: 32,
                });
                return 0;
            }
        }
        result
    }

    /// `u8` presence tag (0 empty, 0x0B present), then ULEB128 length, then
    /// raw bytes.
    pub fn read_string(&mut self) -> String {
        if self.error.is_some() {
            return String::new();
        }

        let tag: u8 = self.read();
        if tag == 0 {
            return String::new();
        }

        let len = self.read_uleb128();
        let mut bytes = vec![0u8; len as usize];
        let got = self.read_bytes(&mut bytes) as u64;
        if got != u64::from(len) {
            self.set_error(StreamError::TruncatedString {
                requested: u64::from(len),
                actual: got,
            });
            return String::new();
        }

        String::from_utf8_lossy(&bytes).into_owned()
    }

    pub fn skip_string(&mut self) {
        if self.error.is_some() {
            return;
        }
        let tag: u8 = self.read();
        if tag == 0 {
            return;
        }
        let len = self.read_uleb128();
        self.skip_bytes(u64::from(len));
    }

    /// Tag, ULEB128 length, then exactly 32 hash-digest bytes. Lengths
    /// greater than 32 are read for 32 bytes and the remainder is skipped
    /// with a warning, not an error (spec §4.1, §8 boundary behavior).
    /// Returns `false` on any irregularity (empty tag, short read,
    /// oversize length) while still leaving the stream positioned at the
    /// next field.
    pub fn read_hash_digest(&mut self, out: &mut [u8; 32]) -> bool {
        if self.error.is_some() {
            return false;
        }

        let tag: u8 = self.read();
        if tag == 0 {
            return false;
        }

        let mut len = self.read_uleb128();
        let mut extra = 0u32;
        let mut success = true;

        if len > 32 {
            warn!(len, "expected 32 bytes for hash digest, got more");
            extra = len - 32;
            len = 32;
            success = false;
        }

        let got = self.read_bytes(&mut out[..len as usize]) as u32;
        if got != len {
            warn!(expected = len, got, "failed to read full hash digest");
            success = false;
        } else if len < 32 {
            out[len as usize..].fill(0);
        }

        self.skip_bytes(u64::from(extra));

        success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_fixture(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn missing_file_latches_error_and_zeroes_reads() {
        let mut reader = Reader::open("/nonexistent/path/does-not-exist.db");
        assert!(!reader.good());
        let value: u32 = reader.read();
        assert_eq!(value, 0);
    }

    #[test]
    fn read_primitive_round_trips() {
        let bytes = 0x0102_0304u32.to_le_bytes();
        let fixture = write_fixture(&bytes);
        let mut reader = Reader::open(fixture.path());
        assert!(reader.good());
        let value: u32 = reader.read();
        assert_eq!(value, 0x0102_0304);
        assert_eq!(reader.total_pos(), 4);
    }

    #[test]
    fn uleb128_small_and_multibyte_values() {
        // 300 = 0b1_0010_1100 -> low 7 bits 0b010_1100 | 0x80, then 0b10
        let bytes = [0xAC, 0x02];
        let fixture = write_fixture(&bytes);
        let mut reader = Reader::open(fixture.path());
        assert_eq!(reader.read_uleb128(), 300);
    }

    #[test]
    fn read_bytes_beyond_capacity_sets_error_and_zeroes() {
        let fixture = write_fixture(&[1, 2, 3, 4]);
        let mut reader = Reader::with_capacity(fixture.path(), 2);
        let mut out = [0xFFu8; 4];
        let n = reader.read_bytes(&mut out);
        assert_eq!(n, 0);
        assert!(!reader.good());
        assert_eq!(out, [0, 0, 0, 0]);
    }

    #[test]
    fn ring_buffer_wraps_correctly_across_many_small_reads() {
        // Force a small buffer so reads wrap around the ring multiple times,
        // and check against a contiguous read of the same file (spec §8).
        let data: Vec<u8> = (0u8..=255).collect();
        let fixture = write_fixture(&data);

        let mut wrapped = Reader::with_capacity(fixture.path(), 16);
        let mut collected = Vec::new();
        loop {
            let mut chunk = [0u8; 3];
            let n = wrapped.read_bytes(&mut chunk);
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&chunk[..n]);
        }

        assert_eq!(collected, data);
    }

    #[test]
    fn skip_bytes_within_buffer_then_beyond_it() {
        let data: Vec<u8> = (0u8..20).collect();
        let fixture = write_fixture(&data);
        let mut reader = Reader::with_capacity(fixture.path(), 8);

        reader.skip_bytes(3);
        let v: u8 = reader.read();
        assert_eq!(v, 3);

        // force a skip larger than what's buffered, invalidating the ring
        reader.skip_bytes(10);
        let v: u8 = reader.read();
        assert_eq!(v, 14);
    }

    #[test]
    fn read_string_empty_and_present() {
        let mut bytes = vec![0u8]; // empty string tag
        bytes.push(0x0B); // present tag
        bytes.push(5); // uleb128 length
        bytes.extend_from_slice(b"hello");
        let fixture = write_fixture(&bytes);

        let mut reader = Reader::open(fixture.path());
        assert_eq!(reader.read_string(), "");
        assert_eq!(reader.read_string(), "hello");
    }

    #[test]
    fn read_hash_digest_oversize_length_reads_32_and_skips_remainder() {
        let mut bytes = vec![0x0B];
        bytes.push(40); // claims 40 bytes
        let payload: Vec<u8> = (0u8..40).collect();
        bytes.extend_from_slice(&payload);
        bytes.push(0xAA); // sentinel after the skipped remainder
        let fixture = write_fixture(&bytes);

        let mut reader = Reader::open(fixture.path());
        let mut digest = [0u8; 32];
        let ok = reader.read_hash_digest(&mut digest);
        assert!(!ok);
        assert_eq!(&digest[..], &payload[..32]);

        let next: u8 = reader.read();
        assert_eq!(next, 0xAA);
    }
}
