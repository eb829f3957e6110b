//! Buffered binary I/O for the client's own database files (collections,
//! scores, avatar/thumbnail/background cache indexes): a ring-buffer
//! [`Reader`] paired with a staged-temp-file [`Writer`], coordinated by a
//! striped shared-mutex scheme so concurrent readers never block each
//! other but always exclude a writer of the same path.

mod errors;
mod locks;
mod reader;
mod writer;

pub use errors::StreamError;
pub use reader::{Reader, DEFAULT_BUFFER_SIZE as DEFAULT_READ_BUFFER_SIZE};
pub use writer::{Writer, DEFAULT_BUFFER_SIZE as DEFAULT_WRITE_BUFFER_SIZE};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_like_record_round_trips_through_writer_and_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collections.db");

        let mut writer = Writer::create(&path);
        writer.write_uleb128(2); // record count
        writer.write_string("Favorites");
        writer.write_uleb128(3); // map count
        writer.write_string("abcd1234 0");
        writer.write_string("Extras");
        writer.write_uleb128(0);
        writer.close().unwrap();

        let mut reader = Reader::open(&path);
        assert_eq!(reader.read_uleb128(), 2);
        assert_eq!(reader.read_string(), "Favorites");
        assert_eq!(reader.read_uleb128(), 3);
        assert_eq!(reader.read_string(), "abcd1234 0");
        assert_eq!(reader.read_string(), "Extras");
        assert_eq!(reader.read_uleb128(), 0);
        assert!(reader.good());
    }
}
