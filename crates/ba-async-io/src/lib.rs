//! Asynchronous file I/O queue, grounded on the engine's original
//! SDL-backed `AsyncIOHandler`: at most one operation per path at a time,
//! completions collected off-thread and only handed back to callers when
//! [`AsyncIoEngine::update`] is pumped.
//!
//! On `wasm32` targets tokio has no multi-threaded I/O driver, so a build
//! targeting the web should route through a synchronous `std::fs`-backed
//! stand-in that calls back inline from `read`/`write` instead of spawning;
//! the single-flight and "callback runs exactly once" contract is
//! unaffected, only the latency characteristics change. This crate does
//! not ship that stand-in itself — the native path below is the one
//! actually exercised by the desktop client.

mod completion;
mod engine;

pub use engine::AsyncIoEngine;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[tokio::test]
    async fn write_then_read_round_trips_through_update_pump() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin").to_string_lossy().into_owned();

        let engine = AsyncIoEngine::new();

        let write_ok = Arc::new(Mutex::new(None));
        let write_ok_clone = Arc::clone(&write_ok);
        assert!(engine.write(
            path.clone(),
            b"hello world".to_vec(),
            Some(Box::new(move |ok| {
                *write_ok_clone.lock().unwrap() = Some(ok);
            })),
        ));

        engine.cleanup(Duration::from_secs(5));
        assert_eq!(*write_ok.lock().unwrap(), Some(true));

        let read_data = Arc::new(Mutex::new(None));
        let read_data_clone = Arc::clone(&read_data);
        assert!(engine.read(path, move |data| {
            *read_data_clone.lock().unwrap() = Some(data);
        }));

        engine.cleanup(Duration::from_secs(5));
        assert_eq!(
            read_data.lock().unwrap().as_deref(),
            Some(b"hello world".as_slice())
        );
    }

    #[tokio::test]
    async fn second_operation_against_busy_path_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("busy.bin").to_string_lossy().into_owned();

        let engine = AsyncIoEngine::new();
        assert!(engine.write(path.clone(), vec![1, 2, 3], None));
        assert!(!engine.write(path.clone(), vec![4, 5, 6], None));

        engine.cleanup(Duration::from_secs(5));
    }

    #[tokio::test]
    async fn read_of_missing_file_yields_empty_data() {
        let engine = AsyncIoEngine::new();
        let data = Arc::new(Mutex::new(None));
        let data_clone = Arc::clone(&data);

        assert!(engine.read("/nonexistent/path/missing.bin", move |d| {
            *data_clone.lock().unwrap() = Some(d);
        }));

        engine.cleanup(Duration::from_secs(5));
        assert_eq!(data.lock().unwrap().as_deref(), Some(b"".as_slice()));
    }
}
