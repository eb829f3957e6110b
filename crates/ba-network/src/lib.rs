//! A single background thread multiplexing HTTP and WebSocket traffic
//! (spec §4.7). Requests enqueue from any thread; [`NetworkClient::update`]
//! drains finished work and runs callbacks on whichever thread calls it —
//! by convention, the main thread.

mod client;
mod errors;
mod request;
mod websocket;

pub use client::NetworkClient;
pub use errors::NetworkError;
pub use request::{HttpMethod, HttpRequest, HttpResponse, MultipartPart, ProgressCallback, ResponseCallback};
pub use websocket::WebSocketHandle;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn wait_until(mut predicate: impl FnMut() -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if predicate() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        predicate()
    }

    #[test]
    fn async_request_against_an_invalid_host_reports_transport_failure() {
        let client = NetworkClient::new();
        let done = Arc::new(AtomicBool::new(false));
        let status = Arc::new(AtomicU16::new(0));
        let done_clone = Arc::clone(&done);
        let status_clone = Arc::clone(&status);

        client.request_async(
            HttpRequest::get("http://127.0.0.1.invalid.test/nope"),
            Box::new(move |response| {
                status_clone.store(response.status_code, Ordering::SeqCst);
                done_clone.store(true, Ordering::SeqCst);
            }),
            None,
        );

        assert!(wait_until(
            || {
                client.update();
                done.load(Ordering::SeqCst)
            },
            Duration::from_secs(5)
        ));
        assert_eq!(status.load(Ordering::SeqCst), 0);
    }
}
