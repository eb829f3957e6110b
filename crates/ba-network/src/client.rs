use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex as StdMutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::errors::NetworkError;
use crate::request::{HttpRequest, HttpResponse, ProgressCallback, RequestId, ResponseCallback};
use crate::websocket::{SocketBuffers, WebSocketHandle, WebSocketId};

enum Command {
    Http {
        id: RequestId,
        request: HttpRequest,
        progress: Option<ProgressCallback>,
    },
    ConnectWebSocket {
        id: RequestId,
        url: String,
    },
    Shutdown,
}

enum Completion {
    Http(RequestId, HttpResponse),
    WebSocket(RequestId, Result<WebSocketHandle, NetworkError>),
}

/// What `update()` does with a finished request: invoke a registered
/// callback, or wake a blocked synchronous caller (spec §4.7).
enum Waiter {
    Callback(ResponseCallback),
    Sync(Arc<SyncSlot<HttpResponse>>),
}

enum WsWaiter {
    Sync(Arc<SyncSlot<Result<WebSocketHandle, NetworkError>>>),
}

struct SyncSlot<T> {
    state: StdMutex<Option<T>>,
    condvar: Condvar,
}

impl<T> SyncSlot<T> {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: StdMutex::new(None),
            condvar: Condvar::new(),
        })
    }

    fn fulfill(&self, value: T) {
        let mut state = self.state.lock().unwrap();
        *state = Some(value);
        self.condvar.notify_all();
    }

    fn wait(&self) -> T {
        let mut state = self.state.lock().unwrap();
        while state.is_none() {
            state = self.condvar.wait(state).unwrap();
        }
        state.take().unwrap()
    }
}

/// A single background thread servicing all HTTP and WebSocket traffic
/// (spec §4.7). Requests are enqueued from any thread; completions are
/// drained on the main thread by [`NetworkClient::update`], which is the
/// only place request/response callbacks run (progress callbacks are the
/// documented exception and run on the network thread).
pub struct NetworkClient {
    cmd_tx: crossbeam_channel::Sender<Command>,
    completed_rx: crossbeam_channel::Receiver<Completion>,
    http_waiters: Mutex<HashMap<u64, Waiter>>,
    ws_waiters: Mutex<HashMap<u64, WsWaiter>>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl NetworkClient {
    pub fn new() -> Self {
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded::<Command>();
        let (completed_tx, completed_rx) = crossbeam_channel::unbounded::<Completion>();

        let worker = std::thread::Builder::new()
            .name("ba-network".to_string())
            .spawn(move || run_background(&cmd_rx, &completed_tx))
            .expect("failed to spawn network thread");

        Self {
            cmd_tx,
            completed_rx,
            http_waiters: Mutex::new(HashMap::new()),
            ws_waiters: Mutex::new(HashMap::new()),
            worker: Some(worker),
        }
    }

    /// Enqueues `request`; `on_complete` runs from [`Self::update`] on
    /// whichever thread calls it (spec §4.7: main thread, by convention).
    pub fn request_async(
        &self,
        request: HttpRequest,
        on_complete: ResponseCallback,
        progress: Option<ProgressCallback>,
    ) {
        let id = RequestId::next();
        self.http_waiters
            .lock()
            .insert(id.bits(), Waiter::Callback(on_complete));
        let _ = self.cmd_tx.send(Command::Http { id, request, progress });
    }

    /// Blocks the calling thread on a condition variable until the
    /// response arrives (spec §4.7).
    pub fn request_sync(&self, request: HttpRequest) -> HttpResponse {
        let id = RequestId::next();
        let slot = SyncSlot::new();
        self.http_waiters
            .lock()
            .insert(id.bits(), Waiter::Sync(Arc::clone(&slot)));
        let _ = self.cmd_tx.send(Command::Http {
            id,
            request,
            progress: None,
        });
        slot.wait()
    }

    /// Initiates a WebSocket handshake; blocks until it succeeds or fails
    /// (spec §4.7: "blocking the network thread for the handshake is
    /// acceptable"). The handle returned is already live: received frames
    /// accumulate immediately and queued sends are drained in the
    /// background as soon as they're queued.
    pub fn connect_websocket(&self, url: impl Into<String>) -> Result<WebSocketHandle, NetworkError> {
        let id = RequestId::next();
        let slot = SyncSlot::new();
        self.ws_waiters
            .lock()
            .insert(id.bits(), WsWaiter::Sync(Arc::clone(&slot)));
        let _ = self.cmd_tx.send(Command::ConnectWebSocket {
            id,
            url: url.into(),
        });
        slot.wait()
    }

    /// Drains the completion queue and runs each finished request's
    /// callback or wakes its synchronous waiter. Returns the number of
    /// completions processed.
    pub fn update(&self) -> usize {
        let mut processed = 0;
        while let Ok(completion) = self.completed_rx.try_recv() {
            match completion {
                Completion::Http(id, response) => {
                    if let Some(waiter) = self.http_waiters.lock().remove(&id.bits()) {
                        match waiter {
                            Waiter::Callback(cb) => cb(response),
                            Waiter::Sync(slot) => slot.fulfill(response),
                        }
                    }
                }
                Completion::WebSocket(id, result) => {
                    if let Some(WsWaiter::Sync(slot)) = self.ws_waiters.lock().remove(&id.bits()) {
                        slot.fulfill(result);
                    }
                }
            }
            processed += 1;
        }
        processed
    }
}

impl Default for NetworkClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NetworkClient {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_background(cmd_rx: &crossbeam_channel::Receiver<Command>, completed_tx: &crossbeam_channel::Sender<Completion>) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build network runtime");

    let http_client = reqwest::Client::new();

    while let Ok(command) = cmd_rx.recv() {
        match command {
            Command::Shutdown => break,
            Command::Http { id, request, progress } => {
                let http_client = http_client.clone();
                let completed_tx = completed_tx.clone();
                runtime.spawn(async move {
                    let response = execute_http(&http_client, request, progress).await;
                    let _ = completed_tx.send(Completion::Http(id, response));
                });
            }
            Command::ConnectWebSocket { id, url } => {
                let completed_tx = completed_tx.clone();
                runtime.spawn(async move {
                    let result = connect_websocket(&url).await;
                    let _ = completed_tx.send(Completion::WebSocket(id, result));
                });
            }
        }
    }
}

async fn execute_http(client: &reqwest::Client, request: HttpRequest, progress: Option<ProgressCallback>) -> HttpResponse {
    let method = match request.method {
        crate::request::HttpMethod::Get => reqwest::Method::GET,
        crate::request::HttpMethod::Post => reqwest::Method::POST,
        crate::request::HttpMethod::Put => reqwest::Method::PUT,
        crate::request::HttpMethod::Delete => reqwest::Method::DELETE,
    };

    let mut builder = client.request(method, &request.url);
    if request.multipart.is_empty() {
        builder = builder.body(request.body);
    } else {
        let mut form = reqwest::multipart::Form::new();
        for part in request.multipart {
            let fallback_data = part.content_type.is_some().then(|| part.data.clone());
            let mut reqwest_part = reqwest::multipart::Part::bytes(part.data);
            if let Some(file_name) = part.file_name.clone() {
                reqwest_part = reqwest_part.file_name(file_name);
            }
            if let Some(content_type) = part.content_type {
                reqwest_part = match reqwest_part.mime_str(&content_type) {
                    Ok(p) => p,
                    Err(_) => {
                        warn!(%content_type, "invalid multipart content type, dropping it");
                        let mut rebuilt = reqwest::multipart::Part::bytes(
                            fallback_data.expect("content_type was Some"),
                        );
                        if let Some(file_name) = part.file_name {
                            rebuilt = rebuilt.file_name(file_name);
                        }
                        rebuilt
                    }
                };
            }
            form = form.part(part.name, reqwest_part);
        }
        builder = builder.multipart(form);
    }
    for (key, value) in &request.headers {
        builder = builder.header(key, value);
    }

    let response = match builder.send().await {
        Ok(response) => response,
        Err(err) => {
            warn!(url = %request.url, error = %err, "http request failed");
            return HttpResponse::transport_failure();
        }
    };

    let status_code = response.status().as_u16();
    let success = response.status().is_success();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
        .collect();

    let total = response.content_length().unwrap_or(0);
    if let Some(progress) = &progress {
        progress(0, total);
    }

    let body = match response.bytes().await {
        Ok(bytes) => bytes.to_vec(),
        Err(err) => {
            warn!(url = %request.url, error = %err, "failed reading response body");
            return HttpResponse::transport_failure();
        }
    };

    if let Some(progress) = &progress {
        progress(body.len() as u64, total);
    }

    HttpResponse {
        success,
        status_code,
        headers,
        body,
    }
}

async fn connect_websocket(url: &str) -> Result<WebSocketHandle, NetworkError> {
    let (stream, _response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|err| NetworkError::WebSocketHandshake(err.to_string()))?;

    let id = WebSocketId::next();
    let buffers = SocketBuffers::new();
    debug!(%url, "websocket connected");

    let pump_buffers = Arc::clone(&buffers);
    tokio::spawn(async move { pump_socket(stream, pump_buffers).await });

    Ok(WebSocketHandle { id, buffers })
}

async fn pump_socket(
    stream: tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    buffers: Arc<SocketBuffers>,
) {
    use std::sync::atomic::Ordering;
    use tokio_tungstenite::tungstenite::Message;

    let (mut sink, mut stream) = stream.split();

    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Binary(data))) => buffers.push_inbound(data),
                    Some(Ok(Message::Text(text))) => buffers.push_inbound(text.into_bytes()),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(error = %err, "websocket read error");
                        break;
                    }
                }
            }
            _ = buffers.outbound_notify.notified() => {
                let frames: Vec<Vec<u8>> = buffers.outbound.lock().drain(..).collect();
                for frame in frames {
                    if sink.send(Message::Binary(frame)).await.is_err() {
                        break;
                    }
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(500)) => {
                // periodic wakeup so a socket with no traffic still notices
                // its buffers being dropped (handle went out of scope).
                if Arc::strong_count(&buffers) == 1 {
                    break;
                }
            }
        }
    }

    buffers.closed.store(true, Ordering::Release);
}
