use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Per-socket inbound buffer cap (spec §4.7: "accumulating inbound frames
/// into a receive buffer (capped per-socket)"). Oldest frames are dropped
/// on overflow so a slow consumer can't grow memory unbounded.
const MAX_BUFFERED_FRAMES: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WebSocketId(pub(crate) u64);

static NEXT_SOCKET_ID: AtomicU64 = AtomicU64::new(1);

impl WebSocketId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SOCKET_ID.fetch_add(1, Ordering::Relaxed))
    }
}

pub(crate) struct SocketBuffers {
    pub(crate) inbound: Mutex<VecDeque<Vec<u8>>>,
    pub(crate) outbound: Mutex<VecDeque<Vec<u8>>>,
    pub(crate) closed: AtomicBool,
    /// Woken by [`WebSocketHandle::send`] so the background pump task
    /// drains `outbound` promptly instead of polling on a timer.
    pub(crate) outbound_notify: tokio::sync::Notify,
}

impl SocketBuffers {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            inbound: Mutex::new(VecDeque::new()),
            outbound: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
            outbound_notify: tokio::sync::Notify::new(),
        })
    }

    pub(crate) fn push_inbound(&self, frame: Vec<u8>) {
        let mut inbound = self.inbound.lock();
        if inbound.len() >= MAX_BUFFERED_FRAMES {
            inbound.pop_front();
        }
        inbound.push_back(frame);
    }
}

/// A connected WebSocket (spec §4.7). Cheap to clone; all clones share the
/// same underlying buffers.
#[derive(Clone)]
pub struct WebSocketHandle {
    pub(crate) id: WebSocketId,
    pub(crate) buffers: Arc<SocketBuffers>,
}

impl WebSocketHandle {
    /// Queues `frame` for the background pump task to drain to the socket.
    pub fn send(&self, frame: Vec<u8>) {
        self.buffers.outbound.lock().push_back(frame);
        self.buffers.outbound_notify.notify_one();
    }

    /// Drains all frames received since the last call.
    pub fn poll_received(&self) -> Vec<Vec<u8>> {
        self.buffers.inbound.lock().drain(..).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.buffers.closed.load(Ordering::Acquire)
    }
}
