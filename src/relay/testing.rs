//! Scripted endpoints for exercising legs, pairs and supervisors.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Yields the scripted chunks in order (splitting any chunk larger than the
/// offered room), then end-of-stream or a permanent `Pending`.
#[derive(Debug)]
pub struct MockReader {
    script: VecDeque<Result<Vec<u8>, io::ErrorKind>>,
    polls: Counter,
    pending_at_end: bool,
    would_block_first: bool,
    blocked: bool,
}

impl MockReader {
    pub fn new(script: Vec<Result<Vec<u8>, io::ErrorKind>>) -> Self {
        Self {
            script: script.into(),
            polls: Counter::default(),
            pending_at_end: false,
            would_block_first: false,
            blocked: false,
        }
    }

    pub fn bytes(data: &[u8], chunk: usize) -> Self {
        Self::new(data.chunks(chunk).map(|c| Ok(c.to_vec())).collect())
    }

    pub fn then_pending(mut self) -> Self {
        self.pending_at_end = true;
        self
    }

    pub fn would_block_first(mut self) -> Self {
        self.would_block_first = true;
        self
    }

    pub fn polls(&self) -> Counter {
        self.polls.clone()
    }
}

impl AsyncRead for MockReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.polls.bump();
        if self.would_block_first && !self.blocked {
            self.blocked = true;
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }
        self.blocked = false;
        match self.script.pop_front() {
            Some(Ok(mut data)) => {
                if data.len() > buf.remaining() {
                    let rest = data.split_off(buf.remaining());
                    self.script.push_front(Ok(rest));
                }
                buf.put_slice(&data);
                Poll::Ready(Ok(()))
            }
            Some(Err(kind)) => Poll::Ready(Err(io::Error::new(kind, "scripted failure"))),
            None if self.pending_at_end => Poll::Pending,
            None => Poll::Ready(Ok(())),
        }
    }
}

#[derive(Debug, Default)]
struct WriterShared {
    out: Mutex<Vec<u8>>,
    shutdowns: AtomicUsize,
    dropped: AtomicBool,
}

#[derive(Debug, Clone)]
pub struct WriterHandle(Arc<WriterShared>);

impl WriterHandle {
    pub fn bytes(&self) -> Vec<u8> {
        self.0.out.lock().unwrap().clone()
    }

    pub fn shutdowns(&self) -> usize {
        self.0.shutdowns.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> bool {
        self.0.dropped.load(Ordering::SeqCst)
    }
}

/// Collects everything written, accepting at most `max_write` bytes per call.
#[derive(Debug)]
pub struct MockWriter {
    shared: Arc<WriterShared>,
    max_write: usize,
    fail_after: Option<usize>,
    would_block_first: bool,
    blocked: bool,
    stall: bool,
}

impl MockWriter {
    pub fn new() -> Self {
        Self {
            shared: Arc::default(),
            max_write: usize::MAX,
            fail_after: None,
            would_block_first: false,
            blocked: false,
            stall: false,
        }
    }

    pub fn max_write(mut self, n: usize) -> Self {
        self.max_write = n;
        self
    }

    /// Fail every write once `n` bytes have been accepted.
    pub fn fail_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    pub fn would_block_first(mut self) -> Self {
        self.would_block_first = true;
        self
    }

    pub fn stalled(mut self) -> Self {
        self.stall = true;
        self
    }

    pub fn handle(&self) -> WriterHandle {
        WriterHandle(self.shared.clone())
    }
}

impl Drop for MockWriter {
    fn drop(&mut self) {
        self.shared.dropped.store(true, Ordering::SeqCst);
    }
}

impl AsyncWrite for MockWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.stall {
            return Poll::Pending;
        }
        if self.would_block_first && !self.blocked {
            self.blocked = true;
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }
        self.blocked = false;
        let mut out = self.shared.out.lock().unwrap();
        if let Some(limit) = self.fail_after {
            if out.len() >= limit {
                return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "scripted failure")));
            }
        }
        let mut n = buf.len().min(self.max_write);
        if let Some(limit) = self.fail_after {
            n = n.min(limit - out.len());
        }
        out.extend_from_slice(&buf[..n]);
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.shared.shutdowns.fetch_add(1, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}

/// Deterministic payload so reordering or duplication shows up in asserts.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}
