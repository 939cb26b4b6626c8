use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use super::leg::{Finish, LegState, ReaderLeg, Step, WaitReason, WriterLeg};
use super::ring_buffer::RingBuffer;

/// One direction of a connection: a reader leg and a writer leg sharing a
/// buffer that nothing else can reach.
#[derive(Debug)]
pub struct RelayPair<R, W> {
    label: String,
    buf: RingBuffer,
    reader: ReaderLeg<R>,
    writer: WriterLeg<W>,
}

#[derive(Debug)]
pub struct PairReport {
    pub label: String,
    pub bytes: u64,
    pub reader: Finish,
    pub writer: Finish,
}

impl PairReport {
    pub fn is_hard_failure(&self) -> bool {
        self.reader.is_hard_error() || self.writer.is_hard_error()
    }
}

impl<R, W> RelayPair<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(label: &str, reader: R, writer: W, capacity: usize) -> Self {
        Self {
            label: label.to_owned(),
            buf: RingBuffer::new(capacity),
            reader: ReaderLeg::new(label, reader),
            writer: WriterLeg::new(label, writer),
        }
    }

    pub fn poll_relay(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        if self.is_finished() {
            return Poll::Ready(());
        }
        loop {
            let read = self
                .reader
                .step(cx, self.buf.read_side(), self.writer.is_finished());
            if read.wakes_sibling() {
                self.writer.wake();
            }

            let write = self
                .writer
                .step(cx, self.buf.write_side(), self.reader.is_finished());
            if write.wakes_sibling() {
                self.reader.wake();
            }

            if self.is_finished() {
                debug!(
                    "pair ({}) done, {} bytes delivered",
                    self.label,
                    self.writer.bytes()
                );
                return Poll::Ready(());
            }
            if read == Step::Idle && write == Step::Idle {
                debug_assert!(
                    !self.both_wait_on_buffer(),
                    "pair ({}) deadlocked on its own buffer: {:?}",
                    self.label,
                    self.buf
                );
                return Poll::Pending;
            }
        }
    }
}

impl<R, W> RelayPair<R, W> {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_finished(&self) -> bool {
        self.reader.is_finished() && self.writer.is_finished()
    }

    pub fn has_hard_failure(&self) -> bool {
        let hard = |state: &LegState| match state {
            LegState::Finished(f) => f.is_hard_error(),
            _ => false,
        };
        hard(self.reader.state()) || hard(self.writer.state())
    }

    /// Force-closes both legs without blocking. Buffered bytes are dropped.
    pub fn abort(&mut self) {
        if !self.is_finished() {
            debug!("pair ({}) aborted", self.label);
        }
        self.reader.abort();
        self.writer.abort();
    }

    pub fn buffer(&self) -> &RingBuffer {
        &self.buf
    }

    pub fn into_report(mut self) -> PairReport {
        PairReport {
            bytes: self.writer.bytes(),
            reader: self.reader.take_finish(),
            writer: self.writer.take_finish(),
            label: self.label,
        }
    }

    fn both_wait_on_buffer(&self) -> bool {
        matches!(self.reader.state(), LegState::Waiting(WaitReason::Buffer))
            && matches!(self.writer.state(), LegState::Waiting(WaitReason::Buffer))
    }
}
