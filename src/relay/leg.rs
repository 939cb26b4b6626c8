//! The two legs of a relay pair.
//!
//! A leg is a small state machine: it is either runnable, suspended on one
//! [`WaitReason`], or finished. Legs never block; each call to `step` makes at
//! most one endpoint call and reports whether it changed anything the
//! sibling leg cares about.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, trace};

use super::endpoint::{poll_read_partial, ReadOutcome};
use super::ring_buffer::{ReadSide, WriteSide};
use crate::error::RelayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Reader,
    Writer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Reader => f.write_str("reader"),
            Role::Writer => f.write_str("writer"),
        }
    }
}

/// What a suspended leg is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    /// The endpoint returned `Pending`; its readiness will re-poll the task.
    Endpoint,
    /// Reader: no room left. Writer: nothing to drain. Only the sibling's
    /// commit can change this.
    Buffer,
}

/// Terminal state of a leg.
#[derive(Debug)]
pub enum Finish {
    Eof,
    Closed,
    /// Reader stopped because its writer is gone.
    SiblingFinished,
    /// Force-closed by the supervisor or an explicit stop.
    Aborted,
    Failed(RelayError),
}

impl Finish {
    pub fn is_hard_error(&self) -> bool {
        match self {
            Finish::Failed(e) => e.is_hard(),
            _ => false,
        }
    }
}

#[derive(Debug)]
pub enum LegState {
    Runnable,
    Waiting(WaitReason),
    Finished(Finish),
}

/// Outcome of one `step`, from the sibling's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Moved,
    Finished,
    Idle,
}

impl Step {
    pub fn wakes_sibling(self) -> bool {
        self != Step::Idle
    }
}

#[derive(Debug)]
struct LegCore<T> {
    label: String,
    role: Role,
    endpoint: Option<T>,
    state: LegState,
    bytes: u64,
}

impl<T> LegCore<T> {
    fn new(label: &str, role: Role, endpoint: T) -> Self {
        Self {
            label: label.to_owned(),
            role,
            endpoint: Some(endpoint),
            state: LegState::Runnable,
            bytes: 0,
        }
    }

    fn is_finished(&self) -> bool {
        matches!(self.state, LegState::Finished(_))
    }

    fn suspend(&mut self, reason: WaitReason) -> Step {
        self.state = LegState::Waiting(reason);
        Step::Idle
    }

    /// Terminal transition. The endpoint is dropped here, so no further
    /// operation can be issued for this leg.
    fn finish(&mut self, finish: Finish) -> Step {
        if self.is_finished() {
            return Step::Idle;
        }
        match &finish {
            Finish::Failed(e) => {
                info!("buffer ({}) {} connection fail: {}", self.label, self.role, e)
            }
            other => debug!("buffer ({}) {} finished: {:?}", self.label, self.role, other),
        }
        self.endpoint = None;
        self.state = LegState::Finished(finish);
        Step::Finished
    }

    fn wake(&mut self) {
        if let LegState::Waiting(WaitReason::Buffer) = self.state {
            trace!("buffer ({}) {} woken", self.label, self.role);
            self.state = LegState::Runnable;
        }
    }

    fn abort(&mut self) {
        self.finish(Finish::Aborted);
    }

    fn take_finish(&mut self) -> Finish {
        match std::mem::replace(&mut self.state, LegState::Finished(Finish::Aborted)) {
            LegState::Finished(finish) => finish,
            _ => Finish::Aborted,
        }
    }
}

#[derive(Debug)]
pub struct ReaderLeg<R> {
    core: LegCore<R>,
}

impl<R: AsyncRead + Unpin> ReaderLeg<R> {
    pub fn new(label: &str, endpoint: R) -> Self {
        Self {
            core: LegCore::new(label, Role::Reader, endpoint),
        }
    }

    /// With no room the leg suspends on the buffer and does not touch the
    /// endpoint at all.
    pub fn step(
        &mut self,
        cx: &mut Context<'_>,
        mut side: ReadSide<'_>,
        writer_finished: bool,
    ) -> Step {
        if self.core.is_finished() {
            return Step::Idle;
        }
        if writer_finished {
            return self.core.finish(Finish::SiblingFinished);
        }
        if side.available() == 0 {
            return self.core.suspend(WaitReason::Buffer);
        }

        let endpoint = match self.core.endpoint.as_mut() {
            Some(endpoint) => endpoint,
            None => return self.core.finish(Finish::Aborted),
        };
        match poll_read_partial(endpoint, cx, side.room()) {
            Poll::Pending => self.core.suspend(WaitReason::Endpoint),
            Poll::Ready(Err(e)) => {
                let err = RelayError::read(self.core.bytes, e);
                self.core.finish(Finish::Failed(err))
            }
            Poll::Ready(Ok(ReadOutcome::Eof)) => self.core.finish(Finish::Eof),
            Poll::Ready(Ok(ReadOutcome::Data(n))) => {
                trace!("buffer ({}) read {} bytes", self.core.label, n);
                self.core.bytes += n as u64;
                self.core.state = LegState::Runnable;
                if side.commit(n) {
                    Step::Moved
                } else {
                    Step::Idle
                }
            }
        }
    }
}

impl<R> ReaderLeg<R> {
    pub fn state(&self) -> &LegState {
        &self.core.state
    }

    pub fn is_finished(&self) -> bool {
        self.core.is_finished()
    }

    pub fn bytes(&self) -> u64 {
        self.core.bytes
    }

    pub fn wake(&mut self) {
        self.core.wake()
    }

    pub fn abort(&mut self) {
        self.core.abort()
    }

    pub(crate) fn take_finish(&mut self) -> Finish {
        self.core.take_finish()
    }
}

/// Drains the pair's buffer into a destination endpoint, closing it once the
/// reader is done and nothing is left.
#[derive(Debug)]
pub struct WriterLeg<W> {
    core: LegCore<W>,
    needs_flush: bool,
    closing: bool,
}

impl<W: AsyncWrite + Unpin> WriterLeg<W> {
    pub fn new(label: &str, endpoint: W) -> Self {
        Self {
            core: LegCore::new(label, Role::Writer, endpoint),
            needs_flush: false,
            closing: false,
        }
    }

    pub fn step(
        &mut self,
        cx: &mut Context<'_>,
        mut side: WriteSide<'_>,
        reader_finished: bool,
    ) -> Step {
        if self.core.is_finished() {
            return Step::Idle;
        }
        let endpoint = match self.core.endpoint.as_mut() {
            Some(endpoint) => endpoint,
            None => return self.core.finish(Finish::Aborted),
        };
        let mut endpoint = Pin::new(endpoint);

        if !self.closing && side.available() > 0 {
            return match endpoint.as_mut().poll_write(cx, side.pending()) {
                Poll::Pending => self.core.suspend(WaitReason::Endpoint),
                Poll::Ready(Ok(0)) => {
                    let e = io::Error::new(io::ErrorKind::WriteZero, "write zero byte into writer");
                    let err = RelayError::write(self.core.bytes, e);
                    self.core.finish(Finish::Failed(err))
                }
                Poll::Ready(Ok(n)) => {
                    trace!("buffer ({}) wrote {} bytes", self.core.label, n);
                    self.core.bytes += n as u64;
                    self.core.state = LegState::Runnable;
                    self.needs_flush = true;
                    if side.commit(n) {
                        Step::Moved
                    } else {
                        Step::Idle
                    }
                }
                Poll::Ready(Err(e)) => {
                    let err = RelayError::write(self.core.bytes, e);
                    self.core.finish(Finish::Failed(err))
                }
            };
        }

        if self.needs_flush {
            match endpoint.as_mut().poll_flush(cx) {
                Poll::Pending => return self.core.suspend(WaitReason::Endpoint),
                Poll::Ready(Err(e)) => {
                    let err = RelayError::write(self.core.bytes, e);
                    return self.core.finish(Finish::Failed(err));
                }
                Poll::Ready(Ok(())) => self.needs_flush = false,
            }
        }

        if !reader_finished {
            return self.core.suspend(WaitReason::Buffer);
        }

        // Empty and the reader is done: propagate end-of-stream. `closing`
        // keeps a pending shutdown from being restarted as a fresh close.
        self.closing = true;
        match endpoint.as_mut().poll_shutdown(cx) {
            Poll::Pending => self.core.suspend(WaitReason::Endpoint),
            Poll::Ready(Ok(())) => self.core.finish(Finish::Closed),
            Poll::Ready(Err(e)) => {
                let err = RelayError::write(self.core.bytes, e);
                self.core.finish(Finish::Failed(err))
            }
        }
    }
}

impl<W> WriterLeg<W> {
    pub fn state(&self) -> &LegState {
        &self.core.state
    }

    pub fn is_finished(&self) -> bool {
        self.core.is_finished()
    }

    pub fn bytes(&self) -> u64 {
        self.core.bytes
    }

    pub fn wake(&mut self) {
        self.core.wake()
    }

    pub fn abort(&mut self) {
        self.core.abort()
    }

    pub(crate) fn take_finish(&mut self) -> Finish {
        self.core.take_finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::ring_buffer::RingBuffer;
    use crate::relay::testing::{MockReader, MockWriter};
    use futures::task::noop_waker_ref;

    #[test]
    fn reader_with_no_room_makes_no_endpoint_call() {
        let reader = MockReader::new(vec![Ok(vec![1u8; 16])]);
        let polls = reader.polls();
        let mut leg = ReaderLeg::new("t", reader);
        let mut buf = RingBuffer::new(8);
        let _ = buf.commit_read(8);
        let mut cx = Context::from_waker(noop_waker_ref());

        for _ in 0..3 {
            assert_eq!(leg.step(&mut cx, buf.read_side(), false), Step::Idle);
        }
        assert_eq!(polls.get(), 0);
        assert!(matches!(leg.state(), LegState::Waiting(WaitReason::Buffer)));

        // a wake without new room is still a no-op
        leg.wake();
        assert_eq!(leg.step(&mut cx, buf.read_side(), false), Step::Idle);
        assert_eq!(polls.get(), 0);

        let _ = buf.commit_write(8);
        leg.wake();
        assert_eq!(leg.step(&mut cx, buf.read_side(), false), Step::Moved);
        assert_eq!(polls.get(), 1);
        assert_eq!(buf.available_to_write(), 8);
    }

    #[test]
    fn reader_eof_and_error_are_terminal() {
        let mut cx = Context::from_waker(noop_waker_ref());
        let mut buf = RingBuffer::new(8);

        let mut eof = ReaderLeg::new("eof", MockReader::new(vec![]));
        assert_eq!(eof.step(&mut cx, buf.read_side(), false), Step::Finished);
        assert!(matches!(eof.state(), LegState::Finished(Finish::Eof)));
        assert_eq!(eof.step(&mut cx, buf.read_side(), false), Step::Idle);

        let mut failed = ReaderLeg::new(
            "err",
            MockReader::new(vec![Err(io::ErrorKind::Other)]),
        );
        assert_eq!(failed.step(&mut cx, buf.read_side(), false), Step::Finished);
        match failed.state() {
            LegState::Finished(f) => assert!(f.is_hard_error()),
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn reader_stops_when_writer_is_gone() {
        let reader = MockReader::new(vec![Ok(vec![1u8; 4])]);
        let polls = reader.polls();
        let mut leg = ReaderLeg::new("t", reader);
        let mut buf = RingBuffer::new(8);
        let mut cx = Context::from_waker(noop_waker_ref());

        assert_eq!(leg.step(&mut cx, buf.read_side(), true), Step::Finished);
        assert!(matches!(leg.state(), LegState::Finished(Finish::SiblingFinished)));
        assert_eq!(polls.get(), 0);
    }

    #[test]
    fn writer_closes_exactly_once_after_reader_finishes() {
        let writer = MockWriter::new();
        let out = writer.handle();
        let mut leg = WriterLeg::new("t", writer);
        let mut buf = RingBuffer::new(8);
        let mut cx = Context::from_waker(noop_waker_ref());

        assert_eq!(leg.step(&mut cx, buf.write_side(), false), Step::Idle);
        assert!(matches!(leg.state(), LegState::Waiting(WaitReason::Buffer)));
        assert_eq!(out.shutdowns(), 0);

        assert_eq!(leg.step(&mut cx, buf.write_side(), true), Step::Finished);
        assert!(matches!(leg.state(), LegState::Finished(Finish::Closed)));
        for _ in 0..3 {
            assert_eq!(leg.step(&mut cx, buf.write_side(), true), Step::Idle);
        }
        assert_eq!(out.shutdowns(), 1);
        assert!(out.bytes().is_empty());
    }

    #[test]
    fn writer_drains_before_closing() {
        let writer = MockWriter::new().max_write(3);
        let out = writer.handle();
        let mut leg = WriterLeg::new("t", writer);
        let mut buf = RingBuffer::new(8);
        buf.read_side().room()[..5].copy_from_slice(b"hello");
        let _ = buf.commit_read(5);
        let mut cx = Context::from_waker(noop_waker_ref());

        assert_eq!(leg.step(&mut cx, buf.write_side(), true), Step::Moved);
        assert_eq!(out.shutdowns(), 0);
        assert_eq!(leg.step(&mut cx, buf.write_side(), true), Step::Moved);
        assert_eq!(buf.cursors(), (0, 0));
        assert_eq!(leg.step(&mut cx, buf.write_side(), true), Step::Finished);
        assert_eq!(out.bytes(), b"hello");
        assert_eq!(out.shutdowns(), 1);
        assert_eq!(leg.bytes(), 5);
    }

    #[test]
    fn writer_zero_write_is_a_failure() {
        let writer = MockWriter::new().max_write(0);
        let mut leg = WriterLeg::new("t", writer);
        let mut buf = RingBuffer::new(8);
        let _ = buf.commit_read(2);
        let mut cx = Context::from_waker(noop_waker_ref());

        assert_eq!(leg.step(&mut cx, buf.write_side(), false), Step::Finished);
        match leg.take_finish() {
            Finish::Failed(RelayError::EndpointWrite { after: 0, source }) => {
                assert_eq!(source.kind(), io::ErrorKind::WriteZero)
            }
            other => panic!("unexpected finish {:?}", other),
        }
    }

    #[test]
    fn abort_finishes_without_closing() {
        let writer = MockWriter::new();
        let out = writer.handle();
        let mut leg = WriterLeg::new("t", writer);
        leg.abort();
        assert!(matches!(leg.state(), LegState::Finished(Finish::Aborted)));
        assert_eq!(out.shutdowns(), 0);
        assert!(out.dropped());
    }
}
