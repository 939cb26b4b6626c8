use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::ready;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::net::{
    unix::{OwnedReadHalf, OwnedWriteHalf},
    UnixStream,
};

/// Read half and write half of one side of a connection.
#[derive(Debug)]
pub struct Endpoint<R, W> {
    pub reader: R,
    pub writer: W,
}

impl<R, W> Endpoint<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    pub fn into_split(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

impl From<UnixStream> for Endpoint<OwnedReadHalf, OwnedWriteHalf> {
    fn from(stream: UnixStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self { reader, writer }
    }
}

impl Endpoint<tokio::io::Stdin, tokio::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

/// Result of one partial read.
///
/// Reads are only issued with a non-empty destination, so a read that fills
/// nothing always means end-of-stream. "Nothing yet" is `Poll::Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    Data(usize),
    Eof,
}

pub fn poll_read_partial<R>(
    reader: &mut R,
    cx: &mut Context<'_>,
    dst: &mut [u8],
) -> Poll<io::Result<ReadOutcome>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    debug_assert!(!dst.is_empty(), "partial read issued without room");
    let mut buf = ReadBuf::new(dst);
    ready!(Pin::new(reader).poll_read(cx, &mut buf))?;
    Poll::Ready(Ok(match buf.filled().len() {
        0 => ReadOutcome::Eof,
        n => ReadOutcome::Data(n),
    }))
}
