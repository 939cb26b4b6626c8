use std::fmt;

pub const DEFAULT_CAPACITY: usize = 1024;

/// Fixed-capacity bump buffer shared by the two legs of one relay pair. The
/// region never wraps; both cursors go back to zero once it fully drains.
///
/// Invariant: `0 <= start <= end <= capacity`, and `start == end` implies
/// `start == end == 0`.
pub struct RingBuffer {
    buf: Box<[u8]>,
    start: usize,
    end: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "RingBuffer capacity must be non-zero");
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            start: 0,
            end: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn available_to_read(&self) -> usize {
        self.buf.len() - self.end
    }

    pub fn available_to_write(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn cursors(&self) -> (usize, usize) {
        (self.start, self.end)
    }

    /// Returns true when the other side should be woken.
    #[must_use]
    pub fn commit_read(&mut self, n: usize) -> bool {
        assert!(
            n <= self.available_to_read(),
            "RingBuffer::commit_read({}) exceeds available room {}",
            n,
            self.available_to_read()
        );
        if n == 0 {
            return false;
        }
        self.end += n;
        true
    }

    #[must_use]
    pub fn commit_write(&mut self, n: usize) -> bool {
        assert!(
            n <= self.available_to_write(),
            "RingBuffer::commit_write({}) exceeds pending bytes {}",
            n,
            self.available_to_write()
        );
        if n == 0 {
            return false;
        }
        self.start += n;
        if self.start == self.end {
            // drained: reclaim the full capacity
            self.start = 0;
            self.end = 0;
        }
        true
    }

    pub fn read_side(&mut self) -> ReadSide<'_> {
        ReadSide { inner: self }
    }

    pub fn write_side(&mut self) -> WriteSide<'_> {
        WriteSide { inner: self }
    }
}

impl fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.buf.len())
            .field("start", &self.start)
            .field("end", &self.end)
            .finish()
    }
}

/// Narrow views handed to the legs.
pub struct ReadSide<'a> {
    inner: &'a mut RingBuffer,
}

impl<'a> ReadSide<'a> {
    pub fn available(&self) -> usize {
        self.inner.available_to_read()
    }

    pub fn room(&mut self) -> &mut [u8] {
        let end = self.inner.end;
        &mut self.inner.buf[end..]
    }

    #[must_use]
    pub fn commit(&mut self, n: usize) -> bool {
        self.inner.commit_read(n)
    }
}

pub struct WriteSide<'a> {
    inner: &'a mut RingBuffer,
}

impl<'a> WriteSide<'a> {
    pub fn available(&self) -> usize {
        self.inner.available_to_write()
    }

    pub fn pending(&self) -> &[u8] {
        &self.inner.buf[self.inner.start..self.inner.end]
    }

    #[must_use]
    pub fn commit(&mut self, n: usize) -> bool {
        self.inner.commit_write(n)
    }
}
