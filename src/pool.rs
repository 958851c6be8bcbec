//! Typed free-lists for per-request allocations.
//!
//! A [`Pool`] hands out values of one type and takes them back. It never
//! resets anything itself: callers reset on checkout and clear on checkin,
//! which keeps the contract visible at the call site. [`BufferPool`] is the
//! byte-buffer specialisation and does clear on checkin.

use bytes::BytesMut;
use parking_lot::Mutex;

/// A free-list of `T` values, safe to share between request tasks.
pub struct Pool<T> {
    idle: Mutex<Vec<T>>,
    make: fn() -> T,
    max_idle: usize,
}

impl<T> Pool<T> {
    /// Creates an empty pool. `make` builds a value when none is idle;
    /// at most `max_idle` returned values are kept.
    pub const fn new(make: fn() -> T, max_idle: usize) -> Self {
        Self { idle: parking_lot::const_mutex(Vec::new()), make, max_idle }
    }

    /// Takes an idle value, or builds a new one.
    pub fn get(&self) -> T {
        let idle = self.idle.lock().pop();
        idle.unwrap_or_else(self.make)
    }

    /// Returns a value. Dropped when the pool already holds `max_idle`.
    pub fn put(&self, value: T) {
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(value);
        }
    }

    /// Number of values waiting to be reused.
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }
}

/// A pool of byte buffers.
///
/// Buffers come back cleared. Buffers that grew beyond `max_capacity` are
/// dropped instead of retained, so one large body does not pin its memory.
pub struct BufferPool {
    pool: Pool<BytesMut>,
    max_capacity: usize,
}

impl BufferPool {
    pub const fn new(max_idle: usize, max_capacity: usize) -> Self {
        Self { pool: Pool::new(BytesMut::new, max_idle), max_capacity }
    }

    /// An empty buffer.
    pub fn get(&self) -> BytesMut {
        self.pool.get()
    }

    pub fn put(&self, mut buf: BytesMut) {
        if buf.capacity() > self.max_capacity {
            return;
        }
        buf.clear();
        self.pool.put(buf);
    }

    pub fn idle(&self) -> usize {
        self.pool.idle()
    }
}
