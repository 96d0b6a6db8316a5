#![deny(unsafe_code)]

//! # Buffer Pool (C1)
//!
//! A fixed-count pool of pre-allocated, equal-sized byte buffers with
//! blocking checkout/return. Pool size is `floor(max_memory_limit /
//! chunk_size)`, and construction fails if that is below `num_threads + 2`
//! (§4.1): the two headroom slots cover the metadump task and one
//! in-flight rotation hand-off, so a task holding a socket never waits
//! forever on a buffer while every other worker is also blocked on buffer
//! checkout (§5 deadlock avoidance).
//!
//! Checkout has no timeout. On shutdown, [`BufferPool::close`] wakes every
//! blocked waiter with [`BufferPoolError::Closed`] so tasks can exit
//! promptly. Every buffer is routed through a single `Mutex`-guarded free
//! list, never referenced by two owners at once (I1).

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

use thiserror::Error;

/// Errors from buffer pool operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferPoolError {
    /// The requested pool size is below `num_threads + headroom`.
    #[error("buffer pool capacity {capacity} is below the required minimum {minimum}")]
    Undersized { capacity: u64, minimum: u64 },
    /// The pool has been shut down; no further buffers will be handed out.
    #[error("buffer pool is closed")]
    Closed,
}

#[derive(Debug)]
struct State {
    free: VecDeque<Vec<u8>>,
    closed: bool,
}

#[derive(Debug)]
struct Inner {
    chunk_size: usize,
    capacity: usize,
    state: Mutex<State>,
    not_empty: Condvar,
}

/// A bounded pool of `chunk_size`-byte buffers.
#[derive(Clone, Debug)]
pub struct BufferPool {
    inner: Arc<Inner>,
}

/// A buffer checked out from the pool. Returns itself to the pool on drop,
/// so every exit path (including task failure) releases it — the scoped
/// acquisition pattern the design notes call for in place of a raw owning
/// handle.
#[derive(Debug)]
pub struct PooledBuffer {
    data: Vec<u8>,
    valid_len: usize,
    pool: Option<Arc<Inner>>,
}

impl BufferPool {
    /// Builds a pool of `capacity` buffers of `chunk_size` bytes, requiring
    /// `capacity >= num_threads + headroom`. Buffers are allocated and
    /// zero-filled once, here; callers track their own valid-byte length on
    /// each checkout instead of the pool re-zeroing between uses.
    pub fn new(chunk_size: u64, capacity: u64, num_threads: u64, headroom: u64) -> Result<BufferPool, BufferPoolError> {
        let minimum = num_threads + headroom;
        if capacity < minimum {
            return Err(BufferPoolError::Undersized { capacity, minimum });
        }
        let capacity = capacity as usize;
        let chunk_size = chunk_size as usize;
        let mut free = VecDeque::with_capacity(capacity);
        for _ in 0..capacity {
            free.push_back(vec![0u8; chunk_size]);
        }
        Ok(BufferPool {
            inner: Arc::new(Inner {
                chunk_size,
                capacity,
                state: Mutex::new(State { free, closed: false }),
                not_empty: Condvar::new(),
            }),
        })
    }

    /// Blocks until a buffer is available, or returns [`BufferPoolError::Closed`]
    /// if the pool is (or becomes) closed while waiting.
    pub fn checkout(&self) -> Result<PooledBuffer, BufferPoolError> {
        let mut state = self.inner.state.lock().expect("buffer pool mutex poisoned");
        loop {
            if state.closed {
                return Err(BufferPoolError::Closed);
            }
            if let Some(data) = state.free.pop_front() {
                return Ok(PooledBuffer {
                    data,
                    valid_len: 0,
                    pool: Some(self.inner.clone()),
                });
            }
            state = self.inner.not_empty.wait(state).expect("buffer pool mutex poisoned");
        }
    }

    /// Number of buffers currently free. Used by tests verifying P3 (no
    /// buffer leak): after quiescence this must equal `capacity()`.
    pub fn free_count(&self) -> usize {
        self.inner.state.lock().expect("buffer pool mutex poisoned").free.len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn chunk_size(&self) -> usize {
        self.inner.chunk_size
    }

    /// Marks the pool closed and wakes every blocked waiter so in-flight
    /// tasks observe [`BufferPoolError::Closed`] promptly instead of
    /// hanging on `checkout`.
    pub fn close(&self) {
        let mut state = self.inner.state.lock().expect("buffer pool mutex poisoned");
        state.closed = true;
        self.inner.not_empty.notify_all();
    }
}

impl PooledBuffer {
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.valid_len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn valid_len(&self) -> usize {
        self.valid_len
    }

    pub fn set_valid_len(&mut self, len: usize) {
        debug_assert!(len <= self.data.len());
        self.valid_len = len.min(self.data.len());
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            let data = std::mem::take(&mut self.data);
            let mut state = pool.state.lock().expect("buffer pool mutex poisoned");
            state.free.push_back(data);
            drop(state);
            pool.not_empty.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_undersized_pool() {
        let err = BufferPool::new(1024, 2, 4, 2).unwrap_err();
        assert_eq!(err, BufferPoolError::Undersized { capacity: 2, minimum: 6 });
    }

    #[test]
    fn accepts_exact_headroom() {
        let pool = BufferPool::new(1024, 6, 4, 2).unwrap();
        assert_eq!(pool.capacity(), 6);
    }

    #[test]
    fn checkout_and_drop_returns_buffer() {
        let pool = BufferPool::new(16, 2, 0, 2).unwrap();
        assert_eq!(pool.free_count(), 2);
        {
            let mut buf = pool.checkout().unwrap();
            assert_eq!(pool.free_count(), 1);
            buf.as_mut_slice()[0] = 7;
            buf.set_valid_len(1);
            assert_eq!(buf.as_slice(), &[7]);
        }
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn checkout_blocks_until_return() {
        let pool = BufferPool::new(16, 1, 0, 1).unwrap();
        let first = pool.checkout().unwrap();
        let pool2 = pool.clone();
        let handle = std::thread::spawn(move || pool2.checkout().unwrap());
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(!handle.is_finished());
        drop(first);
        let second = handle.join().unwrap();
        assert_eq!(second.capacity(), 16);
    }

    #[test]
    fn no_buffer_leak_after_many_checkouts() {
        let pool = BufferPool::new(16, 4, 0, 4).unwrap();
        for _ in 0..100 {
            let _b = pool.checkout().unwrap();
        }
        assert_eq!(pool.free_count(), pool.capacity());
    }

    #[test]
    fn close_wakes_blocked_waiters_with_closed_error() {
        let pool = BufferPool::new(16, 1, 0, 1).unwrap();
        let _held = pool.checkout().unwrap();
        let pool2 = pool.clone();
        let handle = std::thread::spawn(move || pool2.checkout());
        std::thread::sleep(std::time::Duration::from_millis(20));
        pool.close();
        let result = handle.join().unwrap();
        assert_eq!(result.unwrap_err(), BufferPoolError::Closed);
    }
}
