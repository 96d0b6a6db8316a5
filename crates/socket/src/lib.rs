#![deny(unsafe_code)]

//! # Socket Pool (C2)
//!
//! A bounded set of persistent TCP connections to the target, capacity
//! `num_threads`. Connections are created lazily up to capacity and reused
//! across tasks. At any instant at most one task holds a given socket (I2):
//! a socket is routed either through the free list, or through exactly one
//! outstanding checkout, never both.
//!
//! `release_broken` closes the connection outright; the next `checkout`
//! opens a fresh one rather than handing out the dead stream again.

use std::collections::VecDeque;
use std::net::{SocketAddr, TcpStream};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SocketPoolError {
    #[error("failed to connect to {addr}: {source}")]
    Connect { addr: SocketAddr, #[source] source: std::io::Error },
    #[error("socket pool is closed")]
    Closed,
}

struct State {
    free: VecDeque<TcpStream>,
    /// Count of sockets either free or checked out; always <= capacity.
    live: usize,
    closed: bool,
}

struct Inner {
    addr: SocketAddr,
    capacity: usize,
    connect_timeout: Duration,
    state: Mutex<State>,
    available: Condvar,
}

/// A bounded pool of TCP connections to a single target address.
#[derive(Clone)]
pub struct SocketPool {
    inner: Arc<Inner>,
}

/// A socket borrowed from the pool. Release it with [`SocketPool::release`]
/// on success or [`SocketPool::release_broken`] on any send/recv error,
/// short read at EOF before a terminator, or parser-reported framing
/// violation — exactly the conditions enumerated in §4.2. If a caller drops
/// this guard without releasing it explicitly (e.g. an early return via
/// `?`), [`Drop`] treats that as broken: we cannot assume an abandoned
/// connection is still in a known protocol state.
pub struct PooledSocket {
    stream: Option<TcpStream>,
    pool: Option<Arc<Inner>>,
    released: bool,
}

impl SocketPool {
    pub fn new(addr: SocketAddr, capacity: usize) -> SocketPool {
        Self::with_connect_timeout(addr, capacity, Duration::from_secs(10))
    }

    pub fn with_connect_timeout(addr: SocketAddr, capacity: usize, connect_timeout: Duration) -> SocketPool {
        SocketPool {
            inner: Arc::new(Inner {
                addr,
                capacity,
                connect_timeout,
                state: Mutex::new(State {
                    free: VecDeque::with_capacity(capacity),
                    live: 0,
                    closed: false,
                }),
                available: Condvar::new(),
            }),
        }
    }

    /// Blocks until a connection is available: reuses a free one, opens a
    /// new one if under capacity, or waits for a release.
    pub fn checkout(&self) -> Result<PooledSocket, SocketPoolError> {
        loop {
            let mut state = self.inner.state.lock().expect("socket pool mutex poisoned");
            if state.closed {
                return Err(SocketPoolError::Closed);
            }
            if let Some(stream) = state.free.pop_front() {
                return Ok(self.wrap(stream));
            }
            if state.live < self.inner.capacity {
                state.live += 1;
                drop(state);
                return match self.connect() {
                    Ok(stream) => Ok(self.wrap(stream)),
                    Err(err) => {
                        let mut state = self.inner.state.lock().expect("socket pool mutex poisoned");
                        state.live -= 1;
                        self.inner.available.notify_one();
                        Err(err)
                    }
                };
            }
            let _unused = self.inner.available.wait(state).expect("socket pool mutex poisoned");
        }
    }

    fn connect(&self) -> Result<TcpStream, SocketPoolError> {
        TcpStream::connect_timeout(&self.inner.addr, self.inner.connect_timeout)
            .map_err(|source| SocketPoolError::Connect { addr: self.inner.addr, source })
    }

    fn wrap(&self, stream: TcpStream) -> PooledSocket {
        PooledSocket {
            stream: Some(stream),
            pool: Some(self.inner.clone()),
            released: false,
        }
    }

    /// Returns a healthy socket to the free list.
    pub fn release(&self, mut guard: PooledSocket) {
        if let Some(stream) = guard.stream.take() {
            let mut state = self.inner.state.lock().expect("socket pool mutex poisoned");
            state.free.push_back(stream);
            drop(state);
            self.inner.available.notify_one();
        }
        guard.released = true;
    }

    /// Closes a broken socket and frees its capacity slot for a future
    /// fresh connection.
    pub fn release_broken(&self, mut guard: PooledSocket) {
        guard.stream.take(); // dropped, closing the connection
        let mut state = self.inner.state.lock().expect("socket pool mutex poisoned");
        state.live = state.live.saturating_sub(1);
        drop(state);
        self.inner.available.notify_one();
        guard.released = true;
    }

    pub fn close(&self) {
        let mut state = self.inner.state.lock().expect("socket pool mutex poisoned");
        state.closed = true;
        state.free.clear();
        self.inner.available.notify_all();
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn idle_count(&self) -> usize {
        self.inner.state.lock().expect("socket pool mutex poisoned").free.len()
    }
}

impl PooledSocket {
    pub fn stream_mut(&mut self) -> &mut TcpStream {
        self.stream.as_mut().expect("socket already released")
    }

    /// Wraps a stream obtained outside of a [`SocketPool`], with no pool to
    /// return to on drop. Lets callers that consume a `PooledSocket`
    /// (rather than a bare `TcpStream`) be exercised against a
    /// directly-connected stream, without a full pool in play.
    pub fn adopt(stream: TcpStream) -> PooledSocket {
        PooledSocket { stream: Some(stream), pool: None, released: false }
    }
}

impl Drop for PooledSocket {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let (Some(_stream), Some(pool)) = (self.stream.take(), self.pool.take()) {
            let mut state = pool.state.lock().expect("socket pool mutex poisoned");
            state.live = state.live.saturating_sub(1);
            drop(state);
            pool.available.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    fn echo_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let mut stream = match stream {
                    Ok(s) => s,
                    Err(_) => continue,
                };
                std::thread::spawn(move || {
                    let mut buf = [0u8; 1024];
                    loop {
                        match stream.read(&mut buf) {
                            Ok(0) | Err(_) => break,
                            Ok(n) => {
                                if stream.write_all(&buf[..n]).is_err() {
                                    break;
                                }
                            }
                        }
                    }
                });
            }
        });
        addr
    }

    #[test]
    fn checkout_respects_capacity() {
        let addr = echo_server();
        let pool = SocketPool::new(addr, 1);
        let first = pool.checkout().unwrap();
        let pool2 = pool.clone();
        let handle = std::thread::spawn(move || pool2.checkout().unwrap());
        std::thread::sleep(Duration::from_millis(20));
        assert!(!handle.is_finished());
        pool.release(first);
        let second = handle.join().unwrap();
        pool.release(second);
    }

    #[test]
    fn release_broken_frees_a_slot_for_reconnect() {
        let addr = echo_server();
        let pool = SocketPool::new(addr, 1);
        let sock = pool.checkout().unwrap();
        pool.release_broken(sock);
        let fresh = pool.checkout().unwrap();
        pool.release(fresh);
    }

    #[test]
    fn idle_count_reflects_free_list() {
        let addr = echo_server();
        let pool = SocketPool::new(addr, 2);
        let a = pool.checkout().unwrap();
        let b = pool.checkout().unwrap();
        assert_eq!(pool.idle_count(), 0);
        pool.release(a);
        assert_eq!(pool.idle_count(), 1);
        pool.release(b);
        assert_eq!(pool.idle_count(), 2);
    }
}
