//! Write-buffer chain: an ordered FIFO of pending output segments for one
//! connection, drained opportunistically whenever the socket is writable.
//!
//! A segment is either an in-memory byte range or a file range destined for
//! `sendfile(2)`; response bodies never have to be fully materialized in
//! memory before the socket can start accepting them. Backpressure is
//! tracked in queued bytes: past `max_len` the connection should stop
//! reading further request data, and past `2 * max_len` new writes are
//! refused outright so one slow client can't grow its queue without bound.

use std::collections::VecDeque;
use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, IntoRawFd, RawFd};
use std::sync::Arc;

use crate::error::ConnError;

enum ByteSource {
    Owned(Vec<u8>),
    Shared(Arc<[u8]>),
}

impl ByteSource {
    fn as_slice(&self) -> &[u8] {
        match self {
            ByteSource::Owned(v) => v,
            ByteSource::Shared(s) => s,
        }
    }
}

/// Whether this chain is responsible for closing the file descriptor once
/// its segment fully drains.
enum FdHandle {
    /// `File` is dropped (closed) when the segment finishes.
    Owned(File),
    /// The caller keeps ownership; this chain never closes it.
    Borrowed(RawFd),
}

impl FdHandle {
    fn raw(&self) -> RawFd {
        match self {
            FdHandle::Owned(f) => f.as_raw_fd(),
            FdHandle::Borrowed(fd) => *fd,
        }
    }
}

struct ByteSegment {
    data: ByteSource,
    pos: usize,
}

struct FileSegment {
    handle: FdHandle,
    offset: i64,
    remaining: u64,
}

enum Segment {
    Bytes(ByteSegment),
    File(FileSegment),
}

#[derive(Debug, PartialEq, Eq)]
pub enum Backpressure {
    Ok,
    SlowDown,
    Overflow,
}

pub struct WriteChain {
    queue: VecDeque<Segment>,
    queued_bytes: usize,
    max_len: usize,
}

const WRITEV_BATCH: usize = 16;

impl WriteChain {
    pub fn new(max_len: usize) -> Self {
        WriteChain {
            queue: VecDeque::new(),
            queued_bytes: 0,
            max_len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn queued_len(&self) -> usize {
        self.queued_bytes
    }

    pub fn backpressure(&self) -> Backpressure {
        if self.queued_bytes > self.max_len * 2 {
            Backpressure::Overflow
        } else if self.queued_bytes > self.max_len {
            Backpressure::SlowDown
        } else {
            Backpressure::Ok
        }
    }

    fn admit(&mut self, additional: usize) -> Result<(), ConnError> {
        if self.queued_bytes + additional > self.max_len * 2 {
            return Err(ConnError::WriteBufferOverflow);
        }
        self.queued_bytes += additional;
        Ok(())
    }

    /// Copies `data` into the chain. Use when the caller's buffer is
    /// transient (e.g. a stack-local scratch buffer being reused).
    pub fn push_copy(&mut self, data: &[u8]) -> Result<(), ConnError> {
        self.push_owned(data.to_vec())
    }

    /// Takes ownership of `data`; freed once fully written.
    pub fn push_owned(&mut self, data: Vec<u8>) -> Result<(), ConnError> {
        if data.is_empty() {
            return Ok(());
        }
        self.admit(data.len())?;
        self.queue.push_back(Segment::Bytes(ByteSegment {
            data: ByteSource::Owned(data),
            pos: 0,
        }));
        Ok(())
    }

    /// Queues a reference-counted buffer without copying — for bodies kept
    /// alive independently of this connection, such as cached embedded
    /// responses reused across requests.
    pub fn push_shared(&mut self, data: Arc<[u8]>) -> Result<(), ConnError> {
        if data.is_empty() {
            return Ok(());
        }
        self.admit(data.len())?;
        self.queue.push_back(Segment::Bytes(ByteSegment {
            data: ByteSource::Shared(data),
            pos: 0,
        }));
        Ok(())
    }

    /// Queues `len` bytes of `file` starting at `offset` for `sendfile`.
    /// `close_on_drain` selects disposition: `true` transfers ownership of
    /// the fd to this chain (closed once sent), `false` leaves it open for
    /// the caller to manage (e.g. a cached, reused file handle).
    pub fn push_file(
        &mut self,
        file: File,
        offset: u64,
        len: u64,
        close_on_drain: bool,
    ) -> Result<(), ConnError> {
        if len == 0 {
            return Ok(());
        }
        self.admit(len as usize)?;
        let handle = if close_on_drain {
            FdHandle::Owned(file)
        } else {
            FdHandle::Borrowed(file.into_raw_fd())
        };
        self.queue.push_back(Segment::File(FileSegment {
            handle,
            offset: offset as i64,
            remaining: len,
        }));
        Ok(())
    }

    /// Drains as much as the socket accepts without blocking.
    /// Returns `Ok(true)` once the chain is fully empty, `Ok(false)` if the
    /// socket would block with bytes still queued.
    pub fn drain_into(&mut self, socket: &impl AsRawFd) -> io::Result<bool> {
        let fd = socket.as_raw_fd();
        loop {
            match self.queue.front() {
                None => return Ok(true),
                Some(Segment::Bytes(_)) => {
                    if !self.drain_byte_run(fd)? {
                        return Ok(false);
                    }
                }
                Some(Segment::File(_)) => {
                    if !self.drain_file_segment(fd)? {
                        return Ok(false);
                    }
                }
            }
        }
    }

    fn drain_byte_run(&mut self, fd: RawFd) -> io::Result<bool> {
        let mut iovecs: Vec<libc::iovec> = Vec::with_capacity(WRITEV_BATCH);
        for seg in self.queue.iter() {
            let Segment::Bytes(b) = seg else { break };
            let slice = &b.data.as_slice()[b.pos..];
            if slice.is_empty() {
                continue;
            }
            iovecs.push(libc::iovec {
                iov_base: slice.as_ptr() as *mut libc::c_void,
                iov_len: slice.len(),
            });
            if iovecs.len() == WRITEV_BATCH {
                break;
            }
        }
        if iovecs.is_empty() {
            return Ok(true);
        }

        let n = unsafe { libc::writev(fd, iovecs.as_ptr(), iovecs.len() as i32) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(false);
            }
            return Err(err);
        }
        self.advance_bytes(n as usize);
        Ok(true)
    }

    fn advance_bytes(&mut self, mut n: usize) {
        self.queued_bytes -= n;
        while n > 0 {
            let Some(Segment::Bytes(b)) = self.queue.front_mut() else {
                break;
            };
            let remaining = b.data.as_slice().len() - b.pos;
            let take = remaining.min(n);
            b.pos += take;
            n -= take;
            if b.pos == b.data.as_slice().len() {
                self.queue.pop_front();
            }
        }
    }

    fn drain_file_segment(&mut self, out_fd: RawFd) -> io::Result<bool> {
        let Some(Segment::File(f)) = self.queue.front_mut() else {
            return Ok(true);
        };
        let count = f.remaining.min(1 << 20) as libc::size_t;
        let mut offset = f.offset;
        let n = unsafe { libc::sendfile(out_fd, f.handle.raw(), &mut offset, count) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(false);
            }
            return Err(err);
        }
        f.offset = offset;
        f.remaining -= n as u64;
        self.queued_bytes -= n as usize;
        if f.remaining == 0 {
            self.queue.pop_front();
        }
        Ok(n != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};

    fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        server.set_nonblocking(true).unwrap();
        client.set_nonblocking(true).unwrap();
        (server, client)
    }

    #[test]
    fn drains_owned_bytes() {
        let (server, mut client) = connected_pair();
        let mut chain = WriteChain::new(4096);
        chain.push_owned(b"hello".to_vec()).unwrap();
        let done = chain.drain_into(&server).unwrap();
        assert!(done);
        assert!(chain.is_empty());

        std::thread::sleep(std::time::Duration::from_millis(20));
        let mut buf = [0u8; 16];
        use std::io::Read;
        let n = client.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
    }

    #[test]
    fn backpressure_thresholds() {
        let mut chain = WriteChain::new(10);
        chain.push_owned(vec![0u8; 5]).unwrap();
        assert_eq!(chain.backpressure(), Backpressure::Ok);
        chain.push_owned(vec![0u8; 10]).unwrap();
        assert_eq!(chain.backpressure(), Backpressure::SlowDown);
        let err = chain.push_owned(vec![0u8; 20]).unwrap_err();
        assert!(matches!(err, ConnError::WriteBufferOverflow));
    }

    #[test]
    fn multiple_segments_drain_in_order() {
        let (server, mut client) = connected_pair();
        let mut chain = WriteChain::new(4096);
        chain.push_owned(b"abc".to_vec()).unwrap();
        chain.push_owned(b"def".to_vec()).unwrap();
        chain.drain_into(&server).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(20));
        let mut buf = [0u8; 16];
        use std::io::Read;
        let n = client.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"abcdef");
    }
}
