//! The per-stream digest handle.
//!
//! A handle buffers input into 64-byte blocks locally and forwards complete
//! blocks to its server; it owns no hashing logic. One handle serves one
//! logical stream at a time: every operation takes `&mut self`, so a
//! finalize can never race a reset or close on the same stream.

use std::fmt;
use std::sync::mpsc::sync_channel;
use std::sync::Arc;

use crate::error::StreamError;
use crate::lanes::Uid;
use crate::server::{LaneRequest, ServerShared, Tail};
use crate::{Block, Digest, BLOCK_SIZE};

/// An incremental MD5 stream scheduled onto a [`crate::Md5Server`].
///
/// Created by [`crate::Md5Server::new_hasher`]. The stream's lane is bound
/// lazily on the first block sent; when every lane is occupied, that first
/// send blocks until one frees. That is backpressure, not an error, and it never
/// stalls other streams.
///
/// [`sum`](Md5Hasher::sum) finalizes the current accumulation and returns
/// the handle to its freshly-reset state; a later
/// [`update`](Md5Hasher::update) starts a new stream. After
/// [`close`](Md5Hasher::close), `update` fails with
/// [`StreamError::Closed`] while `reset` and `sum` panic; using a released
/// stream is a programming error, not a recoverable condition.
pub struct Md5Hasher {
    server: Arc<ServerShared>,
    uid: Uid,
    /// Partial trailing block carried between `update` calls.
    buf: Block,
    /// Bytes currently held in `buf` (always < `BLOCK_SIZE`).
    nx: usize,
    /// Total bytes written since construction or the last reset/sum.
    len: u64,
    bound: bool,
    closed: bool,
}

impl Md5Hasher {
    pub(crate) fn open(server: Arc<ServerShared>) -> Self {
        let uid = server.next_uid();
        Self {
            server,
            uid,
            buf: [0; BLOCK_SIZE],
            nx: 0,
            len: 0,
            bound: false,
            closed: false,
        }
    }

    /// Feeds bytes into the stream.
    ///
    /// Complete 64-byte blocks are forwarded to the server as they fill; a
    /// partial trailing piece is retained locally across calls. Blocks the
    /// caller only on intake backpressure or first-use lane binding.
    pub fn update(&mut self, data: &[u8]) -> Result<(), StreamError> {
        if self.closed {
            return Err(StreamError::Closed);
        }

        self.len += data.len() as u64;
        let mut rest = data;

        if self.nx > 0 {
            let take = (BLOCK_SIZE - self.nx).min(rest.len());
            self.buf[self.nx..self.nx + take].copy_from_slice(&rest[..take]);
            self.nx += take;
            rest = &rest[take..];
            if self.nx == BLOCK_SIZE {
                let block = self.buf;
                self.send_block(block)?;
                self.nx = 0;
            }
        }

        while rest.len() >= BLOCK_SIZE {
            let block: Block = rest[..BLOCK_SIZE]
                .try_into()
                .expect("slice is exactly one block");
            self.send_block(block)?;
            rest = &rest[BLOCK_SIZE..];
        }

        if !rest.is_empty() {
            self.buf[..rest.len()].copy_from_slice(rest);
            self.nx = rest.len();
        }
        Ok(())
    }

    /// Restarts the stream: clears the local buffer and byte counter and has
    /// the server zero the lane's accumulator, discarding queued blocks.
    ///
    /// # Panics
    ///
    /// Panics if the stream was closed.
    pub fn reset(&mut self) {
        assert!(!self.closed, "reset after close");
        self.nx = 0;
        self.len = 0;
        if self.bound {
            self.server
                .send(LaneRequest::Reset { uid: self.uid })
                .expect("md5 scheduling server disconnected");
        }
    }

    /// Finalizes the stream and returns its digest.
    ///
    /// Applies MD5 padding to the buffered tail, sends the padded block(s)
    /// with a single-use completion channel, and blocks the calling thread
    /// (only) until the digest arrives. The lane is released on delivery and
    /// the handle returns to its freshly-reset state.
    ///
    /// # Panics
    ///
    /// Panics if the stream was closed, or if the scheduler died before
    /// delivering the digest.
    pub fn sum(&mut self) -> Digest {
        assert!(!self.closed, "sum after close");

        let tail = self.padded_tail();
        self.ensure_bound()
            .expect("md5 scheduling server disconnected");

        let (reply, result) = sync_channel(1);
        self.server
            .send(LaneRequest::Finalize {
                uid: self.uid,
                tail,
                reply,
            })
            .expect("md5 scheduling server disconnected");

        let digest = result
            .recv()
            .expect("md5 scheduling server dropped a finalize request");

        // The lane was released with the digest; the handle starts over.
        self.bound = false;
        self.nx = 0;
        self.len = 0;
        digest
    }

    /// Finalizes the stream and appends the digest bytes to `out`.
    pub fn sum_into(&mut self, out: &mut Vec<u8>) {
        let digest = self.sum();
        out.extend_from_slice(&digest);
    }

    /// Releases the stream's lane. Idempotent; later `update` calls fail
    /// with [`StreamError::Closed`]. Also runs on drop.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.bound {
            self.bound = false;
            let _ = self.server.send(LaneRequest::Release { uid: self.uid });
        }
    }

    /// True once the stream was closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Builds the padded tail: the buffered partial block, a 0x80
    /// terminator, zeros up to 56 bytes mod 64, then the 64-bit
    /// little-endian bit length of everything written.
    fn padded_tail(&self) -> Tail {
        let mut bytes = [0_u8; 2 * BLOCK_SIZE];
        bytes[..self.nx].copy_from_slice(&self.buf[..self.nx]);
        bytes[self.nx] = 0x80;

        let tail_len = if self.nx < 56 { BLOCK_SIZE } else { 2 * BLOCK_SIZE };
        let bit_len = self.len << 3;
        bytes[tail_len - 8..tail_len].copy_from_slice(&bit_len.to_le_bytes());

        assert!(
            tail_len % BLOCK_SIZE == 0,
            "internal error: padded tail misaligned (len={tail_len}, nx={})",
            self.nx
        );
        Tail::from_bytes(&bytes[..tail_len])
    }

    /// Binds the stream to a lane on first use; blocks until one is free.
    fn ensure_bound(&mut self) -> Result<(), StreamError> {
        if self.bound {
            return Ok(());
        }
        let (ready, granted) = sync_channel(1);
        self.server.send(LaneRequest::Register {
            uid: self.uid,
            ready,
        })?;
        granted.recv().map_err(|_| StreamError::Disconnected)?;
        self.bound = true;
        Ok(())
    }

    fn send_block(&mut self, block: Block) -> Result<(), StreamError> {
        self.ensure_bound()?;
        self.server.send(LaneRequest::Block {
            uid: self.uid,
            block,
        })
    }
}

impl Drop for Md5Hasher {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Md5Hasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Md5Hasher")
            .field("uid", &self.uid)
            .field("len", &self.len)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
