//! Block-based SPSC ring buffer
//!
//! Couples the device callback thread to the demodulator thread. The ring is
//! a fixed sequence of equally sized sample blocks; the producer writes at
//! element granularity and commits whole blocks, the consumer takes one
//! committed block at a time. The only shared mutable state is the full-block
//! count and the shutdown flag under a single mutex/condvar pair; block
//! payloads are copied outside the lock.
//!
//! # Safety
//!
//! Payload access is synchronized by the block protocol, not the mutex:
//! the producer only writes elements of blocks that are not counted in
//! `num_full_blocks`, and the consumer only reads blocks that are. Commits
//! and consumes go through the mutex, whose unlock/lock pairs provide the
//! release/acquire edge that makes block contents visible across threads.

use std::cell::UnsafeCell;
use std::sync::{Arc, Condvar, Mutex};

struct State {
    num_full_blocks: usize,
    shutdown: bool,
}

pub struct RingBuffer<T> {
    data: Box<[UnsafeCell<T>]>,
    block_size: usize,
    num_blocks: usize,
    state: Mutex<State>,
    cond: Condvar,
}

// SAFETY: the SPSC block protocol above guarantees that a given element is
// never accessed from both threads at once.
unsafe impl<T: Send> Send for RingBuffer<T> {}
unsafe impl<T: Send> Sync for RingBuffer<T> {}

impl<T: Copy + Default> RingBuffer<T> {
    /// Allocate a ring of `num_blocks` blocks of `block_size` samples and
    /// split it into its single writer and single reader.
    pub fn new(block_size: usize, num_blocks: usize) -> (RingWriter<T>, RingReader<T>) {
        assert!(block_size > 0 && num_blocks > 1);
        let ring = Arc::new(RingBuffer {
            data: (0..block_size * num_blocks)
                .map(|_| UnsafeCell::new(T::default()))
                .collect(),
            block_size,
            num_blocks,
            state: Mutex::new(State { num_full_blocks: 0, shutdown: false }),
            cond: Condvar::new(),
        });
        (
            RingWriter { ring: Arc::clone(&ring), write_pos: 0, num_full_blocks: 0 },
            RingReader { ring, num_full_blocks: 0, read_block: 0 },
        )
    }
}

impl<T> RingBuffer<T> {
    fn size(&self) -> usize {
        self.block_size * self.num_blocks
    }

    /// Signal `n` newly committed blocks; returns the new full count.
    fn commit_blocks(&self, n: usize) -> usize {
        let full = {
            let mut st = self.state.lock().unwrap();
            st.num_full_blocks += n;
            st.num_full_blocks
        };
        self.cond.notify_one();
        full
    }

    /// Signal `n` consumed blocks; returns the new full count.
    fn consume_blocks(&self, n: usize) -> usize {
        let full = {
            let mut st = self.state.lock().unwrap();
            st.num_full_blocks -= n;
            st.num_full_blocks
        };
        self.cond.notify_one();
        full
    }

    fn shutdown(&self) {
        self.state.lock().unwrap().shutdown = true;
        self.cond.notify_all();
    }

    /// Block until a committed block exists (returns the full count) or the
    /// ring was shut down with nothing left (returns 0).
    fn wait_for_new_blocks(&self) -> usize {
        let mut st = self.state.lock().unwrap();
        while !st.shutdown && st.num_full_blocks == 0 {
            st = self.cond.wait(st).unwrap();
        }
        st.num_full_blocks
    }

    /// Block until at least one block beyond the partially written one is
    /// free, or the ring shuts down.
    fn wait_for_space(&self) -> (usize, bool) {
        let mut st = self.state.lock().unwrap();
        while !st.shutdown && self.num_blocks - st.num_full_blocks <= 1 {
            st = self.cond.wait(st).unwrap();
        }
        (st.num_full_blocks, st.shutdown)
    }

    /// Copy `src` into the ring starting at element `start`, wrapping.
    ///
    /// SAFETY: caller must hold the producer role and `src` must fit in
    /// uncommitted space.
    unsafe fn copy_in(&self, start: usize, src: &[T]) {
        let base = self.data.as_ptr() as *mut T;
        let first = src.len().min(self.size() - start);
        std::ptr::copy_nonoverlapping(src.as_ptr(), base.add(start), first);
        if src.len() > first {
            std::ptr::copy_nonoverlapping(src.as_ptr().add(first), base, src.len() - first);
        }
    }

    /// Borrow one block.
    ///
    /// SAFETY: caller must hold the consumer role and the block must be
    /// committed.
    unsafe fn block(&self, index: usize) -> &[T] {
        std::slice::from_raw_parts(
            self.data.as_ptr().add(index * self.block_size) as *const T,
            self.block_size,
        )
    }
}

/// Producer handle. Owns the element-granular write cursor.
pub struct RingWriter<T> {
    ring: Arc<RingBuffer<T>>,
    write_pos: usize,
    /// Local copy of the full count; stale values only make us wait sooner.
    num_full_blocks: usize,
}

impl<T: Copy + Default> RingWriter<T> {
    /// Copy `src` into the ring, committing every block boundary crossed.
    /// Blocks while the ring is full; returns the number of samples actually
    /// written, which is short only if the ring shuts down underneath us.
    pub fn write(&mut self, src: &[T]) -> usize {
        let block_size = self.ring.block_size;
        let size = self.ring.size();
        let mut remaining = src;

        while !remaining.is_empty() {
            let used = self.num_full_blocks * block_size + self.write_pos % block_size;
            let free = size - used;

            if free == 0 {
                let (full, shutdown) = self.ring.wait_for_space();
                if shutdown {
                    return src.len() - remaining.len();
                }
                self.num_full_blocks = full;
                continue;
            }

            let n = remaining.len().min(free);
            let offset_in_block = self.write_pos % block_size;
            let new_full_blocks = (offset_in_block + n) / block_size;

            // SAFETY: `n` is bounded by the uncommitted space computed from a
            // full count that can only overestimate.
            unsafe {
                self.ring.copy_in(self.write_pos, &remaining[..n]);
            }
            self.write_pos = (self.write_pos + n) % size;

            if new_full_blocks > 0 {
                self.num_full_blocks = self.ring.commit_blocks(new_full_blocks);
            }
            remaining = &remaining[n..];
        }
        src.len()
    }

    /// Pad the current block to its boundary so the consumer can drain the
    /// tail of the stream. Returns the number of padding samples written.
    pub fn finish_block(&mut self, padding: T) -> usize {
        let partial = self.write_pos % self.ring.block_size;
        if partial == 0 {
            return 0;
        }
        let pad = vec![padding; self.ring.block_size - partial];
        self.write(&pad)
    }

    /// Signal that no more data will be written.
    pub fn shutdown(&self) {
        self.ring.shutdown();
    }
}

/// Consumer handle. Owns the read-block cursor.
pub struct RingReader<T> {
    ring: Arc<RingBuffer<T>>,
    num_full_blocks: usize,
    read_block: usize,
}

impl<T: Copy + Default> RingReader<T> {
    /// True once the ring is shut down and every committed block is drained.
    /// Blocks while the ring is empty but still open.
    pub fn eof(&mut self) -> bool {
        if self.num_full_blocks > 0 {
            return false;
        }
        self.num_full_blocks = self.ring.wait_for_new_blocks();
        self.num_full_blocks == 0
    }

    /// Run `f` on the oldest committed block, then release it. Does nothing
    /// if no block is available (call `eof` first).
    pub fn process<F: FnOnce(&[T])>(&mut self, f: F) {
        if self.num_full_blocks == 0 {
            return;
        }
        // SAFETY: the block at the read cursor is committed and the producer
        // will not touch it until we consume it below.
        let block = unsafe { self.ring.block(self.read_block) };
        f(block);
        self.read_block = (self.read_block + 1) % self.ring.num_blocks;
        self.num_full_blocks = self.ring.consume_blocks(1);
    }
}
