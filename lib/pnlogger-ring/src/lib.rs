//! The pnlogger entry ring
//!
//! A bounded single-producer/single-consumer circular byte buffer holding
//! fixed-size entries. The producer side is driven from a real-time thread and
//! never blocks; both ends synchronize exclusively through the two ring
//! indices, so the critical path on either side is the time it takes to copy
//! one entry.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

#[macro_use]
extern crate tracing;

use std::{
    cell::UnsafeCell,
    ptr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use crossbeam_utils::CachePadded;
use snafu::Snafu;

/// Error returned by [`Producer::try_push`] when no free slot is available.
#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(display("entry ring is full"))]
pub struct RingFull;

/// Error returned by the consumer-side operations when the ring is empty.
#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(display("entry ring is empty"))]
pub struct RingEmpty;

// The two indices are byte offsets into the buffer and always multiples of
// `entry_size`. `end` is advanced only by the producer, `start` only by the
// consumer. One slot stays unused so that `start == end` is unambiguously
// "empty" and `(end + entry_size) % capacity == start` is "full".
//
// Synchronization protocol:
// - producer: load own `end` (Relaxed), load `start` (Acquire), copy the
//   entry in, publish with `end` store (Release)
// - consumer: load own `start` (Relaxed), load `end` (Acquire), copy the
//   entry out, publish with `start` store (Release)
//
// The Release store on an index happens after the byte copy into/out of the
// slot, and the opposite side's Acquire load happens before it touches those
// bytes, so slot contents never race.
#[derive(Debug)]
struct Shared {
    start: CachePadded<AtomicUsize>,
    end: CachePadded<AtomicUsize>,
    buf: UnsafeCell<Box<[u8]>>,
    entry_size: usize,
    capacity: usize,
}

// SAFETY: the buffer is only written by the single `Producer` (slots between
// `end` and `start`) and only read by the single `Consumer` (slots between
// `start` and `end`), with the index protocol above ordering those accesses.
unsafe impl Send for Shared {}
unsafe impl Sync for Shared {}

/// A fixed-capacity SPSC ring of fixed-size byte entries.
///
/// Constructing the ring yields the two endpoint handles; each handle is
/// `Send` but not `Clone`, which is what makes the single-producer and
/// single-consumer roles enforceable at compile time.
#[derive(Debug)]
pub struct EntryRing;

impl EntryRing {
    /// Creates a ring holding up to `slots - 1` entries of `entry_size` bytes.
    ///
    /// One slot is reserved to distinguish the full ring from the empty one.
    ///
    /// # Panics
    ///
    /// Panics if `entry_size` is zero or `slots < 2`.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(entry_size: usize, slots: usize) -> (Producer, Consumer) {
        assert!(entry_size > 0, "entry size must be non-zero");
        assert!(slots >= 2, "ring needs at least two slots");

        let capacity = entry_size * slots;
        let shared = Arc::new(Shared {
            start: CachePadded::new(AtomicUsize::new(0)),
            end: CachePadded::new(AtomicUsize::new(0)),
            buf: UnsafeCell::new(vec![0u8; capacity].into_boxed_slice()),
            entry_size,
            capacity,
        });

        (
            Producer {
                shared: Arc::clone(&shared),
            },
            Consumer { shared },
        )
    }
}

/// The enqueue side of the ring. Held by the ingest endpoint.
#[derive(Debug)]
pub struct Producer {
    shared: Arc<Shared>,
}

impl Producer {
    /// Attempts to enqueue one entry without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`RingFull`] when no free slot is available; the entry is not
    /// stored and the caller decides whether the loss is worth reporting.
    ///
    /// # Panics
    ///
    /// Panics if `entry` is not exactly one entry long.
    pub fn try_push(&mut self, entry: &[u8]) -> Result<(), RingFull> {
        let shared = &*self.shared;
        assert_eq!(entry.len(), shared.entry_size, "pushed entry has wrong size");

        let end = shared.end.load(Ordering::Relaxed);
        let start = shared.start.load(Ordering::Acquire);
        if (end + shared.entry_size) % shared.capacity == start {
            return Err(RingFull);
        }

        // SAFETY: `end` points at a free slot (checked above) that the
        // consumer will not read until the Release store below publishes it.
        unsafe {
            let dst = (*shared.buf.get()).as_mut_ptr().add(end);
            ptr::copy_nonoverlapping(entry.as_ptr(), dst, shared.entry_size);
        }

        shared
            .end
            .store((end + shared.entry_size) % shared.capacity, Ordering::Release);
        Ok(())
    }
}

/// The dequeue side of the ring. Held by the log writer thread.
#[derive(Debug)]
pub struct Consumer {
    shared: Arc<Shared>,
}

impl Consumer {
    /// Copies the head entry into `out` and advances past it.
    ///
    /// # Errors
    ///
    /// Returns [`RingEmpty`] if there is nothing to dequeue.
    ///
    /// # Panics
    ///
    /// Panics if `out` is not exactly one entry long.
    pub fn try_pop(&mut self, out: &mut [u8]) -> Result<(), RingEmpty> {
        assert_eq!(
            out.len(),
            self.shared.entry_size,
            "pop target has wrong size"
        );
        let start = self.head_offset()?;
        self.copy_head(start, out);

        let shared = &*self.shared;
        shared
            .start
            .store((start + shared.entry_size) % shared.capacity, Ordering::Release);
        Ok(())
    }

    /// Copies the first `out.len()` bytes of the head entry without advancing.
    ///
    /// The writer uses this to look at an entry's timestamp before committing
    /// to consuming it.
    ///
    /// # Errors
    ///
    /// Returns [`RingEmpty`] if there is nothing to peek at.
    ///
    /// # Panics
    ///
    /// Panics if `out` is longer than one entry.
    pub fn peek_head(&mut self, out: &mut [u8]) -> Result<(), RingEmpty> {
        assert!(
            out.len() <= self.shared.entry_size,
            "peek target longer than an entry"
        );
        let start = self.head_offset()?;
        self.copy_head(start, out);
        Ok(())
    }

    /// Number of entries currently queued.
    pub fn len(&self) -> usize {
        let shared = &*self.shared;
        let start = shared.start.load(Ordering::Relaxed);
        let end = shared.end.load(Ordering::Acquire);
        ((end + shared.capacity - start) % shared.capacity) / shared.entry_size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries the ring can hold at once.
    pub fn capacity(&self) -> usize {
        self.shared.capacity / self.shared.entry_size - 1
    }

    /// Returns the validated head offset, or [`RingEmpty`].
    ///
    /// This is where the alignment invariant is enforced: `start` must sit on
    /// an entry boundary. It always does, but a corrupted index would
    /// otherwise desynchronize every later entry, so a misaligned value is
    /// logged and snapped back to the start of the entry it landed in.
    fn head_offset(&mut self) -> Result<usize, RingEmpty> {
        let shared = &*self.shared;
        let mut start = shared.start.load(Ordering::Relaxed);
        if start % shared.entry_size != 0 {
            error!(
                message = "Ring start index does not sit on an entry boundary, realigning.",
                start = %start,
                offset = %(start % shared.entry_size),
            );
            start = (start / shared.entry_size) * shared.entry_size;
            shared.start.store(start, Ordering::Release);
        }

        let end = shared.end.load(Ordering::Acquire);
        if start == end {
            return Err(RingEmpty);
        }
        Ok(start)
    }

    fn copy_head(&self, start: usize, out: &mut [u8]) {
        // SAFETY: `start..start + out.len()` lies inside the occupied region
        // (head_offset returned it as non-empty), which the producer will not
        // overwrite until `start` is advanced past it.
        unsafe {
            let src = (*self.shared.buf.get()).as_ptr().add(start);
            ptr::copy_nonoverlapping(src, out.as_mut_ptr(), out.len());
        }
    }
}
