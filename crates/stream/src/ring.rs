// Copyright 2025-2026 CEMAXECUTER LLC

//! Single-producer, single-consumer byte ring between the device callback
//! and the session loop.
//!
//! The producer never waits: bytes that don't fit are dropped and counted.
//! `head` and `tail` are running byte counts; the producer publishes `head`
//! with Release after copying in, the consumer publishes `tail` with Release
//! after copying out, and each side loads the other's index with Acquire.

use std::cell::UnsafeCell;
use std::io::{self, Write};
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::utils::CachePadded;

struct Ring {
    storage: Box<[UnsafeCell<u8>]>,
    /// Bytes ever written (producer-owned)
    head: CachePadded<AtomicU64>,
    /// Bytes ever read (consumer-owned)
    tail: CachePadded<AtomicU64>,
    dropped: AtomicU64,
}

// Producer and consumer only touch disjoint regions, delimited by head/tail
unsafe impl Sync for Ring {}
unsafe impl Send for Ring {}

impl Ring {
    fn capacity(&self) -> usize {
        self.storage.len()
    }

    fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        head.wrapping_sub(tail) as usize
    }

    fn base(&self) -> *mut u8 {
        UnsafeCell::raw_get(self.storage.as_ptr())
    }
}

/// Create a ring of `capacity` bytes and split it into its two ends.
pub fn ring_buffer(capacity: usize) -> (RingProducer, RingConsumer) {
    let storage = (0..capacity).map(|_| UnsafeCell::new(0u8)).collect();
    let ring = Arc::new(Ring {
        storage,
        head: CachePadded::new(AtomicU64::new(0)),
        tail: CachePadded::new(AtomicU64::new(0)),
        dropped: AtomicU64::new(0),
    });
    (
        RingProducer { ring: ring.clone() },
        RingConsumer { ring },
    )
}

/// Writing end, owned by the device callback.
pub struct RingProducer {
    ring: Arc<Ring>,
}

impl RingProducer {
    /// Copy in as much of `data` as fits and return that count. The rest is
    /// dropped and added to the drop counter.
    pub fn push(&mut self, data: &[u8]) -> usize {
        let ring = &*self.ring;
        let cap = ring.capacity();
        let head = ring.head.load(Ordering::Relaxed);
        let tail = ring.tail.load(Ordering::Acquire);

        let free = cap - head.wrapping_sub(tail) as usize;
        let n = data.len().min(free);
        if n < data.len() {
            ring.dropped
                .fetch_add((data.len() - n) as u64, Ordering::Relaxed);
        }
        if n == 0 {
            return 0;
        }

        let start = (head % cap as u64) as usize;
        let first = n.min(cap - start);
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), ring.base().add(start), first);
            ptr::copy_nonoverlapping(data.as_ptr().add(first), ring.base(), n - first);
        }

        ring.head.store(head.wrapping_add(n as u64), Ordering::Release);
        n
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub fn dropped(&self) -> u64 {
        self.ring.dropped.load(Ordering::Relaxed)
    }
}

/// Reading end, owned by the session loop.
pub struct RingConsumer {
    ring: Arc<Ring>,
}

impl RingConsumer {
    /// Write everything currently buffered to `sink` and release it.
    /// Returns the number of bytes written, possibly zero.
    ///
    /// On a write error nothing is released.
    pub fn drain<W: Write>(&mut self, sink: &mut W) -> io::Result<usize> {
        let ring = &*self.ring;
        let cap = ring.capacity();
        let tail = ring.tail.load(Ordering::Relaxed);
        let head = ring.head.load(Ordering::Acquire);

        let avail = head.wrapping_sub(tail) as usize;
        if avail == 0 {
            return Ok(0);
        }

        let start = (tail % cap as u64) as usize;
        let first = avail.min(cap - start);
        let (a, b) = unsafe {
            (
                std::slice::from_raw_parts(ring.base().add(start) as *const u8, first),
                std::slice::from_raw_parts(ring.base() as *const u8, avail - first),
            )
        };
        sink.write_all(a)?;
        sink.write_all(b)?;

        ring.tail.store(tail.wrapping_add(avail as u64), Ordering::Release);
        Ok(avail)
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub fn dropped(&self) -> u64 {
        self.ring.dropped.load(Ordering::Relaxed)
    }
}
