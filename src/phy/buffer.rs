//! # Packet Buffer Protocol
//!
//! The driver never owns memory of its own. Buffers are obtained through the
//! `alloc` callback and every buffer returns to its originator exactly once:
//! through `release` (abandoned), `rx` (received, which counts as release) or
//! `tx` (transmission concluded, successfully or not).
//!
//! All callbacks run in the restricted execution context. They must finish in
//! bounded time and must not block. The only radio calls they may make are
//! configuration requests (`set_idle`, `set_rx`) that take effect after the
//! current operation.

use crate::error::PhyError;
use crate::phy::packet::Packet;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Allocate a buffer for at least `length` bytes, or `None` if none is free.
pub type AllocFn = Box<dyn FnMut(usize) -> Option<Packet> + Send>;
/// Take back an abandoned buffer.
pub type ReleaseFn = Box<dyn FnMut(Packet) + Send>;
/// A packet was received; ownership returns to the caller.
pub type RxFn = Box<dyn FnMut(Packet) + Send>;
/// A transmission concluded; ownership returns to the caller.
pub type TxFn = Box<dyn FnMut(Packet) + Send>;
/// The RSSI became valid after entering RX.
pub type RssiFn = Box<dyn FnMut(i16) + Send>;

/// The five callbacks handed to `Radio::init`.
///
/// Built incrementally; `init` rejects the set with `InvalidArgument` if any
/// callback is missing.
#[derive(Default)]
pub struct RadioCallbacks {
    alloc: Option<AllocFn>,
    release: Option<ReleaseFn>,
    rx: Option<RxFn>,
    tx: Option<TxFn>,
    rssi: Option<RssiFn>,
}

impl RadioCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_alloc(mut self, f: impl FnMut(usize) -> Option<Packet> + Send + 'static) -> Self {
        self.alloc = Some(Box::new(f));
        self
    }

    pub fn on_release(mut self, f: impl FnMut(Packet) + Send + 'static) -> Self {
        self.release = Some(Box::new(f));
        self
    }

    pub fn on_rx(mut self, f: impl FnMut(Packet) + Send + 'static) -> Self {
        self.rx = Some(Box::new(f));
        self
    }

    pub fn on_tx(mut self, f: impl FnMut(Packet) + Send + 'static) -> Self {
        self.tx = Some(Box::new(f));
        self
    }

    pub fn on_rssi_valid(mut self, f: impl FnMut(i16) + Send + 'static) -> Self {
        self.rssi = Some(Box::new(f));
        self
    }

    /// Alloc and release backed by `pool`.
    pub fn with_pool(self, pool: &PacketPool) -> Self {
        let alloc_pool = pool.clone();
        let release_pool = pool.clone();
        self.on_alloc(move |length| alloc_pool.alloc(length))
            .on_release(move |packet| release_pool.release(packet))
    }

    pub(crate) fn bind(self) -> Result<BoundCallbacks, PhyError> {
        let missing = |name: &str| PhyError::InvalidArgument(format!("missing {name} callback"));
        Ok(BoundCallbacks {
            alloc: self.alloc.ok_or_else(|| missing("alloc"))?,
            release: self.release.ok_or_else(|| missing("release"))?,
            rx: self.rx.ok_or_else(|| missing("rx"))?,
            tx: self.tx.ok_or_else(|| missing("tx"))?,
            rssi: self.rssi.ok_or_else(|| missing("rssi"))?,
        })
    }
}

/// A complete callback set, held by an initialized driver.
pub(crate) struct BoundCallbacks {
    pub(crate) alloc: AllocFn,
    pub(crate) release: ReleaseFn,
    pub(crate) rx: RxFn,
    pub(crate) tx: TxFn,
    pub(crate) rssi: RssiFn,
}

/// Counters kept by a [`PacketPool`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub allocations: u64,
    pub allocation_failures: u64,
    pub returns: u64,
}

#[derive(Debug)]
struct PoolInner {
    free: VecDeque<Packet>,
    buffer_size: usize,
    outstanding: usize,
    stats: PoolStats,
}

/// Fixed-capacity pool of packet buffers for the alloc/release side.
///
/// Clones share the same pool. Every buffer handed out is counted until it
/// comes back through [`PacketPool::release`], which makes ownership leaks
/// observable.
#[derive(Debug, Clone)]
pub struct PacketPool {
    inner: Arc<Mutex<PoolInner>>,
}

impl PacketPool {
    /// A pool of `count` buffers of `buffer_size` bytes each.
    pub fn new(count: usize, buffer_size: usize) -> Self {
        let free = (0..count).map(|_| Packet::with_capacity(buffer_size)).collect();
        Self {
            inner: Arc::new(Mutex::new(PoolInner {
                free,
                buffer_size,
                outstanding: 0,
                stats: PoolStats::default(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        // A poisoned pool only means a callback panicked; the counters are still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Hand out a buffer able to hold `length` bytes, or `None`.
    pub fn alloc(&self, length: usize) -> Option<Packet> {
        let mut inner = self.lock();
        if length > inner.buffer_size {
            inner.stats.allocation_failures += 1;
            return None;
        }
        match inner.free.pop_front() {
            Some(packet) => {
                inner.outstanding += 1;
                inner.stats.allocations += 1;
                Some(packet)
            }
            None => {
                inner.stats.allocation_failures += 1;
                None
            }
        }
    }

    /// Return a buffer to the pool.
    pub fn release(&self, mut packet: Packet) {
        packet.reset();
        let mut inner = self.lock();
        inner.outstanding = inner.outstanding.saturating_sub(1);
        inner.stats.returns += 1;
        inner.free.push_back(packet);
    }

    /// Buffers currently handed out.
    pub fn outstanding(&self) -> usize {
        self.lock().outstanding
    }

    /// Buffers ready to be handed out.
    pub fn available(&self) -> usize {
        self.lock().free.len()
    }

    pub fn buffer_size(&self) -> usize {
        self.lock().buffer_size
    }

    pub fn stats(&self) -> PoolStats {
        self.lock().stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_exhaustion() {
        let pool = PacketPool::new(2, 64);
        let a = pool.alloc(10).expect("first buffer");
        let b = pool.alloc(64).expect("second buffer");
        assert!(pool.alloc(1).is_none());
        assert_eq!(pool.outstanding(), 2);

        pool.release(a);
        pool.release(b);
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.available(), 2);
        assert_eq!(pool.stats().allocation_failures, 1);
    }

    #[test]
    fn test_pool_rejects_oversized() {
        let pool = PacketPool::new(1, 16);
        assert!(pool.alloc(17).is_none());
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_released_buffer_is_reset() {
        let pool = PacketPool::new(1, 8);
        let mut packet = pool.alloc(4).unwrap();
        packet.fill(&[1, 2, 3, 4]);
        pool.release(packet);
        assert!(pool.alloc(4).unwrap().is_empty());
    }

    #[test]
    fn test_missing_callback_rejected() {
        let result = RadioCallbacks::new()
            .on_alloc(|_| None)
            .on_release(|_| {})
            .on_rx(|_| {})
            .on_tx(|_| {})
            .bind();
        assert!(matches!(result, Err(PhyError::InvalidArgument(_))));
    }
}
