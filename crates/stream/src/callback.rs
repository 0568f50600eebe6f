// Copyright 2025-2026 CEMAXECUTER LLC

//! Streaming callbacks, one per transfer mode. Each runs in the device's
//! transfer context and owns everything it touches there.
//!
//! Transmit and direct receive do their file I/O inside the callback, so a
//! slow disk can hold up the device. Receive through the ring buffer keeps
//! the callback to a memory copy.

use std::io::{self, Read, Seek, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hx_sdr::{StreamControl, Transfer, TransferCallback};

use crate::limiter::TransferLimiter;
use crate::ring::RingProducer;
use crate::source::SampleSource;

/// Bytes moved by a callback, readable from the session loop.
#[derive(Debug, Clone, Default)]
pub struct TransferCounter(Arc<AtomicU64>);

impl TransferCounter {
    pub fn add(&self, n: usize) {
        self.0.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

fn control(limiter: &TransferLimiter) -> StreamControl {
    if limiter.is_exhausted() {
        StreamControl::Stop
    } else {
        StreamControl::Continue
    }
}

/// Transmit from a file or stdin.
pub struct TxFileCallback<R> {
    source: SampleSource<R>,
    limiter: TransferLimiter,
    counter: TransferCounter,
}

impl<R: Read + Seek> TxFileCallback<R> {
    pub fn new(
        source: SampleSource<R>,
        limiter: TransferLimiter,
        counter: TransferCounter,
    ) -> Self {
        Self {
            source,
            limiter,
            counter,
        }
    }
}

impl<R: Read + Seek + Send> TransferCallback for TxFileCallback<R> {
    fn on_buffer(&mut self, transfer: &mut Transfer<'_>) -> StreamControl {
        let len = transfer.valid_length.min(transfer.buffer.len());
        if len == 0 {
            return StreamControl::Continue;
        }

        let want = self.limiter.take(len);
        let filled = self.source.fill(&mut transfer.buffer[..want]);
        transfer.valid_length = filled;
        self.counter.add(filled);

        if self.limiter.is_exhausted() || self.source.is_exhausted() {
            log::debug!(
                "transmit source done after {} bytes ({} rewinds)",
                self.counter.get(),
                self.source.rewinds()
            );
            StreamControl::Stop
        } else {
            StreamControl::Continue
        }
    }
}

/// Transmit a constant DC value (CW signal source).
pub struct CwCallback {
    amplitude: u8,
    limiter: TransferLimiter,
    counter: TransferCounter,
}

impl CwCallback {
    pub fn new(amplitude: u8, limiter: TransferLimiter, counter: TransferCounter) -> Self {
        Self {
            amplitude,
            limiter,
            counter,
        }
    }
}

impl TransferCallback for CwCallback {
    fn on_buffer(&mut self, transfer: &mut Transfer<'_>) -> StreamControl {
        let len = transfer.valid_length.min(transfer.buffer.len());
        if len == 0 {
            return StreamControl::Continue;
        }

        let want = self.limiter.take(len);
        transfer.buffer[..want].fill(self.amplitude);
        transfer.valid_length = want;
        self.counter.add(want);
        control(&self.limiter)
    }
}

/// Receive straight into a writer.
///
/// A failed write stops the stream; the error is handed out by `finish`.
pub struct RxSinkCallback<W: Write> {
    sink: W,
    limiter: TransferLimiter,
    counter: TransferCounter,
    error: Option<io::Error>,
}

impl<W: Write> RxSinkCallback<W> {
    pub fn new(sink: W, limiter: TransferLimiter, counter: TransferCounter) -> Self {
        Self {
            sink,
            limiter,
            counter,
            error: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}

impl<W: Write + Send> TransferCallback for RxSinkCallback<W> {
    fn on_buffer(&mut self, transfer: &mut Transfer<'_>) -> StreamControl {
        if self.error.is_some() {
            return StreamControl::Stop;
        }
        let valid = transfer.valid();
        if valid.is_empty() {
            return StreamControl::Continue;
        }

        let want = self.limiter.take(valid.len());
        if let Err(e) = self.sink.write_all(&valid[..want]) {
            log::error!("write failed: {}", e);
            self.error = Some(e);
            return StreamControl::Stop;
        }
        self.counter.add(want);
        control(&self.limiter)
    }

    fn finish(&mut self) -> io::Result<()> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        self.sink.flush()
    }
}

/// Receive into the ring buffer; the session loop does the writing.
pub struct RxRingCallback {
    producer: RingProducer,
    limiter: TransferLimiter,
    counter: TransferCounter,
}

impl RxRingCallback {
    pub fn new(producer: RingProducer, limiter: TransferLimiter, counter: TransferCounter) -> Self {
        Self {
            producer,
            limiter,
            counter,
        }
    }
}

impl TransferCallback for RxRingCallback {
    fn on_buffer(&mut self, transfer: &mut Transfer<'_>) -> StreamControl {
        let valid = transfer.valid();
        if valid.is_empty() {
            return StreamControl::Continue;
        }

        let want = self.limiter.take(valid.len());
        self.producer.push(&valid[..want]);
        self.counter.add(want);
        control(&self.limiter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::ring_buffer;
    use std::io::Cursor;

    fn ramp(len: usize) -> Vec<u8> {
        (0..len).map(|i| i as u8).collect()
    }

    /// Run a callback with `size`-byte buffers until it stops or `max` calls.
    fn drive(
        cb: &mut dyn TransferCallback,
        size: usize,
        max: usize,
    ) -> Vec<(Vec<u8>, StreamControl)> {
        let mut calls = Vec::new();
        let mut buf = vec![0xeeu8; size];
        for _ in 0..max {
            let mut t = Transfer::new(&mut buf);
            let ctl = cb.on_buffer(&mut t);
            calls.push((t.valid().to_vec(), ctl));
            if ctl == StreamControl::Stop {
                break;
            }
        }
        calls
    }

    fn tx(data: Vec<u8>, repeat: bool, limit: TransferLimiter) -> TxFileCallback<Cursor<Vec<u8>>> {
        TxFileCallback::new(
            SampleSource::new(Cursor::new(data), repeat),
            limit,
            TransferCounter::default(),
        )
    }

    #[test]
    fn test_tx_limit_truncates_last_buffer() {
        let mut cb = tx(ramp(4096), false, TransferLimiter::bytes(1000));
        let calls = drive(&mut cb, 256, 10);

        let sizes: Vec<usize> = calls.iter().map(|(d, _)| d.len()).collect();
        assert_eq!(sizes, vec![256, 256, 256, 232]);
        assert!(calls[..3].iter().all(|(_, c)| *c == StreamControl::Continue));
        assert_eq!(calls[3].1, StreamControl::Stop);
        assert_eq!(cb.counter.get(), 1000);
    }

    #[test]
    fn test_tx_repeat_cycles_without_gaps() {
        let mut cb = tx(ramp(10), true, TransferLimiter::unlimited());
        let calls = drive(&mut cb, 4, 6);

        let expected: [&[u8]; 6] = [
            &[0, 1, 2, 3],
            &[4, 5, 6, 7],
            &[8, 9, 0, 1],
            &[2, 3, 4, 5],
            &[6, 7, 8, 9],
            &[0, 1, 2, 3],
        ];
        for ((data, ctl), want) in calls.iter().zip(expected) {
            assert_eq!(data.as_slice(), want);
            assert_eq!(*ctl, StreamControl::Continue);
        }
    }

    #[test]
    fn test_tx_delivers_min_of_file_and_limit() {
        for buffer in [1usize, 3, 4, 7, 16, 64] {
            for file_len in [0usize, 1, 5, 16, 33, 64] {
                for limit in [None, Some(0u64), Some(9), Some(40)] {
                    let mut cb = tx(ramp(file_len), false, TransferLimiter::from_bytes(limit));
                    let calls = drive(&mut cb, buffer, 1000);

                    let delivered: Vec<u8> = calls.iter().flat_map(|(d, _)| d.clone()).collect();
                    let bound = limit.map_or(file_len, |l| file_len.min(l as usize));
                    assert_eq!(
                        delivered,
                        ramp(bound),
                        "B={} L={} limit={:?}",
                        buffer,
                        file_len,
                        limit
                    );

                    let stops = calls.iter().filter(|(_, c)| *c == StreamControl::Stop).count();
                    assert_eq!(stops, 1);
                    // The stop comes with the buffer that completes the transfer
                    let last = &calls.last().unwrap().0;
                    assert!(!last.is_empty() || bound == 0);
                }
            }
        }
    }

    #[test]
    fn test_tx_repeat_with_limit_fills_final_buffer() {
        let mut cb = tx(ramp(10), true, TransferLimiter::bytes(14));
        let calls = drive(&mut cb, 8, 10);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, vec![0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(calls[1].0, vec![8, 9, 0, 1, 2, 3]);
        assert_eq!(calls[1].1, StreamControl::Stop);
    }

    #[test]
    fn test_zero_length_request_continues() {
        let mut cb = tx(ramp(10), false, TransferLimiter::unlimited());
        let mut empty: [u8; 0] = [];
        let mut t = Transfer::new(&mut empty);
        assert_eq!(cb.on_buffer(&mut t), StreamControl::Continue);

        let mut cw = CwCallback::new(64, TransferLimiter::bytes(10), TransferCounter::default());
        let mut t = Transfer::new(&mut empty);
        assert_eq!(cw.on_buffer(&mut t), StreamControl::Continue);
    }

    #[test]
    fn test_cw_fills_amplitude_until_limit() {
        let counter = TransferCounter::default();
        let mut cb = CwCallback::new(127, TransferLimiter::bytes(600), counter.clone());
        let calls = drive(&mut cb, 256, 10);

        let sizes: Vec<usize> = calls.iter().map(|(d, _)| d.len()).collect();
        assert_eq!(sizes, vec![256, 256, 88]);
        assert!(calls.iter().all(|(d, _)| d.iter().all(|&b| b == 127)));
        assert_eq!(calls[2].1, StreamControl::Stop);
        assert_eq!(counter.get(), 600);
    }

    #[test]
    fn test_cw_unlimited_never_stops() {
        let mut cb = CwCallback::new(0, TransferLimiter::unlimited(), TransferCounter::default());
        let calls = drive(&mut cb, 64, 50);
        assert_eq!(calls.len(), 50);
        assert!(calls.iter().all(|(_, c)| *c == StreamControl::Continue));
    }

    #[test]
    fn test_rx_sink_writes_until_limit() {
        let mut cb = RxSinkCallback::new(
            Vec::new(),
            TransferLimiter::bytes(10),
            TransferCounter::default(),
        );
        let mut buf = ramp(8);
        let mut t = Transfer::new(&mut buf);
        assert_eq!(cb.on_buffer(&mut t), StreamControl::Continue);
        let mut t = Transfer::new(&mut buf);
        assert_eq!(cb.on_buffer(&mut t), StreamControl::Stop);
        cb.finish().unwrap();
        assert_eq!(cb.into_inner(), vec![0, 1, 2, 3, 4, 5, 6, 7, 0, 1]);
    }

    #[test]
    fn test_rx_sink_write_error_is_deferred() {
        struct Full;
        impl Write for Full {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Ok(0)
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut cb =
            RxSinkCallback::new(Full, TransferLimiter::unlimited(), TransferCounter::default());
        let mut buf = [1u8; 4];
        let mut t = Transfer::new(&mut buf);
        assert_eq!(cb.on_buffer(&mut t), StreamControl::Stop);
        let err = cb.finish().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
    }

    #[test]
    fn test_rx_ring_counts_received_and_drops() {
        let (producer, mut consumer) = ring_buffer(1024);
        let counter = TransferCounter::default();
        let mut cb = RxRingCallback::new(producer, TransferLimiter::unlimited(), counter.clone());

        let mut buf = vec![3u8; 600];
        for _ in 0..2 {
            let mut t = Transfer::new(&mut buf);
            assert_eq!(cb.on_buffer(&mut t), StreamControl::Continue);
        }
        assert_eq!(counter.get(), 1200);
        assert_eq!(consumer.dropped(), 176);

        let mut out = Vec::new();
        assert_eq!(consumer.drain(&mut out).unwrap(), 1024);
    }
}
