// Copyright 2025-2026 CEMAXECUTER LLC

//! One transfer from device open to close.
//!
//! `Idle -> Configuring -> Streaming -> Draining -> Closed`. Every path out of
//! `Configuring` or `Streaming` goes through `Draining`, which stops the
//! transfer, flushes output and releases the device.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hx_output::wav::{self, WavHeader, WAV_HEADER_LEN};
use hx_sdr::{Device, DeviceError, Direction, GainKind, TransferCallback};

use crate::callback::{CwCallback, RxRingCallback, RxSinkCallback, TransferCounter, TxFileCallback};
use crate::config::{TransferConfig, TransferMode, Tuning};
use crate::error::{TransferError, TransferResult};
use crate::limiter::TransferLimiter;
use crate::ring::{ring_buffer, RingConsumer};
use crate::source::{Input, Output, SampleSource, FD_BUFFER_SIZE};

const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Sleep of the receive loop when a pass found the ring empty
const RING_IDLE_INTERVAL: Duration = Duration::from_millis(1);

const MIB: f64 = 1_048_576.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Configuring,
    Streaming,
    Draining,
    Closed,
}

impl SessionState {
    pub fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Configuring)
                | (Configuring, Streaming)
                | (Configuring, Draining)
                | (Streaming, Draining)
                | (Draining, Closed)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Limit reached, or end of input without repeat
    Completed,
    /// Shutdown flag raised (ctrl-c)
    ShutdownRequested,
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub reason: StopReason,
    /// Bytes handed to or taken from the device
    pub bytes_transferred: u64,
    /// Received bytes lost to a full ring
    pub dropped: u64,
    pub elapsed: Duration,
}

impl SessionReport {
    pub fn mib_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes_transferred as f64 / MIB / secs
        } else {
            0.0
        }
    }
}

/// Consumer side of receive streaming, owned by the session loop.
struct RingDrain {
    consumer: RingConsumer,
    writer: BufWriter<Output>,
}

impl RingDrain {
    fn drain(&mut self) -> TransferResult<usize> {
        self.consumer
            .drain(&mut self.writer)
            .map_err(|e| TransferError::io("write failed", e))
    }
}

/// What the session keeps of the endpoints while the device owns the callback.
#[derive(Default)]
struct Endpoints {
    ring: Option<RingDrain>,
    /// Capture whose header is rewritten at the end
    wav: Option<PathBuf>,
}

fn keep_first(slot: &mut Option<TransferError>, err: TransferError) {
    if slot.is_none() {
        *slot = Some(err);
    } else {
        log::warn!("{}", err);
    }
}

fn io_context(what: &str, path: &Path) -> String {
    format!("{} {}", what, path.display())
}

pub struct SessionController {
    config: TransferConfig,
    shutdown: Arc<AtomicBool>,
    state: SessionState,
}

impl SessionController {
    pub fn new(config: TransferConfig, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            config,
            shutdown,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn advance(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "invalid session transition {:?} -> {:?}",
            self.state,
            next
        );
        log::debug!("session {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Run the transfer to completion on the device returned by `open`.
    pub fn run<D, F>(&mut self, open: F) -> TransferResult<SessionReport>
    where
        D: Device,
        F: FnOnce(&TransferConfig) -> Result<D, DeviceError>,
    {
        if self.state != SessionState::Idle {
            return Err(TransferError::config("session already ran"));
        }
        self.advance(SessionState::Configuring);

        let mut device = match open(&self.config) {
            Ok(device) => device,
            Err(e) => {
                self.advance(SessionState::Draining);
                self.advance(SessionState::Closed);
                return Err(e.into());
            }
        };

        let counter = TransferCounter::default();
        let endpoints = match self.install(&mut device, &counter) {
            Ok(endpoints) => endpoints,
            Err(e) => {
                self.advance(SessionState::Draining);
                if let Err(close_err) = device.close() {
                    log::warn!("{}", close_err);
                }
                self.advance(SessionState::Closed);
                return Err(e);
            }
        };

        self.advance(SessionState::Streaming);
        let started = Instant::now();
        let mut endpoints = endpoints;
        let outcome = self.monitor(&device, &mut endpoints, &counter, started);

        self.advance(SessionState::Draining);
        let drained = self.drain(&mut device, endpoints);
        self.advance(SessionState::Closed);

        let report = SessionReport {
            reason: StopReason::Completed,
            bytes_transferred: counter.get(),
            dropped: *drained.as_ref().unwrap_or(&0),
            elapsed: started.elapsed(),
        };
        log::info!(
            "total time: {:.5} s, {} bytes, {:.1} MiB/second",
            report.elapsed.as_secs_f64(),
            report.bytes_transferred,
            report.mib_per_second()
        );
        if report.dropped > 0 {
            log::warn!("{} bytes dropped by a full stream buffer", report.dropped);
        }

        match (outcome, drained) {
            (Err(e), Err(secondary)) => {
                log::warn!("{}", secondary);
                Err(e)
            }
            (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e),
            (Ok(reason), Ok(_)) => Ok(SessionReport { reason, ..report }),
        }
    }

    /// One-shot device configuration, then endpoints and callback, then start.
    fn install<D: Device>(
        &self,
        device: &mut D,
        counter: &TransferCounter,
    ) -> TransferResult<Endpoints> {
        let cfg = &self.config;
        let direction = cfg.direction();

        let rate = cfg.device_sample_rate();
        log::info!("call set_sample_rate({} Hz/{:.3} MHz)", rate, f64::from(rate) / 1e6);
        device.set_sample_rate(f64::from(rate))?;

        log::info!(
            "call set_baseband_filter_bandwidth({} Hz/{:.3} MHz)",
            cfg.baseband_filter_bw_hz,
            f64::from(cfg.baseband_filter_bw_hz) / 1e6
        );
        device.set_baseband_filter_bandwidth(cfg.baseband_filter_bw_hz)?;

        device.set_hw_sync_mode(cfg.hw_sync)?;

        match direction {
            Direction::Rx => {
                device.set_gain(GainKind::Vga, cfg.vga_gain)?;
                device.set_gain(GainKind::Lna, cfg.lna_gain)?;
            }
            Direction::Tx => device.set_gain(GainKind::TxVga, cfg.txvga_gain)?,
        }

        match cfg.device_tuning() {
            Tuning::Direct { freq_hz } => {
                log::info!("call set_freq({} Hz/{:.3} MHz)", freq_hz, freq_hz as f64 / 1e6);
                device.set_freq(freq_hz)?;
            }
            Tuning::Explicit { if_hz, lo_hz, path } => {
                log::info!(
                    "call set_freq_explicit(if {} Hz, lo {} Hz, {:?})",
                    if_hz,
                    lo_hz,
                    path
                );
                device.set_freq_explicit(if_hz, lo_hz, path)?;
            }
        }

        if let Some(enable) = cfg.amp {
            log::info!("call set_amp_enable({})", enable);
            device.set_amp_enable(enable)?;
        }
        if let Some(enable) = cfg.antenna {
            log::info!("call set_antenna_enable({})", enable);
            device.set_antenna_enable(enable)?;
        }

        let (callback, endpoints) = self.endpoints(counter)?;
        device.start_transfer(direction, callback)?;
        log::info!("streaming started ({:?})", direction);
        Ok(endpoints)
    }

    fn endpoints(
        &self,
        counter: &TransferCounter,
    ) -> TransferResult<(Box<dyn TransferCallback>, Endpoints)> {
        let limiter = self.config.limiter();
        match &self.config.mode {
            TransferMode::Transmit { input } => {
                let file = Input::open(input)
                    .map_err(|e| TransferError::io(io_context("failed to open", input), e))?;
                let source = SampleSource::new(file, self.config.repeat);
                let callback = TxFileCallback::new(source, limiter, counter.clone());
                Ok((Box::new(callback), Endpoints::default()))
            }
            TransferMode::SignalSource { amplitude } => {
                let callback = CwCallback::new(*amplitude, limiter, counter.clone());
                Ok((Box::new(callback), Endpoints::default()))
            }
            TransferMode::Receive { output } => self.receiver(output, false, limiter, counter),
            TransferMode::ReceiveWav { output } => self.receiver(output, true, limiter, counter),
        }
    }

    fn receiver(
        &self,
        path: &Path,
        wav: bool,
        limiter: TransferLimiter,
        counter: &TransferCounter,
    ) -> TransferResult<(Box<dyn TransferCallback>, Endpoints)> {
        let file = Output::create(path)
            .map_err(|e| TransferError::io(io_context("failed to create", path), e))?;
        let mut writer = BufWriter::with_capacity(FD_BUFFER_SIZE, file);
        if wav {
            WavHeader::placeholder()
                .write(&mut writer)
                .map_err(|e| TransferError::io(io_context("failed to write header to", path), e))?;
        }
        let wav = wav.then(|| path.to_path_buf());

        match self.config.stream_buffer_size {
            Some(capacity) => {
                log::info!("receive through a {} byte stream buffer", capacity);
                let (producer, consumer) = ring_buffer(capacity);
                let callback = RxRingCallback::new(producer, limiter, counter.clone());
                let ring = RingDrain { consumer, writer };
                Ok((
                    Box::new(callback),
                    Endpoints {
                        ring: Some(ring),
                        wav,
                    },
                ))
            }
            None => {
                let callback = RxSinkCallback::new(writer, limiter, counter.clone());
                Ok((Box::new(callback), Endpoints { ring: None, wav }))
            }
        }
    }

    /// Poll device state and the shutdown flag until one says stop.
    fn monitor<D: Device>(
        &self,
        device: &D,
        endpoints: &mut Endpoints,
        counter: &TransferCounter,
        started: Instant,
    ) -> TransferResult<StopReason> {
        let mut last_report = started;
        let mut reported_bytes = 0u64;
        let mut reported_drops = 0u64;
        let mut last_activity = started;
        let mut seen_bytes = 0u64;

        loop {
            if self.shutdown.load(Ordering::Acquire) {
                log::info!("shutdown requested, stopping transfer");
                return Ok(StopReason::ShutdownRequested);
            }

            let drained = match endpoints.ring.as_mut() {
                Some(ring) => ring.drain()?,
                None => 0,
            };

            if !device.is_streaming()? {
                log::info!("transfer finished");
                return Ok(StopReason::Completed);
            }

            let now = Instant::now();
            let bytes = counter.get();
            if bytes != seen_bytes {
                seen_bytes = bytes;
                last_activity = now;
            }
            if let Some(timeout) = self.config.stall_timeout {
                let idle = now.duration_since(last_activity);
                if idle >= timeout {
                    return Err(TransferError::Stalled { idle });
                }
            }

            let since_report = now.duration_since(last_report);
            if since_report >= PROGRESS_INTERVAL {
                let secs = since_report.as_secs_f64();
                let mib = (bytes - reported_bytes) as f64 / MIB;
                log::info!("{:4.1} MiB / {:5.3} sec = {:4.1} MiB/second", mib, secs, mib / secs);
                if let Some(ring) = endpoints.ring.as_ref() {
                    let dropped = ring.consumer.dropped();
                    if dropped > reported_drops {
                        log::warn!("stream buffer full, {} bytes dropped so far", dropped);
                        reported_drops = dropped;
                    }
                }
                reported_bytes = bytes;
                last_report = now;
            }

            match endpoints.ring {
                Some(_) if drained > 0 => {}
                Some(_) => std::thread::sleep(RING_IDLE_INTERVAL),
                None => std::thread::sleep(self.config.poll_interval),
            }
        }
    }

    /// Stop, flush, close. Returns the ring drop count. Every step runs even
    /// when an earlier one failed; the first error wins.
    fn drain<D: Device>(&self, device: &mut D, endpoints: Endpoints) -> TransferResult<u64> {
        let mut first = None;

        match device.stop_transfer() {
            Ok(Some(mut callback)) => {
                if let Err(e) = callback.finish() {
                    keep_first(&mut first, TransferError::io("write failed", e));
                }
            }
            Ok(None) => {}
            Err(e) => keep_first(&mut first, e.into()),
        }

        let mut dropped = 0;
        if let Some(mut ring) = endpoints.ring {
            if let Err(e) = ring.drain() {
                keep_first(&mut first, e);
            }
            if let Err(e) = ring.writer.flush() {
                keep_first(&mut first, TransferError::io("write failed", e));
            }
            dropped = ring.consumer.dropped();
        }

        if let Err(e) = device.close() {
            keep_first(&mut first, e.into());
        }

        if let Some(path) = endpoints.wav {
            if let Err(e) = self.finalize_wav(&path) {
                keep_first(&mut first, e);
            }
        }

        match first {
            Some(e) => Err(e),
            None => Ok(dropped),
        }
    }

    /// The header gets whatever sample data actually reached the file.
    fn finalize_wav(&self, path: &Path) -> TransferResult<()> {
        let context = || io_context("failed to finalise", path);
        let len = fs::metadata(path)
            .map_err(|e| TransferError::io(context(), e))?
            .len();
        let data_len = len.saturating_sub(WAV_HEADER_LEN as u64);
        wav::finalize_file(path, self.config.sample_rate_hz, data_len)
            .map_err(|e| TransferError::io(context(), e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransferOptions;
    use hx_sdr::sim::SimDevice;
    use std::io::Cursor;

    fn ramp(len: usize) -> Vec<u8> {
        (0..len).map(|i| i as u8).collect()
    }

    fn config(mode: TransferMode) -> TransferConfig {
        let mut cfg = TransferConfig::new(mode);
        cfg.poll_interval = Duration::from_millis(1);
        cfg
    }

    fn session(cfg: TransferConfig) -> SessionController {
        SessionController::new(cfg, Arc::new(AtomicBool::new(false)))
    }

    #[test]
    fn test_transitions() {
        use SessionState::*;
        assert!(Idle.can_advance_to(Configuring));
        assert!(Configuring.can_advance_to(Draining));
        assert!(Streaming.can_advance_to(Draining));
        assert!(!Streaming.can_advance_to(Closed));
        assert!(!Configuring.can_advance_to(Closed));
        assert!(!Closed.can_advance_to(Idle));
    }

    #[test]
    fn test_transmit_file_with_limit() {
        let mut input = tempfile::NamedTempFile::new().unwrap();
        input.write_all(&ramp(1000)).unwrap();

        let mut cfg = config(TransferMode::Transmit {
            input: input.path().to_path_buf(),
        });
        cfg.limit_bytes = Some(600);

        let dev = SimDevice::new(256);
        let probe = dev.probe();
        let mut s = session(cfg);
        let report = s.run(|_| Ok(dev)).unwrap();

        assert_eq!(report.reason, StopReason::Completed);
        assert_eq!(report.bytes_transferred, 600);
        assert_eq!(s.state(), SessionState::Closed);

        let log = probe.log();
        assert_eq!(log.transmitted, ramp(600));
        assert!(log.closed);
        assert!(log.calls.contains(&"set_gain(txvga, 0)".to_string()));
        assert!(log.calls.contains(&"set_freq(900000000)".to_string()));
        assert_eq!(log.calls.last().unwrap(), "start_transfer(Tx)");
    }

    #[test]
    fn test_repeat_runs_until_shutdown() {
        let mut input = tempfile::NamedTempFile::new().unwrap();
        input.write_all(&ramp(10)).unwrap();

        let mut cfg = config(TransferMode::Transmit {
            input: input.path().to_path_buf(),
        });
        cfg.repeat = true;

        let dev = SimDevice::new(64).with_interval(Duration::from_millis(1));
        let probe = dev.probe();
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        let raiser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            flag.store(true, Ordering::Release);
        });

        let mut s = SessionController::new(cfg, shutdown);
        let report = s.run(|_| Ok(dev)).unwrap();
        raiser.join().unwrap();

        assert_eq!(report.reason, StopReason::ShutdownRequested);
        let log = probe.log();
        assert!(!log.transmitted.is_empty());
        assert!(log
            .transmitted
            .iter()
            .enumerate()
            .all(|(i, &b)| b == (i % 10) as u8));
    }

    #[test]
    fn test_signal_source() {
        let mut cfg = config(TransferMode::SignalSource { amplitude: 42 });
        cfg.limit_bytes = Some(1000);
        cfg.amp = Some(true);

        let dev = SimDevice::new(256);
        let probe = dev.probe();
        let report = session(cfg).run(|_| Ok(dev)).unwrap();

        assert_eq!(report.bytes_transferred, 1000);
        let log = probe.log();
        assert_eq!(log.transmitted, vec![42u8; 1000]);
        assert!(log.calls.contains(&"set_amp_enable(true)".to_string()));
    }

    #[test]
    fn test_receive_direct() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rx.iq");
        let mut cfg = config(TransferMode::Receive {
            output: path.clone(),
        });
        cfg.limit_bytes = Some(1000);

        let dev = SimDevice::new(256);
        let probe = dev.probe();
        let report = session(cfg).run(|_| Ok(dev)).unwrap();

        assert_eq!(report.bytes_transferred, 1000);
        let expected: Vec<u8> = (0..1000).map(|i| (i % 256) as u8).collect();
        assert_eq!(std::fs::read(&path).unwrap(), expected);
        let log = probe.log();
        assert!(log.calls.contains(&"set_gain(vga, 20)".to_string()));
        assert!(log.calls.contains(&"set_gain(lna, 8)".to_string()));
    }

    #[test]
    fn test_receive_wav_through_ring() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cap.wav");
        let mut cfg = config(TransferMode::ReceiveWav {
            output: path.clone(),
        });
        cfg.limit_bytes = Some(5000);
        cfg.stream_buffer_size = Some(1 << 20);
        cfg.sample_rate_hz = 2_000_000;

        let report = session(cfg).run(|_| Ok(SimDevice::new(1024))).unwrap();
        assert_eq!(report.dropped, 0);

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), WAV_HEADER_LEN + 5000);
        let header = WavHeader::read(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(header.data_size, 5000);
        assert_eq!(header.riff_size(), 5036);
        assert_eq!(header.sample_rate, 2_000_000);
        assert!(bytes[WAV_HEADER_LEN..]
            .iter()
            .enumerate()
            .all(|(i, &b)| b == (i % 256) as u8));
    }

    #[test]
    fn test_crystal_correction_reaches_device() {
        let mut cfg = config(TransferMode::SignalSource { amplitude: 0 });
        cfg.limit_bytes = Some(16);
        cfg.crystal_ppm = Some(10);

        let dev = SimDevice::new(16);
        let probe = dev.probe();
        session(cfg).run(|_| Ok(dev)).unwrap();

        let log = probe.log();
        assert!(log.calls.contains(&"set_sample_rate(9999900)".to_string()));
        assert!(log.calls.contains(&"set_freq(899991000)".to_string()));
    }

    #[test]
    fn test_configure_failure_closes_device() {
        let cfg = config(TransferMode::SignalSource { amplitude: 1 });
        let dev = SimDevice::new(16).fail_on("set_freq");
        let probe = dev.probe();
        let mut s = session(cfg);

        let err = s.run(|_| Ok(dev)).unwrap_err();
        match err {
            TransferError::Device(e) => assert_eq!(e.op, "set_freq"),
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(s.state(), SessionState::Closed);
        let log = probe.log();
        assert!(log.closed);
        assert!(!log.calls.iter().any(|c| c.starts_with("start_transfer")));
    }

    #[test]
    fn test_open_failure() {
        let mut s = session(config(TransferMode::SignalSource { amplitude: 1 }));
        let err = s
            .run(|_| {
                Err::<SimDevice, _>(DeviceError::new("hackrf_open", -5, "HACKRF_ERROR_NOT_FOUND"))
            })
            .unwrap_err();
        assert!(matches!(err, TransferError::Device(_)));
        assert_eq!(s.state(), SessionState::Closed);
        assert!(s.run(|_| Ok(SimDevice::new(16))).unwrap_err().is_config());
    }

    #[test]
    fn test_missing_input_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(TransferMode::Transmit {
            input: dir.path().join("missing.iq"),
        });
        let dev = SimDevice::new(16);
        let probe = dev.probe();

        let err = session(cfg).run(|_| Ok(dev)).unwrap_err();
        assert!(matches!(err, TransferError::Io { .. }));
        assert!(probe.log().closed);
    }

    #[test]
    fn test_device_fault_aborts() {
        let cfg = config(TransferMode::SignalSource { amplitude: 1 });
        let dev = SimDevice::new(64)
            .with_interval(Duration::from_millis(1))
            .fault_after(2);
        let probe = dev.probe();
        let mut s = session(cfg);

        let err = s.run(|_| Ok(dev)).unwrap_err();
        assert!(matches!(err, TransferError::Device(_)));
        assert_eq!(s.state(), SessionState::Closed);
        assert!(probe.log().closed);
    }

    #[test]
    fn test_hw_sync_waits_for_late_trigger() {
        let mut cfg = TransferOptions {
            cw_amplitude: Some(1),
            hw_sync: Some(1),
            ..Default::default()
        }
        .validate(|_| unreachable!())
        .unwrap();
        cfg.poll_interval = Duration::from_millis(1);

        // First buffer only after 1.5 s, as if the trigger came late
        let dev = SimDevice::new(64).with_interval(Duration::from_millis(1500));
        let probe = dev.probe();
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        let raiser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(2500));
            flag.store(true, Ordering::Release);
        });

        let report = SessionController::new(cfg, shutdown)
            .run(|_| Ok(dev))
            .unwrap();
        raiser.join().unwrap();

        assert_eq!(report.reason, StopReason::ShutdownRequested);
        let log = probe.log();
        assert!(log.calls.contains(&"set_hw_sync_mode(true)".to_string()));
        assert!(!log.transmitted.is_empty());
        assert!(log.transmitted.iter().all(|&b| b == 1));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_receive_write_error_aborts() {
        let cfg = config(TransferMode::Receive {
            output: PathBuf::from("/dev/full"),
        });
        // Larger than the write buffer, so the first buffer hits the device
        let dev = SimDevice::new(4 * FD_BUFFER_SIZE);
        let probe = dev.probe();
        let mut s = session(cfg);

        let err = s.run(|_| Ok(dev)).unwrap_err();
        assert!(matches!(err, TransferError::Io { .. }), "{}", err);
        assert_eq!(s.state(), SessionState::Closed);
        assert!(probe.log().closed);
    }

    #[test]
    fn test_ring_overflow_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cap.wav");
        let mut cfg = config(TransferMode::ReceiveWav {
            output: path.clone(),
        });
        cfg.limit_bytes = Some(16_384);
        cfg.stream_buffer_size = Some(1024);

        // Every 4096 byte buffer overflows the 1024 byte ring
        let report = session(cfg).run(|_| Ok(SimDevice::new(4096))).unwrap();
        assert_eq!(report.bytes_transferred, 16_384);
        assert!(report.dropped > 0);

        let bytes = std::fs::read(&path).unwrap();
        let header = WavHeader::read(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(header.data_size as usize, bytes.len() - WAV_HEADER_LEN);
        assert_eq!(u64::from(header.data_size) + report.dropped, 16_384);
    }
}
