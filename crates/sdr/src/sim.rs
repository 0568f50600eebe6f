// Copyright 2025-2026 CEMAXECUTER LLC

//! Software transceiver that drives a `TransferCallback` from a worker thread,
//! the way libhackrf does from its USB transfer thread. Received bytes are a
//! wrapping counter (0, 1, ..., 255, 0, ...); transmitted bytes are recorded.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{bounded, RecvTimeoutError, Receiver, Sender};

use crate::{
    Device, DeviceError, Direction, GainKind, RfPath, StreamControl, Transfer, TransferCallback,
};

/// HackRF's default USB transfer size
pub const DEFAULT_TRANSFER_SIZE: usize = 262_144;

const STATE_IDLE: u8 = 0;
const STATE_STREAMING: u8 = 1;
const STATE_EXIT_CALLED: u8 = 2;
const STATE_FAULT: u8 = 3;

const SIM_ERROR_CODE: i32 = -1000;

/// Everything the simulated device saw, shared with whoever holds a probe.
#[derive(Debug, Default)]
pub struct SimLog {
    /// Configuration calls in order, e.g. `set_freq(915000000)`
    pub calls: Vec<String>,
    /// Bytes the callback handed over for transmission (valid part only)
    pub transmitted: Vec<u8>,
    /// Number of buffers delivered to the callback
    pub transfers: u64,
    /// Bytes produced on receive
    pub received: u64,
    pub closed: bool,
}

/// Read-only view on a `SimDevice`'s log, usable after the device is gone.
#[derive(Clone)]
pub struct SimProbe {
    log: Arc<Mutex<SimLog>>,
}

impl SimProbe {
    pub fn log(&self) -> MutexGuard<'_, SimLog> {
        self.log.lock().unwrap_or_else(|e| e.into_inner())
    }
}

struct Running {
    stop_tx: Sender<()>,
    worker: JoinHandle<Box<dyn TransferCallback>>,
}

pub struct SimDevice {
    transfer_size: usize,
    interval: Duration,
    fail_on: Option<&'static str>,
    fault_after: Option<u64>,
    log: Arc<Mutex<SimLog>>,
    state: Arc<AtomicU8>,
    running: Option<Running>,
    closed: bool,
}

impl SimDevice {
    pub fn new(transfer_size: usize) -> Self {
        Self {
            transfer_size,
            interval: Duration::ZERO,
            fail_on: None,
            fault_after: None,
            log: Arc::new(Mutex::new(SimLog::default())),
            state: Arc::new(AtomicU8::new(STATE_IDLE)),
            running: None,
            closed: false,
        }
    }

    /// Pause between buffers, to mimic a real sample rate.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Make the named `Device` method fail, e.g. `"set_freq"`.
    pub fn fail_on(mut self, op: &'static str) -> Self {
        self.fail_on = Some(op);
        self
    }

    /// Kill the transfer after `n` buffers, as a USB error would.
    pub fn fault_after(mut self, n: u64) -> Self {
        self.fault_after = Some(n);
        self
    }

    pub fn probe(&self) -> SimProbe {
        SimProbe {
            log: self.log.clone(),
        }
    }

    fn record(&mut self, op: &'static str, call: String) -> Result<(), DeviceError> {
        if self.closed {
            return Err(DeviceError::new(op, SIM_ERROR_CODE, "device closed"));
        }
        if self.fail_on == Some(op) {
            return Err(DeviceError::new(op, SIM_ERROR_CODE, "simulated failure"));
        }
        self.log.lock().unwrap_or_else(|e| e.into_inner()).calls.push(call);
        Ok(())
    }
}

struct Worker {
    callback: Box<dyn TransferCallback>,
    direction: Direction,
    transfer_size: usize,
    interval: Duration,
    fault_after: Option<u64>,
    stop_rx: Receiver<()>,
    log: Arc<Mutex<SimLog>>,
    state: Arc<AtomicU8>,
}

impl Worker {
    fn run(mut self) -> Box<dyn TransferCallback> {
        let mut buffer = vec![0u8; self.transfer_size];
        let mut counter: u8 = 0;
        let mut delivered: u64 = 0;

        loop {
            match self.stop_rx.recv_timeout(self.interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }

            if self.fault_after == Some(delivered) {
                self.state.store(STATE_FAULT, Ordering::Release);
                break;
            }

            match self.direction {
                Direction::Rx => {
                    for b in buffer.iter_mut() {
                        *b = counter;
                        counter = counter.wrapping_add(1);
                    }
                }
                Direction::Tx => buffer.fill(0),
            }

            let mut transfer = Transfer::new(&mut buffer);
            let control = self.callback.on_buffer(&mut transfer);
            delivered += 1;

            {
                let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());
                log.transfers += 1;
                match self.direction {
                    Direction::Rx => log.received += self.transfer_size as u64,
                    Direction::Tx => log.transmitted.extend_from_slice(transfer.valid()),
                }
            }

            if control == StreamControl::Stop {
                self.state.store(STATE_EXIT_CALLED, Ordering::Release);
                break;
            }
        }

        self.callback
    }
}

impl Device for SimDevice {
    fn set_sample_rate(&mut self, hz: f64) -> Result<(), DeviceError> {
        self.record("set_sample_rate", format!("set_sample_rate({})", hz))
    }

    fn set_baseband_filter_bandwidth(&mut self, hz: u32) -> Result<(), DeviceError> {
        self.record(
            "set_baseband_filter_bandwidth",
            format!("set_baseband_filter_bandwidth({})", hz),
        )
    }

    fn set_hw_sync_mode(&mut self, enable: bool) -> Result<(), DeviceError> {
        self.record("set_hw_sync_mode", format!("set_hw_sync_mode({})", enable))
    }

    fn set_freq(&mut self, hz: u64) -> Result<(), DeviceError> {
        self.record("set_freq", format!("set_freq({})", hz))
    }

    fn set_freq_explicit(
        &mut self,
        if_hz: u64,
        lo_hz: u64,
        path: RfPath,
    ) -> Result<(), DeviceError> {
        self.record(
            "set_freq_explicit",
            format!("set_freq_explicit({}, {}, {:?})", if_hz, lo_hz, path),
        )
    }

    fn set_gain(&mut self, kind: GainKind, db: u32) -> Result<(), DeviceError> {
        self.record("set_gain", format!("set_gain({}, {})", kind, db))
    }

    fn set_amp_enable(&mut self, enable: bool) -> Result<(), DeviceError> {
        self.record("set_amp_enable", format!("set_amp_enable({})", enable))
    }

    fn set_antenna_enable(&mut self, enable: bool) -> Result<(), DeviceError> {
        self.record("set_antenna_enable", format!("set_antenna_enable({})", enable))
    }

    fn start_transfer(
        &mut self,
        direction: Direction,
        callback: Box<dyn TransferCallback>,
    ) -> Result<(), DeviceError> {
        self.record("start_transfer", format!("start_transfer({:?})", direction))?;
        if self.running.is_some() {
            return Err(DeviceError::new(
                "start_transfer",
                SIM_ERROR_CODE,
                "transfer already active",
            ));
        }

        let (stop_tx, stop_rx) = bounded(1);
        self.state.store(STATE_STREAMING, Ordering::Release);
        let worker = Worker {
            callback,
            direction,
            transfer_size: self.transfer_size,
            interval: self.interval,
            fault_after: self.fault_after,
            stop_rx,
            log: self.log.clone(),
            state: self.state.clone(),
        };
        let worker = std::thread::Builder::new()
            .name("sim-transfer".into())
            .spawn(move || worker.run())
            .map_err(|e| DeviceError::new("start_transfer", SIM_ERROR_CODE, e.to_string()))?;

        self.running = Some(Running { stop_tx, worker });
        Ok(())
    }

    fn stop_transfer(&mut self) -> Result<Option<Box<dyn TransferCallback>>, DeviceError> {
        let Some(running) = self.running.take() else {
            return Ok(None);
        };
        // The worker may already be gone; a closed channel is fine
        let _ = running.stop_tx.try_send(());
        let callback = running.worker.join().map_err(|_| {
            DeviceError::new("stop_transfer", SIM_ERROR_CODE, "transfer thread panicked")
        })?;
        self.state.store(STATE_IDLE, Ordering::Release);
        Ok(Some(callback))
    }

    fn is_streaming(&self) -> Result<bool, DeviceError> {
        match self.state.load(Ordering::Acquire) {
            STATE_STREAMING => Ok(true),
            STATE_FAULT => Err(DeviceError::new(
                "is_streaming",
                SIM_ERROR_CODE,
                "streaming thread error",
            )),
            _ => Ok(false),
        }
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        if self.closed {
            return Ok(());
        }
        let stopped = self.stop_transfer().map(|_| ());
        self.closed = true;
        self.log.lock().unwrap_or_else(|e| e.into_inner()).closed = true;
        stopped
    }
}

impl Drop for SimDevice {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
