// Copyright 2025-2026 CEMAXECUTER LLC

#[cfg(feature = "hackrf")]
pub mod hackrf;

pub mod sim;

use std::fmt;

/// One buffer handed to the streaming callback by the device.
///
/// On receive, `buffer[..valid_length]` holds fresh samples. On transmit the
/// callback fills the buffer and sets `valid_length` to the number of bytes it
/// wants sent.
pub struct Transfer<'a> {
    /// Interleaved I,Q,I,Q,... as unsigned bytes (HackRF native format)
    pub buffer: &'a mut [u8],
    pub valid_length: usize,
}

impl<'a> Transfer<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Self {
        let valid_length = buffer.len();
        Self { buffer, valid_length }
    }

    /// The part of the buffer the device considers meaningful.
    pub fn valid(&self) -> &[u8] {
        &self.buffer[..self.valid_length.min(self.buffer.len())]
    }
}

/// What the callback wants the device to do after this buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamControl {
    Continue,
    Stop,
}

/// Capability registered with a device for the lifetime of one transfer.
///
/// `on_buffer` runs in the device's transfer context, concurrently with the
/// thread that started the transfer.
pub trait TransferCallback: Send {
    fn on_buffer(&mut self, transfer: &mut Transfer<'_>) -> StreamControl;

    /// Called by the owner after the device handed the callback back.
    /// Flushes buffered output and reports any error deferred from `on_buffer`.
    fn finish(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Transfer direction as seen by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Rx,
    Tx,
}

/// Gain stages exposed by the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainKind {
    /// RX IF gain, 0-40 dB in 8 dB steps
    Lna,
    /// RX baseband gain, 0-62 dB in 2 dB steps
    Vga,
    /// TX IF gain, 0-47 dB in 1 dB steps
    TxVga,
}

impl fmt::Display for GainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GainKind::Lna => write!(f, "lna"),
            GainKind::Vga => write!(f, "vga"),
            GainKind::TxVga => write!(f, "txvga"),
        }
    }
}

/// Image reject filter position used with explicit IF/LO tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RfPath {
    Bypass = 0,
    LowPass = 1,
    HighPass = 2,
}

impl RfPath {
    pub fn from_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(RfPath::Bypass),
            1 => Some(RfPath::LowPass),
            2 => Some(RfPath::HighPass),
            _ => None,
        }
    }
}

/// A failed device call: the operation, the library's code and its name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{op}() failed: {name} ({code})")]
pub struct DeviceError {
    pub op: &'static str,
    pub code: i32,
    pub name: String,
}

impl DeviceError {
    pub fn new(op: &'static str, code: i32, name: impl Into<String>) -> Self {
        Self {
            op,
            code,
            name: name.into(),
        }
    }
}

/// Common interface for transceivers that stream through a callback.
///
/// Opening is backend specific (`HackrfDevice::open`, `SimDevice::new`);
/// everything after that goes through this trait.
pub trait Device: Send {
    fn set_sample_rate(&mut self, hz: f64) -> Result<(), DeviceError>;

    fn set_baseband_filter_bandwidth(&mut self, hz: u32) -> Result<(), DeviceError>;

    fn set_hw_sync_mode(&mut self, enable: bool) -> Result<(), DeviceError>;

    fn set_freq(&mut self, hz: u64) -> Result<(), DeviceError>;

    fn set_freq_explicit(&mut self, if_hz: u64, lo_hz: u64, path: RfPath)
        -> Result<(), DeviceError>;

    fn set_gain(&mut self, kind: GainKind, db: u32) -> Result<(), DeviceError>;

    fn set_amp_enable(&mut self, enable: bool) -> Result<(), DeviceError>;

    fn set_antenna_enable(&mut self, enable: bool) -> Result<(), DeviceError>;

    /// Hand `callback` to the device and start streaming in `direction`.
    /// On failure the callback is dropped.
    fn start_transfer(
        &mut self,
        direction: Direction,
        callback: Box<dyn TransferCallback>,
    ) -> Result<(), DeviceError>;

    /// Stop streaming and give the callback back, if one was installed.
    fn stop_transfer(&mut self) -> Result<Option<Box<dyn TransferCallback>>, DeviceError>;

    /// `Ok(false)` once the callback asked to stop or the transfer was
    /// stopped; `Err` when the transfer died on its own.
    fn is_streaming(&self) -> Result<bool, DeviceError>;

    /// Release the device. Further calls fail.
    fn close(&mut self) -> Result<(), DeviceError>;
}
