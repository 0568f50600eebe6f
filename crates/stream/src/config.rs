// Copyright 2025-2026 CEMAXECUTER LLC

//! Transfer options as given on the command line, and their validated form.

use std::path::PathBuf;
use std::time::Duration;

use hx_sdr::{Direction, RfPath};

use crate::error::{TransferError, TransferResult};
use crate::limiter::TransferLimiter;

pub const FREQ_ONE_MHZ: i64 = 1_000_000;

pub const DEFAULT_FREQ_HZ: i64 = 900_000_000;
pub const FREQ_MIN_HZ: i64 = 0;
pub const FREQ_MAX_HZ: i64 = 7_250_000_000;
pub const IF_MIN_HZ: i64 = 2_150_000_000;
pub const IF_MAX_HZ: i64 = 2_750_000_000;
pub const LO_MIN_HZ: i64 = 84_375_000;
pub const LO_MAX_HZ: i64 = 5_400_000_000;
pub const DEFAULT_LO_HZ: i64 = 1_000_000_000;

pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 10_000_000;
pub const SAMPLE_RATE_MAX_HZ: u32 = 20_000_000;

pub const BASEBAND_FILTER_BW_MIN: u32 = 1_750_000;
pub const BASEBAND_FILTER_BW_MAX: u32 = 28_000_000;

/// Exclusive upper bound of `-n`
pub const SAMPLES_TO_XFER_MAX: u64 = 0x8000_0000_0000_0000;

pub const LNA_GAIN_MAX: u32 = 40;
pub const VGA_GAIN_MAX: u32 = 62;
pub const TXVGA_GAIN_MAX: u32 = 47;
pub const DEFAULT_LNA_GAIN: u32 = 8;
pub const DEFAULT_VGA_GAIN: u32 = 20;
pub const DEFAULT_TXVGA_GAIN: u32 = 0;

pub const CW_AMPLITUDE_MAX: u32 = 127;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(1);

/// MAX2837 baseband filter settings, ascending
const BASEBAND_FILTERS_HZ: [u32; 16] = [
    1_750_000, 2_500_000, 3_500_000, 5_000_000, 5_500_000, 6_000_000, 7_000_000, 8_000_000,
    9_000_000, 10_000_000, 12_000_000, 14_000_000, 15_000_000, 20_000_000, 24_000_000,
    28_000_000,
];

/// Largest filter not above `bandwidth_hz` (the narrowest one if all are).
pub fn baseband_filter_bw(bandwidth_hz: u32) -> u32 {
    BASEBAND_FILTERS_HZ
        .iter()
        .rev()
        .copied()
        .find(|&bw| bw <= bandwidth_hz)
        .unwrap_or(BASEBAND_FILTERS_HZ[0])
}

/// Filter used when none is requested: at most 0.75 x sample rate.
pub fn default_baseband_filter_bw(sample_rate_hz: u32) -> u32 {
    baseband_filter_bw((u64::from(sample_rate_hz) * 3 / 4) as u32)
}

/// Apply a crystal error of `ppm` to a frequency derived from the reference.
pub fn crystal_corrected(hz: u64, ppm: i32) -> u64 {
    let scaled = hz as f64 * (1_000_000.0 - f64::from(ppm)) / 1_000_000.0;
    scaled.round() as u64
}

/// Raw options, one field per command-line flag.
#[derive(Debug, Clone, Default)]
pub struct TransferOptions {
    pub serial: Option<String>,
    pub receive: Option<PathBuf>,
    pub receive_wav: bool,
    pub transmit: Option<PathBuf>,
    pub cw_amplitude: Option<u32>,
    pub freq_hz: Option<i64>,
    pub if_freq_hz: Option<i64>,
    pub lo_freq_hz: Option<i64>,
    pub image_reject: Option<u32>,
    pub amp_enable: Option<u32>,
    pub antenna_enable: Option<u32>,
    pub lna_gain: Option<u32>,
    pub vga_gain: Option<u32>,
    pub txvga_gain: Option<u32>,
    pub sample_rate_hz: Option<u32>,
    pub num_samples: Option<u64>,
    pub stream_buffer_size: Option<u32>,
    pub repeat: bool,
    pub baseband_filter_bw_hz: Option<u32>,
    pub crystal_ppm: Option<i32>,
    pub hw_sync: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferMode {
    /// `-r`: raw IQ to a file or stdout
    Receive { output: PathBuf },
    /// `-w`: IQ with a WAV header, file name derived from time and frequency
    ReceiveWav { output: PathBuf },
    /// `-t`: IQ from a file or stdin
    Transmit { input: PathBuf },
    /// `-c`: constant DC level
    SignalSource { amplitude: u8 },
}

impl TransferMode {
    pub fn direction(&self) -> Direction {
        match self {
            TransferMode::Receive { .. } | TransferMode::ReceiveWav { .. } => Direction::Rx,
            TransferMode::Transmit { .. } | TransferMode::SignalSource { .. } => Direction::Tx,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tuning {
    Direct { freq_hz: u64 },
    Explicit { if_hz: u64, lo_hz: u64, path: RfPath },
}

impl Tuning {
    /// RF frequency the front end ends up on
    pub fn freq_hz(&self) -> u64 {
        match *self {
            Tuning::Direct { freq_hz } => freq_hz,
            Tuning::Explicit { if_hz, lo_hz, path } => match path {
                RfPath::Bypass => if_hz,
                RfPath::LowPass => if_hz.abs_diff(lo_hz),
                RfPath::HighPass => if_hz + lo_hz,
            },
        }
    }

    fn corrected(self, ppm: i32) -> Self {
        match self {
            Tuning::Direct { freq_hz } => Tuning::Direct {
                freq_hz: crystal_corrected(freq_hz, ppm),
            },
            Tuning::Explicit { if_hz, lo_hz, path } => Tuning::Explicit {
                if_hz: crystal_corrected(if_hz, ppm),
                lo_hz: crystal_corrected(lo_hz, ppm),
                path,
            },
        }
    }
}

/// A validated transfer configuration.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    pub serial: Option<String>,
    pub mode: TransferMode,
    pub tuning: Tuning,
    pub sample_rate_hz: u32,
    pub baseband_filter_bw_hz: u32,
    pub lna_gain: u32,
    pub vga_gain: u32,
    pub txvga_gain: u32,
    pub amp: Option<bool>,
    pub antenna: Option<bool>,
    /// Transfer length in bytes
    pub limit_bytes: Option<u64>,
    pub repeat: bool,
    /// Receive through a ring buffer of this many bytes
    pub stream_buffer_size: Option<usize>,
    pub crystal_ppm: Option<i32>,
    pub hw_sync: bool,
    /// How often the session loop samples device state and the shutdown flag
    pub poll_interval: Duration,
    /// Abort when no byte moved for this long. Off with hardware sync.
    pub stall_timeout: Option<Duration>,
}

impl TransferConfig {
    /// Defaults for `mode`, everything else as with no flags given.
    pub fn new(mode: TransferMode) -> Self {
        Self {
            serial: None,
            mode,
            tuning: Tuning::Direct {
                freq_hz: DEFAULT_FREQ_HZ as u64,
            },
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
            baseband_filter_bw_hz: default_baseband_filter_bw(DEFAULT_SAMPLE_RATE_HZ),
            lna_gain: DEFAULT_LNA_GAIN,
            vga_gain: DEFAULT_VGA_GAIN,
            txvga_gain: DEFAULT_TXVGA_GAIN,
            amp: None,
            antenna: None,
            limit_bytes: None,
            repeat: false,
            stream_buffer_size: None,
            crystal_ppm: None,
            hw_sync: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stall_timeout: Some(DEFAULT_STALL_TIMEOUT),
        }
    }

    pub fn direction(&self) -> Direction {
        self.mode.direction()
    }

    pub fn limiter(&self) -> TransferLimiter {
        TransferLimiter::from_bytes(self.limit_bytes)
    }

    /// Sample rate as sent to the device
    pub fn device_sample_rate(&self) -> u32 {
        match self.crystal_ppm {
            Some(ppm) => crystal_corrected(u64::from(self.sample_rate_hz), ppm) as u32,
            None => self.sample_rate_hz,
        }
    }

    /// Tuning as sent to the device
    pub fn device_tuning(&self) -> Tuning {
        match self.crystal_ppm {
            Some(ppm) => self.tuning.corrected(ppm),
            None => self.tuning,
        }
    }
}

fn flag(value: Option<u32>, name: &str) -> TransferResult<Option<bool>> {
    match value {
        None => Ok(None),
        Some(0) => Ok(Some(false)),
        Some(1) => Ok(Some(true)),
        Some(_) => Err(TransferError::config(format!("{} shall be 0 or 1", name))),
    }
}

fn in_range(value: i64, min: i64, max: i64, name: &str) -> TransferResult<u64> {
    if value < min || value > max {
        return Err(TransferError::config(format!(
            "{} shall be between {} and {} MHz",
            name,
            min as f64 / FREQ_ONE_MHZ as f64,
            max as f64 / FREQ_ONE_MHZ as f64
        )));
    }
    Ok(value as u64)
}

fn gain(value: Option<u32>, max: u32, default: u32, name: &str) -> TransferResult<u32> {
    match value {
        Some(db) if db > max => Err(TransferError::config(format!(
            "{} shall be between 0 and {} dB",
            name, max
        ))),
        Some(db) => Ok(db),
        None => Ok(default),
    }
}

impl TransferOptions {
    /// Check every option against the device limits. `wav_name` builds the
    /// `-w` output file name from the tuned frequency.
    pub fn validate(
        self,
        wav_name: impl FnOnce(u64) -> String,
    ) -> TransferResult<TransferConfig> {
        let requested = [
            self.receive.is_some(),
            self.receive_wav,
            self.transmit.is_some(),
            self.cw_amplitude.is_some(),
        ]
        .iter()
        .filter(|&&m| m)
        .count();
        if requested != 1 {
            return Err(TransferError::config(
                "specify exactly one of -t, -c, -r, or -w",
            ));
        }

        let tuning = self.tuning()?;

        let sample_rate_hz = self.sample_rate_hz.unwrap_or(DEFAULT_SAMPLE_RATE_HZ);
        if sample_rate_hz == 0 || sample_rate_hz > SAMPLE_RATE_MAX_HZ {
            return Err(TransferError::config(format!(
                "sample_rate_hz shall be between 1 Hz and {} MHz",
                SAMPLE_RATE_MAX_HZ / FREQ_ONE_MHZ as u32
            )));
        }

        let baseband_filter_bw_hz = match self.baseband_filter_bw_hz {
            Some(bw) if !(BASEBAND_FILTER_BW_MIN..=BASEBAND_FILTER_BW_MAX).contains(&bw) => {
                return Err(TransferError::config(format!(
                    "baseband_filter_bw_hz shall be between {} and {} Hz",
                    BASEBAND_FILTER_BW_MIN, BASEBAND_FILTER_BW_MAX
                )));
            }
            Some(bw) => baseband_filter_bw(bw),
            None => default_baseband_filter_bw(sample_rate_hz),
        };

        let limit_bytes = match self.num_samples {
            Some(n) if n >= SAMPLES_TO_XFER_MAX => {
                return Err(TransferError::config(format!(
                    "num_samples must be less than {}",
                    SAMPLES_TO_XFER_MAX
                )));
            }
            Some(n) => TransferLimiter::samples(n).remaining(),
            None => None,
        };

        let crystal_ppm = match self.crystal_ppm {
            Some(ppm) if ppm.unsigned_abs() >= 1_000_000 => {
                return Err(TransferError::config("crystal ppm shall be within +/-1000000"));
            }
            other => other,
        };

        let mode = if let Some(output) = self.receive {
            TransferMode::Receive { output }
        } else if self.receive_wav {
            TransferMode::ReceiveWav {
                output: PathBuf::from(wav_name(tuning.freq_hz())),
            }
        } else if let Some(input) = self.transmit {
            TransferMode::Transmit { input }
        } else {
            let amplitude = self.cw_amplitude.unwrap_or(0);
            if amplitude > CW_AMPLITUDE_MAX {
                return Err(TransferError::config(format!(
                    "amplitude shall be between 0 and {}",
                    CW_AMPLITUDE_MAX
                )));
            }
            TransferMode::SignalSource {
                amplitude: amplitude as u8,
            }
        };

        let stream_buffer_size = match self.stream_buffer_size {
            Some(0) => return Err(TransferError::config("buf_size shall be greater than 0")),
            Some(size) if mode.direction() == Direction::Rx => Some(size as usize),
            Some(_) => {
                log::warn!("-S only applies to receive, ignored");
                None
            }
            None => None,
        };

        let repeat = match &mode {
            TransferMode::Transmit { .. } => self.repeat,
            _ if self.repeat => {
                log::warn!("-R only applies to transmit from a file, ignored");
                false
            }
            _ => false,
        };

        // With hardware sync nothing moves until the trigger fires
        let hw_sync = flag(self.hw_sync, "hw_sync_enable")?.unwrap_or(false);

        Ok(TransferConfig {
            serial: self.serial,
            mode,
            tuning,
            sample_rate_hz,
            baseband_filter_bw_hz,
            lna_gain: gain(self.lna_gain, LNA_GAIN_MAX, DEFAULT_LNA_GAIN, "lna_gain")?,
            vga_gain: gain(self.vga_gain, VGA_GAIN_MAX, DEFAULT_VGA_GAIN, "vga_gain")?,
            txvga_gain: gain(self.txvga_gain, TXVGA_GAIN_MAX, DEFAULT_TXVGA_GAIN, "txvga_gain")?,
            amp: flag(self.amp_enable, "amp_enable")?,
            antenna: flag(self.antenna_enable, "antenna_enable")?,
            limit_bytes,
            repeat,
            stream_buffer_size,
            crystal_ppm,
            hw_sync,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stall_timeout: (!hw_sync).then_some(DEFAULT_STALL_TIMEOUT),
        })
    }

    fn tuning(&self) -> TransferResult<Tuning> {
        let explicit =
            self.if_freq_hz.is_some() || self.lo_freq_hz.is_some() || self.image_reject.is_some();

        if !explicit {
            let freq_hz = self.freq_hz.unwrap_or(DEFAULT_FREQ_HZ);
            let freq_hz = in_range(freq_hz, FREQ_MIN_HZ, FREQ_MAX_HZ, "freq_hz")?;
            return Ok(Tuning::Direct { freq_hz });
        }

        if self.freq_hz.is_some() {
            return Err(TransferError::config(
                "freq_hz (-f) cannot be combined with explicit IF/LO tuning",
            ));
        }
        let if_hz = self.if_freq_hz.ok_or_else(|| {
            TransferError::config("if_freq_hz must be specified for explicit tuning")
        })?;
        let selection = self.image_reject.ok_or_else(|| {
            TransferError::config("image_reject must be specified for explicit tuning")
        })?;
        let path = RfPath::from_index(selection).ok_or_else(|| {
            TransferError::config(
                "image_reject must be 0 (bypass), 1 (low pass) or 2 (high pass)",
            )
        })?;
        if self.lo_freq_hz.is_none() && path != RfPath::Bypass {
            return Err(TransferError::config(
                "lo_freq_hz must be specified for explicit tuning unless image_reject is bypass",
            ));
        }

        let if_hz = in_range(if_hz, IF_MIN_HZ, IF_MAX_HZ, "if_freq_hz")?;
        let lo_hz = in_range(
            self.lo_freq_hz.unwrap_or(DEFAULT_LO_HZ),
            LO_MIN_HZ,
            LO_MAX_HZ,
            "lo_freq_hz",
        )?;
        Ok(Tuning::Explicit { if_hz, lo_hz, path })
    }
}
