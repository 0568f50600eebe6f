use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use clap::Parser;
use hx_output::wav::capture_file_name;
use hx_sdr::sim::{SimDevice, DEFAULT_TRANSFER_SIZE};
use hx_stream::{
    SessionController, SessionReport, StopReason, TransferConfig, TransferOptions, TransferResult,
};

#[derive(Parser, Debug)]
#[command(name = "hackrf-transfer")]
#[command(about = "Stream IQ samples between a HackRF and a file")]
struct Cli {
    /// Serial number of the device to open
    #[arg(short = 'd', value_name = "SERIAL")]
    serial: Option<String>,

    /// Receive into a file ('-' for stdout)
    #[arg(short = 'r', value_name = "FILE")]
    receive: Option<PathBuf>,

    /// Receive into HackRF_<time>_<freq>Hz_IQ.wav
    #[arg(short = 'w')]
    receive_wav: bool,

    /// Transmit from a file ('-' for stdin)
    #[arg(short = 't', value_name = "FILE")]
    transmit: Option<PathBuf>,

    /// Frequency in Hz [0MHz to 7250MHz]
    #[arg(short = 'f', value_name = "FREQ_HZ", value_parser = parse_freq)]
    freq_hz: Option<i64>,

    /// Intermediate frequency in Hz [2150MHz to 2750MHz]
    #[arg(short = 'i', value_name = "IF_HZ", value_parser = parse_freq)]
    if_freq_hz: Option<i64>,

    /// Front-end local oscillator frequency in Hz [84MHz to 5400MHz]
    #[arg(short = 'o', value_name = "LO_HZ", value_parser = parse_freq)]
    lo_freq_hz: Option<i64>,

    /// Image reject filter: 0=bypass, 1=low pass, 2=high pass
    #[arg(short = 'm', value_name = "FILTER", value_parser = parse_u32)]
    image_reject: Option<u32>,

    /// RX/TX RF amplifier 1=enable, 0=disable
    #[arg(short = 'a', value_name = "AMP", value_parser = parse_u32)]
    amp_enable: Option<u32>,

    /// Antenna port power, 1=enable, 0=disable
    #[arg(short = 'p', value_name = "ANTENNA", value_parser = parse_u32)]
    antenna_enable: Option<u32>,

    /// RX LNA (IF) gain, 0-40dB, 8dB steps
    #[arg(short = 'l', value_name = "GAIN_DB", value_parser = parse_u32)]
    lna_gain: Option<u32>,

    /// RX VGA (baseband) gain, 0-62dB, 2dB steps
    #[arg(short = 'g', value_name = "GAIN_DB", value_parser = parse_u32)]
    vga_gain: Option<u32>,

    /// TX VGA (IF) gain, 0-47dB, 1dB steps
    #[arg(short = 'x', value_name = "GAIN_DB", value_parser = parse_u32)]
    txvga_gain: Option<u32>,

    /// Sample rate in Hz (default 10MHz)
    #[arg(short = 's', value_name = "SAMPLE_RATE_HZ", value_parser = parse_freq_u32)]
    sample_rate_hz: Option<u32>,

    /// Number of samples to transfer (default is unlimited)
    #[arg(short = 'n', value_name = "NUM_SAMPLES", value_parser = parse_u64)]
    num_samples: Option<u64>,

    /// Receive through a stream buffer of this many bytes
    #[arg(short = 'S', value_name = "BUF_SIZE", value_parser = parse_u32)]
    stream_buffer_size: Option<u32>,

    /// CW signal source mode, amplitude 0-127 (DC value to DAC)
    #[arg(short = 'c', value_name = "AMPLITUDE", value_parser = parse_u32)]
    cw_amplitude: Option<u32>,

    /// Repeat TX mode (default is off)
    #[arg(short = 'R')]
    repeat: bool,

    /// Set baseband filter bandwidth in Hz
    #[arg(short = 'b', value_name = "BW_HZ", value_parser = parse_freq_u32)]
    baseband_filter_bw_hz: Option<u32>,

    /// Crystal error in ppm, applied to sample rate and frequency
    #[arg(short = 'C', value_name = "PPM", allow_negative_numbers = true)]
    crystal_ppm: Option<i32>,

    /// Synchronise RX/TX to external trigger input, 1=enable, 0=disable
    #[arg(short = 'H', value_name = "HW_SYNC", value_parser = parse_u32)]
    hw_sync: Option<u32>,

    /// Drive a simulated device instead of hardware
    #[arg(long)]
    sim: bool,

    /// Verbose output
    #[arg(short = 'v', long)]
    verbose: bool,
}

impl Cli {
    fn into_options(self) -> TransferOptions {
        TransferOptions {
            serial: self.serial,
            receive: self.receive,
            receive_wav: self.receive_wav,
            transmit: self.transmit,
            cw_amplitude: self.cw_amplitude,
            freq_hz: self.freq_hz,
            if_freq_hz: self.if_freq_hz,
            lo_freq_hz: self.lo_freq_hz,
            image_reject: self.image_reject,
            amp_enable: self.amp_enable,
            antenna_enable: self.antenna_enable,
            lna_gain: self.lna_gain,
            vga_gain: self.vga_gain,
            txvga_gain: self.txvga_gain,
            sample_rate_hz: self.sample_rate_hz,
            num_samples: self.num_samples,
            stream_buffer_size: self.stream_buffer_size,
            repeat: self.repeat,
            baseband_filter_bw_hz: self.baseband_filter_bw_hz,
            crystal_ppm: self.crystal_ppm,
            hw_sync: self.hw_sync,
        }
    }
}

/// Unsigned integer with optional `0x` / `0b` prefix.
fn parse_u64(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let (digits, radix) = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (hex, 16)
    } else if let Some(bin) = s.strip_prefix("0b").or_else(|| s.strip_prefix("0B")) {
        (bin, 2)
    } else {
        (s, 10)
    };
    u64::from_str_radix(digits, radix).map_err(|e| format!("invalid number '{}': {}", s, e))
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let v = parse_u64(s)?;
    u32::try_from(v).map_err(|_| format!("'{}' does not fit in 32 bits", s))
}

/// Frequency in Hz; float notation such as `2.4e9` is accepted.
fn parse_freq(s: &str) -> Result<i64, String> {
    if let Ok(v) = parse_u64(s) {
        return i64::try_from(v).map_err(|_| format!("frequency '{}' is too large", s));
    }
    let hz: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("invalid frequency '{}'", s))?;
    if !hz.is_finite() || hz.abs() >= i64::MAX as f64 {
        return Err(format!("invalid frequency '{}'", s));
    }
    Ok(hz.round() as i64)
}

fn parse_freq_u32(s: &str) -> Result<u32, String> {
    let hz = parse_freq(s)?;
    u32::try_from(hz).map_err(|_| format!("'{}' is out of range", s))
}

#[cfg(feature = "hackrf")]
fn run_hardware(session: &mut SessionController) -> TransferResult<SessionReport> {
    session.run(|cfg| hx_sdr::hackrf::HackrfDevice::open(cfg.serial.as_deref()))
}

#[cfg(not(feature = "hackrf"))]
fn run_hardware(_session: &mut SessionController) -> TransferResult<SessionReport> {
    Err(hx_stream::TransferError::config(
        "built without HackRF support (enable the `hackrf` feature, or use --sim)",
    ))
}

/// Flag raised by SIGINT, SIGTERM or SIGHUP. The session stops at its next poll.
fn shutdown_flag() -> Arc<AtomicBool> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Release)) {
        log::warn!("cannot install signal handler: {}", e);
    }
    shutdown
}

/// Pace the software device like hardware at the configured rate.
fn sim_device(cfg: &TransferConfig) -> SimDevice {
    let bytes_per_sec = 2.0 * f64::from(cfg.sample_rate_hz);
    let interval = Duration::from_secs_f64(DEFAULT_TRANSFER_SIZE as f64 / bytes_per_sec);
    SimDevice::new(DEFAULT_TRANSFER_SIZE).with_interval(interval)
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let sim = cli.sim;
    let config = match cli
        .into_options()
        .validate(|freq_hz| capture_file_name(freq_hz, Local::now()))
    {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("see hackrf-transfer --help");
            std::process::exit(1);
        }
    };

    log::info!("mode: {:?}", config.mode);
    log::info!(
        "frequency: {} Hz, sample rate: {} Hz, baseband filter: {} Hz",
        config.tuning.freq_hz(),
        config.sample_rate_hz,
        config.baseband_filter_bw_hz
    );
    if let Some(limit) = config.limit_bytes {
        log::info!("transfer limit: {} bytes", limit);
    }

    let shutdown = shutdown_flag();
    let mut session = SessionController::new(config, shutdown);
    let result = if sim {
        log::info!("using simulated device");
        session.run(|cfg| Ok(sim_device(cfg)))
    } else {
        run_hardware(&mut session)
    };

    match result {
        Ok(report) => {
            match report.reason {
                StopReason::Completed => log::info!("transfer complete"),
                StopReason::ShutdownRequested => log::info!("transfer interrupted"),
            }
            log::info!("exit");
        }
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_prefixes() {
        assert_eq!(parse_u64("1234"), Ok(1234));
        assert_eq!(parse_u64("0x10"), Ok(16));
        assert_eq!(parse_u64("0b101"), Ok(5));
        assert!(parse_u64("12ab").is_err());
        assert!(parse_u32("0x100000000").is_err());
    }

    #[test]
    fn test_frequency_notation() {
        assert_eq!(parse_freq("915000000"), Ok(915_000_000));
        assert_eq!(parse_freq("2.4e9"), Ok(2_400_000_000));
        assert_eq!(parse_freq("-1e6"), Ok(-1_000_000));
        assert!(parse_freq("nan").is_err());
        assert_eq!(parse_freq_u32("10e6"), Ok(10_000_000));
        assert!(parse_freq_u32("5e9").is_err());
    }

    #[test]
    fn test_cli_maps_to_options() {
        let cli = Cli::try_parse_from([
            "hackrf-transfer",
            "-t",
            "-",
            "-f",
            "433.92e6",
            "-x",
            "20",
            "-n",
            "0x100",
            "-R",
            "-C",
            "-5",
        ])
        .unwrap();
        let opts = cli.into_options();
        assert_eq!(opts.transmit, Some(PathBuf::from("-")));
        assert_eq!(opts.freq_hz, Some(433_920_000));
        assert_eq!(opts.txvga_gain, Some(20));
        assert_eq!(opts.num_samples, Some(256));
        assert!(opts.repeat);
        assert_eq!(opts.crystal_ppm, Some(-5));
    }

    #[test]
    fn test_help_is_not_an_error() {
        let err = Cli::try_parse_from(["hackrf-transfer", "-h"]).unwrap_err();
        assert!(!err.use_stderr());
        let err = Cli::try_parse_from(["hackrf-transfer", "-l"]).unwrap_err();
        assert!(err.use_stderr());
    }

    #[cfg(unix)]
    #[test]
    fn test_sigterm_requests_shutdown() {
        let shutdown = shutdown_flag();
        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !shutdown.load(Ordering::Acquire) && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(shutdown.load(Ordering::Acquire));
    }
}
