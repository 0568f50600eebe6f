// Copyright 2025-2026 CEMAXECUTER LLC

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_double, c_int, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use crate::{
    Device, DeviceError, Direction, GainKind, RfPath, StreamControl, Transfer, TransferCallback,
};

const HACKRF_SUCCESS: c_int = 0;
const HACKRF_TRUE: c_int = 1;
const HACKRF_ERROR_STREAMING_STOPPED: c_int = -1003;
const HACKRF_ERROR_STREAMING_EXIT_CALLED: c_int = -1004;
/// Generic failure code used for errors raised on the Rust side
const HACKRF_ERROR_OTHER: c_int = -9999;

#[repr(C)]
struct HackrfTransfer {
    device: *mut c_void,
    buffer: *mut u8,
    buffer_length: c_int,
    valid_length: c_int,
    rx_ctx: *mut c_void,
    tx_ctx: *mut c_void,
}

type RawDevice = c_void;
type RawCallback = unsafe extern "C" fn(*mut HackrfTransfer) -> c_int;

extern "C" {
    fn hackrf_init() -> c_int;
    fn hackrf_exit() -> c_int;
    fn hackrf_open_by_serial(
        desired_serial_number: *const c_char,
        device: *mut *mut RawDevice,
    ) -> c_int;
    fn hackrf_close(device: *mut RawDevice) -> c_int;
    fn hackrf_error_name(errcode: c_int) -> *const c_char;
    fn hackrf_set_sample_rate(device: *mut RawDevice, freq_hz: c_double) -> c_int;
    fn hackrf_set_baseband_filter_bandwidth(device: *mut RawDevice, bandwidth_hz: u32) -> c_int;
    fn hackrf_set_hw_sync_mode(device: *mut RawDevice, value: u8) -> c_int;
    fn hackrf_set_freq(device: *mut RawDevice, freq_hz: u64) -> c_int;
    fn hackrf_set_freq_explicit(
        device: *mut RawDevice,
        if_freq_hz: u64,
        lo_freq_hz: u64,
        path: c_int,
    ) -> c_int;
    fn hackrf_set_lna_gain(device: *mut RawDevice, value: u32) -> c_int;
    fn hackrf_set_vga_gain(device: *mut RawDevice, value: u32) -> c_int;
    fn hackrf_set_txvga_gain(device: *mut RawDevice, value: u32) -> c_int;
    fn hackrf_set_amp_enable(device: *mut RawDevice, value: u8) -> c_int;
    fn hackrf_set_antenna_enable(device: *mut RawDevice, value: u8) -> c_int;
    fn hackrf_start_rx(device: *mut RawDevice, callback: RawCallback, rx_ctx: *mut c_void)
        -> c_int;
    fn hackrf_stop_rx(device: *mut RawDevice) -> c_int;
    fn hackrf_start_tx(device: *mut RawDevice, callback: RawCallback, tx_ctx: *mut c_void)
        -> c_int;
    fn hackrf_stop_tx(device: *mut RawDevice) -> c_int;
    fn hackrf_is_streaming(device: *mut RawDevice) -> c_int;
}

fn error_name(code: c_int) -> String {
    unsafe {
        let name = hackrf_error_name(code);
        if name.is_null() {
            return format!("HACKRF_ERROR {}", code);
        }
        CStr::from_ptr(name).to_string_lossy().into_owned()
    }
}

fn check(op: &'static str, code: c_int) -> Result<(), DeviceError> {
    if code == HACKRF_SUCCESS {
        Ok(())
    } else {
        Err(DeviceError::new(op, code, error_name(code)))
    }
}

/// Context handed to libhackrf as rx_ctx/tx_ctx for one transfer
struct CallbackContext {
    callback: Box<dyn TransferCallback>,
}

unsafe fn dispatch(transfer: *mut HackrfTransfer, ctx: *mut c_void) -> c_int {
    if ctx.is_null() {
        return -1;
    }
    let ctx = &mut *(ctx as *mut CallbackContext);
    let len = (*transfer).buffer_length.max(0) as usize;
    let buffer = std::slice::from_raw_parts_mut((*transfer).buffer, len);
    let mut view = Transfer {
        buffer,
        valid_length: (*transfer).valid_length.max(0) as usize,
    };

    // A panic must not unwind into libhackrf's transfer thread
    let control = panic::catch_unwind(AssertUnwindSafe(|| ctx.callback.on_buffer(&mut view)))
        .unwrap_or(StreamControl::Stop);

    (*transfer).valid_length = view.valid_length.min(len) as c_int;
    match control {
        StreamControl::Continue => 0,
        StreamControl::Stop => -1,
    }
}

unsafe extern "C" fn rx_trampoline(transfer: *mut HackrfTransfer) -> c_int {
    dispatch(transfer, (*transfer).rx_ctx)
}

unsafe extern "C" fn tx_trampoline(transfer: *mut HackrfTransfer) -> c_int {
    dispatch(transfer, (*transfer).tx_ctx)
}

/// HackRF One handle on top of the libhackrf C API
pub struct HackrfDevice {
    dev: *mut RawDevice,
    active: Option<(Direction, *mut CallbackContext)>,
}

// The device pointer is owned by this handle and only used through &mut self
unsafe impl Send for HackrfDevice {}

impl HackrfDevice {
    /// Open the HackRF with the given serial number, or the first one found.
    pub fn open(serial: Option<&str>) -> Result<Self, DeviceError> {
        let serial_c = serial
            .map(CString::new)
            .transpose()
            .map_err(|e| DeviceError::new("hackrf_open", HACKRF_ERROR_OTHER, e.to_string()))?;

        unsafe {
            check("hackrf_init", hackrf_init())?;

            let mut dev: *mut RawDevice = ptr::null_mut();
            let serial_ptr = serial_c.as_ref().map_or(ptr::null(), |s| s.as_ptr());
            let r = hackrf_open_by_serial(serial_ptr, &mut dev);
            if r != HACKRF_SUCCESS {
                hackrf_exit();
                return Err(DeviceError::new("hackrf_open", r, error_name(r)));
            }

            log::info!("HackRF opened (serial={:?})", serial);

            Ok(Self {
                dev,
                active: None,
            })
        }
    }

    fn raw(&self, op: &'static str) -> Result<*mut RawDevice, DeviceError> {
        if self.dev.is_null() {
            Err(DeviceError::new(op, HACKRF_ERROR_OTHER, "device closed"))
        } else {
            Ok(self.dev)
        }
    }
}

impl Device for HackrfDevice {
    fn set_sample_rate(&mut self, hz: f64) -> Result<(), DeviceError> {
        let dev = self.raw("hackrf_set_sample_rate")?;
        check("hackrf_set_sample_rate", unsafe { hackrf_set_sample_rate(dev, hz) })
    }

    fn set_baseband_filter_bandwidth(&mut self, hz: u32) -> Result<(), DeviceError> {
        let dev = self.raw("hackrf_set_baseband_filter_bandwidth")?;
        check("hackrf_set_baseband_filter_bandwidth", unsafe {
            hackrf_set_baseband_filter_bandwidth(dev, hz)
        })
    }

    fn set_hw_sync_mode(&mut self, enable: bool) -> Result<(), DeviceError> {
        let dev = self.raw("hackrf_set_hw_sync_mode")?;
        check("hackrf_set_hw_sync_mode", unsafe {
            hackrf_set_hw_sync_mode(dev, enable as u8)
        })
    }

    fn set_freq(&mut self, hz: u64) -> Result<(), DeviceError> {
        let dev = self.raw("hackrf_set_freq")?;
        check("hackrf_set_freq", unsafe { hackrf_set_freq(dev, hz) })
    }

    fn set_freq_explicit(
        &mut self,
        if_hz: u64,
        lo_hz: u64,
        path: RfPath,
    ) -> Result<(), DeviceError> {
        let dev = self.raw("hackrf_set_freq_explicit")?;
        check("hackrf_set_freq_explicit", unsafe {
            hackrf_set_freq_explicit(dev, if_hz, lo_hz, path as c_int)
        })
    }

    fn set_gain(&mut self, kind: GainKind, db: u32) -> Result<(), DeviceError> {
        let dev = self.raw("hackrf_set_gain")?;
        unsafe {
            match kind {
                GainKind::Lna => check("hackrf_set_lna_gain", hackrf_set_lna_gain(dev, db)),
                GainKind::Vga => check("hackrf_set_vga_gain", hackrf_set_vga_gain(dev, db)),
                GainKind::TxVga => check("hackrf_set_txvga_gain", hackrf_set_txvga_gain(dev, db)),
            }
        }
    }

    fn set_amp_enable(&mut self, enable: bool) -> Result<(), DeviceError> {
        let dev = self.raw("hackrf_set_amp_enable")?;
        check("hackrf_set_amp_enable", unsafe {
            hackrf_set_amp_enable(dev, enable as u8)
        })
    }

    fn set_antenna_enable(&mut self, enable: bool) -> Result<(), DeviceError> {
        let dev = self.raw("hackrf_set_antenna_enable")?;
        check("hackrf_set_antenna_enable", unsafe {
            hackrf_set_antenna_enable(dev, enable as u8)
        })
    }

    fn start_transfer(
        &mut self,
        direction: Direction,
        callback: Box<dyn TransferCallback>,
    ) -> Result<(), DeviceError> {
        let dev = self.raw("hackrf_start_transfer")?;
        if self.active.is_some() {
            return Err(DeviceError::new(
                "hackrf_start_transfer",
                HACKRF_ERROR_OTHER,
                "transfer already active",
            ));
        }

        // Owned by libhackrf until stop_transfer reclaims it
        let ctx = Box::into_raw(Box::new(CallbackContext { callback }));

        let (op, r) = unsafe {
            match direction {
                Direction::Rx => (
                    "hackrf_start_rx",
                    hackrf_start_rx(dev, rx_trampoline, ctx as *mut c_void),
                ),
                Direction::Tx => (
                    "hackrf_start_tx",
                    hackrf_start_tx(dev, tx_trampoline, ctx as *mut c_void),
                ),
            }
        };
        if r != HACKRF_SUCCESS {
            drop(unsafe { Box::from_raw(ctx) });
            return Err(DeviceError::new(op, r, error_name(r)));
        }

        self.active = Some((direction, ctx));
        log::debug!("HackRF {:?} transfer started", direction);
        Ok(())
    }

    fn stop_transfer(&mut self) -> Result<Option<Box<dyn TransferCallback>>, DeviceError> {
        let Some((direction, ctx)) = self.active.take() else {
            return Ok(None);
        };
        let dev = self.raw("hackrf_stop_transfer")?;

        let (op, r) = unsafe {
            match direction {
                Direction::Rx => ("hackrf_stop_rx", hackrf_stop_rx(dev)),
                Direction::Tx => ("hackrf_stop_tx", hackrf_stop_tx(dev)),
            }
        };

        // libhackrf has joined its transfer thread (or never started it); the
        // context is ours again either way
        let ctx = unsafe { Box::from_raw(ctx) };
        check(op, r)?;
        log::debug!("HackRF {:?} transfer stopped", direction);
        Ok(Some(ctx.callback))
    }

    fn is_streaming(&self) -> Result<bool, DeviceError> {
        let dev = self.raw("hackrf_is_streaming")?;
        match unsafe { hackrf_is_streaming(dev) } {
            HACKRF_TRUE => Ok(true),
            HACKRF_ERROR_STREAMING_EXIT_CALLED | HACKRF_ERROR_STREAMING_STOPPED => Ok(false),
            r => Err(DeviceError::new("hackrf_is_streaming", r, error_name(r))),
        }
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        if self.dev.is_null() {
            return Ok(());
        }
        let stopped = self.stop_transfer().map(|_| ());
        let r = unsafe { hackrf_close(self.dev) };
        self.dev = ptr::null_mut();
        unsafe {
            hackrf_exit();
        }
        log::info!("HackRF closed");
        stopped?;
        check("hackrf_close", r)
    }
}

impl Drop for HackrfDevice {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("HackRF close on drop: {}", e);
        }
    }
}
