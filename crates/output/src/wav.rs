use std::fs::OpenOptions;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Local};

/// RIFF + fmt + data chunk headers
pub const WAV_HEADER_LEN: usize = 44;

// RIFF size counts everything after the 8-byte RIFF preamble
const RIFF_OVERHEAD: u32 = (WAV_HEADER_LEN - 8) as u32;

const FMT_CHUNK_SIZE: u32 = 16;
const WAVE_FORMAT_PCM: u16 = 1;
// I and Q as two interleaved unsigned 8-bit channels
const CHANNELS: u16 = 2;
const BITS_PER_SAMPLE: u16 = 8;
const BLOCK_ALIGN: u16 = CHANNELS * BITS_PER_SAMPLE / 8;

/// Header of an 8-bit IQ WAV capture (SDR# compatible).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WavHeader {
    pub sample_rate: u32,
    /// Sample bytes in the data chunk
    pub data_size: u32,
}

impl WavHeader {
    /// Empty data chunk, written before the capture starts.
    pub fn placeholder() -> Self {
        Self::default()
    }

    /// Header for `data_len` sample bytes. Lengths past what RIFF can express
    /// are clamped.
    pub fn new(sample_rate: u32, data_len: u64) -> Self {
        let max = u64::from(u32::MAX - RIFF_OVERHEAD);
        if data_len > max {
            log::warn!(
                "capture of {} bytes exceeds the WAV size limit, header clamped to {}",
                data_len,
                max
            );
        }
        Self {
            sample_rate,
            data_size: data_len.min(max) as u32,
        }
    }

    pub fn riff_size(&self) -> u32 {
        self.data_size + RIFF_OVERHEAD
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate.saturating_mul(u32::from(BLOCK_ALIGN))
    }

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(b"RIFF")?;
        w.write_u32::<LittleEndian>(self.riff_size())?;
        w.write_all(b"WAVE")?;

        w.write_all(b"fmt ")?;
        w.write_u32::<LittleEndian>(FMT_CHUNK_SIZE)?;
        w.write_u16::<LittleEndian>(WAVE_FORMAT_PCM)?;
        w.write_u16::<LittleEndian>(CHANNELS)?;
        w.write_u32::<LittleEndian>(self.sample_rate)?;
        w.write_u32::<LittleEndian>(self.byte_rate())?;
        w.write_u16::<LittleEndian>(BLOCK_ALIGN)?;
        w.write_u16::<LittleEndian>(BITS_PER_SAMPLE)?;

        w.write_all(b"data")?;
        w.write_u32::<LittleEndian>(self.data_size)?;
        Ok(())
    }

    /// Parse a header written by `write`. Only the layout this module produces
    /// is accepted.
    pub fn read<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut tag = [0u8; 4];

        expect_tag(r, &mut tag, b"RIFF")?;
        let riff_size = r.read_u32::<LittleEndian>()?;
        expect_tag(r, &mut tag, b"WAVE")?;

        expect_tag(r, &mut tag, b"fmt ")?;
        if r.read_u32::<LittleEndian>()? != FMT_CHUNK_SIZE
            || r.read_u16::<LittleEndian>()? != WAVE_FORMAT_PCM
            || r.read_u16::<LittleEndian>()? != CHANNELS
        {
            return Err(invalid("unsupported fmt chunk"));
        }
        let sample_rate = r.read_u32::<LittleEndian>()?;
        let _byte_rate = r.read_u32::<LittleEndian>()?;
        if r.read_u16::<LittleEndian>()? != BLOCK_ALIGN
            || r.read_u16::<LittleEndian>()? != BITS_PER_SAMPLE
        {
            return Err(invalid("unsupported sample layout"));
        }

        expect_tag(r, &mut tag, b"data")?;
        let data_size = r.read_u32::<LittleEndian>()?;

        let header = Self {
            sample_rate,
            data_size,
        };
        if header.riff_size() != riff_size {
            return Err(invalid("RIFF size does not match data size"));
        }
        Ok(header)
    }

    /// Rewrite the header at the start of `w` in place, leaving the stream
    /// positioned at its end.
    pub fn patch<W: Write + Seek>(&self, w: &mut W) -> io::Result<()> {
        w.seek(SeekFrom::Start(0))?;
        self.write(w)?;
        w.seek(SeekFrom::End(0))?;
        w.flush()
    }
}

fn expect_tag<R: Read>(r: &mut R, buf: &mut [u8; 4], tag: &[u8; 4]) -> io::Result<()> {
    r.read_exact(buf)?;
    if buf != tag {
        return Err(invalid("unexpected chunk id"));
    }
    Ok(())
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

/// Finalise a capture file whose sample data is already on disk: the header
/// at offset 0 gets the sample rate and the `data_len` sample bytes.
pub fn finalize_file(path: &Path, sample_rate: u32, data_len: u64) -> io::Result<WavHeader> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    let header = WavHeader::new(sample_rate, data_len);
    header.patch(&mut file)?;
    file.sync_all()?;
    log::debug!(
        "{}: WAV header finalised ({} Hz, {} data bytes)",
        path.display(),
        header.sample_rate,
        header.data_size
    );
    Ok(header)
}

/// Name used for `-w` captures, e.g. `HackRF_20260131_235959_915000000Hz_IQ.wav`.
pub fn capture_file_name(freq_hz: u64, at: DateTime<Local>) -> String {
    format!("HackRF_{}_{}Hz_IQ.wav", at.format("%Y%m%d_%H%M%S"), freq_hz)
}
