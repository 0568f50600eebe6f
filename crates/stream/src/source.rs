// Copyright 2025-2026 CEMAXECUTER LLC

//! Backing stores for IQ streams: a file, stdin or stdout.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// stdio buffer size used for sample files
pub const FD_BUFFER_SIZE: usize = 8 * 1024;

/// Path meaning stdin (transmit) or stdout (receive)
pub const STDIO_PATH: &str = "-";

fn is_stdio(path: &Path) -> bool {
    path.as_os_str() == STDIO_PATH
}

/// Transmit input. Stdin is accepted but cannot be rewound.
pub enum Input {
    Stdin(io::Stdin),
    File(File),
}

impl Input {
    pub fn open(path: &Path) -> io::Result<Self> {
        if is_stdio(path) {
            Ok(Input::Stdin(io::stdin()))
        } else {
            File::open(path).map(Input::File)
        }
    }
}

impl Read for Input {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Input::Stdin(s) => s.read(buf),
            Input::File(f) => f.read(buf),
        }
    }
}

impl Seek for Input {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Input::Stdin(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "stdin cannot be repositioned",
            )),
            Input::File(f) => f.seek(pos),
        }
    }
}

/// Receive output.
pub enum Output {
    Stdout(io::Stdout),
    File(File),
}

impl Output {
    pub fn create(path: &Path) -> io::Result<Self> {
        if is_stdio(path) {
            Ok(Output::Stdout(io::stdout()))
        } else {
            File::create(path).map(Output::File)
        }
    }
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Output::Stdout(s) => s.write(buf),
            Output::File(f) => f.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::Stdout(s) => s.flush(),
            Output::File(f) => f.flush(),
        }
    }
}

/// Sample source with repeat support.
///
/// Once the end of the data is reached without repeat (or the input can't
/// be rewound) the source is ended for good. Read errors end it too: on
/// transmit a failing input is treated as the end of the stream.
pub struct SampleSource<R> {
    reader: BufReader<R>,
    repeat: bool,
    ended: bool,
    rewinds: u64,
}

impl<R: Read + Seek> SampleSource<R> {
    pub fn new(inner: R, repeat: bool) -> Self {
        Self {
            reader: BufReader::with_capacity(FD_BUFFER_SIZE, inner),
            repeat,
            ended: false,
            rewinds: 0,
        }
    }

    /// How many times the input wrapped around
    pub fn rewinds(&self) -> u64 {
        self.rewinds
    }

    /// Fill `buf` with the next bytes and return how many were written.
    ///
    /// With repeat enabled the input is rewound as often as needed, so the
    /// output is the input repeated byte for byte. Anything short of a full
    /// buffer means the source has ended.
    pub fn fill(&mut self, buf: &mut [u8]) -> usize {
        let mut filled = self.read_full(buf);

        while filled < buf.len() && self.repeat && !self.ended {
            if let Err(e) = self.reader.rewind() {
                log::warn!("cannot rewind input ({}), ending stream", e);
                self.ended = true;
                break;
            }
            self.rewinds += 1;
            log::debug!("input end reached, rewound to beginning ({} times)", self.rewinds);

            let n = self.read_full(&mut buf[filled..]);
            if n == 0 {
                log::warn!("input is empty, nothing to repeat");
                self.ended = true;
                break;
            }
            filled += n;
        }

        if filled < buf.len() {
            self.ended = true;
        }
        filled
    }

    /// True once no further byte will come out of `fill`.
    ///
    /// Without repeat this peeks at the input, so the buffer carrying the last
    /// bytes is already known to be the last one.
    pub fn is_exhausted(&mut self) -> bool {
        if self.ended || self.repeat {
            return self.ended;
        }
        match self.reader.fill_buf() {
            Ok(rest) => self.ended = rest.is_empty(),
            Err(e) => {
                log::warn!("input read error: {}", e);
                self.ended = true;
            }
        }
        self.ended
    }

    fn read_full(&mut self, buf: &mut [u8]) -> usize {
        let mut n = 0;
        while n < buf.len() {
            match self.reader.read(&mut buf[n..]) {
                Ok(0) => break,
                Ok(k) => n += k,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::warn!("input read error: {}", e);
                    self.ended = true;
                    break;
                }
            }
        }
        n
    }
}
