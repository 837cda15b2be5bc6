//! Result pipe between the forked child and the parent
//!
//! Both ends are `OwnedFd`s, so whichever side drops an end closes it. The
//! parent must drop its write end before reading, otherwise end-of-stream is
//! never observed.

use crate::errors::{ForkRunError, ForkRunResult};
use std::fs::File;
use std::io::{self, Read};
use std::os::fd::OwnedFd;

/// Default size of the parent's read buffer; one byte stays reserved.
pub const DEFAULT_READ_BUFFER: usize = 256;

/// A freshly created pipe, before either side has taken its end.
#[derive(Debug)]
pub struct ResultPipe {
    reader: OwnedFd,
    writer: OwnedFd,
}

impl ResultPipe {
    /// Allocate a pipe.
    pub fn open() -> ForkRunResult<Self> {
        let (reader, writer) = nix::unistd::pipe().map_err(ForkRunError::PipeCreation)?;
        Ok(Self { reader, writer })
    }

    /// Split into `(read end, write end)`.
    pub fn into_parts(self) -> (OwnedFd, OwnedFd) {
        (self.reader, self.writer)
    }
}

/// Read the child's output with a single read call.
///
/// At most `capacity - 1` bytes are returned, mirroring a C string buffer of
/// `capacity` bytes. Zero bytes means the child closed its end without
/// writing.
pub fn read_once(reader: OwnedFd, capacity: usize) -> io::Result<Vec<u8>> {
    let mut file = File::from(reader);
    let mut buf = vec![0u8; capacity.saturating_sub(1)];
    let n = loop {
        match file.read(&mut buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => break other?,
        }
    };
    buf.truncate(n);
    Ok(buf)
}
