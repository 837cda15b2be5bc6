//! Child side of a fork-and-run job
//!
//! Runs between `fork` and `_exit`. The parent may have had other threads
//! holding locks at the moment of the fork, so nothing here allocates or goes
//! through `tracing`/`std::io::stdout`; diagnostics are written straight to
//! the stderr descriptor.

use crate::job::ChildOutput;
use nix::errno::Errno;
use nix::sys::signal::{signal, SigHandler, Signal};
use nix::unistd::{getpid, Pid};
use std::fs::File;
use std::io::{Cursor, Write};
use std::os::fd::OwnedFd;

const DIAG_CAPACITY: usize = 256;

/// Run the job in the forked child and terminate it.
///
/// Always exits with status 0; a failed write to the pipe is only reported on
/// stderr, so the parent sees it as empty output.
pub fn run(input: i32, reader: OwnedFd, writer: OwnedFd) -> ! {
    drop(reader);
    // A closed read end must surface as EPIPE, not kill the child.
    // Safety: installs SIG_IGN, no handler code runs.
    let _ = unsafe { signal(Signal::SIGPIPE, SigHandler::SigIgn) };

    let pid = getpid();
    let output = ChildOutput::compute(input);
    diag(pid, format_args!("Performing work for: {}", input));
    diag(pid, format_args!("Result: {}", output));

    let mut pipe = File::from(writer);
    if let Err(e) = pipe.write_all(output.as_bytes()) {
        let reason = e
            .raw_os_error()
            .map(|code| Errno::from_raw(code).desc())
            .unwrap_or("short write");
        diag(pid, format_args!("Error writing to pipe: {}", reason));
    }
    drop(pipe);

    // Safety: _exit only terminates the process; it skips atexit handlers and
    // destructors that may be inconsistent after fork.
    unsafe { libc::_exit(0) }
}

fn diag(pid: Pid, args: std::fmt::Arguments<'_>) {
    let mut buf = [0u8; DIAG_CAPACITY];
    let mut line = Cursor::new(&mut buf[..]);
    let _ = writeln!(line, "[Child {}] {}", pid, args);
    let len = line.position() as usize;
    let _ = nix::unistd::write(std::io::stderr(), &buf[..len]);
}
