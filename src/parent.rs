//! Parent side of a fork-and-run job
//!
//! `PipeOpen -> Reading -> {ReadFailed | ReadOk} -> Waiting ->
//! {WaitFailed | ExitedNormally | ExitedAbnormally} -> Closed`
//!
//! Everything here blocks; the runner moves it onto a blocking worker.

use crate::errors::{ForkRunError, ForkRunResult};
use crate::job::JobOutcome;
use crate::pipe::read_once;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;
use std::os::fd::OwnedFd;
use tracing::{debug, error, info, warn};

/// The parent's view of a forked child: its pid and the read end of the
/// result pipe.
#[derive(Debug)]
pub struct ParentEnd {
    pid: Pid,
    reader: OwnedFd,
}

impl ParentEnd {
    /// Take ownership of the read end and close the parent's write end.
    pub fn attach(pid: Pid, reader: OwnedFd, writer: OwnedFd) -> Self {
        drop(writer);
        info!(child = %pid, "Forked child");
        Self { pid, reader }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Read the child's output, then reap it.
    ///
    /// The read end is closed on every path. On a failed read the child is
    /// still reaped before the error is returned.
    pub fn collect(self, read_buffer: usize) -> ForkRunResult<JobOutcome> {
        let Self { pid, reader } = self;

        let bytes = match read_once(reader, read_buffer) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(child = %pid, error = %e, "Error reading from pipe");
                reap_quietly(pid);
                return Err(ForkRunError::PipeRead(e));
            }
        };
        let output = String::from_utf8_lossy(&bytes).into_owned();
        debug!(child = %pid, bytes = bytes.len(), "Read child output");

        match waitpid(pid, None) {
            Err(source) => {
                error!(child = %pid, error = %source, "Error waiting for child");
                Err(ForkRunError::Wait { pid, source })
            }
            Ok(WaitStatus::Exited(waited, exit_code)) => {
                info!(child = %waited, exit_code, "Child exited");
                Ok(JobOutcome {
                    pid,
                    output,
                    exit_code,
                })
            }
            Ok(status) => {
                warn!(child = %pid, ?status, discarded = %output, "Child exited abnormally");
                Err(ForkRunError::AbnormalExit {
                    pid,
                    status: describe(status),
                })
            }
        }
    }
}

fn reap_quietly(pid: Pid) {
    if let Err(e) = waitpid(pid, None) {
        debug!(child = %pid, error = %e, "Could not reap child");
    }
}

fn describe(status: WaitStatus) -> String {
    match status {
        WaitStatus::Signaled(_, sig, true) => format!("killed by {} (core dumped)", sig),
        WaitStatus::Signaled(_, sig, false) => format!("killed by {}", sig),
        WaitStatus::Stopped(_, sig) => format!("stopped by {}", sig),
        other => format!("{:?}", other),
    }
}
