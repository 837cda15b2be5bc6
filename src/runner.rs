//! Fork-and-run entry points
//!
//! Pipe creation and `fork` happen synchronously on the caller. Reading the
//! pipe and waiting for the child are blocking, so `PendingJob::join` runs
//! them on tokio's blocking pool and the caller only awaits a future.

use crate::child;
use crate::errors::{ForkRunError, ForkRunResult};
use crate::job::{job_input, JobOutcome};
use crate::parent::ParentEnd;
use crate::pipe::{ResultPipe, DEFAULT_READ_BUFFER};
use nix::unistd::{fork, ForkResult, Pid};
use serde_json::Value;
use std::future::Future;
use tracing::{debug, error, warn};

/// Builder for fork-and-run jobs
#[derive(Debug, Clone)]
pub struct ForkRunner {
    read_buffer: usize,
}

impl Default for ForkRunner {
    fn default() -> Self {
        Self {
            read_buffer: DEFAULT_READ_BUFFER,
        }
    }
}

impl ForkRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Size of the parent's read buffer. One byte is reserved, so at most
    /// `capacity - 1` bytes of child output are kept.
    pub fn read_buffer(mut self, capacity: usize) -> Self {
        self.read_buffer = capacity;
        self
    }

    fn validate(&self) -> ForkRunResult<()> {
        if self.read_buffer == 0 {
            return Err(ForkRunError::InvalidConfig(
                "read buffer must hold at least one byte".into(),
            ));
        }
        Ok(())
    }

    /// Create the pipe and fork the child that computes the job for `input`.
    pub fn spawn(&self, input: i32) -> ForkRunResult<PendingJob> {
        self.validate()?;

        let pipe = ResultPipe::open().map_err(|e| {
            error!(error = %e, "Pipe setup failed");
            e
        })?;
        let (reader, writer) = pipe.into_parts();

        // Safety: the child only executes `child::run`, which avoids locks and
        // allocation and terminates with `_exit`.
        match unsafe { fork() } {
            Err(e) => {
                error!(error = %e, "Fork failed");
                Err(ForkRunError::Fork(e))
            }
            Ok(ForkResult::Child) => child::run(input, reader, writer),
            Ok(ForkResult::Parent { child }) => {
                debug!(child = %child, input, "Job started");
                Ok(PendingJob {
                    pid: child,
                    parent: Some(ParentEnd::attach(child, reader, writer)),
                    read_buffer: self.read_buffer,
                })
            }
        }
    }

    /// Like [`spawn`](Self::spawn) for a dynamically typed input.
    ///
    /// A non-number is rejected before any pipe or process is created.
    pub fn spawn_value(&self, input: &Value) -> ForkRunResult<PendingJob> {
        let input = job_input(input)?;
        self.spawn(input)
    }

    /// Spawn a job and await its outcome.
    pub async fn run(&self, input: i32) -> ForkRunResult<JobOutcome> {
        self.spawn(input)?.join().await
    }
}

/// A forked child whose output has not been collected yet.
///
/// Dropping it without [`join`](Self::join) or [`wait`](Self::wait) hands
/// the child to a reaper thread so it does not linger as a zombie.
#[derive(Debug)]
pub struct PendingJob {
    pid: Pid,
    parent: Option<ParentEnd>,
    read_buffer: usize,
}

impl PendingJob {
    pub fn pid(&self) -> Pid {
        self.pid
    }

    fn take_parent(&mut self) -> ParentEnd {
        self.parent
            .take()
            .expect("parent end is only taken by join, wait or drop")
    }

    /// Collect the child's output and exit status without blocking the
    /// calling task.
    pub async fn join(mut self) -> ForkRunResult<JobOutcome> {
        let parent = self.take_parent();
        let read_buffer = self.read_buffer;
        tokio::task::spawn_blocking(move || parent.collect(read_buffer)).await?
    }

    /// Collect the child's output and exit status on the current thread.
    pub fn wait(mut self) -> ForkRunResult<JobOutcome> {
        let parent = self.take_parent();
        parent.collect(self.read_buffer)
    }
}

impl Drop for PendingJob {
    fn drop(&mut self) {
        if let Some(parent) = self.parent.take() {
            let read_buffer = self.read_buffer;
            let pid = self.pid;
            debug!(child = %pid, "Pending job dropped, reaping in background");
            let spawned = std::thread::Builder::new()
                .name(format!("forkrun-reaper-{}", pid))
                .spawn(move || {
                    let _ = parent.collect(read_buffer);
                });
            if let Err(e) = spawned {
                warn!(child = %pid, error = %e, "Could not start reaper thread");
            }
        }
    }
}

/// Run one job for `input` in a forked child.
///
/// Resolves to `Child (<pid>) result: <output> (exit code: <code>)`.
pub async fn fork_and_run(input: i32) -> ForkRunResult<String> {
    let outcome = ForkRunner::new().run(input).await?;
    Ok(outcome.to_string())
}

/// Like [`fork_and_run`] for a dynamically typed input.
///
/// Validation, pipe creation and `fork` happen before this returns, so a
/// non-number fails right here with [`ForkRunError::NotANumber`]. The
/// returned future resolves to the combined result message.
pub fn fork_and_run_value(
    input: &Value,
) -> ForkRunResult<impl Future<Output = ForkRunResult<String>>> {
    let pending = ForkRunner::new().spawn_value(input)?;
    Ok(async move { pending.join().await.map(|outcome| outcome.to_string()) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn test_run_returns_cube() {
        let outcome = ForkRunner::new().run(3).await.unwrap();
        assert!(outcome.pid.as_raw() > 0);
        assert_eq!(outcome.output, "Child result for 3: 27");
        assert_eq!(outcome.exit_code, 0);
    }

    #[test]
    fn test_blocking_wait() {
        let outcome = ForkRunner::new().spawn(-4).unwrap().wait().unwrap();
        assert_eq!(outcome.output, "Child result for -4: -64");
        assert_eq!(outcome.exit_code, 0);
    }

    #[test]
    fn test_small_read_buffer_truncates() {
        let outcome = ForkRunner::new()
            .read_buffer(11)
            .spawn(3)
            .unwrap()
            .wait()
            .unwrap();
        assert_eq!(outcome.output, "Child resu");
    }

    #[test]
    fn test_zero_read_buffer_is_rejected() {
        let err = ForkRunner::new().read_buffer(0).spawn(3).unwrap_err();
        assert!(matches!(err, ForkRunError::InvalidConfig(_)));
        assert!(!err.spawned_child());
    }

    #[test]
    fn test_spawn_value_rejects_string() {
        let err = ForkRunner::new().spawn_value(&json!("3")).unwrap_err();
        assert!(err.is_type_error());
    }

    #[test]
    fn test_child_write_failure_is_not_fatal() {
        // A one-byte buffer reads nothing and closes the read end, so the
        // child's write can hit a broken pipe.
        for _ in 0..5 {
            let outcome = ForkRunner::new()
                .read_buffer(1)
                .spawn(3)
                .unwrap()
                .wait()
                .unwrap();
            assert_eq!(outcome.output, "");
            assert_eq!(outcome.exit_code, 0);
        }
    }

    #[test]
    fn test_value_type_error_is_immediate() {
        // No await: the error is returned by the call itself.
        match fork_and_run_value(&json!([3])) {
            Err(err) => assert!(err.is_type_error()),
            Ok(_) => panic!("expected a type error"),
        }
    }

    #[tokio::test]
    async fn test_value_future_resolves_message() {
        let message = fork_and_run_value(&json!(3)).unwrap().await.unwrap();
        assert!(message.ends_with("result: Child result for 3: 27 (exit code: 0)"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_dropped_job_is_reaped() {
        let pending = ForkRunner::new().spawn(7).unwrap();
        let proc_entry = std::path::PathBuf::from(format!("/proc/{}", pending.pid()));
        drop(pending);

        // A zombie keeps its /proc entry until it is reaped.
        let deadline = Instant::now() + Duration::from_secs(5);
        while proc_entry.exists() {
            assert!(Instant::now() < deadline, "{:?} was not reaped", proc_entry);
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}
