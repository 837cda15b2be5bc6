//! Error handling module
//!
//! Uses `thiserror` for library errors. Every failure of a fork-and-run job
//! surfaces as exactly one `ForkRunError`; nothing is retried.

use nix::unistd::Pid;
use std::io;
use thiserror::Error;

/// Failure reasons of a fork-and-run job
#[derive(Error, Debug)]
pub enum ForkRunError {
    /// Dynamically typed input was not a number
    #[error("Number expected, got {found}")]
    NotANumber { found: &'static str },

    /// Runner configuration rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// pipe(2) failed, no child was created
    #[error("Failed to create pipe: {0}")]
    PipeCreation(#[source] nix::Error),

    /// fork(2) failed, both pipe ends were released
    #[error("Failed to fork process: {0}")]
    Fork(#[source] nix::Error),

    /// Reading the child's output failed
    #[error("Error reading from pipe: {0}")]
    PipeRead(#[source] io::Error),

    /// waitpid(2) failed
    #[error("Error waiting for child {pid}: {source}")]
    Wait {
        pid: Pid,
        #[source]
        source: nix::Error,
    },

    /// Child was killed by a signal or otherwise did not exit normally
    #[error("Child {pid} exited abnormally: {status}")]
    AbnormalExit { pid: Pid, status: String },

    /// Background collector task panicked or was cancelled
    #[error("Collector task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl ForkRunError {
    /// Whether a child process existed when this error occurred.
    ///
    /// Validation, configuration, pipe and fork failures happen before the
    /// child is created.
    pub fn spawned_child(&self) -> bool {
        !matches!(
            self,
            Self::NotANumber { .. } | Self::InvalidConfig(_) | Self::PipeCreation(_) | Self::Fork(_)
        )
    }

    /// Whether this is an input type error
    pub fn is_type_error(&self) -> bool {
        matches!(self, Self::NotANumber { .. })
    }
}

/// Result type alias for fork-and-run operations
pub type ForkRunResult<T> = Result<T, ForkRunError>;

#[cfg(test)]
mod tests {
    use super::*;
    use nix::errno::Errno;

    #[test]
    fn test_error_messages_carry_system_text() {
        let err = ForkRunError::PipeCreation(Errno::EMFILE);
        let msg = err.to_string();
        assert!(msg.starts_with("Failed to create pipe: "));
        assert!(msg.contains(Errno::EMFILE.desc()));

        let err = ForkRunError::PipeRead(io::Error::from_raw_os_error(Errno::EBADF as i32));
        assert!(err.to_string().starts_with("Error reading from pipe: "));
    }

    #[test]
    fn test_spawned_child() {
        assert!(!ForkRunError::NotANumber { found: "string" }.spawned_child());
        assert!(!ForkRunError::PipeCreation(Errno::EMFILE).spawned_child());
        assert!(!ForkRunError::Fork(Errno::EAGAIN).spawned_child());
        assert!(ForkRunError::Wait {
            pid: Pid::from_raw(1),
            source: Errno::ECHILD,
        }
        .spawned_child());
        assert!(ForkRunError::AbnormalExit {
            pid: Pid::from_raw(42),
            status: "killed by SIGKILL".into(),
        }
        .spawned_child());
    }

    #[test]
    fn test_type_error() {
        let err = ForkRunError::NotANumber { found: "string" };
        assert!(err.is_type_error());
        assert_eq!(err.to_string(), "Number expected, got string");
    }
}
