//! Job input, the work performed in the child, and the result envelope

use crate::errors::{ForkRunError, ForkRunResult};
use nix::unistd::Pid;
use serde_json::Value;
use std::fmt;
use std::io::{Cursor, Write};

/// Upper bound of the rendered child output for any `i32` input.
///
/// The longest case, `i32::MIN`, needs 59 bytes.
pub const CHILD_OUTPUT_CAPACITY: usize = 96;

/// Coerce a dynamically typed value into a job input.
///
/// Only numbers are accepted. They are mapped onto `i32` the way ECMAScript
/// `ToInt32` does: truncate toward zero, wrap modulo 2^32, NaN and infinities
/// become 0.
pub fn job_input(value: &Value) -> ForkRunResult<i32> {
    let number = match value {
        Value::Number(n) => n,
        other => {
            return Err(ForkRunError::NotANumber {
                found: value_kind(other),
            })
        }
    };

    if let Some(i) = number.as_i64() {
        return Ok(i as i32);
    }
    if let Some(u) = number.as_u64() {
        return Ok(u as i32);
    }
    Ok(number.as_f64().map(to_int32).unwrap_or(0))
}

fn to_int32(f: f64) -> i32 {
    if !f.is_finite() {
        return 0;
    }
    let wrapped = f.trunc().rem_euclid(4_294_967_296.0);
    wrapped as u32 as i32
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Text produced by the child for one input.
///
/// Rendered into a fixed stack buffer so the child never allocates after
/// `fork`.
#[derive(Clone, Copy)]
pub struct ChildOutput {
    buf: [u8; CHILD_OUTPUT_CAPACITY],
    len: usize,
}

impl ChildOutput {
    /// Compute the job result: `Child result for <input>: <input^3>`
    pub fn compute(input: i32) -> Self {
        let cube = i128::from(input).pow(3);
        let mut buf = [0u8; CHILD_OUTPUT_CAPACITY];
        let mut cursor = Cursor::new(&mut buf[..]);
        // Cannot fail: CHILD_OUTPUT_CAPACITY covers the whole i32 range.
        let _ = write!(cursor, "Child result for {}: {}", input, cube);
        let len = cursor.position() as usize;
        Self { buf, len }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn as_str(&self) -> &str {
        // Only ASCII digits, signs and literal text are ever written.
        std::str::from_utf8(self.as_bytes()).unwrap_or_default()
    }
}

impl fmt::Display for ChildOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for ChildOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ChildOutput").field(&self.as_str()).finish()
    }
}

/// Successful result of one job: what the parent observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    /// Pid of the child that ran the job
    pub pid: Pid,
    /// Text read from the pipe, truncated to the read buffer
    pub output: String,
    /// Exit code of the child
    pub exit_code: i32,
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Child ({}) result: {} (exit code: {})",
            self.pid, self.output, self.exit_code
        )
    }
}
