//! C2's error type: every `ptrace`/`waitpid` failure reduces to an
//! `errno`, carried with enough context to log, per spec §7.

use nix::{errno::Errno, unistd::Pid};
use snafu::Snafu;

#[derive(Debug, Snafu)]
pub enum PtraceError {
  #[snafu(display("ptrace({request}, {pid}) failed: {source}"))]
  Request {
    request: &'static str,
    pid: i32,
    source: Errno,
  },
  #[snafu(display("tkill({lwp}, {signal}) failed: {source}"))]
  Tkill { lwp: i32, signal: i32, source: Errno },
  #[snafu(display("waitpid failed: {source}"))]
  Wait { source: Errno },
}

impl PtraceError {
  pub fn request(request: &'static str, pid: Pid, source: Errno) -> Self {
    Self::Request {
      request,
      pid: pid.as_raw(),
      source,
    }
  }

  pub fn errno(&self) -> Errno {
    match self {
      Self::Request { source, .. } => *source,
      Self::Tkill { source, .. } => *source,
      Self::Wait { source } => *source,
    }
  }
}
