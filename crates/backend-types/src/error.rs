//! Error taxonomy, per spec §7.
//!
//! `Invariant` and `ProtocolError` are not `Result` values anywhere in this
//! crate: per §7 they "abort with a diagnostic", so they surface as
//! `panic!`/`unreachable!` at the call site instead of being threaded
//! through `Result`. What remains here are the recoverable kinds.

use std::io;

use nix::errno::Errno;
use snafu::Snafu;

use crate::ptid::Ptid;

/// Error from reading/parsing `/proc`. See C1 `ProcfsIo`.
#[derive(Debug, Snafu)]
pub enum ProcfsError {
  #[snafu(display("failed to access /proc/{pid}/{what}: {source}"))]
  Io {
    pid: i32,
    what: &'static str,
    source: io::Error,
  },
  #[snafu(display("/proc/{pid}/status has no '{field}' line"))]
  MissingField { pid: i32, field: &'static str },
  #[snafu(display("/proc/{pid}/status has a malformed '{field}' line"))]
  MalformedField { pid: i32, field: &'static str },
}

/// Memory-inspection errors double as `ptrace(PEEK*)` errors in the
/// original; both reduce to an `errno`. Named to match the upstream
/// convention (`InspectError = Errno`) this backend is grounded on.
pub type InspectError = Errno;

/// The recoverable subset of §7's error kinds, surfaced by `StopResumeCore`
/// entry points and the public API (§6.1).
#[derive(Debug, Snafu)]
pub enum BackendError {
  #[snafu(display("I/O error: {source}"))]
  Io { source: io::Error },

  #[snafu(display("ptrace/waitpid failure (errno {source})"))]
  Ptrace { source: Errno },

  #[snafu(display("no such tracee: {ptid}"))]
  NoSuchTracee { ptid: Ptid },

  #[snafu(display("permission denied: {action}"))]
  PermissionDenied { action: String },

  #[snafu(display("tracee {pid} is already traced"))]
  AlreadyTraced { pid: i32 },

  #[snafu(display("tracee {pid} is a zombie"))]
  Zombie { pid: i32 },

  #[snafu(display("address space of {ptid} vanished (EOF on /proc/{pid}/mem)", pid = ptid.pid))]
  Eof { ptid: Ptid },
}

impl From<io::Error> for BackendError {
  fn from(source: io::Error) -> Self {
    Self::Io { source }
  }
}

impl From<Errno> for BackendError {
  fn from(source: Errno) -> Self {
    Self::Ptrace { source }
  }
}

impl From<ProcfsError> for BackendError {
  fn from(value: ProcfsError) -> Self {
    let message = value.to_string();
    match value {
      ProcfsError::Io { source, .. } => Self::Io { source },
      ProcfsError::MissingField { .. } | ProcfsError::MalformedField { .. } => Self::Io {
        source: io::Error::new(io::ErrorKind::InvalidData, message),
      },
    }
  }
}
