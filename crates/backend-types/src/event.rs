//! The client-visible event vocabulary (spec §3, §4.7, §6.1) and the small
//! supporting types (`Signal`, `StopReason`, `ProcessExit`) it is built from.
//!
//! `Signal`'s standard/realtime split is grounded on
//! `tracexec-core/src/tracer.rs`'s `Signal` type: RT signal numbers vary by
//! libc reservation, so only the low 8 bits are meaningful to us and we
//! don't try to validate them.

use std::{
  fmt::{self, Display},
  path::PathBuf,
};

use nix::libc::{c_int, SIGRTMIN};

use crate::ptid::Ptid;

/// Architecture-neutral code address. Register layout and breakpoint
/// encoding are out of scope (spec §1); this backend only ever moves
/// addresses around opaquely.
pub type Address = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
  Standard(nix::sys::signal::Signal),
  Realtime(u8),
}

impl Signal {
  pub fn from_raw(raw: c_int) -> Self {
    match nix::sys::signal::Signal::try_from(raw) {
      Ok(sig) => Self::Standard(sig),
      Err(_) => Self::Realtime(raw as u8),
    }
  }

  pub fn as_raw(self) -> i32 {
    match self {
      Self::Standard(signal) => signal as i32,
      Self::Realtime(raw) => raw as i32,
    }
  }

  pub fn is_sigstop(self) -> bool {
    matches!(self, Self::Standard(nix::sys::signal::Signal::SIGSTOP))
  }

  /// Whether this signal can be sent more than once before delivery without
  /// merging into a single pending instance (spec §4.6.1 step 2: "`SIGSTOP`
  /// is not an RT signal and can only be queued once").
  pub fn is_realtime(self) -> bool {
    matches!(self, Self::Realtime(_))
  }
}

impl From<nix::sys::signal::Signal> for Signal {
  fn from(value: nix::sys::signal::Signal) -> Self {
    Self::Standard(value)
  }
}

impl Display for Signal {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Standard(signal) => signal.fmt(f),
      Self::Realtime(sig) => {
        let min = SIGRTMIN();
        let delta = *sig as i32 - min;
        match delta.signum() {
          0 => write!(f, "SIGRTMIN"),
          1 => write!(f, "SIGRTMIN+{delta}"),
          -1 => write!(f, "SIGRTMIN{delta}"),
          _ => unreachable!(),
        }
      }
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
  Code(i32),
  Signal(Signal),
}

/// Why an LWP is stopped, per spec §3/§4.6.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopReason {
  #[default]
  None,
  SwBreakpoint,
  HwBreakpoint,
  Watchpoint {
    addr: Address,
  },
  SingleStep,
}

/// A single reportable occurrence, as produced by `EventFilter` (spec §4.7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
  /// Consumed internally, nothing to report.
  Ignore,
  Stopped {
    signal: Signal,
    reason: StopReason,
  },
  SyscallEntry(i64),
  SyscallReturn(i64),
  Forked(Ptid),
  Vforked(Ptid),
  VforkDone,
  ThreadCloned(Ptid),
  ThreadCreated,
  Execd(PathBuf),
  ThreadExited(i32),
  Exited(i32),
  Signalled(Signal),
  /// No LWP is running and none has a pending event (spec §4.5 step 5,
  /// §8 "boundary behaviors").
  NoResumed,
}

impl Event {
  pub fn is_reportable(&self) -> bool {
    !matches!(self, Self::Ignore)
  }
}
