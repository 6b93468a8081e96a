//! `Inferior`: per-process bookkeeping, one instance per traced thread
//! group (spec §3 "Inferior — one per process").
//!
//! Register layout, breakpoint encoding, and `r_debug`/link-map walking are
//! out of scope (spec §1 Non-goals); `tdesc` and `arch_private` are kept as
//! opaque slots an external arch layer can populate, mirroring how
//! `tracexec-backend-ptrace` keeps its arch-specific state behind a small
//! trait boundary instead of baking it into the tracer.

use std::fs::File;

use nix::unistd::Pid;

use crate::event::Address;

/// Sentinel meaning "catch every syscall", as opposed to a specific
/// syscall number in `syscalls_to_catch` (spec §3).
pub const ANY_SYSCALL: i32 = -1;

/// Placeholder for architecture-specific per-inferior state. This backend
/// never looks inside it; an arch layer built against SPEC_FULL.md's
/// out-of-scope boundary owns the real type.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArchProcess;

/// Placeholder for the target's register/word-size description, same
/// rationale as [`ArchProcess`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TargetDescription;

/// One traced process (thread group), per spec §3.
#[derive(Debug)]
pub struct Inferior {
  pub pid: Pid,
  /// Whether this backend is actually attached (false for a brief window
  /// during `create_inferior` before the tracee's first stop).
  pub attached: bool,
  pub tdesc: TargetDescription,
  /// `/proc/<pid>/mem`, opened lazily: not valid until the tracee has
  /// survived its first post-exec stop (spec §3, §4.6.2).
  pub mem_fd: Option<File>,
  /// Cached address of `r_debug` in the dynamic linker, invalidated on
  /// re-exec. Out-of-scope consumers may use this; this backend never
  /// computes it itself.
  pub r_debug_cache: Option<Address>,
  /// True from `create_inferior`/`attach` until the first reportable stop
  /// for this inferior has been delivered (spec §4.6.2).
  pub starting_up: bool,
  /// Syscalls this inferior's LWPs should stop at syscall-entry/exit for.
  /// Empty means "none"; contains [`ANY_SYSCALL`] to mean "all".
  pub syscalls_to_catch: Vec<i32>,
  pub arch_private: ArchProcess,
}

impl Inferior {
  pub fn new(pid: Pid) -> Self {
    Self {
      pid,
      attached: false,
      tdesc: TargetDescription,
      mem_fd: None,
      r_debug_cache: None,
      starting_up: true,
      syscalls_to_catch: Vec::new(),
      arch_private: ArchProcess,
    }
  }

  pub fn catches_syscall(&self, nr: i64) -> bool {
    self
      .syscalls_to_catch
      .iter()
      .any(|&catch| catch == ANY_SYSCALL || catch as i64 == nr)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn new_inferior_starts_detached_and_starting_up() {
    let inferior = Inferior::new(Pid::from_raw(123));
    assert!(!inferior.attached);
    assert!(inferior.starting_up);
    assert!(inferior.mem_fd.is_none());
  }

  #[test]
  fn catches_syscall_respects_any_sentinel() {
    let mut inferior = Inferior::new(Pid::from_raw(123));
    assert!(!inferior.catches_syscall(5));

    inferior.syscalls_to_catch.push(5);
    assert!(inferior.catches_syscall(5));
    assert!(!inferior.catches_syscall(6));

    inferior.syscalls_to_catch = vec![ANY_SYSCALL];
    assert!(inferior.catches_syscall(6));
  }
}
