//! Architecture hooks: the seam spec §9 OQ1 asks for ("expose as a hook"
//! rather than guessing watchpoint disambiguation on non-x86 targets).
//!
//! Register layout, breakpoint encoding, and watchpoint debug-register
//! access are out of scope (spec §1); everything in this trait is a
//! query the core asks an external arch layer to answer, never something
//! this crate computes itself.

use backend_types::{Ptid, StopReason};

/// Queries the core needs answered by something that understands
/// register layout and debug registers, without this crate ever parsing
/// either itself.
pub trait ArchHooks {
  /// Disambiguates a `TRAP_TRACE` stop that might actually be a
  /// watchpoint hit (spec §4.6.6, §9 OQ1). The default implementation
  /// (`NullArchHooks`) always answers `SingleStep`, per the spec's "do
  /// not guess" instruction.
  fn disambiguate_trap_trace(&self, ptid: Ptid) -> StopReason {
    let _ = ptid;
    StopReason::SingleStep
  }

  /// Disambiguates a `TRAP_HWBKPT`-only stop (no `TRAP_BRKPT` bit set)
  /// between a hardware breakpoint and a watchpoint (spec §4.6.6). The
  /// default answer is a hardware breakpoint.
  fn disambiguate_trap_hwbkpt(&self, ptid: Ptid) -> StopReason {
    let _ = ptid;
    StopReason::HwBreakpoint
  }

  /// Disambiguates the case where `TRAP_BRKPT` and `TRAP_HWBKPT` are
  /// *both* set (spec §4.6.6): some kernels report a plain software
  /// breakpoint this way. The default answer is a software breakpoint,
  /// distinct from the HWBKPT-only default above.
  fn disambiguate_ambiguous_brkpt(&self, ptid: Ptid) -> StopReason {
    let _ = ptid;
    StopReason::SwBreakpoint
  }

  /// How far past a software breakpoint's address the PC lands after
  /// the trap (spec §4.6.6's `decr_pc_after_break`). Zero means the
  /// architecture never advances the PC past a breakpoint trap.
  fn decr_pc_after_break(&self) -> u64 {
    0
  }

  /// Reads the syscall number a syscall-entry/exit stop is currently at
  /// (spec §4.7's per-syscall-number catch-list semantics), via whatever
  /// register access the architecture layer has. Register inspection is
  /// out of scope here (spec §1); the default answer (`None`) means
  /// "can't tell", and callers fall back to "something is caught at
  /// all" rather than guessing a number.
  fn current_syscall_number(&self, ptid: Ptid) -> Option<i64> {
    let _ = ptid;
    None
  }

  /// Whether a GDB breakpoint at `pc` currently has a true condition, so
  /// a step-over can be skipped per spec §4.6.5 step 1. Conditional
  /// breakpoint evaluation is out of scope here; the default answer
  /// (always true) means "always treat an inserted breakpoint as live".
  fn breakpoint_condition_true(&self, pc: backend_types::event::Address) -> bool {
    let _ = pc;
    true
  }
}

/// The hook implementation used when no arch layer is plugged in: never
/// guesses, always defers to the conservative default spec §9 mandates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullArchHooks;

impl ArchHooks for NullArchHooks {}

#[cfg(test)]
mod tests {
  use super::*;
  use nix::unistd::Pid;

  #[test]
  fn null_hooks_never_guesses_watchpoint() {
    let hooks = NullArchHooks;
    let ptid = Ptid::leader_of(Pid::from_raw(1));
    assert_eq!(hooks.disambiguate_trap_trace(ptid), StopReason::SingleStep);
    assert_eq!(hooks.decr_pc_after_break(), 0);
  }

  #[test]
  fn null_hooks_default_hwbkpt_and_ambiguous_cases_differ() {
    let hooks = NullArchHooks;
    let ptid = Ptid::leader_of(Pid::from_raw(1));
    assert_eq!(hooks.disambiguate_trap_hwbkpt(ptid), StopReason::HwBreakpoint);
    assert_eq!(hooks.disambiguate_ambiguous_brkpt(ptid), StopReason::SwBreakpoint);
  }
}
