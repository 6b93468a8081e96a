//! `LwpState`: one per attached LWP, owned exclusively by [`crate::lwp_table::LwpTable`]
//! (spec §3).

use std::collections::VecDeque;

use backend_sys::RawStatus;
use backend_types::{Event, Ptid, Signal, StopReason, event::Address};

/// What the caller most recently asked this LWP to do (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResumeKind {
  #[default]
  Stop,
  Continue,
  Step,
}

/// Whether an LWP is at syscall-entry or syscall-return for the purpose
/// of catchpoint toggling (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyscallState {
  #[default]
  Ignore,
  SyscallEntry,
  SyscallReturn,
}

/// Fast-tracepoint jump-pad stabilization state (spec §4.6.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectingFastTp {
  #[default]
  NotCollecting,
  BeforeInsn,
  AtInsn,
}

/// A signal queued for later delivery, carrying just enough to
/// distinguish real-time signals that must not be merged (spec §3,
/// §4.6.4 step 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingSignal(pub Signal);

/// Placeholder for architecture-specific per-LWP state (register cache,
/// watchpoint debug-register shadow, etc). Out of scope (spec §1).
#[derive(Debug, Default, Clone, Copy)]
pub struct ArchLwp;

/// One tracked LWP (spec §3's `LwpState`).
#[derive(Debug)]
pub struct LwpState {
  pub ptid: Ptid,
  pub stopped: bool,
  pub stop_expected: bool,
  pub signalled: bool,
  pub must_set_ptrace_flags: bool,
  pub status_pending: Option<RawStatus>,
  pub waitstatus_pending: Option<Event>,
  pub stop_pc: Address,
  pub stop_reason: StopReason,
  pub step: bool,
  pub step_range: Option<(Address, Address)>,
  pub last_resume_kind: ResumeKind,
  pub suspended: i32,
  pub pending_signals: VecDeque<PendingSignal>,
  pub deferred_signals: VecDeque<PendingSignal>,
  pub bp_reinsert: Option<Address>,
  pub syscall_state: SyscallState,
  pub collecting_fast_tp: CollectingFastTp,
  pub arch_private: ArchLwp,
  /// The unreported fork/vfork/clone partner (spec §3): a weak, symmetric
  /// link broken when the event is reported or either side is deleted.
  pub relative: Option<Ptid>,
  /// True once a `SIGINT` on a sibling LWP has marked this LWP to
  /// silently consume its next `SIGINT` (spec §4.7).
  pub ignore_sigint: bool,
}

impl LwpState {
  pub fn new(ptid: Ptid) -> Self {
    Self {
      ptid,
      stopped: false,
      stop_expected: false,
      signalled: false,
      must_set_ptrace_flags: true,
      status_pending: None,
      waitstatus_pending: None,
      stop_pc: 0,
      stop_reason: StopReason::None,
      step: false,
      step_range: None,
      last_resume_kind: ResumeKind::Stop,
      suspended: 0,
      pending_signals: VecDeque::new(),
      deferred_signals: VecDeque::new(),
      bp_reinsert: None,
      syscall_state: SyscallState::Ignore,
      collecting_fast_tp: CollectingFastTp::NotCollecting,
      arch_private: ArchLwp,
      relative: None,
      ignore_sigint: false,
    }
  }

  /// Whether this LWP currently has a pending event to report, per the
  /// invariant in spec §3: "exactly one of `status_pending` /
  /// `waitstatus_pending` is non-empty when `has_pending_event` returns
  /// true."
  pub fn has_pending_event(&self) -> bool {
    self.status_pending.is_some() || self.waitstatus_pending.is_some()
  }

  pub fn is_leader(&self) -> bool {
    self.ptid.is_leader()
  }

  /// Queues a signal for later delivery rather than resuming with it
  /// immediately (spec §4.6.4 step 1). Non-realtime signals already
  /// queued are not duplicated.
  pub fn enqueue_signal(&mut self, signal: Signal) {
    if !signal.is_realtime() && self.pending_signals.iter().any(|p| p.0 == signal) {
      return;
    }
    self.pending_signals.push_back(PendingSignal(signal));
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use nix::unistd::Pid;

  fn ptid(pid: i32) -> Ptid {
    Ptid::leader_of(Pid::from_raw(pid))
  }

  #[test]
  fn new_lwp_state_is_not_stopped_and_has_no_pending_event() {
    let lwp = LwpState::new(ptid(1));
    assert!(!lwp.stopped);
    assert!(!lwp.has_pending_event());
    assert_eq!(lwp.suspended, 0);
  }

  #[test]
  fn enqueue_signal_does_not_duplicate_non_realtime() {
    let mut lwp = LwpState::new(ptid(1));
    lwp.enqueue_signal(Signal::from(nix::sys::signal::Signal::SIGUSR1));
    lwp.enqueue_signal(Signal::from(nix::sys::signal::Signal::SIGUSR1));
    assert_eq!(lwp.pending_signals.len(), 1);
  }

  #[test]
  fn enqueue_signal_duplicates_realtime() {
    let mut lwp = LwpState::new(ptid(1));
    lwp.enqueue_signal(Signal::Realtime(40));
    lwp.enqueue_signal(Signal::Realtime(40));
    assert_eq!(lwp.pending_signals.len(), 2);
  }
}
