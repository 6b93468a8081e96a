//! C7 `EventFilter` (spec §4.7): turns one raw wait-status into exactly
//! one client-visible [`Event`], applying the policies spec.md lists
//! (syscall toggling, extended-event bookkeeping, self-sent `SIGSTOP`
//! discard, `SIGINT` group suppression, non-leader exit filtering).
//!
//! Register/siginfo inspection that decides *why* a stop happened
//! (§4.6.6) is `StopResumeCore`'s job, not this module's: `filter_status`
//! takes the already-inferred [`StopReason`] and any already-fetched
//! extended-event ancillary data (child ptid from `PTRACE_GETEVENTMSG`,
//! exec path) as arguments, so this module stays pure translation.

use std::path::PathBuf;

use backend_sys::{ExtendedEvent, RawStatus};
use backend_types::{Event, Ptid, Signal, StopReason};
use tracing::warn;

use crate::lwp::{LwpState, SyscallState};

/// Ancillary facts about an extended-event stop that require a ptrace
/// round-trip to learn (`PTRACE_GETEVENTMSG`, `/proc/<pid>/exe`) and so
/// are fetched by the caller before `filter_status` is invoked.
#[derive(Debug, Clone, Default)]
pub struct ExtendedInfo {
  pub child: Option<Ptid>,
  pub exec_path: Option<PathBuf>,
}

/// Per-backend policy knobs `EventFilter` consults (spec §4.7).
#[derive(Debug, Clone, Copy)]
pub struct EventFilter {
  /// Whether the caller opted into seeing `ThreadExited` for non-leader
  /// LWPs, rather than having them silently reaped (spec §4.7 last
  /// bullet).
  pub report_thread_exits: bool,
  /// Whether newly-cloned children should be surfaced as
  /// `ThreadCloned` rather than silently recorded (spec §4.7: "`Clone`
  /// is only surfaced if the parent's thread options include
  /// `ThreadCloneOption`").
  pub thread_clone_option: bool,
}

impl Default for EventFilter {
  fn default() -> Self {
    Self {
      report_thread_exits: false,
      thread_clone_option: true,
    }
  }
}

impl EventFilter {
  /// Translates one raw status for `lwp` into exactly one [`Event`],
  /// per spec §4.7.
  ///
  /// `syscall_nr` is the syscall number read off the register set by an
  /// arch hook (`None` if no arch layer is plugged in); `syscall_caught`
  /// is whether the owning `Inferior`'s catch-list actually wants a stop
  /// for that number (already resolved by the caller against
  /// `Inferior::catches_syscall`, since this module never looks at an
  /// `Inferior` itself). `stop_reason` is whatever
  /// `StopResumeCore::save_stop_reason` already inferred for an
  /// ordinary signal-delivery stop (ignored for exits/extended events).
  pub fn filter_status(
    &self,
    lwp: &mut LwpState,
    is_leader: bool,
    syscall_nr: Option<i64>,
    syscall_caught: bool,
    status: RawStatus,
    stop_reason: StopReason,
    extended: ExtendedInfo,
  ) -> Event {
    if status.exited() {
      lwp.stopped = false;
      return if is_leader {
        Event::Exited(status.exit_code())
      } else if self.report_thread_exits {
        Event::ThreadExited(status.exit_code())
      } else {
        Event::Ignore
      };
    }

    if status.signalled() {
      lwp.stopped = false;
      let signal = Signal::from_raw(status.term_sig());
      return if is_leader {
        Event::Signalled(signal)
      } else if self.report_thread_exits {
        Event::ThreadExited(0)
      } else {
        Event::Ignore
      };
    }

    debug_assert!(status.stopped(), "filter_status called on a non-stopped, non-exit status");
    lwp.stopped = true;

    if status.is_syscall_trap() {
      return self.filter_syscall_trap(lwp, syscall_nr, syscall_caught);
    }

    if status.is_extended() {
      return self.filter_extended_event(lwp, status, extended);
    }

    let raw_signal = status.stop_sig();
    let signal = Signal::from_raw(raw_signal);

    if signal.is_sigstop() && lwp.stop_expected {
      lwp.stop_expected = false;
      if !matches!(lwp.last_resume_kind, crate::lwp::ResumeKind::Stop) {
        // A SIGSTOP we sent ourselves (to force a ptrace-stop) arriving
        // after the caller already asked this LWP to run again — not
        // something the caller ever asked to see.
        warn!(ptid = %lwp.ptid, "discarding self-sent SIGSTOP");
        return Event::Ignore;
      }
    }

    if matches!(signal, Signal::Standard(nix::sys::signal::Signal::SIGINT)) {
      if lwp.ignore_sigint {
        lwp.ignore_sigint = false;
        return Event::Ignore;
      }
    }

    Event::Stopped {
      signal,
      reason: stop_reason,
    }
  }

  fn filter_syscall_trap(&self, lwp: &mut LwpState, syscall_nr: Option<i64>, syscall_caught: bool) -> Event {
    let entering = matches!(lwp.syscall_state, SyscallState::Ignore | SyscallState::SyscallReturn);
    lwp.syscall_state = if entering { SyscallState::SyscallEntry } else { SyscallState::SyscallReturn };

    if !syscall_caught {
      return Event::Ignore;
    }

    let nr = syscall_nr.unwrap_or(0);
    if entering {
      Event::SyscallEntry(nr)
    } else {
      Event::SyscallReturn(nr)
    }
  }

  fn filter_extended_event(&self, lwp: &mut LwpState, status: RawStatus, extended: ExtendedInfo) -> Event {
    match status.extended_event() {
      ExtendedEvent::Fork => match extended.child {
        Some(child) => Event::Forked(child),
        None => Event::Ignore,
      },
      ExtendedEvent::Vfork => match extended.child {
        Some(child) => Event::Vforked(child),
        None => Event::Ignore,
      },
      ExtendedEvent::VforkDone => Event::VforkDone,
      ExtendedEvent::Clone => match extended.child {
        Some(child) if self.thread_clone_option => {
          lwp.relative = Some(child);
          Event::ThreadCloned(child)
        }
        Some(child) => {
          // Recorded but not surfaced: the initial SIGSTOP of the new
          // child is consumed silently (spec §4.7).
          lwp.relative = Some(child);
          Event::Ignore
        }
        None => Event::Ignore,
      },
      ExtendedEvent::Exec => match extended.exec_path {
        Some(path) => Event::Execd(path),
        None => Event::Ignore,
      },
      ExtendedEvent::Stop | ExtendedEvent::Seccomp | ExtendedEvent::None | ExtendedEvent::Unknown(_) => Event::Ignore,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use backend_types::Ptid;
  use nix::unistd::Pid;

  fn lwp(pid: i32) -> LwpState {
    LwpState::new(Ptid::leader_of(Pid::from_raw(pid)))
  }

  fn stopped_status(sig: i32) -> RawStatus {
    RawStatus::new((sig << 8) | 0x7f)
  }

  #[test]
  fn leader_exit_is_exited_non_leader_is_filtered_by_default() {
    let filter = EventFilter::default();
    let mut leader = lwp(1);
    let event = filter.filter_status(&mut leader, true, None, true, RawStatus::new(7 << 8), StopReason::None, ExtendedInfo::default());
    assert_eq!(event, Event::Exited(7));

    let mut child = lwp(1);
    let event = filter.filter_status(&mut child, false, None, true, RawStatus::new(7 << 8), StopReason::None, ExtendedInfo::default());
    assert_eq!(event, Event::Ignore);
  }

  #[test]
  fn self_sent_sigstop_is_discarded() {
    let filter = EventFilter::default();
    let mut l = lwp(1);
    l.stop_expected = true;
    l.last_resume_kind = crate::lwp::ResumeKind::Continue;
    let status = stopped_status(nix::libc::SIGSTOP);
    let event = filter.filter_status(&mut l, true, None, true, status, StopReason::None, ExtendedInfo::default());
    assert_eq!(event, Event::Ignore);
  }

  #[test]
  fn expected_sigstop_while_still_wanting_stop_is_reported() {
    let filter = EventFilter::default();
    let mut l = lwp(1);
    l.stop_expected = true;
    l.last_resume_kind = crate::lwp::ResumeKind::Stop;
    let status = stopped_status(nix::libc::SIGSTOP);
    let event = filter.filter_status(&mut l, true, None, true, status, StopReason::None, ExtendedInfo::default());
    assert!(matches!(event, Event::Stopped { .. }));
  }

  #[test]
  fn ignored_sigint_is_consumed_once() {
    let filter = EventFilter::default();
    let mut l = lwp(1);
    l.ignore_sigint = true;
    let status = stopped_status(nix::libc::SIGINT);
    let event = filter.filter_status(&mut l, true, None, true, status, StopReason::None, ExtendedInfo::default());
    assert_eq!(event, Event::Ignore);
    assert!(!l.ignore_sigint);
  }

  #[test]
  fn syscall_trap_ignored_when_number_not_in_catch_list() {
    let filter = EventFilter::default();
    let mut l = lwp(1);
    let status = stopped_status(nix::libc::SIGTRAP | 0x80);
    let event = filter.filter_status(&mut l, true, Some(42), false, status, StopReason::None, ExtendedInfo::default());
    assert_eq!(event, Event::Ignore);
  }

  #[test]
  fn syscall_trap_reports_the_real_syscall_number_when_caught() {
    let filter = EventFilter::default();
    let mut l = lwp(1);
    let status = stopped_status(nix::libc::SIGTRAP | 0x80);
    let event = filter.filter_status(&mut l, true, Some(42), true, status, StopReason::None, ExtendedInfo::default());
    assert_eq!(event, Event::SyscallEntry(42));
  }
}
