//! C6 `StopResumeCore` (spec §4.6): attach/detach, stop-all/resume-one,
//! step-over-breakpoint choreography, stop-reason inference, the
//! zombie-leader policy, and fast-tracepoint jump-pad stabilization.
//!
//! Grounded on the teacher's ptrace tracer loop for the overall
//! attach/resume control flow, adapted to the per-LWP state machine
//! spec §3/§4.6 actually describes.

use hashbrown::HashMap;

use backend_sys::{ops, RawStatus};
use backend_types::{
  error::BackendError,
  event::Address,
  proc,
  spawn,
  Inferior, LwpId, Ptid, Signal, StopReason, ANY_SYSCALL,
};
use nix::{
  errno::Errno,
  sys::{
    signal::Signal as NixSignal,
    wait::WaitPidFlag,
  },
  unistd::{fork, ForkResult, Pid},
};
use tracing::warn;

use crate::{
  arch::ArchHooks,
  event_loop::EventLoop,
  lwp::{CollectingFastTp, PendingSignal, ResumeKind},
  lwp_table::LwpTable,
};

fn ptrace_err(e: backend_sys::PtraceError) -> BackendError {
  BackendError::from(e.errno())
}

/// `si_code` values for `PTRACE_GETSIGINFO` (spec §6.3).
mod si_code {
  pub const TRAP_BRKPT: i32 = 1;
  pub const TRAP_TRACE: i32 = 2;
  pub const TRAP_HWBKPT: i32 = 4;
}

/// Explicit suspension-state enum (spec §9 "Async control flow"): the
/// entry points drive this rather than anything resembling a coroutine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoreState {
  #[default]
  Idle,
  Draining,
  StepOverInProgress,
  Stabilizing,
}

/// The heart of the backend: every attached LWP and process, plus the
/// protocols that move them between stopped and running.
pub struct StopResumeCore {
  pub lwps: LwpTable,
  pub inferiors: HashMap<Pid, Inferior>,
  pub exitkill_supported: bool,
  pub state: CoreState,
  /// Mirrors `BackendConfig::catch_all_syscalls_by_default`: whether a
  /// newly attached/spawned `Inferior` starts with every syscall caught.
  pub catch_all_syscalls_by_default: bool,
  step_over_lwp: Option<Ptid>,
}

impl StopResumeCore {
  pub fn new() -> Self {
    let exitkill_supported = ops::probe_exitkill_support().unwrap_or_else(|e| {
      warn!(error = %e, "failed to probe PTRACE_O_EXITKILL support, assuming unsupported");
      false
    });
    Self {
      lwps: LwpTable::new(),
      inferiors: HashMap::new(),
      exitkill_supported,
      state: CoreState::Idle,
      catch_all_syscalls_by_default: false,
      step_over_lwp: None,
    }
  }

  /// Seeds a freshly constructed `Inferior`'s catch-list per
  /// `catch_all_syscalls_by_default` (spec §3's `AnySyscall` sentinel).
  pub(crate) fn new_inferior(&self, pid: Pid) -> Inferior {
    let mut inferior = Inferior::new(pid);
    if self.catch_all_syscalls_by_default {
      inferior.syscalls_to_catch = vec![ANY_SYSCALL];
    }
    inferior
  }

  // ---- 4.6.1 attach --------------------------------------------------

  pub fn attach(&mut self, pid: Pid) -> Result<(), BackendError> {
    let leader = Ptid::leader_of(pid);

    // `TracerPid != 0` is how gdbserver's `linux_attach_lwp` detects an
    // already-traced target (SPEC_FULL.md §C), since `PTRACE_ATTACH`
    // itself fails with the unhelpfully generic `EPERM`.
    if let Ok(Some(tracer)) = proc::tracer_pid(pid) {
      if tracer.as_raw() != 0 {
        return Err(BackendError::AlreadyTraced { pid: pid.as_raw() });
      }
    }
    if matches!(proc::pid_state(pid), Ok(proc::PidState::Zombie)) {
      return Err(BackendError::Zombie { pid: pid.as_raw() });
    }

    ops::attach(pid).map_err(ptrace_err)?;
    self.lwps.add(leader);

    if matches!(proc::pid_state(pid), Ok(proc::PidState::Stopped)) {
      ops::tkill(pid, NixSignal::SIGSTOP).map_err(ptrace_err)?;
      ops::cont(pid, None).map_err(ptrace_err)?;
    }

    let (_, status) = ops::waitpid(Some(pid), Some(WaitPidFlag::__WALL)).map_err(ptrace_err)?;
    if !(status.stopped() && status.stop_sig() == nix::libc::SIGSTOP) {
      self.lwps.remove(pid);
      return Err(BackendError::NoSuchTracee { ptid: leader });
    }

    let mut attach_errors = Vec::new();
    let mut newly_attached = vec![leader];
    proc::attach_all_tasks(pid, |ptid| {
      if ptid == leader {
        return;
      }
      match ops::attach(ptid.lwp) {
        Ok(()) => {
          self.lwps.add(ptid);
          newly_attached.push(ptid);
        }
        Err(e) if e.errno() == Errno::ESRCH => {}
        Err(e) if e.errno() == Errno::EPERM && proc::pid_is_gone(ptid.lwp) => {}
        Err(e) => attach_errors.push(e),
      }
    })
    .map_err(BackendError::from)?;

    if let Some(first) = attach_errors.into_iter().next() {
      for ptid in newly_attached {
        let _ = ops::detach(ptid.lwp, None);
        self.lwps.remove(ptid.lwp);
      }
      return Err(ptrace_err(first));
    }

    if let Some(lwp) = self.lwps.find_mut(pid) {
      lwp.last_resume_kind = ResumeKind::Stop;
      lwp.stopped = true;
      lwp.status_pending = Some(status);
    }

    let options = backend_sys::default_attached_options();
    for lwp_id in self.lwps.iter_process(pid).map(|l| l.ptid.lwp).collect::<Vec<_>>() {
      let _ = ops::setoptions(lwp_id, options);
    }

    let new_inferior = self.new_inferior(pid);
    let inferior = self.inferiors.entry(pid).or_insert_with(|| new_inferior);
    inferior.attached = true;
    inferior.starting_up = false;
    inferior.mem_fd = Some(proc::open_mem_file(pid)?);

    Ok(())
  }

  // ---- 4.6.2 spawn ----------------------------------------------------

  pub fn create_inferior(
    &mut self,
    program: &std::ffi::CString,
    args: &[std::ffi::CString],
    env: &[std::ffi::CString],
    disable_randomization: bool,
    redirect_stdio: bool,
  ) -> Result<Pid, BackendError> {
    match unsafe { fork() }.map_err(BackendError::from)? {
      ForkResult::Child => {
        let _ = spawn::exec_traced_child(program, args, env, disable_randomization, redirect_stdio);
        std::process::exit(127);
      }
      ForkResult::Parent { child } => {
        let leader = Ptid::leader_of(child);
        self.lwps.add(leader);

        let (_, status) = ops::waitpid(Some(child), Some(WaitPidFlag::__WALL)).map_err(ptrace_err)?;
        if let Some(lwp) = self.lwps.find_mut(child) {
          lwp.stopped = true;
          lwp.last_resume_kind = ResumeKind::Stop;
          lwp.status_pending = Some(status);
        }

        let options = backend_sys::default_spawned_options(self.exitkill_supported);
        ops::setoptions(child, options).map_err(ptrace_err)?;

        let mut inferior = self.new_inferior(child);
        inferior.attached = true;
        inferior.starting_up = false;
        inferior.mem_fd = Some(proc::open_mem_file(child)?);
        self.inferiors.insert(child, inferior);

        Ok(child)
      }
    }
  }

  // ---- 4.6.3 stop all / unstop all ------------------------------------

  pub fn stop_all(&mut self, except: Option<Ptid>, suspend: bool) -> Result<(), BackendError> {
    debug_assert!(self.state != CoreState::StepOverInProgress, "re-entrant stop_all while a step-over is in flight");

    for lwp in self.lwps.iter_mut() {
      if Some(lwp.ptid) == except {
        continue;
      }
      if suspend {
        lwp.suspended += 1;
      }
      if !lwp.stopped && !lwp.stop_expected {
        ops::tkill(lwp.ptid.lwp, NixSignal::SIGSTOP).map_err(ptrace_err)?;
        lwp.stop_expected = true;
      }
    }

    self.wait_until_stopped(except)
  }

  fn wait_until_stopped(&mut self, except: Option<Ptid>) -> Result<(), BackendError> {
    self.state = CoreState::Draining;
    loop {
      self.drain_statuses()?;
      let all_stopped = self.lwps.iter().filter(|l| Some(l.ptid) != except).all(|l| l.stopped);
      if all_stopped {
        self.state = CoreState::Idle;
        return Ok(());
      }
      let mask = EventLoop::block_sigchld().map_err(BackendError::from)?;
      EventLoop::sigsuspend_on(&mask);
      EventLoop::restore_mask(&mask).map_err(BackendError::from)?;
    }
  }

  pub fn unstop_all(&mut self, except: Option<Ptid>, unsuspend: bool) -> Result<(), BackendError> {
    let ptids: Vec<Ptid> = self.lwps.iter().filter(|l| Some(l.ptid) != except).map(|l| l.ptid).collect();
    for ptid in ptids {
      if unsuspend {
        if let Some(lwp) = self.lwps.find_mut(ptid.lwp) {
          lwp.suspended = lwp.suspended.saturating_sub(1);
        }
      }
      let should_resume = self.lwps.find(ptid.lwp).map(|l| l.suspended == 0).unwrap_or(false);
      if should_resume {
        self.resume_one(ptid.lwp, false, None)?;
      }
    }
    Ok(())
  }

  // ---- draining raw statuses ------------------------------------------

  /// One non-blocking pass of `waitpid(-1, WNOHANG|__WALL)`, handing
  /// every status to `record_status` (spec §4.5 step 2).
  pub fn drain_statuses(&mut self) -> Result<(), BackendError> {
    loop {
      match ops::waitpid(None, Some(WaitPidFlag::__WALL | WaitPidFlag::WNOHANG)) {
        Ok((pid, _)) if pid.as_raw() == 0 => return Ok(()),
        Ok((pid, status)) => self.record_status(pid, status),
        Err(e) if e.errno() == Errno::ECHILD => return Ok(()),
        Err(e) => return Err(ptrace_err(e)),
      }
    }
  }

  fn record_status(&mut self, pid: Pid, status: RawStatus) {
    if self.lwps.find(pid).is_none() {
      if self.inferiors.contains_key(&pid) {
        warn!(pid = %pid, "re-adding zombie leader to surface its real exit event");
        self.lwps.add(Ptid::leader_of(pid));
      } else {
        return;
      }
    }
    if let Some(lwp) = self.lwps.find_mut(pid) {
      lwp.stopped = status.stopped();
      lwp.status_pending = Some(status);
    }
  }

  // ---- 4.6.4 resume one ------------------------------------------------

  pub fn resume_one(&mut self, lwp_id: LwpId, step: bool, sig: Option<Signal>) -> Result<(), BackendError> {
    let pid = self
      .lwps
      .find(lwp_id)
      .map(|l| l.ptid.pid)
      .ok_or(BackendError::NoSuchTracee { ptid: Ptid::leader_of(lwp_id) })?;

    let mut deliver = None;
    if let Some(lwp) = self.lwps.find_mut(lwp_id) {
      let collecting = !matches!(lwp.collecting_fast_tp, CollectingFastTp::NotCollecting);
      if let Some(signal) = sig {
        if !lwp.pending_signals.is_empty() || lwp.has_pending_event() || collecting {
          lwp.enqueue_signal(signal);
        } else {
          deliver = Some(signal);
        }
      }
      if deliver.is_none() && !collecting {
        if let Some(PendingSignal(queued)) = lwp.pending_signals.pop_front() {
          deliver = Some(queued);
        }
      }
      lwp.step = step;
      lwp.last_resume_kind = if step { ResumeKind::Step } else { ResumeKind::Continue };
    }

    let nix_sig = deliver.and_then(|s| NixSignal::try_from(s.as_raw()).ok());
    let catches_any = self.inferiors.get(&pid).map(|i| !i.syscalls_to_catch.is_empty()).unwrap_or(false);

    let result = if step {
      ops::single_step(lwp_id, nix_sig)
    } else if catches_any {
      ops::syscall(lwp_id, nix_sig)
    } else {
      ops::cont(lwp_id, nix_sig)
    };

    match result {
      Ok(()) => {
        if let Some(lwp) = self.lwps.find_mut(lwp_id) {
          lwp.stopped = false;
          lwp.stop_reason = StopReason::None;
        }
        Ok(())
      }
      Err(e) if e.errno() == Errno::ESRCH && proc::pid_is_gone(lwp_id) => {
        if let Some(lwp) = self.lwps.find_mut(lwp_id) {
          lwp.status_pending = None;
        }
        Ok(())
      }
      Err(e) => Err(ptrace_err(e)),
    }
  }

  // ---- 4.6.5 step over a breakpoint ------------------------------------

  pub fn thread_needs_step_over(&self, lwp_id: LwpId, breakpoint_inserted_at: impl Fn(Address) -> bool, arch: &dyn ArchHooks) -> bool {
    let Some(lwp) = self.lwps.find(lwp_id) else {
      return false;
    };
    lwp.stopped
      && lwp.suspended == 0
      && lwp.status_pending.is_none()
      && breakpoint_inserted_at(lwp.stop_pc)
      && arch.breakpoint_condition_true(lwp.stop_pc)
  }

  /// `start_step_over`: `uninsert` must remove both the real breakpoint
  /// and any fast-tracepoint jump at `pc` before this returns (spec
  /// §4.6.5 step 2b).
  pub fn start_step_over(&mut self, lwp_id: LwpId, pc: Address, uninsert: impl FnOnce(Address)) -> Result<(), BackendError> {
    let ptid = self
      .lwps
      .find(lwp_id)
      .map(|l| l.ptid)
      .ok_or(BackendError::NoSuchTracee { ptid: Ptid::leader_of(lwp_id) })?;

    self.stop_all(Some(ptid), true)?;
    uninsert(pc);
    if let Some(lwp) = self.lwps.find_mut(lwp_id) {
      lwp.bp_reinsert = Some(pc);
    }
    self.step_over_lwp = Some(ptid);
    self.state = CoreState::StepOverInProgress;
    self.resume_one(lwp_id, true, None)
  }

  pub fn finish_step_over(&mut self, lwp_id: LwpId, reinsert: impl FnOnce(Address)) -> Result<(), BackendError> {
    let pc = self.lwps.find_mut(lwp_id).and_then(|l| l.bp_reinsert.take());
    if let Some(pc) = pc {
      reinsert(pc);
    }
    let except = self.step_over_lwp.take();
    self.state = CoreState::Idle;
    self.unstop_all(except, true)
  }

  /// Drains an in-flight step-over synchronously (spec §4.6.5 step 4,
  /// §5 "Cancellation of a step-over"). Any stray event collected from
  /// a peer is impossible by construction since every peer is
  /// suspended, but is discarded defensively if a race is ever observed.
  pub fn complete_ongoing_step_over(&mut self) -> Result<(), BackendError> {
    let Some(ptid) = self.step_over_lwp else {
      return Ok(());
    };
    loop {
      self.drain_statuses()?;
      if self.lwps.find(ptid.lwp).map(|l| l.has_pending_event()).unwrap_or(true) {
        return Ok(());
      }
      let mask = EventLoop::block_sigchld().map_err(BackendError::from)?;
      EventLoop::sigsuspend_on(&mask);
      EventLoop::restore_mask(&mask).map_err(BackendError::from)?;
    }
  }

  // ---- 4.6.6 save stop reason -------------------------------------------

  pub fn save_stop_reason(&mut self, lwp_id: LwpId, code: i32, arch: &dyn ArchHooks) -> StopReason {
    let Some(ptid) = self.lwps.find(lwp_id).map(|l| l.ptid) else {
      return StopReason::None;
    };

    let is_brkpt = code & si_code::TRAP_BRKPT != 0;
    let is_hwbkpt = code & si_code::TRAP_HWBKPT != 0;

    let reason = if is_brkpt && !is_hwbkpt {
      StopReason::SwBreakpoint
    } else if is_brkpt && is_hwbkpt {
      // Both bits set (spec §4.6.6): ambiguous, some kernels report a
      // plain software breakpoint this way. Defaults to SwBreakpoint,
      // distinct from the HWBKPT-only case below.
      arch.disambiguate_ambiguous_brkpt(ptid)
    } else if is_hwbkpt {
      // HWBKPT only: defaults to a hardware breakpoint, deferring to
      // the arch layer's watchpoint state.
      arch.disambiguate_trap_hwbkpt(ptid)
    } else if code == si_code::TRAP_TRACE {
      arch.disambiguate_trap_trace(ptid)
    } else {
      StopReason::None
    };

    if let Some(lwp) = self.lwps.find_mut(lwp_id) {
      lwp.stop_reason = reason;
      if matches!(reason, StopReason::SwBreakpoint) {
        let decr = arch.decr_pc_after_break();
        if decr > 0 {
          lwp.stop_pc = lwp.stop_pc.saturating_sub(decr);
        }
      }
    }
    reason
  }

  // ---- 4.6.7 zombie-leader policy ---------------------------------------

  pub fn check_zombie_leaders(&mut self) {
    let leaders: Vec<Ptid> = self.lwps.iter().filter(|l| l.is_leader()).map(|l| l.ptid).collect();
    for ptid in leaders {
      let is_zombie = matches!(proc::pid_state(ptid.pid), Ok(proc::PidState::Zombie));
      if !is_zombie {
        continue;
      }
      let has_siblings = self.lwps.iter_process(ptid.pid).any(|l| !l.is_leader());
      if has_siblings {
        warn!(pid = %ptid.pid, "deleting zombie leader eagerly; live siblings remain");
        self.lwps.remove(ptid.lwp);
      }
    }
  }

  // ---- 4.6.8 fast-tracepoint jump pad stabilization ---------------------

  /// Whether `signal` is one spec §4.6.8 allows to defer (synchronous
  /// signals only).
  fn is_deferrable(signal: Signal) -> bool {
    matches!(
      signal,
      Signal::Standard(NixSignal::SIGILL | NixSignal::SIGFPE | NixSignal::SIGSEGV | NixSignal::SIGBUS)
    )
  }

  /// Queues `signal` for replay once `lwp_id` leaves its jump pad,
  /// returning `false` (and doing nothing) if the LWP isn't collecting
  /// or the signal isn't one that can be deferred.
  pub fn defer_signal_in_jump_pad(&mut self, lwp_id: LwpId, signal: Signal) -> bool {
    if !Self::is_deferrable(signal) {
      return false;
    }
    if let Some(lwp) = self.lwps.find_mut(lwp_id) {
      if !matches!(lwp.collecting_fast_tp, CollectingFastTp::NotCollecting) {
        lwp.deferred_signals.push_back(PendingSignal(signal));
        return true;
      }
    }
    false
  }

  fn replay_deferred_signals(&mut self, lwp_id: LwpId) {
    if let Some(lwp) = self.lwps.find_mut(lwp_id) {
      let deferred: Vec<_> = lwp.deferred_signals.drain(..).collect();
      lwp.pending_signals.extend(deferred);
    }
  }

  /// Single-steps every LWP still mid-collection until `at_exit`
  /// reports it has left the pad, replaying its deferred signals (spec
  /// §4.6.8 `stabilize_threads`).
  pub fn stabilize_threads(&mut self, at_exit: impl Fn(LwpId) -> bool) -> Result<(), BackendError> {
    self.state = CoreState::Stabilizing;
    loop {
      let stuck: Vec<LwpId> = self
        .lwps
        .iter()
        .filter(|l| !matches!(l.collecting_fast_tp, CollectingFastTp::NotCollecting))
        .map(|l| l.ptid.lwp)
        .collect();
      if stuck.is_empty() {
        self.state = CoreState::Idle;
        return Ok(());
      }
      for lwp_id in stuck {
        if at_exit(lwp_id) {
          if let Some(lwp) = self.lwps.find_mut(lwp_id) {
            lwp.collecting_fast_tp = CollectingFastTp::NotCollecting;
          }
          self.replay_deferred_signals(lwp_id);
        } else {
          self.resume_one(lwp_id, true, None)?;
        }
      }
      self.drain_statuses()?;
    }
  }

  // ---- 4.6.9 detach -------------------------------------------------------

  pub fn detach(&mut self, pid: Pid) -> Result<(), BackendError> {
    self.complete_ongoing_step_over()?;

    let non_leaders: Vec<LwpId> = self.lwps.iter_process(pid).filter(|l| !l.is_leader()).map(|l| l.ptid.lwp).collect();
    for lwp_id in non_leaders {
      self.detach_one(lwp_id)?;
    }
    self.detach_one(pid)?;
    self.inferiors.remove(&pid);
    Ok(())
  }

  fn detach_one(&mut self, lwp_id: LwpId) -> Result<(), BackendError> {
    let Some(already_stopped) = self.lwps.find(lwp_id).map(|l| l.stopped) else {
      return Ok(());
    };
    if !already_stopped {
      let _ = ops::tkill(lwp_id, NixSignal::SIGSTOP);
      let _ = ops::waitpid(Some(lwp_id), Some(WaitPidFlag::__WALL));
    }

    let detach_signal = self
      .lwps
      .find_mut(lwp_id)
      .and_then(|l| l.pending_signals.pop_front())
      .and_then(|PendingSignal(s)| NixSignal::try_from(s.as_raw()).ok());

    match ops::detach(lwp_id, detach_signal) {
      Ok(()) => {}
      Err(e) if e.errno() == Errno::ESRCH => {
        let _ = ops::waitpid(Some(lwp_id), Some(WaitPidFlag::__WALL));
      }
      Err(e) => return Err(ptrace_err(e)),
    }

    self.lwps.remove(lwp_id);
    Ok(())
  }
}

impl Default for StopResumeCore {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::arch::NullArchHooks;
  use rusty_fork::rusty_fork_test;

  #[test]
  fn save_stop_reason_trap_brkpt_is_sw_breakpoint() {
    let mut core = StopResumeCore {
      lwps: LwpTable::new(),
      inferiors: HashMap::new(),
      exitkill_supported: false,
      state: CoreState::Idle,
      catch_all_syscalls_by_default: false,
      step_over_lwp: None,
    };
    let ptid = Ptid::leader_of(Pid::from_raw(123));
    core.lwps.add(ptid);
    let reason = core.save_stop_reason(Pid::from_raw(123), si_code::TRAP_BRKPT, &NullArchHooks);
    assert_eq!(reason, StopReason::SwBreakpoint);
  }

  #[test]
  fn save_stop_reason_both_brkpt_and_hwbkpt_bits_default_to_sw_breakpoint() {
    let mut core = StopResumeCore {
      lwps: LwpTable::new(),
      inferiors: HashMap::new(),
      exitkill_supported: false,
      state: CoreState::Idle,
      catch_all_syscalls_by_default: false,
      step_over_lwp: None,
    };
    let ptid = Ptid::leader_of(Pid::from_raw(123));
    core.lwps.add(ptid);
    let reason = core.save_stop_reason(Pid::from_raw(123), si_code::TRAP_BRKPT | si_code::TRAP_HWBKPT, &NullArchHooks);
    assert_eq!(reason, StopReason::SwBreakpoint);
  }

  #[test]
  fn save_stop_reason_hwbkpt_only_defaults_to_hw_breakpoint() {
    let mut core = StopResumeCore {
      lwps: LwpTable::new(),
      inferiors: HashMap::new(),
      exitkill_supported: false,
      state: CoreState::Idle,
      catch_all_syscalls_by_default: false,
      step_over_lwp: None,
    };
    let ptid = Ptid::leader_of(Pid::from_raw(123));
    core.lwps.add(ptid);
    let reason = core.save_stop_reason(Pid::from_raw(123), si_code::TRAP_HWBKPT, &NullArchHooks);
    assert_eq!(reason, StopReason::HwBreakpoint);
  }

  #[test]
  fn save_stop_reason_trap_trace_defers_to_arch_hooks() {
    let mut core = StopResumeCore {
      lwps: LwpTable::new(),
      inferiors: HashMap::new(),
      exitkill_supported: false,
      state: CoreState::Idle,
      catch_all_syscalls_by_default: false,
      step_over_lwp: None,
    };
    let ptid = Ptid::leader_of(Pid::from_raw(123));
    core.lwps.add(ptid);
    let reason = core.save_stop_reason(Pid::from_raw(123), si_code::TRAP_TRACE, &NullArchHooks);
    assert_eq!(reason, StopReason::SingleStep);
  }

  #[test]
  fn defer_signal_in_jump_pad_only_defers_synchronous_signals() {
    let mut core = StopResumeCore::new();
    let ptid = Ptid::leader_of(Pid::from_raw(321));
    core.lwps.add(ptid);
    core.lwps.find_mut(Pid::from_raw(321)).unwrap().collecting_fast_tp = CollectingFastTp::AtInsn;

    let deferred = core.defer_signal_in_jump_pad(Pid::from_raw(321), Signal::from(NixSignal::SIGSEGV));
    assert!(deferred);
    let not_deferred = core.defer_signal_in_jump_pad(Pid::from_raw(321), Signal::from(NixSignal::SIGUSR1));
    assert!(!not_deferred);
  }

  #[test]
  fn check_zombie_leaders_is_a_noop_with_no_tracked_pids() {
    let mut core = StopResumeCore::new();
    core.check_zombie_leaders();
    assert!(core.lwps.is_empty());
  }

  #[test]
  fn new_inferior_starts_empty_catch_list_by_default() {
    let core = StopResumeCore::new();
    let inferior = core.new_inferior(Pid::from_raw(1));
    assert!(inferior.syscalls_to_catch.is_empty());
  }

  #[test]
  fn new_inferior_catches_everything_when_configured_to() {
    let mut core = StopResumeCore::new();
    core.catch_all_syscalls_by_default = true;
    let inferior = core.new_inferior(Pid::from_raw(1));
    assert_eq!(inferior.syscalls_to_catch, vec![ANY_SYSCALL]);
    assert!(inferior.catches_syscall(42));
  }

  rusty_fork_test! {
    #[test]
    fn spawn_true_then_continue_reaches_exited() {
      let mut core = StopResumeCore::new();
      let program = std::ffi::CString::new("/bin/true").unwrap();
      let args = [program.clone()];
      let env: Vec<std::ffi::CString> = Vec::new();
      let pid = core
        .create_inferior(&program, &args, &env, false, true)
        .expect("spawning /bin/true must succeed");

      core.resume_one(pid, false, None).expect("continuing past the exec stop");

      let (_, status) = ops::waitpid(Some(pid), Some(WaitPidFlag::__WALL)).expect("waiting for exit");
      assert!(status.exited());
    }
  }
}
