//! C5 `EventLoop` (spec §4.5): the `SIGCHLD`-driven wakeup plumbing.
//!
//! Grounded on the signal-handler-marks-a-pipe pattern from the
//! teacher's tracer loop, but the pipe registration itself leans on
//! `signal_hook::low_level::pipe::register`, which exists precisely to
//! install an async-signal-safe "write one byte on signal" handler
//! without hand-rolling one.

use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use nix::{
  errno::Errno,
  sys::signal::{SigSet, SigmaskHow, Signal, kill, sigprocmask, sigsuspend},
  unistd::{Pid, pipe2, read},
};
use signal_hook::{SigId, consts::SIGCHLD, low_level};

/// Owns the optional event pipe and `SIGCHLD` registration for async
/// mode (spec §4.5 "Async mode"). In sync mode nothing here is armed;
/// the core instead blocks/unblocks `SIGCHLD` around `sigsuspend`
/// itself via [`block_sigchld`]/[`restore_mask`].
#[derive(Debug, Default)]
pub struct EventLoop {
  read_fd: Option<OwnedFd>,
  write_fd: Option<OwnedFd>,
  sig_id: Option<SigId>,
}

impl EventLoop {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_async(&self) -> bool {
    self.sig_id.is_some()
  }

  /// Enables async mode, returning the previous enabled state (spec
  /// §6.1 `async(enable) -> prev-state bool`). Idempotent.
  pub fn enable_async(&mut self) -> Result<bool, Errno> {
    let prev = self.is_async();
    if prev {
      return Ok(prev);
    }
    let (read_fd, write_fd) = pipe2(nix::fcntl::OFlag::O_CLOEXEC | nix::fcntl::OFlag::O_NONBLOCK)?;
    let sig_id = low_level::pipe::register(SIGCHLD, write_fd.try_clone()?)?;
    self.read_fd = Some(read_fd);
    self.write_fd = Some(write_fd);
    self.sig_id = Some(sig_id);
    Ok(prev)
  }

  pub fn disable_async(&mut self) -> bool {
    let prev = self.is_async();
    if let Some(id) = self.sig_id.take() {
      low_level::unregister(id);
    }
    self.read_fd = None;
    self.write_fd = None;
    prev
  }

  pub fn event_fd(&self) -> Option<RawFd> {
    self.read_fd.as_ref().map(AsRawFd::as_raw_fd)
  }

  /// Drains every byte currently sitting in the event pipe. Per spec
  /// §5 "a resume request issued before `wait` returns is guaranteed to
  /// have taken effect before `wait` blocks": the core calls this right
  /// before re-entering a blocking wait so a stale wakeup byte can't
  /// cause an immediate spurious return.
  pub fn drain_pipe(&self) {
    let Some(fd) = &self.read_fd else { return };
    let mut buf = [0u8; 64];
    loop {
      match read(fd, &mut buf) {
        Ok(n) if n == buf.len() => continue,
        _ => break,
      }
    }
  }

  /// Blocks `SIGCHLD` and returns the previous mask, to be restored with
  /// [`EventLoop::sigsuspend_on`] (spec §4.5 step 1, §5 "signal masks").
  pub fn block_sigchld() -> Result<SigSet, Errno> {
    let mut chld = SigSet::empty();
    chld.add(Signal::SIGCHLD);
    let mut old = SigSet::empty();
    sigprocmask(SigmaskHow::SIG_BLOCK, Some(&chld), Some(&mut old))?;
    Ok(old)
  }

  pub fn restore_mask(mask: &SigSet) -> Result<(), Errno> {
    sigprocmask(SigmaskHow::SIG_SETMASK, Some(mask), None)
  }

  /// Suspends with `SIGCHLD` unblocked relative to `mask`, waking on the
  /// next `SIGCHLD` (or any other unblocked signal) — spec §4.5 step 5.
  pub fn sigsuspend_on(mask: &SigSet) {
    let _ = sigsuspend(mask);
  }

  /// `request_interrupt()` (spec §4.5 "Cancellation"): `SIGINT` to the
  /// inferior's whole process group, nothing else.
  pub fn request_interrupt(pid: Pid) -> Result<(), Errno> {
    kill(Pid::from_raw(-pid.as_raw()), Signal::SIGINT)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;

  #[test]
  #[serial]
  fn enable_then_disable_async_round_trips() {
    let mut loop_ = EventLoop::new();
    assert!(!loop_.is_async());
    let prev = loop_.enable_async().unwrap();
    assert!(!prev);
    assert!(loop_.is_async());
    assert!(loop_.event_fd().is_some());
    let prev = loop_.disable_async();
    assert!(prev);
    assert!(!loop_.is_async());
    assert!(loop_.event_fd().is_none());
  }

  #[test]
  fn block_sigchld_then_restore_does_not_error() {
    let old = EventLoop::block_sigchld().unwrap();
    EventLoop::restore_mask(&old).unwrap();
  }
}
