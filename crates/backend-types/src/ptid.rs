//! LWP identity.
//!
//! See spec §3 "Identity": every tracee is identified by a triple
//! `Ptid { pid, lwp, tid }`. `lwp` (the kernel task id) is globally unique on
//! Linux, so it is what `LwpTable` indexes by; `pid` groups LWPs into a
//! thread group (inferior); `tid` is a user-level thread id from a layer
//! above this backend and is opaque here.

use std::fmt;

use nix::unistd::Pid;

/// The kernel task id part of a [`Ptid`]. An alias, not a newtype: it is
/// the same representation as a process id, just a different role.
pub type LwpId = Pid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ptid {
  pub pid: Pid,
  pub lwp: LwpId,
  pub tid: Option<u64>,
}

impl Ptid {
  pub fn new(pid: Pid, lwp: LwpId) -> Self {
    Self { pid, lwp, tid: None }
  }

  /// A `Ptid` denoting the thread-group leader of `pid` (`lwp == pid`).
  pub fn leader_of(pid: Pid) -> Self {
    Self::new(pid, pid)
  }

  /// True iff this LWP is the leader of its thread group (`pid == lwp`).
  pub fn is_leader(&self) -> bool {
    self.pid == self.lwp
  }

  pub fn with_tid(mut self, tid: u64) -> Self {
    self.tid = Some(tid);
    self
  }
}

impl fmt::Display for Ptid {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_leader() {
      write!(f, "{}", self.pid)
    } else {
      write!(f, "{}.{}", self.pid, self.lwp)
    }
  }
}

/// A selector used by `wait`/`resume` to match against one or more LWPs.
///
/// Corresponds to spec §6.1's `filter_ptid` and the "`minus_one_ptid`"
/// wording of §4.5/§8 for "any resumable LWP".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PtidFilter {
  /// Matches every tracked LWP (gdb's `minus_one_ptid`).
  Any,
  /// Matches every LWP belonging to one inferior.
  Process(Pid),
  /// Matches exactly one LWP.
  Exact(Ptid),
}

impl PtidFilter {
  pub fn matches(&self, ptid: Ptid) -> bool {
    match self {
      Self::Any => true,
      Self::Process(pid) => ptid.pid == *pid,
      Self::Exact(p) => *p == ptid,
    }
  }
}

impl From<Ptid> for PtidFilter {
  fn from(value: Ptid) -> Self {
    Self::Exact(value)
  }
}

impl From<Pid> for PtidFilter {
  fn from(value: Pid) -> Self {
    Self::Process(value)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn pid(n: i32) -> Pid {
    Pid::from_raw(n)
  }

  #[test]
  fn leader_detection() {
    let leader = Ptid::leader_of(pid(100));
    assert!(leader.is_leader());
    let child = Ptid::new(pid(100), pid(101));
    assert!(!child.is_leader());
  }

  #[test]
  fn display_leader_vs_non_leader() {
    assert_eq!(Ptid::leader_of(pid(5)).to_string(), "5");
    assert_eq!(Ptid::new(pid(5), pid(9)).to_string(), "5.9");
  }

  #[test]
  fn filter_matching() {
    let p1 = Ptid::new(pid(5), pid(5));
    let p2 = Ptid::new(pid(5), pid(6));
    let p3 = Ptid::new(pid(7), pid(7));

    assert!(PtidFilter::Any.matches(p1));
    assert!(PtidFilter::Any.matches(p3));

    let proc_filter = PtidFilter::Process(pid(5));
    assert!(proc_filter.matches(p1));
    assert!(proc_filter.matches(p2));
    assert!(!proc_filter.matches(p3));

    let exact = PtidFilter::from(p2);
    assert!(exact.matches(p2));
    assert!(!exact.matches(p1));
  }
}
