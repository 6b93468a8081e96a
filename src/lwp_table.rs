//! `LwpTable` (C4, spec §3): the set of LWPs currently attached-to, keyed
//! by kernel task id and also kept in reverse-creation order for the
//! "newest created last" scans `StopResumeCore` needs (fast-tracepoint
//! jump-pad stabilization, zombie-leader re-add ordering).

use hashbrown::HashMap;

use backend_types::{LwpId, Ptid};

use crate::lwp::LwpState;

/// All LWPs currently known to the backend.
///
/// Lookup is by `lwp` (the kernel task id), since that is what every
/// `waitpid` result and every ptrace request is keyed on. Creation order
/// is tracked separately so callers can walk "newest first" without
/// reconstructing it from a `HashMap`, whose iteration order is
/// unspecified.
#[derive(Debug, Default)]
pub struct LwpTable {
  by_lwp: HashMap<LwpId, LwpState>,
  /// Kept in creation order; a removed lwp's id lingers here until the
  /// next `add`/`iter_creation_order` pass compacts it away, so deletion
  /// during iteration is safe.
  creation_order: Vec<LwpId>,
}

impl LwpTable {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add(&mut self, ptid: Ptid) -> &mut LwpState {
    self.creation_order.push(ptid.lwp);
    self.by_lwp.entry(ptid.lwp).or_insert_with(|| LwpState::new(ptid))
  }

  pub fn remove(&mut self, lwp: LwpId) -> Option<LwpState> {
    self.by_lwp.remove(&lwp)
  }

  pub fn find(&self, lwp: LwpId) -> Option<&LwpState> {
    self.by_lwp.get(&lwp)
  }

  pub fn find_mut(&mut self, lwp: LwpId) -> Option<&mut LwpState> {
    self.by_lwp.get_mut(&lwp)
  }

  pub fn contains(&self, lwp: LwpId) -> bool {
    self.by_lwp.contains_key(&lwp)
  }

  pub fn len(&self) -> usize {
    self.by_lwp.len()
  }

  pub fn is_empty(&self) -> bool {
    self.by_lwp.is_empty()
  }

  /// All LWPs belonging to `pid`'s thread group.
  pub fn iter_process(&self, pid: nix::unistd::Pid) -> impl Iterator<Item = &LwpState> {
    self.by_lwp.values().filter(move |lwp| lwp.ptid.pid == pid)
  }

  pub fn iter(&self) -> impl Iterator<Item = &LwpState> {
    self.by_lwp.values()
  }

  pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut LwpState> {
    self.by_lwp.values_mut()
  }

  /// Walks tracked LWPs from most- to least-recently-created, skipping
  /// any id that has since been removed (spec §3: creation order matters
  /// for step-over and zombie-leader bookkeeping, not for lookup).
  pub fn iter_creation_order_rev(&self) -> impl Iterator<Item = &LwpState> {
    self.creation_order.iter().rev().filter_map(move |lwp| self.by_lwp.get(lwp))
  }

  /// Drops stale ids of already-removed LWPs from the creation-order
  /// list. Cheap to skip indefinitely since `iter_creation_order_rev`
  /// tolerates staleness, but bounds memory for long-lived sessions with
  /// many short-lived threads.
  pub fn compact(&mut self) {
    let by_lwp = &self.by_lwp;
    self.creation_order.retain(|lwp| by_lwp.contains_key(lwp));
  }

  /// Whether any tracked LWP is the leader of `pid` (used to decide
  /// whether a process is still attached-to at all).
  pub fn has_leader(&self, pid: nix::unistd::Pid) -> bool {
    self.by_lwp.values().any(|lwp| lwp.ptid.is_leader() && lwp.ptid.pid == pid)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use nix::unistd::Pid;

  fn ptid(pid: i32, lwp: i32) -> Ptid {
    Ptid::new(Pid::from_raw(pid), Pid::from_raw(lwp))
  }

  #[test]
  fn add_then_find_round_trips() {
    let mut table = LwpTable::new();
    table.add(ptid(10, 10));
    assert!(table.find(Pid::from_raw(10)).is_some());
    assert_eq!(table.len(), 1);
  }

  #[test]
  fn remove_then_find_is_none() {
    let mut table = LwpTable::new();
    table.add(ptid(10, 10));
    table.remove(Pid::from_raw(10));
    assert!(table.find(Pid::from_raw(10)).is_none());
    assert!(table.is_empty());
  }

  #[test]
  fn creation_order_is_newest_first_and_tolerates_removal() {
    let mut table = LwpTable::new();
    table.add(ptid(10, 10));
    table.add(ptid(10, 11));
    table.add(ptid(10, 12));
    table.remove(Pid::from_raw(11));

    let order: Vec<i32> = table.iter_creation_order_rev().map(|l| l.ptid.lwp.as_raw()).collect();
    assert_eq!(order, vec![12, 10]);
  }

  #[test]
  fn compact_drops_removed_ids() {
    let mut table = LwpTable::new();
    table.add(ptid(10, 10));
    table.add(ptid(10, 11));
    table.remove(Pid::from_raw(11));
    table.compact();
    assert_eq!(table.creation_order.len(), 1);
  }

  #[test]
  fn iter_process_filters_by_pid() {
    let mut table = LwpTable::new();
    table.add(ptid(10, 10));
    table.add(ptid(10, 11));
    table.add(ptid(20, 20));
    let count = table.iter_process(Pid::from_raw(10)).count();
    assert_eq!(count, 2);
  }

  #[test]
  fn has_leader_true_only_for_leader_lwp() {
    let mut table = LwpTable::new();
    table.add(ptid(10, 11));
    assert!(!table.has_leader(Pid::from_raw(10)));
    table.add(ptid(10, 10));
    assert!(table.has_leader(Pid::from_raw(10)));
  }
}
