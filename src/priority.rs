//! Event-selection priority (spec §4.5 "Ordering guarantees", §9 OQ2):
//! when more than one LWP has a pending event and the caller asked for
//! `minus_one_ptid` (any), which one gets reported first.
//!
//! Exposed as a swappable hook per OQ2 ("this is a policy the caller may
//! want to override; expose it as a hook") rather than hard-coded into
//! `EventLoop`.

use backend_types::LwpId;
use rand::{Rng, rng};

use crate::lwp_table::LwpTable;

/// Picks one LWP id out of a non-empty candidate list.
pub trait EventPriority {
  fn choose(&self, candidates: &[LwpId], single_stepping: &[LwpId]) -> LwpId;
}

/// Prefers a single-stepping LWP in all-stop mode (its SIGTRAP is
/// assumed to be what the user is waiting on); otherwise picks
/// pseudo-randomly among the candidates to avoid starvation (spec §4.5).
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEventPriority;

impl EventPriority for DefaultEventPriority {
  fn choose(&self, candidates: &[LwpId], single_stepping: &[LwpId]) -> LwpId {
    debug_assert!(!candidates.is_empty(), "choose called with no candidates");
    if let Some(&stepping) = single_stepping.iter().find(|lwp| candidates.contains(lwp)) {
      return stepping;
    }
    let idx = rng().random_range(0..candidates.len());
    candidates[idx]
  }
}

/// Collects the lwp ids currently eligible to be reported (have a
/// pending event and match the caller's filter) plus which of those are
/// single-stepping, for use with an [`EventPriority`] hook.
pub fn pending_candidates(table: &LwpTable, matches: impl Fn(LwpId) -> bool) -> (Vec<LwpId>, Vec<LwpId>) {
  let mut candidates = Vec::new();
  let mut single_stepping = Vec::new();
  for lwp in table.iter() {
    if lwp.has_pending_event() && matches(lwp.ptid.lwp) {
      candidates.push(lwp.ptid.lwp);
      if lwp.step {
        single_stepping.push(lwp.ptid.lwp);
      }
    }
  }
  (candidates, single_stepping)
}

#[cfg(test)]
mod tests {
  use super::*;
  use nix::unistd::Pid;

  #[test]
  fn prefers_single_stepping_lwp_when_present() {
    let priority = DefaultEventPriority;
    let candidates = vec![Pid::from_raw(1), Pid::from_raw(2), Pid::from_raw(3)];
    let stepping = vec![Pid::from_raw(2)];
    for _ in 0..20 {
      assert_eq!(priority.choose(&candidates, &stepping), Pid::from_raw(2));
    }
  }

  #[test]
  fn falls_back_to_one_of_the_candidates() {
    let priority = DefaultEventPriority;
    let candidates = vec![Pid::from_raw(1), Pid::from_raw(2)];
    let chosen = priority.choose(&candidates, &[]);
    assert!(candidates.contains(&chosen));
  }
}
