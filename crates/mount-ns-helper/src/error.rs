//! C3's error type (spec §4.3, §7): helper-protocol failures reduce to an
//! `errno` from either the local syscall or the helper's reported remote
//! one. `MsgError`/a malformed reply is unrecoverable — per §4.3 it is
//! "treated as an assertion failure by the caller" — so it is not a
//! variant here; callers hit it via `unreachable!`.

use nix::errno::Errno;
use snafu::Snafu;

#[derive(Debug, Snafu)]
pub enum HelperError {
  #[snafu(display("failed to spawn mount-ns helper: {source}"))]
  Spawn { source: Errno },

  #[snafu(display("helper protocol I/O failed: {source}"))]
  Io { source: Errno },

  #[snafu(display("remote operation failed in helper: {source}"))]
  Remote { source: Errno },
}

impl From<Errno> for HelperError {
  fn from(source: Errno) -> Self {
    Self::Io { source }
  }
}
