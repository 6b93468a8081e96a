//! `MountNsHelper` (C3, spec §4.3): the main-process side. Spawns the
//! helper child lazily, tracks which mount namespace it last switched to,
//! and skips the helper entirely when the caller is already in the
//! tracee's mount namespace.

use std::{
  ffi::CString,
  os::fd::{AsFd, FromRawFd, OwnedFd},
};

use nix::{
  errno::Errno,
  fcntl::{self, OFlag},
  sched::CloneFlags,
  sys::{
    socket::{AddressFamily, SockFlag, SockType, socketpair},
    stat::{Mode, fstat},
  },
  unistd::{ForkResult, Pid, fork, getpid},
};
use tracing::debug;

use crate::{
  error::HelperError,
  helper,
  protocol::{Header, MsgType, PATH_MAX, recv_message, send_message},
};

/// Inode of `/proc/<pid>/ns/mnt`, used to tell whether two processes
/// share a mount namespace (spec §4.3 "Namespace selection").
pub fn mnt_ns_inode(pid: Pid) -> Result<u64, Errno> {
  let path = format!("/proc/{pid}/ns/mnt");
  let fd = fcntl::open(path.as_str(), OFlag::O_RDONLY, Mode::empty())?;
  let owned = unsafe { OwnedFd::from_raw_fd(fd) };
  Ok(fstat(owned.as_fd())?.st_ino)
}

struct HelperChild {
  pid: Pid,
  socket: OwnedFd,
  current_ns_inode: Option<u64>,
}

/// Lazily-spawned cross-mount-namespace file-access helper.
pub struct MountNsHelper {
  child: Option<HelperChild>,
}

impl Default for MountNsHelper {
  fn default() -> Self {
    Self::new()
  }
}

impl MountNsHelper {
  pub fn new() -> Self {
    Self { child: None }
  }

  fn spawn(&mut self) -> Result<(), HelperError> {
    let (parent_sock, child_sock) = socketpair(
      AddressFamily::Unix,
      SockType::Stream,
      None,
      SockFlag::SOCK_CLOEXEC,
    )
    .map_err(|source| HelperError::Spawn { source })?;

    let birth_parent = getpid();
    match unsafe { fork() }.map_err(|source| HelperError::Spawn { source })? {
      ForkResult::Child => {
        drop(parent_sock);
        helper::run(child_sock, birth_parent);
      }
      ForkResult::Parent { child } => {
        drop(child_sock);
        debug!(helper_pid = child.as_raw(), "spawned mount-ns helper");
        self.child = Some(HelperChild {
          pid: child,
          socket: parent_sock,
          current_ns_inode: None,
        });
        Ok(())
      }
    }
  }

  fn ensure_namespace(&mut self, target: Pid) -> Result<(), HelperError> {
    let target_ino = mnt_ns_inode(target)?;
    if self.child.is_none() {
      self.spawn()?;
    }
    let child = self.child.as_mut().expect("just spawned");
    if child.current_ns_inode == Some(target_ino) {
      return Ok(());
    }

    let path = format!("/proc/{target}/ns/mnt");
    let raw = fcntl::open(path.as_str(), OFlag::O_RDONLY, Mode::empty())?;
    let ns_fd = unsafe { OwnedFd::from_raw_fd(raw) };

    send_message(
      child.socket.as_fd(),
      Header::new(MsgType::Setns, CloneFlags::CLONE_NEWNS.bits() as i32, 0),
      Some(ns_fd.as_fd()),
      &[],
    )
    .map_err(|source| HelperError::Io { source })?;

    let mut payload_buf = [0u8; PATH_MAX];
    let (header, _, _) = recv_message(child.socket.as_fd(), &mut payload_buf)
      .map_err(|source| HelperError::Io { source })?
      .expect("helper closed socket mid-request");

    match header.msg_type {
      MsgType::RetInt if header.int1 == 0 => {
        child.current_ns_inode = Some(target_ino);
        Ok(())
      }
      MsgType::RetInt => Err(HelperError::Remote {
        source: Errno::from_raw(header.int2),
      }),
      _ => unreachable!("helper protocol violation on setns reply"),
    }
  }

  /// True if `pid`'s mount namespace is the same as this process's own
  /// (spec §4.3: skip the helper entirely in that case).
  fn shares_our_namespace(pid: Pid) -> Result<bool, Errno> {
    Ok(mnt_ns_inode(pid)? == mnt_ns_inode(getpid())?)
  }

  pub fn multifs_open(&mut self, pid: Pid, path: &CString, flags: OFlag, mode: Mode) -> Result<OwnedFd, HelperError> {
    if Self::shares_our_namespace(pid)? {
      let fd = fcntl::open(path.as_c_str(), flags, mode)?;
      return Ok(unsafe { OwnedFd::from_raw_fd(fd) });
    }

    self.ensure_namespace(pid)?;
    let child = self.child.as_mut().expect("ensure_namespace spawns");
    let payload = path.as_bytes_with_nul();
    send_message(
      child.socket.as_fd(),
      Header::new(MsgType::Open, flags.bits(), mode.bits() as i32),
      None,
      payload,
    )
    .map_err(|source| HelperError::Io { source })?;

    let mut payload_buf = [0u8; PATH_MAX];
    let (header, fd, _) = recv_message(child.socket.as_fd(), &mut payload_buf)
      .map_err(|source| HelperError::Io { source })?
      .expect("helper closed socket mid-request");

    match header.msg_type {
      MsgType::RetFd if header.int1 == 0 => Ok(fd.expect("RetFd success must carry a fd")),
      MsgType::RetFd => Err(HelperError::Remote {
        source: Errno::from_raw(header.int2),
      }),
      _ => unreachable!("helper protocol violation on open reply"),
    }
  }

  pub fn multifs_unlink(&mut self, pid: Pid, path: &CString) -> Result<(), HelperError> {
    if Self::shares_our_namespace(pid)? {
      return nix::unistd::unlink(path.as_c_str()).map_err(|source| HelperError::Io { source });
    }

    self.ensure_namespace(pid)?;
    let child = self.child.as_mut().expect("ensure_namespace spawns");
    send_message(
      child.socket.as_fd(),
      Header::new(MsgType::Unlink, 0, 0),
      None,
      path.as_bytes_with_nul(),
    )
    .map_err(|source| HelperError::Io { source })?;

    let mut payload_buf = [0u8; PATH_MAX];
    let (header, _, _) = recv_message(child.socket.as_fd(), &mut payload_buf)
      .map_err(|source| HelperError::Io { source })?
      .expect("helper closed socket mid-request");

    match header.msg_type {
      MsgType::RetInt if header.int1 == 0 => Ok(()),
      MsgType::RetInt => Err(HelperError::Remote {
        source: Errno::from_raw(header.int2),
      }),
      _ => unreachable!("helper protocol violation on unlink reply"),
    }
  }

  pub fn multifs_readlink(&mut self, pid: Pid, path: &CString) -> Result<Vec<u8>, HelperError> {
    if Self::shares_our_namespace(pid)? {
      let target = nix::unistd::readlink(path.as_c_str()).map_err(|source| HelperError::Io { source })?;
      return Ok(target.into_encoded_bytes());
    }

    self.ensure_namespace(pid)?;
    let child = self.child.as_mut().expect("ensure_namespace spawns");
    send_message(
      child.socket.as_fd(),
      Header::new(MsgType::Readlink, 0, 0),
      None,
      path.as_bytes_with_nul(),
    )
    .map_err(|source| HelperError::Io { source })?;

    let mut payload_buf = [0u8; PATH_MAX];
    let (header, _, len) = recv_message(child.socket.as_fd(), &mut payload_buf)
      .map_err(|source| HelperError::Io { source })?
      .expect("helper closed socket mid-request");

    match header.msg_type {
      MsgType::RetIntStr if header.int1 >= 0 => Ok(payload_buf[..len].to_vec()),
      MsgType::RetIntStr => Err(HelperError::Remote {
        source: Errno::from_raw(header.int2),
      }),
      _ => unreachable!("helper protocol violation on readlink reply"),
    }
  }

  /// The helper's pid, if spawned — visible in the main process's
  /// process table, per spec §8 test 6.
  pub fn helper_pid(&self) -> Option<Pid> {
    self.child.as_ref().map(|c| c.pid)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;

  #[test]
  fn mnt_ns_inode_of_self_is_stable() {
    let a = mnt_ns_inode(getpid()).unwrap();
    let b = mnt_ns_inode(getpid()).unwrap();
    assert_eq!(a, b);
  }

  #[test]
  fn shares_our_namespace_true_for_self() {
    assert!(MountNsHelper::shares_our_namespace(getpid()).unwrap());
  }

  #[test]
  #[serial]
  fn multifs_open_in_same_namespace_bypasses_helper() {
    let mut helper = MountNsHelper::new();
    let path = CString::new("/dev/null").unwrap();
    let fd = helper
      .multifs_open(getpid(), &path, OFlag::O_RDONLY, Mode::empty())
      .expect("opening /dev/null in our own namespace must not need the helper");
    drop(fd);
    assert!(helper.helper_pid().is_none());
  }
}
