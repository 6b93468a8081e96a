//! The helper child's main loop (spec §4.3).
//!
//! Runs after `fork()`, single-threaded, and never returns to the caller:
//! it either services requests until the parent goes away, or calls
//! `_exit` directly. Debug logging is disabled here and allocation is
//! avoided on the request-handling path — everything after `fork` and
//! before `_exit` is held to the same constraint as a signal handler.

use std::{
  ffi::CString,
  os::fd::{AsFd, BorrowedFd, FromRawFd, OwnedFd},
};

use nix::{
  errno::Errno,
  fcntl::{self, OFlag},
  sched::{CloneFlags, setns},
  sys::stat::Mode,
  unistd::{Pid, getppid, readlink, unlink},
};

use crate::protocol::{Header, MsgType, PATH_MAX, recv_message, send_message};

fn path_from_payload(buf: &[u8], len: usize) -> Option<CString> {
  let bytes = buf.get(..len)?;
  let end = bytes.iter().position(|&b| b == 0).unwrap_or(len);
  CString::new(&bytes[..end]).ok()
}

fn handle_setns(socket: BorrowedFd<'_>, ns_fd: Option<OwnedFd>, nstype: i32) -> Result<(), Errno> {
  let result = match &ns_fd {
    Some(fd) => setns(fd.as_fd(), CloneFlags::from_bits_truncate(nstype)),
    None => Err(Errno::EBADF),
  };
  let (ret, errno) = match result {
    Ok(()) => (0, 0),
    Err(e) => (-1, e as i32),
  };
  send_message(socket, Header::new(MsgType::RetInt, ret, errno), None, &[])
}

fn handle_open(socket: BorrowedFd<'_>, path: CString, flags: i32, mode: u32) -> Result<(), Errno> {
  let oflag = OFlag::from_bits_truncate(flags);
  let mode = Mode::from_bits_truncate(mode);
  match fcntl::open(path.as_c_str(), oflag, mode) {
    Ok(fd) => {
      let owned = unsafe { OwnedFd::from_raw_fd(fd) };
      send_message(socket, Header::new(MsgType::RetFd, 0, 0), Some(owned.as_fd()), &[])
    }
    Err(e) => send_message(socket, Header::new(MsgType::RetFd, -1, e as i32), None, &[]),
  }
}

fn handle_unlink(socket: BorrowedFd<'_>, path: CString) -> Result<(), Errno> {
  let (ret, errno) = match unlink(path.as_c_str()) {
    Ok(()) => (0, 0),
    Err(e) => (-1, e as i32),
  };
  send_message(socket, Header::new(MsgType::RetInt, ret, errno), None, &[])
}

fn handle_readlink(socket: BorrowedFd<'_>, path: CString) -> Result<(), Errno> {
  let mut buf = [0u8; PATH_MAX];
  match readlink(path.as_c_str(), &mut buf[..]) {
    Ok(target) => {
      let bytes = target.as_bytes();
      let n = bytes.len().min(PATH_MAX);
      let mut payload = [0u8; PATH_MAX];
      payload[..n].copy_from_slice(&bytes[..n]);
      send_message(socket, Header::new(MsgType::RetIntStr, n as i32, 0), None, &payload[..n])
    }
    Err(e) => send_message(socket, Header::new(MsgType::RetIntStr, -1, e as i32), None, &[]),
  }
}

/// Runs the helper loop until the parent dies or the socket closes.
/// Never returns: calls `std::process::exit` on every exit path.
pub fn run(socket: OwnedFd, birth_parent: Pid) -> ! {
  let mut payload_buf = [0u8; PATH_MAX];
  loop {
    if getppid() != birth_parent {
      std::process::exit(0);
    }

    let socket_fd = socket.as_fd();
    let received = recv_message(socket_fd, &mut payload_buf);
    let (header, fd, len) = match received {
      Ok(Some(msg)) => msg,
      Ok(None) => std::process::exit(0),
      Err(_) => std::process::exit(1),
    };

    let outcome = match header.msg_type {
      MsgType::Setns => handle_setns(socket_fd, fd, header.int1),
      MsgType::Open => match path_from_payload(&payload_buf, len) {
        Some(path) => handle_open(socket_fd, path, header.int1, header.int2 as u32),
        None => send_message(socket_fd, Header::new(MsgType::MsgError, 0, 0), None, &[]),
      },
      MsgType::Unlink => match path_from_payload(&payload_buf, len) {
        Some(path) => handle_unlink(socket_fd, path),
        None => send_message(socket_fd, Header::new(MsgType::MsgError, 0, 0), None, &[]),
      },
      MsgType::Readlink => match path_from_payload(&payload_buf, len) {
        Some(path) => handle_readlink(socket_fd, path),
        None => send_message(socket_fd, Header::new(MsgType::MsgError, 0, 0), None, &[]),
      },
      _ => send_message(socket_fd, Header::new(MsgType::MsgError, 0, 0), None, &[]),
    };

    if outcome.is_err() {
      std::process::exit(1);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn path_from_payload_stops_at_nul() {
    let mut buf = [0u8; PATH_MAX];
    buf[..5].copy_from_slice(b"/tmp\0");
    let path = path_from_payload(&buf, 5).unwrap();
    assert_eq!(path.to_str().unwrap(), "/tmp");
  }

  #[test]
  fn path_from_payload_rejects_embedded_nul_free_garbage() {
    let buf = [0u8; 0];
    assert!(path_from_payload(&buf, 0).is_some());
  }
}
