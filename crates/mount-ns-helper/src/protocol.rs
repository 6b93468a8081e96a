//! Wire protocol for the `mount-ns-helper` child (spec §4.3): one message
//! is a fixed 12-byte header plus an optional nul-terminated path payload,
//! with file descriptors passed out-of-band via `SCM_RIGHTS`.

use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd};

use nix::{
  cmsg_space,
  errno::Errno,
  sys::socket::{ControlMessage, ControlMessageOwned, MsgFlags, recvmsg, sendmsg},
  sys::uio::IoSliceMut,
};

/// Linux `PATH_MAX`, also the hard cap on this protocol's payload size
/// (spec §4.3: "a fixed stack buffer (≤ `PATH_MAX`)").
pub const PATH_MAX: usize = 4096;
const HEADER_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MsgType {
  Setns = 0,
  Open = 1,
  Unlink = 2,
  Readlink = 3,
  RetInt = 4,
  RetFd = 5,
  RetIntStr = 6,
  MsgError = 7,
}

impl MsgType {
  fn from_u32(v: u32) -> Option<Self> {
    Some(match v {
      0 => Self::Setns,
      1 => Self::Open,
      2 => Self::Unlink,
      3 => Self::Readlink,
      4 => Self::RetInt,
      5 => Self::RetFd,
      6 => Self::RetIntStr,
      7 => Self::MsgError,
      _ => return None,
    })
  }
}

#[derive(Debug, Clone, Copy)]
pub struct Header {
  pub msg_type: MsgType,
  pub int1: i32,
  pub int2: i32,
}

impl Header {
  pub fn new(msg_type: MsgType, int1: i32, int2: i32) -> Self {
    Self { msg_type, int1, int2 }
  }

  fn to_bytes(self) -> [u8; HEADER_LEN] {
    let mut buf = [0u8; HEADER_LEN];
    buf[0..4].copy_from_slice(&(self.msg_type as u32).to_ne_bytes());
    buf[4..8].copy_from_slice(&self.int1.to_ne_bytes());
    buf[8..12].copy_from_slice(&self.int2.to_ne_bytes());
    buf
  }

  fn from_bytes(buf: &[u8; HEADER_LEN]) -> Option<Self> {
    let msg_type = MsgType::from_u32(u32::from_ne_bytes(buf[0..4].try_into().unwrap()))?;
    let int1 = i32::from_ne_bytes(buf[4..8].try_into().unwrap());
    let int2 = i32::from_ne_bytes(buf[8..12].try_into().unwrap());
    Some(Self { msg_type, int1, int2 })
  }
}

/// Sends one message: header, an optional raw fd via `SCM_RIGHTS`, and an
/// optional payload. `payload` must be `<= PATH_MAX` bytes.
pub fn send_message(socket: BorrowedFd<'_>, header: Header, fd: Option<BorrowedFd<'_>>, payload: &[u8]) -> Result<(), Errno> {
  debug_assert!(payload.len() <= PATH_MAX);
  let header_bytes = header.to_bytes();
  let iov = [std::io::IoSlice::new(&header_bytes), std::io::IoSlice::new(payload)];
  match fd {
    Some(fd) => {
      let fds = [fd.as_raw_fd()];
      let cmsg = [ControlMessage::ScmRights(&fds)];
      sendmsg::<()>(socket.as_raw_fd(), &iov, &cmsg, MsgFlags::empty(), None)?;
    }
    None => {
      sendmsg::<()>(socket.as_raw_fd(), &iov, &[], MsgFlags::empty(), None)?;
    }
  }
  Ok(())
}

/// Receives one message into a caller-provided fixed payload buffer.
/// Returns `None` on a clean EOF (peer closed the socket), matching the
/// reparent-exit behavior in §4.3.
pub fn recv_message(socket: BorrowedFd<'_>, payload_buf: &mut [u8; PATH_MAX]) -> Result<Option<(Header, Option<OwnedFd>, usize)>, Errno> {
  let mut header_buf = [0u8; HEADER_LEN];
  let mut iov = [IoSliceMut::new(&mut header_buf), IoSliceMut::new(payload_buf)];
  let mut cmsg_buf = cmsg_space!([std::os::unix::io::RawFd; 1]);
  let msg = recvmsg::<()>(socket.as_raw_fd(), &mut iov, Some(&mut cmsg_buf), MsgFlags::empty())?;

  if msg.bytes == 0 {
    return Ok(None);
  }

  let header = Header::from_bytes(&header_buf).ok_or(Errno::EPROTO)?;
  let payload_len = msg.bytes.saturating_sub(HEADER_LEN).min(PATH_MAX);

  let mut fd = None;
  for cmsg in msg.cmsgs().map_err(|_| Errno::EPROTO)? {
    if let ControlMessageOwned::ScmRights(fds) = cmsg {
      if let Some(&raw) = fds.first() {
        fd = Some(unsafe { OwnedFd::from_raw_fd(raw) });
      }
    }
  }

  Ok(Some((header, fd, payload_len)))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn header_round_trips() {
    let header = Header::new(MsgType::Open, 42, -1);
    let bytes = header.to_bytes();
    let decoded = Header::from_bytes(&bytes).unwrap();
    assert_eq!(decoded.msg_type, MsgType::Open);
    assert_eq!(decoded.int1, 42);
    assert_eq!(decoded.int2, -1);
  }

  #[test]
  fn unknown_msg_type_rejected() {
    let mut bytes = [0u8; HEADER_LEN];
    bytes[0..4].copy_from_slice(&255u32.to_ne_bytes());
    assert!(Header::from_bytes(&bytes).is_none());
  }
}
