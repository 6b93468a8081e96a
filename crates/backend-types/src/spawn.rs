//! Child-side process setup for `create_inferior` (spec §4.6.2).
//!
//! Grounded on `tracexec-core/src/tracee.rs`: the stdio/group helpers
//! below are carried over almost verbatim, extended with the
//! `PTRACE_TRACEME` + ASLR-disable + `execve` sequence the spec's spawn
//! path actually runs.

use std::{
  convert::Infallible,
  ffi::CString,
  os::fd::{AsFd, FromRawFd, OwnedFd},
};

use nix::{
  errno::Errno,
  sys::{
    personality::{self, Persona},
    ptrace,
  },
  unistd::{dup2, execve, getpid, setpgid},
};

pub fn nullify_stdio() -> Result<(), Errno> {
  let dev_null = std::fs::File::options()
    .read(true)
    .write(true)
    .open("/dev/null")
    .map_err(|_| Errno::EIO)?;
  let mut stdin = unsafe { OwnedFd::from_raw_fd(0) };
  let mut stdout = unsafe { OwnedFd::from_raw_fd(1) };
  let mut stderr = unsafe { OwnedFd::from_raw_fd(2) };
  dup2(dev_null.as_fd(), &mut stdin)?;
  dup2(dev_null.as_fd(), &mut stdout)?;
  dup2(dev_null.as_fd(), &mut stderr)?;
  std::mem::forget(stdin);
  std::mem::forget(stdout);
  std::mem::forget(stderr);
  Ok(())
}

/// `setpgid(0,0)`: the child becomes its own process group leader, so a
/// Ctrl-C delivered to the debugger's foreground group does not directly
/// signal it too (spec §4.6.2).
pub fn lead_process_group() -> Result<(), Errno> {
  let me = getpid();
  setpgid(me, me)
}

/// Runs in the forked child: `PTRACE_TRACEME`, then `setpgid(0,0)`, then
/// optional stdio redirection, then `ADDR_NO_RANDOMIZE` if requested, then
/// `execve`. Per spec §4.6.2, the parent only learns of success by seeing
/// the post-exec stop; this function itself never returns on success.
pub fn exec_traced_child(
  program: &CString,
  args: &[CString],
  env: &[CString],
  disable_randomization: bool,
  redirect_stdio: bool,
) -> Result<Infallible, Errno> {
  ptrace::traceme()?;
  lead_process_group()?;
  if redirect_stdio {
    nullify_stdio()?;
  }
  if disable_randomization {
    let current = personality::get()?;
    personality::set(current | Persona::ADDR_NO_RANDOMIZE)?;
  }
  execve(program, args, env)
}

#[cfg(test)]
mod tests {
  use super::*;
  use nix::unistd::getpgrp;
  use rusty_fork::rusty_fork_test;
  use std::io::{Read, Write};

  rusty_fork_test! {
    #[test]
    fn test_nullify_stdio() {
      nullify_stdio().expect("nullify_stdio failed");

      let mut stdout = std::io::stdout();
      stdout.write_all(b"discarded").unwrap();
      stdout.flush().unwrap();

      let mut buf = [0u8; 16];
      let mut stdin = std::io::stdin();
      let n = stdin.read(&mut buf).unwrap();
      assert_eq!(n, 0);
    }
  }

  rusty_fork_test! {
    #[test]
    fn test_lead_process_group() {
      let pid = nix::unistd::getpid();
      lead_process_group().expect("lead_process_group failed");
      assert_eq!(getpgrp(), pid);
    }
  }

  rusty_fork_test! {
    #[test]
    fn test_exec_traced_child_rejects_missing_program() {
      // A path that cannot exist lets us observe the traceme/setpgid
      // sequence succeeding while still catching ENOENT from execve,
      // without actually replacing this forked test process's image.
      let program = CString::new("/nonexistent/does-not-exist").unwrap();
      let args = [program.clone()];
      let env: Vec<CString> = Vec::new();
      let err = exec_traced_child(&program, &args, &env, false, true).unwrap_err();
      assert_eq!(err, Errno::ENOENT);
    }
  }
}
