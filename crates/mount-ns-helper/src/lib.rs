//! C3 `MountNsHelper`: cross-mount-namespace file access via a forked,
//! single-threaded helper child and a `SCM_RIGHTS` wire protocol.

mod client;
mod error;
mod helper;
mod protocol;

pub use client::{MountNsHelper, mnt_ns_inode};
pub use error::HelperError;
