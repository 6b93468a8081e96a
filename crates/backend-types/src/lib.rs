//! Shared types for the native-debug ptrace backend.
//!
//! This crate owns the data that both the raw syscall layer (`backend-sys`)
//! and the orchestration layer (the root crate) need: LWP identity, the
//! per-inferior bookkeeping, `/proc` access, the client-visible event
//! vocabulary, and the child-side process setup helpers used when spawning
//! a new inferior.

pub mod error;
pub mod event;
pub mod inferior;
pub mod proc;
pub mod ptid;
pub mod spawn;

pub use error::{InspectError, ProcfsError};
pub use event::{Event, ProcessExit, Signal, StopReason};
pub use inferior::{Inferior, ANY_SYSCALL};
pub use ptid::{LwpId, Ptid};
